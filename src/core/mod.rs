//! The player state sync engine and the pieces it is wired from.
//!
//! Everything here talks to the outside world only through the traits in
//! [`collaborators`]; concrete systems live in [`crate::backends`].

pub mod collaborators;
pub mod config;
pub mod environment;
pub mod error;
pub mod locks;
pub mod player;
pub mod player_state;
pub mod record;
pub mod session;
pub mod statistics;
pub mod sync;
pub mod time;
