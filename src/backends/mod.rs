//! Concrete collaborators: the SQLite-backed web application, the
//! file-backed permission systems, and SQL statistics.

pub mod db;
pub mod permissions;
pub mod statistics;
pub mod webapp;
