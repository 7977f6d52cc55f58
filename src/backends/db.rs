use crate::core::error::BridgeError;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT_SECS: u64 = 5;

/// Opens an existing web application database. A missing file is an error
/// rather than a fresh empty database.
pub fn db_connect(db_path: &Path) -> Result<Connection, BridgeError> {
    if !db_path.is_file() {
        return Err(BridgeError::NotFound(format!(
            "web application database {}",
            db_path.display()
        )));
    }
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
    Ok(conn)
}

/// Renders a column value the way the bridge stores ids: as text.
pub fn value_to_string(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(i) => Some(i.to_string()),
        SqlValue::Real(f) => Some(f.to_string()),
        SqlValue::Text(s) => Some(s),
        SqlValue::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}
