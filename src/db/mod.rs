//! Gallery record store.
//!
//! Owns the `photos` and `sensor_readings` tables. All writes that touch
//! both tables run in a single immediate transaction, so readers never see
//! a photo without its reading or a reading without its photo.

mod schema;
pub mod geo;
pub mod photos;
pub mod readings;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{GalleryError, Result};

pub use geo::GeoTag;
pub use photos::{NewPhoto, Photo};
pub use readings::{NewReading, SensorReading};
pub use schema::{MIGRATIONS, SCHEMA};

/// Shared handle to the SQLite database; safe to use from many threads.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| GalleryError::io(parent, e))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;
        for migration in MIGRATIONS {
            let _ = conn.execute(migration, []);
        }
        Ok(())
    }

    /// A panic while holding the lock leaves no half-applied transaction
    /// behind (it rolls back on drop), so a poisoned lock is still usable.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
