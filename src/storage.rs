//! ==============================================================================
//! storage.rs - registros/datos persistence on sqlite
//! ==============================================================================
//!
//! purpose:
//!     owns the sql. every query the api needs lives here, together with the
//!     schema it runs against. readers hand their row cursor straight to the
//!     aggregator, so rows are never buffered flat.
//!
//! design:
//!     - `ReadingStore` is the seam handlers depend on (injected via router state)
//!     - `SqliteStore` implements it over a single rusqlite connection behind a
//!       mutex; callers run it on the blocking pool
//!     - data rows cascade with their reading (foreign keys are switched on
//!       for the connection)
//!
//! relationships:
//!     - used by: server.rs (handlers), main.rs (opened at startup)
//!     - uses: aggregate.rs, domain.rs
//!
//! ==============================================================================

use crate::aggregate::aggregate;
use crate::domain::{FlatRow, NewReading, Reading};

use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Errors that can occur while talking to storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage connection poisoned by a panicked request")]
    Poisoned,

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// what the http layer needs from storage
pub trait ReadingStore: Send + Sync {
    /// most recent readings of one device, newest first, capped at `row_limit` joined rows
    fn readings_for_device(&self, device: &str, row_limit: u32) -> StorageResult<Vec<Reading>>;

    /// every reading, oldest first
    fn export_all(&self) -> StorageResult<Vec<Reading>>;

    /// distinct device names in query order
    fn devices(&self) -> StorageResult<Vec<String>>;

    /// write one reading and its data, returns the new reading id
    fn create_reading(&self, reading: &NewReading) -> StorageResult<i64>;

    /// remove every reading (data go with them)
    fn delete_all(&self) -> StorageResult<usize>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS Registros (
        ID          INTEGER PRIMARY KEY AUTOINCREMENT,
        Dispositivo TEXT NOT NULL,
        Fecha       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%S', 'now'))
    );

    CREATE TABLE IF NOT EXISTS Datos (
        ID_Dato     INTEGER PRIMARY KEY AUTOINCREMENT,
        ID_Registro INTEGER NOT NULL REFERENCES Registros(ID) ON DELETE CASCADE,
        Variable    TEXT NOT NULL,
        Valor       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_registros_dispositivo_fecha
        ON Registros (Dispositivo, Fecha);
    CREATE INDEX IF NOT EXISTS idx_datos_registro
        ON Datos (ID_Registro);
";

// the timestamp shift is bound as a sqlite date modifier (?1), e.g. "-180 minutes"
const SELECT_DEVICE: &str = "
    SELECT r.ID, r.Dispositivo, datetime(r.Fecha, ?1) AS Converted_Fecha,
           d.ID_Dato AS Dato_ID, d.Variable, d.Valor
    FROM Registros r
    LEFT JOIN Datos d ON r.ID = d.ID_Registro
    WHERE r.Dispositivo = ?2
    ORDER BY r.Fecha DESC, r.ID DESC, d.ID_Dato ASC
    LIMIT ?3";

const SELECT_ALL: &str = "
    SELECT r.ID, r.Dispositivo, datetime(r.Fecha, ?1) AS Converted_Fecha,
           d.ID_Dato AS Dato_ID, d.Variable, d.Valor
    FROM Registros r
    LEFT JOIN Datos d ON r.ID = d.ID_Registro
    ORDER BY r.Fecha ASC, r.ID ASC, d.ID_Dato ASC";

const SELECT_DEVICES: &str = "SELECT DISTINCT Dispositivo FROM Registros";

const INSERT_REGISTRO: &str = "INSERT INTO Registros (Dispositivo) VALUES (?1)";
const INSERT_DATO: &str = "INSERT INTO Datos (ID_Registro, Variable, Valor) VALUES (?1, ?2, ?3)";
const DELETE_REGISTROS: &str = "DELETE FROM Registros";

/// sqlite-backed reading store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// sqlite date modifier applied to every Fecha on the way out
    offset_modifier: String,
}

impl SqliteStore {
    /// Open the store named by a DSN.
    ///
    /// accepted forms: `:memory:`, `sqlite::memory:`, `sqlite://path/to.db`,
    /// `sqlite:path/to.db` or a bare file path.
    pub fn open(dsn: &str, utc_offset_minutes: i32) -> StorageResult<Self> {
        let target = dsn
            .strip_prefix("sqlite://")
            .or_else(|| dsn.strip_prefix("sqlite:"))
            .unwrap_or(dsn);

        let conn = if target == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(target))?
        };
        Self::with_connection(conn, utc_offset_minutes)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory(utc_offset_minutes: i32) -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, utc_offset_minutes)
    }

    fn with_connection(conn: Connection, utc_offset_minutes: i32) -> StorageResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            offset_modifier: format!("{:+} minutes", utc_offset_minutes),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn flat_row(row: &Row<'_>) -> rusqlite::Result<FlatRow> {
    Ok(FlatRow {
        reading_id: row.get(0)?,
        device: row.get(1)?,
        timestamp: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        datum_id: row.get(3)?,
        variable: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        value: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}

impl ReadingStore for SqliteStore {
    fn readings_for_device(&self, device: &str, row_limit: u32) -> StorageResult<Vec<Reading>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(SELECT_DEVICE)?;
        let rows = stmt.query_map(params![self.offset_modifier, device, row_limit], flat_row)?;
        Ok(aggregate(rows)?)
    }

    fn export_all(&self) -> StorageResult<Vec<Reading>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(SELECT_ALL)?;
        let rows = stmt.query_map(params![self.offset_modifier], flat_row)?;
        Ok(aggregate(rows)?)
    }

    fn devices(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(SELECT_DEVICES)?;
        let devices = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(devices)
    }

    fn create_reading(&self, reading: &NewReading) -> StorageResult<i64> {
        let mut conn = self.lock()?;
        // registro + datos commit together or not at all
        let tx = conn.transaction()?;
        tx.execute(INSERT_REGISTRO, params![reading.device])?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare_cached(INSERT_DATO)?;
            for (variable, value) in &reading.data {
                stmt.execute(params![id, variable, value])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    fn delete_all(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(DELETE_REGISTROS, [])?)
    }
}
