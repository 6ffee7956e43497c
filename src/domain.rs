//! ==============================================================================
//! domain.rs - registros, datos and the flat rows they are rebuilt from
//! ==============================================================================
//!
//! purpose:
//!     the types that travel between storage, the aggregator and the http api.
//!     field names on the wire follow the dashboard contract
//!     (`ID`, `Dispositivo`, `Fecha`, `Datos` / `ID`, `Variable`, `Valor`).
//!
//! relationships:
//!     - produced by: storage.rs (FlatRow), aggregate.rs (Reading)
//!     - consumed by: server.rs (json responses), ingest.rs (NewReading)
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};

/// one timestamped event reported by a device (a "registro")
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// device name (e.g. "invernadero-1")
    #[serde(rename = "Dispositivo")]
    pub device: String,

    /// timestamp as returned by storage, already shifted to the local offset
    #[serde(rename = "Fecha")]
    pub timestamp: String,

    /// storage-assigned identifier
    #[serde(rename = "ID")]
    pub id: i64,

    /// data points in the order storage delivered them
    #[serde(rename = "Datos")]
    pub data: Vec<Datum>,
}

/// one variable/value pair attached to a reading (a "dato")
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datum {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Variable")]
    pub variable: String,
    #[serde(rename = "Valor")]
    pub value: String,
}

/// one row of the registros LEFT JOIN datos result set
///
/// a reading without data yields a single row with `datum_id == None`
/// and empty variable/value columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatRow {
    pub reading_id: i64,
    pub device: String,
    pub timestamp: String,
    pub datum_id: Option<i64>,
    pub variable: String,
    pub value: String,
}

impl FlatRow {
    /// the datum carried by this row, if the join matched one
    pub fn datum(&self) -> Option<Datum> {
        self.datum_id.map(|id| Datum {
            id,
            variable: self.variable.clone(),
            value: self.value.clone(),
        })
    }
}

/// a reading about to be written: device plus its variable/value pairs
///
/// both ingest payload shapes (generic map, fixed sensor fields) normalize
/// into this before storage sees them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewReading {
    pub device: String,
    pub data: Vec<(String, String)>,
}
