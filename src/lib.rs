//! registros host library
//!
//! devices push readings (`Registro` + `Dato`s) over http, the dashboard reads
//! them back. `main.rs` only wires these modules together.

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod server;
pub mod storage;
