//! ==============================================================================
//! ingest.rs - decode POST /registro bodies into a NewReading
//! ==============================================================================
//!
//! purpose:
//!     devices post readings in one of two shapes, picked per deployment in
//!     host.toml (`[ingest] payload`):
//!
//! ```text
//!     generic:  {"Dispositivo": "invernadero-1", "Datos": {"temp": 21.5, "hum": "55"}}
//!     fixed:    {"Dispositivo": "invernadero-1", "Temperatura": 21.5, "Humedad": 55}
//!
//!     both end up as the same `NewReading` (device + variable/value strings),
//!     so storage only knows one schema mapping.
//! ```
//!
//! relationships:
//!     - used by: server.rs (create handler)
//!     - uses: domain.rs (NewReading), config.rs (PayloadShape)
//!
//! ==============================================================================

use crate::config::PayloadShape;
use crate::domain::NewReading;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct GenericPayload {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        rename = "Dispositivo",
        alias = "dispositivo",
        alias = "device"
    )]
    device: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        rename = "Datos",
        alias = "datos",
        alias = "data"
    )]
    data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FixedPayload {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        rename = "Dispositivo",
        alias = "dispositivo",
        alias = "device"
    )]
    device: String,
    #[serde(default, rename = "Temperatura", alias = "temperatura")]
    temperature: Option<f64>,
    #[serde(default, rename = "Humedad", alias = "humedad")]
    humidity: Option<f64>,
    #[serde(default, rename = "Presion", alias = "presion")]
    pressure: Option<f64>,
}

/// `null` decodes like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// decode a request body according to the configured payload shape
pub fn decode(shape: PayloadShape, body: &[u8]) -> Result<NewReading, serde_json::Error> {
    match shape {
        PayloadShape::Generic => {
            let payload: GenericPayload = serde_json::from_slice(body)?;
            Ok(NewReading {
                device: payload.device,
                data: payload
                    .data
                    .iter()
                    .map(|(variable, value)| (variable.clone(), value_text(value)))
                    .collect(),
            })
        }
        PayloadShape::Fixed => {
            let payload: FixedPayload = serde_json::from_slice(body)?;
            let fields = [
                ("temperatura", payload.temperature),
                ("humedad", payload.humidity),
                ("presion", payload.pressure),
            ];
            Ok(NewReading {
                device: payload.device,
                data: fields
                    .into_iter()
                    .filter_map(|(name, v)| v.map(|v| (name.to_string(), v.to_string())))
                    .collect(),
            })
        }
    }
}

/// text stored in Datos.Valor for a json value
///
/// strings go in verbatim (no quotes), null becomes "", everything else is
/// its compact json text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
