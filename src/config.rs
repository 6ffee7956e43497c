//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml` and reads the required environment.
//!     the file is optional (defaults apply); the environment is not.
//!
//! structure:
//!     - ServerConfig: listen address for the http api.
//!     - QueryConfig: per-device row cap and the utc offset applied to Fecha.
//!     - ExportConfig: attachment filename for /registrosJSON.
//!     - IngestConfig: which POST /registro payload shape this deployment takes.
//!     - LoggingConfig: whether decoded payloads are logged.
//!     - Environment: ENV (release|debug) and DSN, both mandatory. PORT optional.
//!       a .env file, when present, fills in whatever the process env lacks.
//!
//! ==============================================================================

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryConfig {
    /// joined rows returned by GET /registros/{device}
    pub device_row_limit: u32,
    /// offset Fecha is converted to, "+HH:MM" / "-HH:MM"
    pub utc_offset: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub filename: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    #[serde(default)]
    pub payload: PayloadShape,
}

/// body layout accepted by POST /registro
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    /// {"Dispositivo": .., "Datos": {variable: value, ..}}
    #[default]
    Generic,
    /// {"Dispositivo": .., "Temperatura": .., "Humedad": .., "Presion": ..}
    Fixed,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub show_payloads: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: "0.0.0.0:8080".to_string() }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { device_row_limit: 30, utc_offset: "-03:00".to_string() }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { filename: "registros.json".to_string() }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    /// Parse and validate a host.toml document
    pub fn parse(content: &str) -> Result<Self> {
        let config: HostConfig = toml::from_str(content)
            .map_err(|e| anyhow!("Failed to parse config: {}", e))?;
        config.utc_offset_minutes()?;
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("host.toml"),
            std::path::PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("[CONFIG] Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No config file found - using defaults");
        Self::default()
    }

    /// query.utc_offset in minutes east of utc
    pub fn utc_offset_minutes(&self) -> Result<i32> {
        parse_utc_offset(&self.query.utc_offset)
    }

    /// apply environment overrides (PORT replaces the listen port)
    pub fn apply_env(&mut self, env: &Environment) {
        if let Some(port) = env.port {
            let host = self
                .server
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.listen_addr = format!("{}:{}", host, port);
        }
    }

    /// Log configuration summary
    pub fn print_summary(&self, env: &Environment) {
        tracing::info!("┌─────────────────────────────────────────┐");
        tracing::info!("│           HOST CONFIGURATION            │");
        tracing::info!("├─────────────────────────────────────────┤");
        tracing::info!("│ Mode: {:?}", env.mode);
        tracing::info!("│ Listen: {}", self.server.listen_addr);
        tracing::info!("│ Device row limit: {}", self.query.device_row_limit);
        tracing::info!("│ UTC offset: {}", self.query.utc_offset);
        tracing::info!("│ Ingest payload: {:?}", self.ingest.payload);
        tracing::info!("└─────────────────────────────────────────┘");
    }
}

/// "-03:00" -> -180
pub fn parse_utc_offset(raw: &str) -> Result<i32> {
    let raw = raw.trim();
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => bail!("utc offset {:?} must start with + or -", raw),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| anyhow!("utc offset {:?} must look like -03:00", raw))?;
    let hours: u32 = hours.parse().with_context(|| format!("bad hours in utc offset {:?}", raw))?;
    let minutes: u32 = minutes
        .parse()
        .with_context(|| format!("bad minutes in utc offset {:?}", raw))?;
    if hours > 14 || minutes >= 60 {
        bail!("utc offset {:?} out of range", raw);
    }
    Ok(sign * (hours * 60 + minutes) as i32)
}

// ==============================================================================
// environment
// ==============================================================================

/// logging strictness picked by ENV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// ENV=release: info and up
    Release,
    /// ENV=debug: everything down to debug
    Debug,
}

impl RunMode {
    /// default tracing filter for this mode (RUST_LOG still wins)
    pub fn default_filter(self) -> &'static str {
        match self {
            RunMode::Release => "info",
            RunMode::Debug => "debug",
        }
    }
}

/// the process environment the host refuses to start without
#[derive(Debug, Clone)]
pub struct Environment {
    pub mode: RunMode,
    /// raw ENV value, kept so unknown values can be reported once logging is up
    pub mode_raw: String,
    pub dsn: String,
    pub port: Option<u16>,
}

/// Load `.env` from the working directory (or a parent) into the process
/// environment. Already-set variables are left alone.
pub fn load_dotenv() -> Result<std::path::PathBuf> {
    dotenvy::dotenv().context("failed to load .env")
}

/// Load a specific env file into the process environment.
pub fn load_dotenv_from<P: AsRef<Path>>(path: P) -> Result<()> {
    dotenvy::from_path(path.as_ref())
        .with_context(|| format!("failed to load {}", path.as_ref().display()))
}

impl Environment {
    /// Read ENV, DSN and PORT from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode_raw = lookup("ENV").ok_or_else(|| anyhow!("ENV: not present"))?;
        let dsn = lookup("DSN").ok_or_else(|| anyhow!("DSN: not present"))?;
        let port = match lookup("PORT") {
            Some(p) => Some(p.parse().with_context(|| format!("PORT: invalid value {:?}", p))?),
            None => None,
        };
        let mode = match mode_raw.as_str() {
            "release" => RunMode::Release,
            _ => RunMode::Debug,
        };
        Ok(Self { mode, mode_raw, dsn, port })
    }

    /// true when ENV held something other than release/debug
    pub fn mode_is_unknown(&self) -> bool {
        !matches!(self.mode_raw.as_str(), "release" | "debug")
    }
}
