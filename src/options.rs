// Copyright (c) 2025 - Cowboy AI, Inc.
//! Connection options for the eventd client
//!
//! Options live under the `eventd` section of the host application's
//! configuration document:
//!
//! ```yaml
//! eventd:
//!   host: 10.0.20.1
//!   port: 4222
//!   disabled: false
//!   nkeyFile: eventd.nk      # resolved against <cwd>/etc when relative
//!   nkey: SUAM...            # raw user seed, takes precedence over nkeyFile
//! ```
//!
//! Options are loaded once at startup and handed to [`crate::EventdClient`].
//! Missing or non-positive values fall back to `127.0.0.1:4222`.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{EventdError, EventdResult};
use crate::secret::SecretBuffer;

/// Name of the configuration section holding eventd options
pub const CONFIGURATION_KEY: &str = "eventd";

/// Host used when none is configured
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when none (or an unusable one) is configured
pub const DEFAULT_PORT: u16 = 4222;

/// Section as it appears on disk, before defaults are applied
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOptions {
    nkey_file: Option<String>,
    host: Option<String>,
    port: Option<i64>,
    disabled: Option<bool>,
    nkey: Option<SecretBuffer>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    eventd: Option<RawOptions>,
}

/// Normalized eventd connection options
#[derive(Debug, Clone)]
pub struct EventdOptions {
    host: String,
    port: u16,
    disabled: bool,
    nkey_file: Option<PathBuf>,
    nkey: Option<SecretBuffer>,
}

impl Default for EventdOptions {
    fn default() -> Self {
        Self::from_raw(RawOptions::default())
    }
}

impl EventdOptions {
    /// Options for the given server, without authentication
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            disabled: false,
            nkey_file: None,
            nkey: None,
        }
        .normalized()
    }

    /// Load the `eventd` section from a configuration file.
    ///
    /// `.json` files are parsed as JSON; everything else is parsed as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> EventdResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EventdError::Configuration(format!(
                "failed to read configuration file '{}': {e}",
                path.display()
            ))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Parse options from a JSON configuration document
    pub fn from_json_str(document: &str) -> EventdResult<Self> {
        let document: ConfigDocument = serde_json::from_str(document).map_err(|e| {
            EventdError::Configuration(format!("invalid '{CONFIGURATION_KEY}' section: {e}"))
        })?;
        Ok(Self::from_raw(document.eventd.unwrap_or_default()))
    }

    /// Parse options from a YAML configuration document
    pub fn from_yaml_str(document: &str) -> EventdResult<Self> {
        // an empty YAML document deserializes as unit, not as a map
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: ConfigDocument = serde_yaml::from_str(document).map_err(|e| {
            EventdError::Configuration(format!("invalid '{CONFIGURATION_KEY}' section: {e}"))
        })?;
        Ok(Self::from_raw(document.eventd.unwrap_or_default()))
    }

    /// Overlay `EVENTD_*` environment variables onto these options
    pub fn with_env_overrides(self) -> EventdResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, keyed by `EVENTD_HOST`, `EVENTD_PORT`,
    /// `EVENTD_DISABLED`, `EVENTD_NKEY` and `EVENTD_NKEY_FILE`.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> EventdResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("EVENTD_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("EVENTD_PORT") {
            let port: i64 = port.trim().parse().map_err(|e| {
                EventdError::Configuration(format!("invalid EVENTD_PORT '{port}': {e}"))
            })?;
            self.port = normalize_port(Some(port));
        }
        if let Some(disabled) = lookup("EVENTD_DISABLED") {
            self.disabled = disabled.trim().parse().map_err(|e| {
                EventdError::Configuration(format!("invalid EVENTD_DISABLED '{disabled}': {e}"))
            })?;
        }
        if let Some(nkey) = lookup("EVENTD_NKEY") {
            self.nkey = non_empty_secret(Some(SecretBuffer::from(nkey)));
        }
        if let Some(path) = lookup("EVENTD_NKEY_FILE") {
            self.nkey_file = non_empty_path(Some(path));
        }
        Ok(self.normalized())
    }

    /// Set the raw NKey user seed
    #[must_use]
    pub fn with_nkey(mut self, seed: impl Into<SecretBuffer>) -> Self {
        self.nkey = non_empty_secret(Some(seed.into()));
        self
    }

    /// Set the NKey seed file path
    #[must_use]
    pub fn with_nkey_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.nkey_file = (!path.as_os_str().is_empty()).then_some(path);
        self
    }

    /// Enable or disable the eventd client
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    pub fn nkey_file(&self) -> Option<&Path> {
        self.nkey_file.as_deref()
    }

    pub fn nkey(&self) -> Option<&SecretBuffer> {
        self.nkey.as_ref()
    }

    /// Server URL dialed by the client
    pub fn server_url(&self) -> String {
        format!("nats://{}:{}", self.host, self.port)
    }

    fn from_raw(raw: RawOptions) -> Self {
        Self {
            host: raw.host.unwrap_or_default(),
            port: normalize_port(raw.port),
            disabled: raw.disabled.unwrap_or(false),
            nkey_file: non_empty_path(raw.nkey_file),
            nkey: non_empty_secret(raw.nkey),
        }
        .normalized()
    }

    fn normalized(mut self) -> Self {
        if self.host.trim().is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        self
    }
}

impl fmt::Display for EventdOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn normalize_port(port: Option<i64>) -> u16 {
    port.and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p > 0)
        .unwrap_or(DEFAULT_PORT)
}

fn non_empty_path(path: Option<String>) -> Option<PathBuf> {
    path.filter(|p| !p.trim().is_empty()).map(PathBuf::from)
}

fn non_empty_secret(secret: Option<SecretBuffer>) -> Option<SecretBuffer> {
    secret.filter(|s| !s.is_empty())
}
