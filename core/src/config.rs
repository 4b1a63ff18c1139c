//! Configuration options.
//!
//! The engine is configured by a TOML file with one table per layer: `[tcap]` for dialogue
//! tracking, `[camel]` for operation matching, and an optional `[replay]` table used by the
//! offline replay runtime. Every option has a default, so a partial (or empty) file is valid. See
//! `configs/` at the workspace root for examples.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted dialogue timeout, in seconds.
pub(crate) const MAX_TIMEOUT: u64 = 365 * 24 * 3600;

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SrtConfig, ConfigError> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: SrtConfig = toml::from_str(&config_str)?;
    config.validate()?;
    Ok(config)
}

/// Loads a default configuration.
///
/// ```toml
/// [tcap]
///     handle_srt = true
///     persistent = false
///     repetition_timeout = 10
///     lost_timeout = 30
///     display = true
///
/// [camel]
///     handle_srt = true
///     persistent = false
///     display = true
/// ```
pub fn default_config() -> SrtConfig {
    SrtConfig::default()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

/* --------------------------------------------------------------------------------- */

/// Engine configuration options.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SrtConfig {
    /// TCAP dialogue tracking settings.
    #[serde(default)]
    pub tcap: TcapConfig,

    /// CAMEL operation matching settings.
    #[serde(default)]
    pub camel: CamelConfig,

    /// Offline replay settings.
    #[serde(default = "default_replay")]
    pub replay: Option<ReplayConfig>,
}

impl SrtConfig {
    /// Checks option combinations the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, timeout) in [
            ("tcap.repetition_timeout", self.tcap.repetition_timeout),
            ("tcap.lost_timeout", self.tcap.lost_timeout),
        ] {
            if timeout == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be at least 1 second",
                });
            }
            if timeout > MAX_TIMEOUT {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must not exceed one year",
                });
            }
        }
        if self.camel.handle_srt && !self.tcap.handle_srt {
            return Err(ConfigError::InvalidValue {
                field: "camel.handle_srt",
                reason: "requires tcap.handle_srt",
            });
        }
        if let Some(replay) = &self.replay {
            if replay.passes == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "replay.passes",
                    reason: "must be at least 1",
                });
            }
        }
        Ok(())
    }
}

fn default_replay() -> Option<ReplayConfig> {
    None
}

/* --------------------------------------------------------------------------------- */

/// TCAP dialogue tracking options.
///
/// The two timeouts decide whether a BEGIN reusing the transaction id of a known dialogue is a
/// retransmission or a new dialogue. Both are compared against capture time.
///
/// ## Example
/// ```toml
/// [tcap]
///     persistent = true
///     repetition_timeout = 5
///     lost_timeout = 60
/// ```
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TcapConfig {
    /// Correlate TCAP messages into dialogues. Defaults to `true`.
    #[serde(default = "default_handle_srt")]
    pub handle_srt: bool,

    /// Keep closed dialogues in the tables. Defaults to `false`.
    ///
    /// Persistent mode trades memory for the ability to re-dissect frames of closed dialogues,
    /// for instance on a second pass over a capture.
    #[serde(default = "default_persistent")]
    pub persistent: bool,

    /// A responded dialogue's transaction id may start a new dialogue after this many seconds.
    /// Defaults to `10`.
    #[serde(default = "default_repetition_timeout")]
    pub repetition_timeout: u64,

    /// An unresponded dialogue is considered lost after this many seconds, letting its
    /// transaction id start a new dialogue. Defaults to `30`.
    #[serde(default = "default_lost_timeout")]
    pub lost_timeout: u64,

    /// Log per-message dialogue annotations at `info` level. Defaults to `true`.
    #[serde(default = "default_display")]
    pub display: bool,
}

fn default_handle_srt() -> bool {
    true
}

fn default_persistent() -> bool {
    false
}

fn default_repetition_timeout() -> u64 {
    10
}

fn default_lost_timeout() -> u64 {
    30
}

fn default_display() -> bool {
    true
}

impl Default for TcapConfig {
    fn default() -> Self {
        TcapConfig {
            handle_srt: default_handle_srt(),
            persistent: default_persistent(),
            repetition_timeout: default_repetition_timeout(),
            lost_timeout: default_lost_timeout(),
            display: default_display(),
        }
    }
}

/* --------------------------------------------------------------------------------- */

/// CAMEL operation matching options.
///
/// ## Example
/// ```toml
/// [camel]
///     persistent = true
///     display = false
/// ```
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CamelConfig {
    /// Pair CAMEL operations and measure their response times. Defaults to `true`.
    #[serde(default = "default_handle_srt")]
    pub handle_srt: bool,

    /// Keep closed call records. Defaults to `false`.
    #[serde(default = "default_persistent")]
    pub persistent: bool,

    /// Log per-operation annotations at `info` level. Defaults to `true`.
    #[serde(default = "default_display")]
    pub display: bool,
}

impl Default for CamelConfig {
    fn default() -> Self {
        CamelConfig {
            handle_srt: default_handle_srt(),
            persistent: default_persistent(),
            display: default_display(),
        }
    }
}

/* --------------------------------------------------------------------------------- */

/// Offline replay options.
///
/// ## Example
/// ```toml
/// [replay]
///     input = "./traces/camel_call.csv"
///     passes = 2
/// ```
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ReplayConfig {
    /// Path to a CSV file of decoded message facts.
    pub input: String,

    /// Number of passes over the input. Defaults to `1`.
    ///
    /// Passes after the first re-dissect every frame, as a GUI does when revisiting packets.
    #[serde(default = "default_passes")]
    pub passes: usize,
}

fn default_passes() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_config_defaults() {
        let config: SrtConfig = toml::from_str("").unwrap();
        assert!(config.tcap.handle_srt);
        assert!(!config.tcap.persistent);
        assert_eq!(config.tcap.repetition_timeout, 10);
        assert_eq!(config.tcap.lost_timeout, 30);
        assert!(config.camel.handle_srt);
        assert!(config.replay.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn core_config_partial() {
        let config: SrtConfig = toml::from_str(
            r#"
            [tcap]
                persistent = true
                lost_timeout = 60

            [replay]
                input = "calls.csv"
            "#,
        )
        .unwrap();
        assert!(config.tcap.persistent);
        assert_eq!(config.tcap.lost_timeout, 60);
        assert_eq!(config.tcap.repetition_timeout, 10);
        assert!(!config.camel.persistent);
        let replay = config.replay.unwrap();
        assert_eq!(replay.input, "calls.csv");
        assert_eq!(replay.passes, 1);
    }

    #[test]
    fn core_config_invalid() {
        let mut config = default_config();
        config.tcap.lost_timeout = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "tcap.lost_timeout",
                ..
            })
        ));

        let mut config = default_config();
        config.tcap.handle_srt = false;
        assert!(config.validate().is_err());
        config.camel.handle_srt = false;
        assert!(config.validate().is_ok());

        assert!(matches!(
            toml::from_str::<SrtConfig>("[tcap]\nlost_timeout = \"soon\""),
            Err(_)
        ));
    }

    #[test]
    fn core_config_timeout_bound() {
        let config: SrtConfig = toml::from_str("[tcap]\nlost_timeout = 9300000000000000").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "tcap.lost_timeout",
                ..
            })
        ));

        let mut config = default_config();
        config.tcap.repetition_timeout = MAX_TIMEOUT;
        assert!(config.validate().is_ok());
        config.tcap.repetition_timeout = MAX_TIMEOUT + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn core_config_missing_file() {
        let err = load_config("/nonexistent/tcapsrt.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn core_config_shipped_files() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../configs");
        let config = load_config(format!("{}/replay.toml", dir)).unwrap();
        assert!(!config.tcap.persistent);
        assert_eq!(config.replay.map(|r| r.passes), Some(1));

        let config = load_config(format!("{}/persistent.toml", dir)).unwrap();
        assert!(config.tcap.persistent && config.camel.persistent);
        assert_eq!(config.replay.map(|r| r.passes), Some(2));
    }
}
