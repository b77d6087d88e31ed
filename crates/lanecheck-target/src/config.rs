//! Harness configuration.
//!
//! Read from a TOML file and then overridden from the environment:
//!
//! ```toml
//! manifest = "build/kernels.json"
//! library = "build/libnpsr_kernels.so"
//! targets = ["AVX2", "AVX512_SKX"]
//! max_ulp = 1
//! low_accuracy_max_ulp = 4
//! ```
//!
//! | Variable            | Field                                  |
//! |---------------------|----------------------------------------|
//! | `LANECHECK_MANIFEST`| `manifest`                             |
//! | `LANECHECK_LIBRARY` | `library`                              |
//! | `LANECHECK_TARGETS` | `targets`, comma separated             |
//! | `LANECHECK_MAX_ULP` | `max_ulp`                              |

use camino::{Utf8Path, Utf8PathBuf};
use lanecheck_precise::PrecisionPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading the harness configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML of the expected shape.
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment override has an unusable value.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Value found.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required setting is absent.
    #[error("no {0} configured")]
    Missing(&'static str),
}

/// Where the kernels live and how strict the oracle is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Kernel manifest (JSON).
    pub manifest: Option<Utf8PathBuf>,
    /// Native kernel library.
    pub library: Option<Utf8PathBuf>,
    /// Targets to test; empty means every target in the manifest.
    pub targets: Vec<String>,
    /// Default ULP tolerance.
    pub max_ulp: u64,
    /// ULP tolerance for reduced-accuracy kernels.
    pub low_accuracy_max_ulp: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            manifest: None,
            library: None,
            targets: Vec::new(),
            max_ulp: 1,
            low_accuracy_max_ulp: 4,
        }
    }
}

impl HarnessConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] for malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Toml`] if it is malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if `LANECHECK_MAX_ULP` is not a number.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if `LANECHECK_MAX_ULP` is not a number.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = lookup("LANECHECK_MANIFEST") {
            self.manifest = Some(Utf8PathBuf::from(path));
        }
        if let Some(path) = lookup("LANECHECK_LIBRARY") {
            self.library = Some(Utf8PathBuf::from(path));
        }
        if let Some(list) = lookup("LANECHECK_TARGETS") {
            self.targets = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup("LANECHECK_MAX_ULP") {
            self.max_ulp = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Env {
                    var: "LANECHECK_MAX_ULP",
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(self)
    }

    /// Whether the target filter admits `target`.
    #[must_use]
    pub fn selects(&self, target: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == target)
    }

    /// ULP tolerance for kernels compiled under `policy`.
    #[must_use]
    pub fn max_ulp_for(&self, policy: &PrecisionPolicy) -> u64 {
        if policy.low_accuracy() {
            self.low_accuracy_max_ulp
        } else {
            self.max_ulp
        }
    }

    /// The configured manifest path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if none is set.
    pub fn manifest_path(&self) -> Result<&Utf8Path, ConfigError> {
        self.manifest.as_deref().ok_or(ConfigError::Missing("manifest"))
    }

    /// The configured library path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if none is set.
    pub fn library_path(&self) -> Result<&Utf8Path, ConfigError> {
        self.library.as_deref().ok_or(ConfigError::Missing("library"))
    }
}
