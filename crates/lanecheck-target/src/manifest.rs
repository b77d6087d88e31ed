//! The kernel manifest: which targets a kernel build contains and which
//! symbols implement each intrinsic on each of them.
//!
//! ```json
//! {
//!   "targets": [
//!     {
//!       "name": "AVX2",
//!       "register_width": 32,
//!       "have_float64": true,
//!       "intrinsics": {
//!         "Sin": [
//!           { "symbol": "npsr_avx2_sin_f32", "slots": [ ... ] }
//!         ]
//!       }
//!     }
//!   ]
//! }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use lanecheck_dispatch::OverloadDecl;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors reading a kernel manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {path}: {source}")]
    Io {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON of the expected shape.
    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two targets share a name.
    #[error("target `{0}` is listed more than once")]
    DuplicateTarget(String),
}

/// A whole kernel build.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// Targets in the build.
    pub targets: Vec<TargetManifest>,
}

/// One target of a kernel build.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TargetManifest {
    /// Target name, e.g. `AVX2`.
    pub name: String,
    /// Vector register width in bytes.
    pub register_width: usize,
    /// Whether the target has `float64_t` lanes.
    #[serde(default = "default_true")]
    pub have_float64: bool,
    /// Overload declarations per intrinsic name.
    #[serde(default)]
    pub intrinsics: BTreeMap<String, Vec<OverloadDecl>>,
}

fn default_true() -> bool {
    true
}

impl Manifest {
    /// Parse a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed JSON and
    /// [`ManifestError::DuplicateTarget`] if a target name repeats.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(text)?;
        let mut seen = std::collections::BTreeSet::new();
        for target in &manifest.targets {
            if !seen.insert(target.name.as_str()) {
                return Err(ManifestError::DuplicateTarget(target.name.clone()));
            }
        }
        Ok(manifest)
    }

    /// Read and parse the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the file cannot be read, otherwise
    /// as [`from_json`](Self::from_json).
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_json(&text)?;
        tracing::info!(
            manifest = %path,
            targets = manifest.targets.len(),
            "loaded kernel manifest"
        );
        Ok(manifest)
    }

    /// Names of all targets in listed order.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.name.as_str())
    }
}
