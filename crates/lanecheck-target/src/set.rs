//! Every target of a kernel build.

use crate::config::HarnessConfig;
use crate::manifest::Manifest;
use crate::target::Target;
use crate::Result;
use lanecheck_dispatch::{NativeLibrary, SymbolResolver};
use std::collections::BTreeMap;

/// Targets by name, iterated in name order.
///
/// Tests run the same check against each target in turn.
#[derive(Debug, Default)]
pub struct TargetSet {
    targets: BTreeMap<String, Target>,
}

impl TargetSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the targets of `manifest` admitted by `config`, resolving
    /// symbols through `resolver`.
    ///
    /// # Errors
    ///
    /// Fails on the first target whose declarations cannot be registered.
    pub fn from_manifest(
        manifest: &Manifest,
        resolver: &dyn SymbolResolver,
        config: &HarnessConfig,
    ) -> Result<Self> {
        let mut set = Self::new();
        for entry in &manifest.targets {
            if !config.selects(&entry.name) {
                tracing::warn!(target = %entry.name, "target skipped by filter");
                continue;
            }
            set.insert(Target::from_manifest(entry, resolver)?);
        }
        for wanted in &config.targets {
            if !manifest.target_names().any(|name| name == wanted) {
                tracing::warn!(target = %wanted, "requested target is not in the manifest");
            }
        }
        Ok(set)
    }

    /// Load the configured manifest and library and build the targets.
    ///
    /// # Errors
    ///
    /// Fails if the manifest or library is not configured or cannot be
    /// loaded, or if any admitted target fails to build.
    pub fn load(config: &HarnessConfig) -> Result<Self> {
        let manifest = Manifest::load(config.manifest_path()?)?;
        let library = NativeLibrary::open(config.library_path()?)?;
        Self::from_manifest(&manifest, &library, config)
    }

    /// Add a target, returning any target it replaces.
    pub fn insert(&mut self, target: Target) -> Option<Target> {
        self.targets.insert(target.name().to_string(), target)
    }

    /// The target called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// Targets in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Target names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl<'a> IntoIterator for &'a TargetSet {
    type Item = &'a Target;
    type IntoIter = std::collections::btree_map::Values<'a, String, Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.values()
    }
}
