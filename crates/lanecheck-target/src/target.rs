//! One hardware target's namespace of intrinsics.

use crate::manifest::TargetManifest;
use crate::oracle::{self, AccuracyError};
use crate::Result;
use lanecheck_dispatch::{
    Arg, CallError, CallResult, DeclResult, DeclarationError, EntryPoint, OverloadDecl,
    OverloadSet, SymbolResolver,
};
use lanecheck_value::{bitcast, ElementKind, Number, TypedValue, ValueError, ValueResult};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// The intrinsics compiled for one target, with its register width.
///
/// Intrinsics are registered during setup and only read afterwards.
pub struct Target {
    name: String,
    register_width: usize,
    have_float64: bool,
    intrinsics: FxHashMap<String, OverloadSet>,
}

impl Target {
    /// An empty namespace for `name` with `register_width` bytes per
    /// vector register.
    pub fn new(name: impl Into<String>, register_width: usize) -> Self {
        Self {
            name: name.into(),
            register_width,
            have_float64: true,
            intrinsics: FxHashMap::default(),
        }
    }

    /// Set whether the target has `float64_t` lanes.
    #[must_use]
    pub fn with_float64(mut self, have_float64: bool) -> Self {
        self.have_float64 = have_float64;
        self
    }

    /// Build a target from its manifest entry, resolving every symbol.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] if a symbol cannot be resolved or an
    /// overload is malformed.
    pub fn from_manifest(entry: &TargetManifest, resolver: &dyn SymbolResolver) -> DeclResult<Self> {
        let mut target = Self::new(&entry.name, entry.register_width).with_float64(entry.have_float64);
        for (intrinsic, decls) in &entry.intrinsics {
            for decl in decls {
                target.register_from(intrinsic, decl, resolver)?;
            }
        }
        tracing::info!(
            target = %target.name,
            register_width = target.register_width,
            intrinsics = target.intrinsics.len(),
            "built target"
        );
        Ok(target)
    }

    /// Target name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vector register width in bytes.
    #[must_use]
    pub fn register_width(&self) -> usize {
        self.register_width
    }

    /// Whether the target has `float64_t` lanes.
    #[must_use]
    pub fn have_float64(&self) -> bool {
        self.have_float64
    }

    /// Whether kernels over `kind` exist on this target.
    #[must_use]
    pub fn supports(&self, kind: ElementKind) -> bool {
        kind != ElementKind::Float64 || self.have_float64
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register an entry point as an overload of `intrinsic`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] if the declaration is malformed or
    /// its signature is already registered.
    pub fn register(
        &mut self,
        intrinsic: &str,
        decl: &OverloadDecl,
        entry: Arc<dyn EntryPoint>,
    ) -> DeclResult<()> {
        self.intrinsics
            .entry(intrinsic.to_string())
            .or_insert_with(|| OverloadSet::new(intrinsic))
            .register(decl, entry)
    }

    /// Register the entry point `resolver` exports under `decl.symbol`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] if the symbol is missing or the
    /// declaration is malformed.
    pub fn register_from(
        &mut self,
        intrinsic: &str,
        decl: &OverloadDecl,
        resolver: &dyn SymbolResolver,
    ) -> DeclResult<()> {
        let entry = resolver.resolve(&decl.symbol)?;
        self.register(intrinsic, decl, entry)
    }

    /// Overloads registered as `name`.
    #[must_use]
    pub fn intrinsic(&self, name: &str) -> Option<&OverloadSet> {
        self.intrinsics.get(name)
    }

    /// Registered intrinsic names, sorted.
    #[must_use]
    pub fn intrinsic_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.intrinsics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Call the intrinsic `name`.
    ///
    /// # Errors
    ///
    /// - [`CallError::UnknownIntrinsic`] if `name` is not registered.
    /// - Anything [`OverloadSet::call`] returns.
    pub fn call(&self, name: &str, args: &[Arg<'_>]) -> CallResult<Option<TypedValue>> {
        let set = self.intrinsics.get(name).ok_or_else(|| CallError::UnknownIntrinsic {
            target: self.name.clone(),
            name: name.to_string(),
            available: self.intrinsic_names().join(", "),
        })?;
        set.call(args)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Lanes of `kind` in one register.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::LaneWidth`] if the register width is
    /// not a positive whole number of `kind` elements.
    pub fn lanes(&self, kind: ElementKind) -> DeclResult<usize> {
        let width = kind.width();
        if self.register_width == 0 || self.register_width % width != 0 {
            return Err(DeclarationError::LaneWidth {
                width: self.register_width,
                kind,
            });
        }
        Ok(self.register_width / width)
    }

    /// A full register of `kind` with every lane set to `value`.
    ///
    /// # Errors
    ///
    /// Fails if the register width does not fit `kind`, or `value` cannot
    /// be converted to `kind`.
    pub fn broadcast(&self, kind: ElementKind, value: impl Into<Number>) -> Result<TypedValue> {
        let lanes = self.lanes(kind)?;
        let value = value.into();
        Ok(TypedValue::vector(kind, std::iter::repeat(value).take(lanes))?)
    }

    /// Reinterpret `value`'s bytes as `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Layout`] if the byte length does not fit.
    pub fn reinterpret(&self, kind: ElementKind, value: &TypedValue) -> ValueResult<TypedValue> {
        bitcast(kind, value)
    }

    /// Per-lane ULP distance between `actual` and `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Layout`] if the values differ in type or
    /// length.
    pub fn ulp_distance(&self, actual: &TypedValue, expected: &TypedValue) -> ValueResult<Vec<u64>> {
        oracle::ulp_distance(actual, expected)
    }

    /// Check that every lane of `actual` is within `max_ulp` of `expected`.
    ///
    /// `input` is the kernel argument the lanes came from and appears in
    /// the report next to each offending lane.
    ///
    /// # Errors
    ///
    /// - [`AccuracyError`] listing each offending lane.
    /// - [`ValueError::Layout`] if the three values disagree in length or
    ///   `actual` and `expected` differ in type.
    pub fn assert_ulp(
        &self,
        actual: &TypedValue,
        expected: &TypedValue,
        input: &TypedValue,
        max_ulp: u64,
    ) -> Result<()> {
        let distances = oracle::ulp_distance(actual, expected)?;
        if input.len() != actual.len() {
            return Err(ValueError::Layout {
                ty: input.value_type(),
                len: input.as_bytes().len(),
                reason: "input and result differ in length",
            }
            .into());
        }
        AccuracyError::check(&distances, input, actual, expected, max_ulp)?;
        Ok(())
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("register_width", &self.register_width)
            .field("have_float64", &self.have_float64)
            .field("intrinsics", &self.intrinsic_names())
            .finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
