//! Target namespaces and the ULP correctness oracle.
//!
//! The native kernel library is built once per hardware target (SSE4,
//! AVX2, AVX-512, NEON, ...). A [`Target`] gathers every intrinsic compiled
//! for one of them, knows its register width, and carries the helpers
//! tests need around a call: lane counts, broadcasts, reinterpretation and
//! [`Target::assert_ulp`].
//!
//! A [`TargetSet`] is built from a JSON [`Manifest`] describing every
//! target of a kernel build, resolving symbols from the loaded library.
//! [`HarnessConfig`] says where the manifest and library live.
//!
//! ```
//! use std::sync::Arc;
//! use lanecheck_dispatch::{Arg, NativeReturn, OverloadDecl};
//! use lanecheck_target::Target;
//! use lanecheck_value::ElementKind;
//!
//! let mut avx2 = Target::new("AVX2", 32);
//! let identity = |args: &[&[u8]]| NativeReturn::Bytes(args[0].to_vec());
//! avx2.register(
//!     "Id",
//!     &OverloadDecl::new("id_f32").ret(ElementKind::Float32, 8).param(ElementKind::Float32, 8),
//!     Arc::new(identity),
//! )?;
//!
//! let x = avx2.broadcast(ElementKind::Float32, 0.5)?;
//! let y = avx2.call("Id", &[Arg::from(&x)])?.expect("Id returns a value");
//! avx2.assert_ulp(&y, &x, &x, 0)?;
//! # Ok::<(), lanecheck_target::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod manifest;
pub mod oracle;
pub mod set;
pub mod target;

pub use config::{ConfigError, HarnessConfig};
pub use manifest::{Manifest, ManifestError, TargetManifest};
pub use oracle::{ulp_between, ulp_distance, AccuracyError, LaneReport};
pub use set::TargetSet;
pub use target::Target;

use lanecheck_dispatch::{CallError, DeclarationError};
use lanecheck_value::ValueError;
use thiserror::Error;

/// Any failure raised while building targets or checking kernels.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed registration or target metadata.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// A call could not be dispatched or broke its contract.
    #[error(transparent)]
    Call(#[from] CallError),

    /// A value could not be built or reshaped.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// A result exceeded its ULP tolerance.
    #[error(transparent)]
    Accuracy(#[from] AccuracyError),

    /// The kernel manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The harness configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for target operations.
pub type Result<T> = std::result::Result<T, Error>;
