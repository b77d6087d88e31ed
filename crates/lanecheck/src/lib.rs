//! Correctness harness for native SIMD math kernels.
//!
//! lanecheck drives kernels compiled once per hardware target and checks
//! their results lane by lane against a reference, in units in the last
//! place (ULP). It is split into four crates, re-exported here:
//!
//! | Module        | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | [`value`]     | Element kinds, interned value types, typed values     |
//! | [`precise`]   | Precision policies that select kernel variants        |
//! | [`dispatch`]  | Overload declarations, dispatch, native entry points  |
//! | [`target`]    | Target namespaces, manifests, config and the oracle   |
//!
//! Most tests only need the [`prelude`].
//!
//! ```
//! use lanecheck::prelude::*;
//! use std::sync::Arc;
//!
//! let mut sse4 = Target::new("SSE4", 16);
//! let negate = |args: &[&[u8]]| {
//!     let out = args[0]
//!         .chunks_exact(4)
//!         .flat_map(|b| (-f32::from_ne_bytes([b[0], b[1], b[2], b[3]])).to_ne_bytes())
//!         .collect();
//!     NativeReturn::Bytes(out)
//! };
//! sse4.register(
//!     "Neg",
//!     &OverloadDecl::new("neg_f32")
//!         .precision(PrecisionPolicy::new())
//!         .ret(ElementKind::Float32, 4)
//!         .param(ElementKind::Float32, 4),
//!     Arc::new(negate),
//! )?;
//!
//! let x = TypedValue::vector(ElementKind::Float32, [1.0, -2.0, 0.5, 0.0])?;
//! let want = TypedValue::vector(ElementKind::Float32, [-1.0, 2.0, -0.5, -0.0])?;
//! let got = sse4
//!     .call("Neg", &[PrecisionPolicy::new().into(), Arg::from(&x)])?
//!     .expect("Neg returns a value");
//! sse4.assert_ulp(&got, &want, &x, 0)?;
//! # Ok::<(), lanecheck::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use lanecheck_dispatch as dispatch;
pub use lanecheck_precise as precise;
pub use lanecheck_target as target;
pub use lanecheck_value as value;

pub use lanecheck_target::{Error, Result};

/// The types a kernel test usually touches.
pub mod prelude {
    pub use lanecheck_dispatch::{
        Arg, CallError, DeclarationError, EntryPoint, NativeLibrary, NativeReturn, OverloadDecl,
        OverloadSet, SymbolTable,
    };
    pub use lanecheck_precise::{PrecisionPolicy, RoundingMode};
    pub use lanecheck_target::{
        ulp_distance, AccuracyError, Error, HarnessConfig, Manifest, Target, TargetSet,
    };
    pub use lanecheck_value::{bitcast, Element, ElementKind, Number, TypedValue, ValueType};
}
