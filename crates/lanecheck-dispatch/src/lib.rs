//! Overload registry and dispatch for native SIMD kernels.
//!
//! A logical intrinsic such as `Sin` is compiled into many native entry
//! points, one per argument layout and precision profile. An
//! [`OverloadSet`] holds every variant registered under one name and picks
//! the right one from the arguments of a call.
//!
//! # Flow
//!
//! ```text
//! OverloadDecl ──register──> OverloadSet { DispatchKey -> Overload }
//!                                   │
//!  call(&[Arg]) ── key of actual ───┘──> Overload ──bytes──> EntryPoint
//!                  arg types                               │
//!  Option<TypedValue> <──── wrap under declared return ────┘
//! ```
//!
//! A [`PrecisionPolicy`](lanecheck_precise::PrecisionPolicy) argument only
//! selects the entry point. It is never passed to the kernel as data.
//!
//! # Native ABI
//!
//! Entry points implement [`EntryPoint`]. Rust closures implement it
//! directly; kernels exported from a shared library are wrapped by
//! [`CEntryPoint`] after being resolved from a [`NativeLibrary`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decl;
pub mod native;
pub mod overload;

pub use decl::{LaneMeta, LaneSlot, OverloadDecl, SlotMeta};
pub use native::{
    CEntryPoint, EntryPoint, NativeLibrary, NativeReturn, RawKernelFn, SymbolResolver,
    SymbolTable,
};
pub use overload::{Arg, DispatchKey, KeySlot, Overload, OverloadSet};

use lanecheck_precise::PolicyConflict;
use lanecheck_value::{ElementKind, ValueError};
use thiserror::Error;

/// Malformed registration metadata. Raised during setup and fatal to it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// No element kind has this width and classification.
    #[error(
        "unsupported scalar type for {intrinsic}: kTypeSize={type_size}, \
         kIsFloat={is_float}, kIsUnsigned={is_unsigned}"
    )]
    UnsupportedLayout {
        /// Intrinsic being registered.
        intrinsic: String,
        /// Declared element width in bytes.
        type_size: usize,
        /// Declared float classification.
        is_float: bool,
        /// Declared unsigned classification.
        is_unsigned: bool,
    },

    /// A data slot declares no lanes.
    #[error("{intrinsic}: slot declares zero lanes")]
    ZeroLanes {
        /// Intrinsic being registered.
        intrinsic: String,
    },

    /// More than one precision slot.
    #[error("{intrinsic}: more than one precision slot in `{symbol}`")]
    DuplicatePrecision {
        /// Intrinsic being registered.
        intrinsic: String,
        /// Native symbol of the overload.
        symbol: String,
    },

    /// More than one return slot.
    #[error("{intrinsic}: more than one return slot in `{symbol}`")]
    DuplicateReturn {
        /// Intrinsic being registered.
        intrinsic: String,
        /// Native symbol of the overload.
        symbol: String,
    },

    /// The declared precision policy contradicts itself.
    #[error("{intrinsic}: invalid precision slot in `{symbol}`: {source}")]
    Policy {
        /// Intrinsic being registered.
        intrinsic: String,
        /// Native symbol of the overload.
        symbol: String,
        /// The conflict found.
        #[source]
        source: PolicyConflict,
    },

    /// Two overloads share one dispatch key.
    #[error("{intrinsic}: `{symbol}` duplicates signature `{signature}`")]
    Duplicate {
        /// Intrinsic being registered.
        intrinsic: String,
        /// Native symbol of the rejected overload.
        symbol: String,
        /// The shared signature.
        signature: String,
    },

    /// A native library could not be opened.
    #[error("cannot load native library {path}: {reason}")]
    Library {
        /// Library path.
        path: String,
        /// Loader message.
        reason: String,
    },

    /// A declared symbol is not exported.
    #[error("symbol `{symbol}` not found: {reason}")]
    Symbol {
        /// Native symbol name.
        symbol: String,
        /// Resolver message.
        reason: String,
    },

    /// A register width does not split evenly into lanes of a kind.
    #[error("register width of {width} bytes does not hold a whole number of {kind} lanes")]
    LaneWidth {
        /// Register width in bytes.
        width: usize,
        /// Element kind asked for.
        kind: ElementKind,
    },
}

/// Errors raised by a call through an [`OverloadSet`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CallError {
    /// No overload matches the actual argument types.
    #[error(
        "no matching signature to call {call}\n\
         only the following signatures are supported:\n{available}"
    )]
    Dispatch {
        /// The attempted call, as `Name( type, ... )`.
        call: String,
        /// Every registered signature, one per line.
        available: String,
    },

    /// The intrinsic is not registered at all.
    #[error("{target} has no intrinsic `{name}`; available: {available}")]
    UnknownIntrinsic {
        /// Namespace searched.
        target: String,
        /// Requested intrinsic name.
        name: String,
        /// Registered intrinsic names, comma separated.
        available: String,
    },

    /// The native call returned something other than the declared shape.
    #[error("`{symbol}` ({intrinsic}) broke its return contract: {reason}")]
    Contract {
        /// Intrinsic called.
        intrinsic: String,
        /// Native symbol invoked.
        symbol: String,
        /// What was wrong with the result.
        reason: String,
    },

    /// Argument or result bytes do not fit their types.
    #[error(transparent)]
    Value(#[from] ValueError),
}

impl CallError {
    /// Whether this is a dispatch failure: no overload or no intrinsic.
    #[must_use]
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. } | Self::UnknownIntrinsic { .. })
    }
}

/// Result type for registration.
pub type DeclResult<T> = Result<T, DeclarationError>;

/// Result type for calls.
pub type CallResult<T> = Result<T, CallError>;
