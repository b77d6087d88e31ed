//! Typed scalar and vector values for native SIMD kernels.
//!
//! This crate is the value model of lanecheck. Every value handed to or
//! returned from a native kernel is a [`TypedValue`]: a dense, native-endian
//! byte buffer tagged with an interned [`ValueType`].
//!
//! # Overview
//!
//! - [`ElementKind`]: one of eight lane representations (`uint16_t` …
//!   `float64_t`), with width and float/unsigned classification.
//! - [`ContainerKind`]: scalar (one lane) or vector (N lanes).
//! - [`ValueType`]: interned `(ContainerKind, ElementKind)` handle; equal
//!   pairs always yield the identical handle.
//! - [`TypedValue`]: the value itself, with indexing, slicing, iteration,
//!   in-place element writes and [`bitcast`].
//!
//! # Example
//!
//! ```
//! use lanecheck_value::{bitcast, ElementKind, TypedValue};
//!
//! let one = TypedValue::scalar(ElementKind::Float64, 1.0)?;
//! let bits = bitcast(ElementKind::Uint64, &one)?;
//! assert_eq!(bits.to_vec::<u64>()?, vec![0x3FF0_0000_0000_0000]);
//! # Ok::<(), lanecheck_value::ValueError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod kind;
pub mod number;
pub mod types;
pub mod value;

pub use kind::{ContainerKind, ElementKind};
pub use number::{parse_hex_float, Element, NativeElement, Number};
pub use types::ValueType;
pub use value::{bitcast, Iter, TypedValue};

use thiserror::Error;

/// Errors raised by the value model.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValueError {
    /// A number cannot be coerced to an element kind.
    #[error("cannot convert {value} to {kind}")]
    TypeConversion {
        /// The offending value, as written.
        value: String,
        /// Target element kind.
        kind: ElementKind,
    },

    /// A byte buffer does not fit the element width or container.
    #[error("{len} bytes do not form a {ty}: {reason}")]
    Layout {
        /// Requested type.
        ty: ValueType,
        /// Buffer length in bytes.
        len: usize,
        /// Why the length was rejected.
        reason: &'static str,
    },

    /// Element access out of range.
    #[error("{ty} index {index} out of range for length {len}")]
    Index {
        /// Type of the indexed value.
        ty: ValueType,
        /// Requested index (or slice end).
        index: usize,
        /// Number of elements.
        len: usize,
    },
}

/// Result type for value operations.
pub type ValueResult<T> = Result<T, ValueError>;
