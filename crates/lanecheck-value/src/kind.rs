//! Element and container kinds.
//!
//! An [`ElementKind`] is one native numeric lane representation; a
//! [`ContainerKind`] says whether a value holds exactly one lane or many.
//! Together they identify a [`ValueType`](crate::ValueType).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native numeric representation of a single lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Unsigned 16-bit integer.
    Uint16,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 64-bit integer.
    Uint64,
    /// Signed 64-bit integer.
    Int64,
    /// IEEE 754 binary32.
    Float32,
    /// IEEE 754 binary64.
    Float64,
}

impl ElementKind {
    /// Every element kind, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Uint16,
        Self::Int16,
        Self::Uint32,
        Self::Int32,
        Self::Uint64,
        Self::Int64,
        Self::Float32,
        Self::Float64,
    ];

    /// Width of one element in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Uint64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Check if this is a floating-point kind.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Check if this is an unsigned integer kind.
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::Uint16 | Self::Uint32 | Self::Uint64)
    }

    /// Check if this is a signed integer kind.
    #[must_use]
    pub const fn is_signed_integer(self) -> bool {
        matches!(self, Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// The C name of this kind, e.g. `float32_t`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint16 => "uint16_t",
            Self::Int16 => "int16_t",
            Self::Uint32 => "uint32_t",
            Self::Int32 => "int32_t",
            Self::Uint64 => "uint64_t",
            Self::Int64 => "int64_t",
            Self::Float32 => "float32_t",
            Self::Float64 => "float64_t",
        }
    }

    /// Resolve an element kind from its declared layout.
    ///
    /// This is the total lookup over `(width, is_float, is_unsigned)` used
    /// when registering native overloads. Combinations without a kind
    /// (e.g. an unsigned float, or a 2-byte float) return `None`.
    #[must_use]
    pub const fn from_layout(width: usize, is_float: bool, is_unsigned: bool) -> Option<Self> {
        match (width, is_float, is_unsigned) {
            (2, false, true) => Some(Self::Uint16),
            (2, false, false) => Some(Self::Int16),
            (4, false, true) => Some(Self::Uint32),
            (4, false, false) => Some(Self::Int32),
            (8, false, true) => Some(Self::Uint64),
            (8, false, false) => Some(Self::Int64),
            (4, true, false) => Some(Self::Float32),
            (8, true, false) => Some(Self::Float64),
            _ => None,
        }
    }

    /// The unsigned integer kind of the same width.
    #[must_use]
    pub const fn to_unsigned(self) -> Self {
        match self {
            Self::Uint16 | Self::Int16 => Self::Uint16,
            Self::Uint32 | Self::Int32 | Self::Float32 => Self::Uint32,
            Self::Uint64 | Self::Int64 | Self::Float64 => Self::Uint64,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a value holds one element or a run of elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Exactly one element.
    Scalar,
    /// N elements, N fixed at construction.
    Vector,
}

impl ContainerKind {
    /// Container kind for a declared lane count; one lane is a scalar.
    #[must_use]
    pub const fn for_lanes(lanes: usize) -> Self {
        if lanes == 1 {
            Self::Scalar
        } else {
            Self::Vector
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => f.write_str("scalar"),
            Self::Vector => f.write_str("vector"),
        }
    }
}
