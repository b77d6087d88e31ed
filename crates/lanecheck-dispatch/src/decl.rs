//! Overload declarations as emitted by the kernel build.
//!
//! Each native entry point comes with one metadata record per slot: the
//! return value, an optional precision profile, and one record per data
//! parameter. In JSON a slot is an object keyed by the native trait names:
//!
//! ```json
//! { "kIsRet": 1, "kTypeSize": 4, "kIsFloat": 1, "kIsUnsigned": 0, "kLanes": 8 }
//! { "kIsPrecise": true, "kLowAccuracy": true }
//! { "kTypeSize": 4, "kIsFloat": 1, "kIsUnsigned": 0, "kLanes": 8 }
//! ```
//!
//! Flags may be written as booleans or as `0`/`1`. A `null` slot stands
//! for "no precision profile" and is skipped.

use crate::{DeclResult, DeclarationError};
use lanecheck_precise::{deserialize_flag, PrecisionPolicy};
use lanecheck_value::{ContainerKind, ElementKind, ValueType};
use serde::{Deserialize, Deserializer};

/// Element layout and lane count of one data slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaneMeta {
    /// Element width in bytes (`kTypeSize`).
    pub type_size: usize,
    /// `kIsFloat`.
    pub is_float: bool,
    /// `kIsUnsigned`.
    pub is_unsigned: bool,
    /// `kIsSigned`.
    pub is_signed: bool,
    /// `kIsInteger`.
    pub is_integer: bool,
    /// Lanes per call (`kLanes`); one means scalar.
    pub lanes: usize,
}

impl LaneMeta {
    /// Metadata describing `lanes` lanes of `kind`.
    #[must_use]
    pub const fn of(kind: ElementKind, lanes: usize) -> Self {
        Self {
            type_size: kind.width(),
            is_float: kind.is_float(),
            is_unsigned: kind.is_unsigned(),
            is_signed: !kind.is_unsigned(),
            is_integer: !kind.is_float(),
            lanes,
        }
    }

    /// Resolve to an interned value type via the layout table.
    ///
    /// # Errors
    ///
    /// - [`DeclarationError::UnsupportedLayout`] if no element kind matches
    ///   `(type_size, is_float, is_unsigned)`.
    /// - [`DeclarationError::ZeroLanes`] if `lanes` is zero.
    pub fn resolve(&self, intrinsic: &str) -> DeclResult<LaneSlot> {
        let kind = ElementKind::from_layout(self.type_size, self.is_float, self.is_unsigned)
            .ok_or_else(|| DeclarationError::UnsupportedLayout {
                intrinsic: intrinsic.to_string(),
                type_size: self.type_size,
                is_float: self.is_float,
                is_unsigned: self.is_unsigned,
            })?;
        if self.lanes == 0 {
            return Err(DeclarationError::ZeroLanes {
                intrinsic: intrinsic.to_string(),
            });
        }
        Ok(LaneSlot {
            ty: ValueType::get(ContainerKind::for_lanes(self.lanes), kind),
            lanes: self.lanes,
        })
    }
}

/// A resolved data slot: its interned type and declared lane count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaneSlot {
    /// Interned value type.
    pub ty: ValueType,
    /// Lanes per call.
    pub lanes: usize,
}

impl LaneSlot {
    /// Bytes in one batch of this slot.
    #[must_use]
    pub fn batch_bytes(&self) -> usize {
        self.lanes * self.ty.element_width()
    }
}

/// Metadata for one slot of a native signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSlot")]
pub enum SlotMeta {
    /// The precision profile this entry point was compiled for.
    Precision(PrecisionPolicy),
    /// The return value.
    Return(LaneMeta),
    /// An ordinary data parameter.
    Param(LaneMeta),
}

/// Declaration of one native entry point.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OverloadDecl {
    /// Exported symbol name.
    pub symbol: String,
    /// Slot metadata in declared order.
    #[serde(deserialize_with = "non_null_slots")]
    pub slots: Vec<SlotMeta>,
}

impl OverloadDecl {
    /// An empty declaration for `symbol`.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            slots: Vec::new(),
        }
    }

    /// Add a precision slot.
    #[must_use]
    pub fn precision(mut self, policy: PrecisionPolicy) -> Self {
        self.slots.push(SlotMeta::Precision(policy));
        self
    }

    /// Declare the return as `lanes` lanes of `kind`.
    #[must_use]
    pub fn ret(mut self, kind: ElementKind, lanes: usize) -> Self {
        self.slots.push(SlotMeta::Return(LaneMeta::of(kind, lanes)));
        self
    }

    /// Add a data parameter of `lanes` lanes of `kind`.
    #[must_use]
    pub fn param(mut self, kind: ElementKind, lanes: usize) -> Self {
        self.slots.push(SlotMeta::Param(LaneMeta::of(kind, lanes)));
        self
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Deserialize)]
struct RawSlot {
    #[serde(rename = "kIsPrecise", default, deserialize_with = "deserialize_flag")]
    is_precise: bool,
    #[serde(rename = "kIsRet", default, deserialize_with = "deserialize_flag")]
    is_ret: bool,
    #[serde(rename = "kTypeSize")]
    type_size: Option<usize>,
    #[serde(rename = "kIsFloat", default, deserialize_with = "deserialize_flag")]
    is_float: bool,
    #[serde(rename = "kIsUnsigned", default, deserialize_with = "deserialize_flag")]
    is_unsigned: bool,
    #[serde(rename = "kIsSigned", default, deserialize_with = "deserialize_flag")]
    is_signed: bool,
    #[serde(rename = "kIsInteger", default, deserialize_with = "deserialize_flag")]
    is_integer: bool,
    #[serde(rename = "kLanes", default = "one_lane")]
    lanes: usize,
    #[serde(flatten)]
    policy: PrecisionPolicy,
}

fn one_lane() -> usize {
    1
}

impl TryFrom<RawSlot> for SlotMeta {
    type Error = String;

    fn try_from(raw: RawSlot) -> Result<Self, Self::Error> {
        if raw.is_precise {
            return Ok(Self::Precision(raw.policy));
        }
        let type_size = raw
            .type_size
            .ok_or_else(|| "data slot is missing kTypeSize".to_string())?;
        let meta = LaneMeta {
            type_size,
            is_float: raw.is_float,
            is_unsigned: raw.is_unsigned,
            is_signed: raw.is_signed,
            is_integer: raw.is_integer,
            lanes: raw.lanes,
        };
        Ok(if raw.is_ret {
            Self::Return(meta)
        } else {
            Self::Param(meta)
        })
    }
}

fn non_null_slots<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SlotMeta>, D::Error> {
    let slots = Vec::<Option<SlotMeta>>::deserialize(deserializer)?;
    Ok(slots.into_iter().flatten().collect())
}
