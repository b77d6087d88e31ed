//! ULP distance and the accuracy oracle.
//!
//! Float lanes are compared on a monotonic integer encoding of their bit
//! patterns: non-negative values map to their bits, negative values to the
//! negated magnitude bits. Adjacent floats are then one apart, and `+0`
//! and `-0` both map to zero.
//!
//! Conventions for the cases the encoding does not settle:
//!
//! | actual / expected          | distance     |
//! |----------------------------|--------------|
//! | both NaN (any payload)     | 0            |
//! | exactly one NaN            | `u64::MAX`   |
//! | equal, incl. `±0`, `±inf`  | 0            |
//! | an infinity vs. other      | `u64::MAX`   |
//! | opposite signs             | sum of both distances from zero |
//!
//! Integer lanes are `|actual - expected|`.

use lanecheck_value::{Element, TypedValue, ValueError, ValueResult};
use std::fmt;
use thiserror::Error;

/// Distance in units in the last place between two lanes of one kind.
///
/// Lanes of different kinds are `u64::MAX` apart.
#[must_use]
pub fn ulp_between(actual: Element, expected: Element) -> u64 {
    match (actual, expected) {
        (Element::Float32(a), Element::Float32(b)) => float_distance(
            FloatLane::of32(a),
            FloatLane::of32(b),
        ),
        (Element::Float64(a), Element::Float64(b)) => float_distance(
            FloatLane::of64(a),
            FloatLane::of64(b),
        ),
        (a, b) => match (integer(a), integer(b)) {
            (Some(x), Some(y)) if a.kind() == b.kind() => {
                u64::try_from(x.abs_diff(y)).unwrap_or(u64::MAX)
            }
            _ => u64::MAX,
        },
    }
}

/// Per-lane ULP distance between two values of the same type.
///
/// # Errors
///
/// Returns [`ValueError::Layout`] if the values differ in type or length.
pub fn ulp_distance(actual: &TypedValue, expected: &TypedValue) -> ValueResult<Vec<u64>> {
    check_same_shape(actual, expected, "actual and expected differ in type or length")?;
    Ok(actual
        .to_elements()
        .into_iter()
        .zip(expected.to_elements())
        .map(|(a, e)| ulp_between(a, e))
        .collect())
}

pub(crate) fn check_same_shape(
    value: &TypedValue,
    reference: &TypedValue,
    reason: &'static str,
) -> ValueResult<()> {
    if value.value_type() != reference.value_type() || value.len() != reference.len() {
        return Err(ValueError::Layout {
            ty: reference.value_type(),
            len: value.as_bytes().len(),
            reason,
        });
    }
    Ok(())
}

struct FloatLane {
    nan: bool,
    infinite: bool,
    ordered: i128,
    value: f64,
}

impl FloatLane {
    fn of32(x: f32) -> Self {
        let bits = x.to_bits();
        let magnitude = i128::from(bits & 0x7FFF_FFFF);
        Self {
            nan: x.is_nan(),
            infinite: x.is_infinite(),
            ordered: if bits >> 31 == 1 { -magnitude } else { magnitude },
            value: f64::from(x),
        }
    }

    fn of64(x: f64) -> Self {
        let bits = x.to_bits();
        let magnitude = i128::from(bits & 0x7FFF_FFFF_FFFF_FFFF);
        Self {
            nan: x.is_nan(),
            infinite: x.is_infinite(),
            ordered: if bits >> 63 == 1 { -magnitude } else { magnitude },
            value: x,
        }
    }
}

fn float_distance(a: FloatLane, b: FloatLane) -> u64 {
    match (a.nan, b.nan) {
        (true, true) => return 0,
        (true, false) | (false, true) => return u64::MAX,
        (false, false) => {}
    }
    if a.value == b.value {
        return 0;
    }
    if a.infinite || b.infinite {
        return u64::MAX;
    }
    // Finite encodings are below 2^63, so the difference fits.
    u64::try_from(a.ordered.abs_diff(b.ordered)).unwrap_or(u64::MAX)
}

fn integer(e: Element) -> Option<i128> {
    match e {
        Element::Uint16(v) => Some(i128::from(v)),
        Element::Int16(v) => Some(i128::from(v)),
        Element::Uint32(v) => Some(i128::from(v)),
        Element::Int32(v) => Some(i128::from(v)),
        Element::Uint64(v) => Some(i128::from(v)),
        Element::Int64(v) => Some(i128::from(v)),
        Element::Float32(_) | Element::Float64(_) => None,
    }
}

// ============================================================================
// Accuracy failures
// ============================================================================

/// One lane beyond tolerance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaneReport {
    /// Lane index.
    pub lane: usize,
    /// Kernel input in this lane.
    pub input: Element,
    /// Value the kernel produced.
    pub actual: Element,
    /// Reference value.
    pub expected: Element,
    /// ULP distance between `actual` and `expected`.
    pub distance: u64,
}

impl fmt::Display for LaneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ({}, {}, {}, {})",
            self.lane, self.input, self.actual, self.expected, self.distance
        )
    }
}

/// Lanes of a result exceeded the allowed ULP distance.
#[derive(Clone, Debug, PartialEq, Error)]
#[error(
    "expected ULP distance {max_ulp}, worst {worst}, \
     lanes as [lane] (input, actual, expected, ulp):{}",
    lane_lines(.lanes)
)]
pub struct AccuracyError {
    /// Allowed distance.
    pub max_ulp: u64,
    /// Largest distance over all lanes.
    pub worst: u64,
    /// Offending lanes in lane order.
    pub lanes: Vec<LaneReport>,
}

impl AccuracyError {
    /// Check `distances` against `max_ulp`, reporting every offending lane.
    pub(crate) fn check(
        distances: &[u64],
        input: &TypedValue,
        actual: &TypedValue,
        expected: &TypedValue,
        max_ulp: u64,
    ) -> Result<(), Self> {
        let worst = distances.iter().copied().max().unwrap_or(0);
        if worst <= max_ulp {
            return Ok(());
        }
        let (inputs, actuals, expecteds) =
            (input.to_elements(), actual.to_elements(), expected.to_elements());
        let lanes = distances
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > max_ulp)
            .map(|(lane, &distance)| LaneReport {
                lane,
                input: inputs[lane],
                actual: actuals[lane],
                expected: expecteds[lane],
                distance,
            })
            .collect();
        Err(Self {
            max_ulp,
            worst,
            lanes,
        })
    }
}

/// The per-lane part of an [`AccuracyError`] message, one line per lane.
fn lane_lines(lanes: &[LaneReport]) -> String {
    lanes.iter().map(|lane| format!("\n {lane}")).collect()
}
