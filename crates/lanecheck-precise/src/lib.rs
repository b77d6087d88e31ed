//! Precision policy for native math kernels.
//!
//! A native kernel is compiled once per precision profile: accuracy level,
//! large-argument and special-case handling, floating-point exceptions,
//! rounding mode and subnormal handling. [`PrecisionPolicy`] names one such
//! profile. It is a plain `Copy` value whose equality and hash cover all
//! twelve flags, so it can sit inside a dispatch key next to value types.
//!
//! ```
//! use lanecheck_precise::{PrecisionPolicy, RoundingMode};
//!
//! let fast = PrecisionPolicy::new().with_low_accuracy();
//! assert_eq!(fast.to_string(), "Precise(kLowAccuracy)");
//! assert_eq!(fast.rounding(), RoundingMode::Nearest);
//! assert_ne!(fast, PrecisionPolicy::default());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// The rounding mode a kernel variant runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoundingMode {
    /// Round to nearest, ties to even.
    Nearest,
    /// Round toward negative infinity.
    Down,
    /// Round toward positive infinity.
    Up,
    /// Round toward zero.
    Zero,
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nearest => "kRoundNearest",
            Self::Down => "kRoundDown",
            Self::Up => "kRoundUp",
            Self::Zero => "kRoundZero",
        })
    }
}

/// A precision policy contradicts itself.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PolicyConflict {
    /// More than one rounding direction is set.
    #[error("only one rounding mode can be set at a time, got {0}")]
    Rounding(String),

    /// Strict IEEE 754 subnormals combined with DAZ or FTZ.
    #[error("kIEEE754 cannot be combined with kDAZ or kFTZ")]
    Subnormal,
}

/// Read a metadata flag written either as a boolean or as an integer,
/// where any non-zero integer is set.
///
/// # Errors
///
/// Fails if the value is neither a boolean nor an unsigned integer.
pub fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

/// An immutable bundle of floating-point behavior flags.
///
/// The default is strict IEEE 754, round to nearest, with every
/// suppression flag off. Builders return a new policy; nothing mutates a
/// policy after construction.
///
/// Field names on the wire follow the native metadata (`kLowAccuracy`,
/// `kRoundNearest`, ...) and accept booleans or `0`/`1`. Missing fields
/// take their default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionPolicy {
    #[serde(rename = "kNoExceptions", deserialize_with = "deserialize_flag")]
    no_exceptions: bool,
    #[serde(rename = "kLowAccuracy", deserialize_with = "deserialize_flag")]
    low_accuracy: bool,
    #[serde(rename = "kNoLargeArgument", deserialize_with = "deserialize_flag")]
    no_large_argument: bool,
    #[serde(rename = "kNoSpecialCases", deserialize_with = "deserialize_flag")]
    no_special_cases: bool,
    #[serde(rename = "kDAZ", deserialize_with = "deserialize_flag")]
    daz: bool,
    #[serde(rename = "kFTZ", deserialize_with = "deserialize_flag")]
    ftz: bool,
    #[serde(rename = "kIEEE754", deserialize_with = "deserialize_flag")]
    ieee754: bool,
    #[serde(rename = "kRoundForce", deserialize_with = "deserialize_flag")]
    round_force: bool,
    #[serde(rename = "kRoundNearest", deserialize_with = "deserialize_flag")]
    round_nearest: bool,
    #[serde(rename = "kRoundDown", deserialize_with = "deserialize_flag")]
    round_down: bool,
    #[serde(rename = "kRoundUp", deserialize_with = "deserialize_flag")]
    round_up: bool,
    #[serde(rename = "kRoundZero", deserialize_with = "deserialize_flag")]
    round_zero: bool,
}

impl Default for PrecisionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl PrecisionPolicy {
    /// The default policy: IEEE 754, round to nearest, nothing suppressed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            no_exceptions: false,
            low_accuracy: false,
            no_large_argument: false,
            no_special_cases: false,
            daz: false,
            ftz: false,
            ieee754: true,
            round_force: false,
            round_nearest: true,
            round_down: false,
            round_up: false,
            round_zero: false,
        }
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// Trade accuracy for speed.
    #[must_use]
    pub const fn with_low_accuracy(mut self) -> Self {
        self.low_accuracy = true;
        self
    }

    /// Skip the slow path for arguments of large magnitude.
    #[must_use]
    pub const fn with_no_large_argument(mut self) -> Self {
        self.no_large_argument = true;
        self
    }

    /// Skip NaN, infinity and other special-case handling.
    #[must_use]
    pub const fn with_no_special_cases(mut self) -> Self {
        self.no_special_cases = true;
        self
    }

    /// Do not preserve floating-point exception flags.
    #[must_use]
    pub const fn with_no_exceptions(mut self) -> Self {
        self.no_exceptions = true;
        self
    }

    /// Force the rounding mode for the kernel's duration.
    #[must_use]
    pub const fn with_round_force(mut self) -> Self {
        self.round_force = true;
        self
    }

    /// Select the rounding direction, clearing any other.
    #[must_use]
    pub const fn with_rounding(mut self, mode: RoundingMode) -> Self {
        self.round_nearest = matches!(mode, RoundingMode::Nearest);
        self.round_down = matches!(mode, RoundingMode::Down);
        self.round_up = matches!(mode, RoundingMode::Up);
        self.round_zero = matches!(mode, RoundingMode::Zero);
        self
    }

    /// Treat subnormal inputs as zero. Leaves strict IEEE 754 mode.
    #[must_use]
    pub const fn with_daz(mut self) -> Self {
        self.daz = true;
        self.ieee754 = false;
        self
    }

    /// Flush subnormal results to zero. Leaves strict IEEE 754 mode.
    #[must_use]
    pub const fn with_ftz(mut self) -> Self {
        self.ftz = true;
        self.ieee754 = false;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Whether exception flags are left unpreserved.
    #[must_use]
    pub const fn no_exceptions(&self) -> bool {
        self.no_exceptions
    }

    /// Whether the reduced-accuracy variant is selected.
    #[must_use]
    pub const fn low_accuracy(&self) -> bool {
        self.low_accuracy
    }

    /// Whether large-argument handling is skipped.
    #[must_use]
    pub const fn no_large_argument(&self) -> bool {
        self.no_large_argument
    }

    /// Whether special-case handling is skipped.
    #[must_use]
    pub const fn no_special_cases(&self) -> bool {
        self.no_special_cases
    }

    /// Denormals-are-zero.
    #[must_use]
    pub const fn daz(&self) -> bool {
        self.daz
    }

    /// Flush-to-zero.
    #[must_use]
    pub const fn ftz(&self) -> bool {
        self.ftz
    }

    /// Strict IEEE 754 subnormal handling.
    #[must_use]
    pub const fn ieee754(&self) -> bool {
        self.ieee754
    }

    /// Whether the rounding mode is forced.
    #[must_use]
    pub const fn round_force(&self) -> bool {
        self.round_force
    }

    /// The selected rounding direction.
    ///
    /// With no direction flag set the kernel rounds to nearest.
    #[must_use]
    pub const fn rounding(&self) -> RoundingMode {
        if self.round_down {
            RoundingMode::Down
        } else if self.round_up {
            RoundingMode::Up
        } else if self.round_zero {
            RoundingMode::Zero
        } else {
            RoundingMode::Nearest
        }
    }

    /// All twelve flags with their native metadata names.
    #[must_use]
    pub const fn flags(&self) -> [(&'static str, bool); 12] {
        [
            ("kLowAccuracy", self.low_accuracy),
            ("kNoLargeArgument", self.no_large_argument),
            ("kNoSpecialCases", self.no_special_cases),
            ("kNoExceptions", self.no_exceptions),
            ("kRoundForce", self.round_force),
            ("kRoundNearest", self.round_nearest),
            ("kRoundZero", self.round_zero),
            ("kRoundDown", self.round_down),
            ("kRoundUp", self.round_up),
            ("kDAZ", self.daz),
            ("kFTZ", self.ftz),
            ("kIEEE754", self.ieee754),
        ]
    }

    /// Check the flag combinations the native profile forbids.
    ///
    /// Builders never produce a conflict; deserialized metadata can.
    ///
    /// # Errors
    ///
    /// - [`PolicyConflict::Rounding`] if more than one of nearest, down,
    ///   up and zero is set.
    /// - [`PolicyConflict::Subnormal`] if `kIEEE754` is set together with
    ///   `kDAZ` or `kFTZ`.
    pub fn validate(&self) -> Result<(), PolicyConflict> {
        let directions: Vec<&str> = [
            ("kRoundNearest", self.round_nearest),
            ("kRoundDown", self.round_down),
            ("kRoundUp", self.round_up),
            ("kRoundZero", self.round_zero),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
        if directions.len() > 1 {
            return Err(PolicyConflict::Rounding(directions.join(", ")));
        }
        if self.ieee754 && (self.daz || self.ftz) {
            return Err(PolicyConflict::Subnormal);
        }
        Ok(())
    }
}

/// Lists the flags that differ from the defaults: `Precise()`,
/// `Precise(kLowAccuracy, kNoSpecialCases)`. A default flag that is
/// cleared prints as `!kIEEE754`, unless `kDAZ`/`kFTZ` (for `kIEEE754`) or
/// another rounding direction (for `kRoundNearest`) already accounts for
/// it.
impl fmt::Display for PrecisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let implied_off = |name: &str| match name {
            "kIEEE754" => self.daz || self.ftz,
            "kRoundNearest" => self.round_down || self.round_up || self.round_zero,
            _ => false,
        };
        let defaults = Self::new().flags();
        let mut shown = Vec::new();
        for ((name, set), (_, default)) in self.flags().into_iter().zip(defaults) {
            match (set, default) {
                (true, false) => shown.push(name.to_string()),
                (false, true) if !implied_off(name) => shown.push(format!("!{name}")),
                _ => {}
            }
        }
        write!(f, "Precise({})", shown.join(", "))
    }
}
