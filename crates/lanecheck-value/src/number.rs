//! Conversions between native numbers and element bytes.
//!
//! [`Number`] is what callers hand in: an integer, a float, or a
//! hexadecimal float literal such as `"0x1.921fb54442d18p+1"`. [`Element`]
//! is what comes back out: one lane decoded under its element kind.

use crate::kind::ElementKind;
use crate::{ValueError, ValueResult};
use std::fmt;

/// A native number supplied when building a value.
#[derive(Clone, Debug, PartialEq)]
pub enum Number {
    /// A whole number.
    Int(i128),
    /// A binary64 float.
    Float(f64),
    /// A hexadecimal float (`[-]0x1.8p3`, `inf`, `nan`) or, for integer
    /// kinds, a decimal or `0x` integer.
    Text(String),
}

macro_rules! number_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Number {
            fn from(v: $t) -> Self {
                Self::Int(i128::from(v))
            }
        })*
    };
}

number_from_int!(u8, i8, u16, i16, u32, i32, u64, i64, i128);

impl From<usize> for Number {
    fn from(v: usize) -> Self {
        // usize is at most 64 bits on every supported platform.
        Self::Int(v as i128)
    }
}

impl From<f32> for Number {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Number {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Number {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Element> for Number {
    fn from(v: Element) -> Self {
        match v {
            Element::Uint16(x) => Self::from(x),
            Element::Int16(x) => Self::from(x),
            Element::Uint32(x) => Self::from(x),
            Element::Int32(x) => Self::from(x),
            Element::Uint64(x) => Self::from(x),
            Element::Int64(x) => Self::from(x),
            Element::Float32(x) => Self::from(x),
            Element::Float64(x) => Self::from(x),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl Number {
    /// Coerce this number to an element of `kind`.
    ///
    /// Floating kinds accept integers, floats and hexadecimal text.
    /// Integer kinds accept whole numbers that fit the kind's range.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeConversion`] if the number cannot be
    /// represented as `kind`.
    pub fn to_element(&self, kind: ElementKind) -> ValueResult<Element> {
        if kind.is_float() {
            let v = self.as_f64().ok_or_else(|| self.conversion_error(kind))?;
            return Ok(match kind {
                // Narrowing rounds to nearest, as a C float conversion does.
                ElementKind::Float32 => Element::Float32(v as f32),
                _ => Element::Float64(v),
            });
        }
        let whole = self.as_whole().ok_or_else(|| self.conversion_error(kind))?;
        let element = match kind {
            ElementKind::Uint16 => u16::try_from(whole).ok().map(Element::Uint16),
            ElementKind::Int16 => i16::try_from(whole).ok().map(Element::Int16),
            ElementKind::Uint32 => u32::try_from(whole).ok().map(Element::Uint32),
            ElementKind::Int32 => i32::try_from(whole).ok().map(Element::Int32),
            ElementKind::Uint64 => u64::try_from(whole).ok().map(Element::Uint64),
            ElementKind::Int64 => i64::try_from(whole).ok().map(Element::Int64),
            ElementKind::Float32 | ElementKind::Float64 => None,
        };
        element.ok_or_else(|| self.conversion_error(kind))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            // Large integers round to the nearest representable float.
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => parse_hex_float(s),
        }
    }

    fn as_whole(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 2f64.powi(127) {
                    Some(*v as i128)
                } else {
                    None
                }
            }
            Self::Text(s) => parse_integer(s),
        }
    }

    fn conversion_error(&self, kind: ElementKind) -> ValueError {
        ValueError::TypeConversion {
            value: self.to_string(),
            kind,
        }
    }
}

/// One lane decoded under its element kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Element {
    /// `uint16_t` lane.
    Uint16(u16),
    /// `int16_t` lane.
    Int16(i16),
    /// `uint32_t` lane.
    Uint32(u32),
    /// `int32_t` lane.
    Int32(i32),
    /// `uint64_t` lane.
    Uint64(u64),
    /// `int64_t` lane.
    Int64(i64),
    /// `float32_t` lane.
    Float32(f32),
    /// `float64_t` lane.
    Float64(f64),
}

impl Element {
    /// Element kind of this lane.
    #[must_use]
    pub const fn kind(self) -> ElementKind {
        match self {
            Self::Uint16(_) => ElementKind::Uint16,
            Self::Int16(_) => ElementKind::Int16,
            Self::Uint32(_) => ElementKind::Uint32,
            Self::Int32(_) => ElementKind::Int32,
            Self::Uint64(_) => ElementKind::Uint64,
            Self::Int64(_) => ElementKind::Int64,
            Self::Float32(_) => ElementKind::Float32,
            Self::Float64(_) => ElementKind::Float64,
        }
    }

    /// Decode one lane from the first `kind.width()` bytes of `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than the element width. Callers slice
    /// storage on element boundaries.
    #[must_use]
    pub fn read(kind: ElementKind, bytes: &[u8]) -> Self {
        match kind {
            ElementKind::Uint16 => Self::Uint16(u16::read_ne(bytes)),
            ElementKind::Int16 => Self::Int16(i16::read_ne(bytes)),
            ElementKind::Uint32 => Self::Uint32(u32::read_ne(bytes)),
            ElementKind::Int32 => Self::Int32(i32::read_ne(bytes)),
            ElementKind::Uint64 => Self::Uint64(u64::read_ne(bytes)),
            ElementKind::Int64 => Self::Int64(i64::read_ne(bytes)),
            ElementKind::Float32 => Self::Float32(f32::read_ne(bytes)),
            ElementKind::Float64 => Self::Float64(f64::read_ne(bytes)),
        }
    }

    /// Encode this lane into the first `width` bytes of `out`.
    pub fn write(self, out: &mut [u8]) {
        match self {
            Self::Uint16(v) => v.write_ne(out),
            Self::Int16(v) => v.write_ne(out),
            Self::Uint32(v) => v.write_ne(out),
            Self::Int32(v) => v.write_ne(out),
            Self::Uint64(v) => v.write_ne(out),
            Self::Int64(v) => v.write_ne(out),
            Self::Float32(v) => v.write_ne(out),
            Self::Float64(v) => v.write_ne(out),
        }
    }

    /// Numeric value widened to `f64` (64-bit integers may round).
    #[must_use]
    pub fn to_f64(self) -> f64 {
        match self {
            Self::Uint16(v) => f64::from(v),
            Self::Int16(v) => f64::from(v),
            Self::Uint32(v) => f64::from(v),
            Self::Int32(v) => f64::from(v),
            Self::Uint64(v) => v as f64,
            Self::Int64(v) => v as f64,
            Self::Float32(v) => f64::from(v),
            Self::Float64(v) => v,
        }
    }

    /// Raw bit pattern, zero-extended to 64 bits.
    #[must_use]
    pub fn to_bits(self) -> u64 {
        match self {
            Self::Uint16(v) => u64::from(v),
            Self::Int16(v) => u64::from(v as u16),
            Self::Uint32(v) => u64::from(v),
            Self::Int32(v) => u64::from(v as u32),
            Self::Uint64(v) => v,
            Self::Int64(v) => v as u64,
            Self::Float32(v) => u64::from(v.to_bits()),
            Self::Float64(v) => v.to_bits(),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint16(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Uint32(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Uint64(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v:?}"),
            Self::Float64(v) => write!(f, "{v:?}"),
        }
    }
}

/// Rust primitives that have an [`ElementKind`].
///
/// Implemented for `u16 i16 u32 i32 u64 i64 f32 f64`; gives typed fast
/// paths for building and reading values.
pub trait NativeElement: Copy + Send + Sync + 'static {
    /// Element kind of this primitive.
    const KIND: ElementKind;

    /// Write native-endian bytes into `out[..width]`.
    fn write_ne(self, out: &mut [u8]);

    /// Read from native-endian bytes `bytes[..width]`.
    fn read_ne(bytes: &[u8]) -> Self;
}

macro_rules! native_element {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(impl NativeElement for $t {
            const KIND: ElementKind = ElementKind::$kind;

            #[inline]
            fn write_ne(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
            }

            #[inline]
            fn read_ne(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_ne_bytes(buf)
            }
        })*
    };
}

native_element! {
    u16 => Uint16,
    i16 => Int16,
    u32 => Uint32,
    i32 => Int32,
    u64 => Uint64,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
}

// ============================================================================
// Text parsing
// ============================================================================

/// Parse a hexadecimal float literal.
///
/// Accepts `[+-][0x]h[.h][p[+-]d]` as well as `inf`, `infinity` and `nan`
/// in any case. The `0x` prefix is optional, so `"10"` is sixteen.
#[must_use]
pub fn parse_hex_float(text: &str) -> Option<f64> {
    let s = text.trim();
    let (negative, s) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let sign = if negative { -1.0 } else { 1.0 };

    let lower = s.to_ascii_lowercase();
    if lower == "inf" || lower == "infinity" {
        return Some(sign * f64::INFINITY);
    }
    if lower == "nan" {
        return Some(f64::NAN);
    }

    let body = lower.strip_prefix("0x").unwrap_or(&lower);
    let (digits, exponent) = match body.split_once('p') {
        Some((d, e)) => (d, e.parse::<i64>().ok()?),
        None => (body, 0),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut mantissa: u64 = 0;
    let mut scale: i64 = 0;
    let mut sticky = false;
    for (c, fractional) in int_part
        .chars()
        .map(|c| (c, false))
        .chain(frac_part.chars().map(|c| (c, true)))
    {
        let d = u64::from(c.to_digit(16)?);
        if mantissa < (1 << 60) {
            mantissa = mantissa * 16 + d;
            if fractional {
                scale -= 4;
            }
        } else {
            sticky |= d != 0;
            if !fractional {
                scale += 4;
            }
        }
    }
    if sticky {
        mantissa |= 1;
    }

    if mantissa == 0 {
        return Some(sign * 0.0);
    }
    // A mantissa below 2^64 scaled past 2^±2200 saturates to infinity or
    // zero, so larger shifts are clamped.
    let shift = exponent.saturating_add(scale).clamp(-2200, 2200);
    // u64 -> f64 rounds to nearest-even; the power-of-two scaling is exact
    // outside the subnormal range.
    Some(sign * scale_by_pow2(mantissa as f64, shift))
}

fn scale_by_pow2(mut x: f64, mut exp: i64) -> f64 {
    while exp > 1000 {
        x *= pow2(1000);
        exp -= 1000;
        if x.is_infinite() {
            return x;
        }
    }
    while exp < -1000 {
        x *= pow2(-1000);
        exp += 1000;
        if x == 0.0 {
            return x;
        }
    }
    // |exp| <= 1000 here, inside the normal exponent range.
    x * pow2(exp as i32)
}

fn pow2(exp: i32) -> f64 {
    f64::from_bits(((exp + 1023) as u64) << 52)
}

fn parse_integer(text: &str) -> Option<i128> {
    let s = text.trim();
    let (negative, s) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    // The sign was taken above; the digits must not carry another.
    if digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
