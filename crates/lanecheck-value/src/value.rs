//! Typed values over dense native byte storage.
//!
//! A [`TypedValue`] is a byte buffer plus its interned [`ValueType`]. The
//! buffer is exactly `len × element_width` bytes, native-endian, with no
//! padding and no tag, so it can be handed to a native kernel verbatim.

use crate::kind::{ContainerKind, ElementKind};
use crate::number::{Element, NativeElement, Number};
use crate::types::ValueType;
use crate::{ValueError, ValueResult};
use std::fmt;
use std::ops::{Bound, RangeBounds};

/// A scalar or vector value with byte-exact native layout.
///
/// Values compare equal when they have the same type and identical bytes,
/// so `NaN` lanes with the same payload compare equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypedValue {
    ty: ValueType,
    bytes: Vec<u8>,
}

impl TypedValue {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Build a value of type `ty` from native numbers.
    ///
    /// # Errors
    ///
    /// - [`ValueError::TypeConversion`] if a number cannot be coerced to the
    ///   element kind.
    /// - [`ValueError::Layout`] if a scalar type is given anything other than
    ///   exactly one number.
    pub fn make<I>(ty: ValueType, values: I) -> ValueResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<Number>,
    {
        let kind = ty.element();
        let width = kind.width();
        let mut bytes = Vec::new();
        for value in values {
            let element = value.into().to_element(kind)?;
            let start = bytes.len();
            bytes.resize(start + width, 0);
            element.write(&mut bytes[start..]);
        }
        Self::from_bytes(ty, bytes)
    }

    /// Build a scalar of `kind` from one native number.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeConversion`] if `value` does not fit `kind`.
    pub fn scalar(kind: ElementKind, value: impl Into<Number>) -> ValueResult<Self> {
        Self::make(ValueType::scalar(kind), [value.into()])
    }

    /// Build a vector of `kind` from native numbers.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeConversion`] if any value does not fit `kind`.
    pub fn vector<I>(kind: ElementKind, values: I) -> ValueResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<Number>,
    {
        Self::make(ValueType::vector(kind), values)
    }

    /// Build a vector directly from Rust primitives.
    #[must_use]
    pub fn from_slice<T: NativeElement>(values: &[T]) -> Self {
        let width = T::KIND.width();
        let mut bytes = vec![0u8; values.len() * width];
        for (chunk, value) in bytes.chunks_exact_mut(width).zip(values) {
            value.write_ne(chunk);
        }
        Self {
            ty: ValueType::vector(T::KIND),
            bytes,
        }
    }

    /// Build a scalar directly from a Rust primitive.
    #[must_use]
    pub fn from_native<T: NativeElement>(value: T) -> Self {
        let mut bytes = vec![0u8; T::KIND.width()];
        value.write_ne(&mut bytes);
        Self {
            ty: ValueType::scalar(T::KIND),
            bytes,
        }
    }

    /// Reinterpret raw bytes as a value of type `ty`.
    ///
    /// An owned `Vec<u8>` is taken over without copying. Only the length is
    /// checked: it must be a whole number of elements, and exactly one
    /// element for a scalar type.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Layout`] if the length does not fit the type.
    pub fn from_bytes(ty: ValueType, bytes: impl Into<Vec<u8>>) -> ValueResult<Self> {
        let bytes = bytes.into();
        let width = ty.element_width();
        if bytes.len() % width != 0 {
            return Err(ValueError::Layout {
                ty,
                len: bytes.len(),
                reason: "length is not a multiple of the element width",
            });
        }
        if ty.is_scalar() && bytes.len() != width {
            return Err(ValueError::Layout {
                ty,
                len: bytes.len(),
                reason: "a scalar holds exactly one element",
            });
        }
        Ok(Self { ty, bytes })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Interned type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    /// Container kind.
    #[must_use]
    pub fn container(&self) -> ContainerKind {
        self.ty.container()
    }

    /// Element kind.
    #[must_use]
    pub fn element_kind(&self) -> ElementKind {
        self.ty.element()
    }

    /// The canonical native byte view, passed verbatim to kernels.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the value, returning its storage.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len() / self.ty.element_width()
    }

    /// Check if the value holds no elements (only possible for vectors).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Index`] if `index` is out of range.
    pub fn element(&self, index: usize) -> ValueResult<Element> {
        let range = self.byte_range(index)?;
        Ok(Element::read(self.element_kind(), &self.bytes[range]))
    }

    /// The element of a scalar, or of a one-lane vector.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Index`] if the value does not hold exactly one
    /// element.
    pub fn scalar_value(&self) -> ValueResult<Element> {
        if self.len() != 1 {
            return Err(ValueError::Index {
                ty: self.ty,
                index: 1,
                len: self.len(),
            });
        }
        self.element(0)
    }

    /// Decode every element in storage order.
    #[must_use]
    pub fn to_elements(&self) -> Vec<Element> {
        let kind = self.element_kind();
        self.bytes
            .chunks_exact(kind.width())
            .map(|chunk| Element::read(kind, chunk))
            .collect()
    }

    /// Decode every element as the Rust primitive `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeConversion`] if `T` is not this value's
    /// element kind.
    pub fn to_vec<T: NativeElement>(&self) -> ValueResult<Vec<T>> {
        if T::KIND != self.element_kind() {
            return Err(ValueError::TypeConversion {
                value: self.ty.name().to_string(),
                kind: T::KIND,
            });
        }
        Ok(self
            .bytes
            .chunks_exact(T::KIND.width())
            .map(T::read_ne)
            .collect())
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// The element at `index` as a new scalar of the same element kind.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Index`] if `index` is out of range.
    pub fn get(&self, index: usize) -> ValueResult<Self> {
        let range = self.byte_range(index)?;
        Ok(Self {
            ty: ValueType::scalar(self.element_kind()),
            bytes: self.bytes[range].to_vec(),
        })
    }

    /// The elements in `range` as a new vector of the sliced length.
    ///
    /// Out-of-range bounds fail rather than clamp.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Index`] if the range is reversed or extends
    /// past the end.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> ValueResult<Self> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };
        if end > len || start > end {
            return Err(ValueError::Index {
                ty: self.ty,
                index: end.max(start),
                len,
            });
        }
        let width = self.ty.element_width();
        Ok(Self {
            ty: ValueType::vector(self.element_kind()),
            bytes: self.bytes[start * width..end * width].to_vec(),
        })
    }

    /// Overwrite the element at `index` in place.
    ///
    /// # Errors
    ///
    /// - [`ValueError::Index`] if `index` is out of range.
    /// - [`ValueError::TypeConversion`] if `value` does not fit the element
    ///   kind.
    pub fn set(&mut self, index: usize, value: impl Into<Number>) -> ValueResult<()> {
        let range = self.byte_range(index)?;
        let element = value.into().to_element(self.element_kind())?;
        element.write(&mut self.bytes[range]);
        Ok(())
    }

    /// Iterate the elements as scalars in storage order.
    ///
    /// The iterator borrows the value; call again to restart.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            value: self,
            front: 0,
            back: self.len(),
        }
    }

    // ========================================================================
    // Reinterpretation
    // ========================================================================

    /// Reinterpret the bytes under `kind`, keeping the container kind.
    ///
    /// No numeric conversion is performed and the storage is reused.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Layout`] if the byte length is not a whole
    /// number of `kind` elements (or not exactly one, for a scalar).
    pub fn bitcast(self, kind: ElementKind) -> ValueResult<Self> {
        Self::from_bytes(self.ty.with_element(kind), self.bytes)
    }

    fn byte_range(&self, index: usize) -> ValueResult<std::ops::Range<usize>> {
        let len = self.len();
        if index >= len {
            return Err(ValueError::Index {
                ty: self.ty,
                index,
                len,
            });
        }
        let width = self.ty.element_width();
        Ok(index * width..(index + 1) * width)
    }
}

/// Reinterpret `value`'s bytes under `kind`, keeping the container kind.
///
/// # Errors
///
/// Returns [`ValueError::Layout`] if the byte length does not fit `kind`.
pub fn bitcast(kind: ElementKind, value: &TypedValue) -> ValueResult<TypedValue> {
    value.clone().bitcast(kind)
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ty)?;
        for (i, element) in self.to_elements().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{element}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Iterator over the elements of a [`TypedValue`] as scalars.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    value: &'a TypedValue,
    front: usize,
    back: usize,
}

impl Iterator for Iter<'_> {
    type Item = TypedValue;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let item = self.value.get(self.front).ok();
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        self.value.get(self.back).ok()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a TypedValue {
    type Item = TypedValue;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_from_literal() {
        let v = TypedValue::scalar(ElementKind::Float64, 1.0).unwrap();
        assert_eq!(v.as_bytes(), &1.0f64.to_ne_bytes());
        assert_eq!(v.len(), 1);
        assert_eq!(v.to_string(), "float64_t(1.0)");
    }

    #[test]
    fn test_scalar_needs_one_number() {
        let err = TypedValue::make(ValueType::scalar(ElementKind::Int32), [1, 2]).unwrap_err();
        assert!(matches!(err, ValueError::Layout { len: 8, .. }));
    }

    #[test]
    fn test_from_bytes_checks_divisibility() {
        let ty = ValueType::vector(ElementKind::Float32);
        assert!(TypedValue::from_bytes(ty, vec![0u8; 12]).is_ok());
        let err = TypedValue::from_bytes(ty, vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, ValueError::Layout { len: 10, .. }));
    }

    #[test]
    fn test_index_and_slice() {
        let v = TypedValue::vector(ElementKind::Int32, [1, 2, 3, 4]).unwrap();
        assert_eq!(v.get(2).unwrap(), TypedValue::scalar(ElementKind::Int32, 3).unwrap());
        assert_eq!(v.slice(1..3).unwrap().to_vec::<i32>().unwrap(), vec![2, 3]);
        assert_eq!(v.slice(..).unwrap(), v);
        assert!(matches!(v.get(4), Err(ValueError::Index { index: 4, len: 4, .. })));
        assert!(v.slice(2..5).is_err());
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = v.slice(3..1);
        assert!(reversed.is_err());
    }

    #[test]
    fn test_set_is_in_place() {
        let mut v = TypedValue::vector(ElementKind::Uint16, [1, 2, 3]).unwrap();
        let before = v.as_bytes().as_ptr();
        v.set(1, 40).unwrap();
        assert_eq!(v.as_bytes().as_ptr(), before);
        assert_eq!(v.to_vec::<u16>().unwrap(), vec![1, 40, 3]);
        assert!(v.set(1, -1).is_err());
        assert!(v.set(3, 0).is_err());
    }

    #[test]
    fn test_iteration_restarts() {
        let v = TypedValue::from_slice(&[1.5f32, -2.0, 0.25]);
        let first: Vec<_> = v.iter().collect();
        let second: Vec<_> = v.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|s| s.value_type() == ValueType::scalar(ElementKind::Float32)));
        assert_eq!(v.iter().rev().next().unwrap().scalar_value().unwrap(), Element::Float32(0.25));
    }

    #[test]
    fn test_bitcast_keeps_container() {
        let v = TypedValue::from_slice(&[1.0f32, 2.0]);
        let u = bitcast(ElementKind::Uint16, &v).unwrap();
        assert_eq!(u.value_type(), ValueType::vector(ElementKind::Uint16));
        assert_eq!(u.len(), 4);
        assert_eq!(u.as_bytes(), v.as_bytes());
    }

    #[test]
    fn test_scalar_bitcast_requires_same_width() {
        let v = TypedValue::from_native(1.0f32);
        assert!(bitcast(ElementKind::Int32, &v).is_ok());
        assert!(matches!(bitcast(ElementKind::Uint16, &v), Err(ValueError::Layout { .. })));
        assert!(bitcast(ElementKind::Float64, &v).is_err());
    }

    #[test]
    fn test_to_vec_checks_kind() {
        let v = TypedValue::from_slice(&[1i64, 2]);
        assert!(v.to_vec::<u64>().is_err());
        assert_eq!(v.to_vec::<i64>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_display() {
        let v = TypedValue::vector(ElementKind::Int32, [1, 2, 3]).unwrap();
        assert_eq!(v.to_string(), "Vec(int32_t)(1, 2, 3)");
        assert_eq!(format!("{v:?}"), "Vec(int32_t)(1, 2, 3)");
    }
}
