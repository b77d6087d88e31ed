//! Interned value types.
//!
//! A [`ValueType`] is a handle to a process-wide descriptor for one
//! `(ContainerKind, ElementKind)` pair. Each pair owns one static slot that
//! is filled on first request and never cleared, so two requests for the
//! same pair always return handles to the same descriptor. Equality and
//! hashing use the descriptor's address, not its contents.
//!
//! ```text
//! ValueType::vector(Float32) ──┐
//!                              ├──> &'static TypeDesc { Vector, Float32, "Vec(float32_t)" }
//! ValueType::vector(Float32) ──┘
//! ```

use crate::kind::{ContainerKind, ElementKind};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

const KINDS: usize = ElementKind::ALL.len();

/// One slot per pair, indexed by `container * KINDS + element`. A slot is
/// initialized at most once; reads of a filled slot take no lock.
static TYPE_CACHE: [OnceLock<TypeDesc>; 2 * KINDS] = [const { OnceLock::new() }; 2 * KINDS];

/// Descriptor behind a [`ValueType`] handle.
#[derive(Debug)]
struct TypeDesc {
    container: ContainerKind,
    element: ElementKind,
    name: String,
}

impl TypeDesc {
    fn new(container: ContainerKind, element: ElementKind) -> Self {
        let name = match container {
            ContainerKind::Scalar => element.name().to_string(),
            ContainerKind::Vector => format!("Vec({})", element.name()),
        };
        Self {
            container,
            element,
            name,
        }
    }
}

/// Interned handle identifying the type of a [`TypedValue`](crate::TypedValue).
///
/// Handles are `Copy` and compare by identity.
#[derive(Clone, Copy)]
pub struct ValueType(&'static TypeDesc);

impl ValueType {
    /// Get the interned type for a container and element kind.
    ///
    /// The first request for a pair creates its descriptor; concurrent
    /// first requests agree on a single winner.
    #[must_use]
    pub fn get(container: ContainerKind, element: ElementKind) -> Self {
        let slot = &TYPE_CACHE[container as usize * KINDS + element as usize];
        Self(slot.get_or_init(|| TypeDesc::new(container, element)))
    }

    /// The interned scalar type of `element`.
    #[must_use]
    pub fn scalar(element: ElementKind) -> Self {
        Self::get(ContainerKind::Scalar, element)
    }

    /// The interned vector type of `element`.
    #[must_use]
    pub fn vector(element: ElementKind) -> Self {
        Self::get(ContainerKind::Vector, element)
    }

    /// The same container with a different element kind.
    #[must_use]
    pub fn with_element(self, element: ElementKind) -> Self {
        Self::get(self.container(), element)
    }

    /// Container kind.
    #[must_use]
    pub fn container(self) -> ContainerKind {
        self.0.container
    }

    /// Element kind.
    #[must_use]
    pub fn element(self) -> ElementKind {
        self.0.element
    }

    /// Width in bytes of one element.
    #[must_use]
    pub fn element_width(self) -> usize {
        self.0.element.width()
    }

    /// Check if this is a scalar type.
    #[must_use]
    pub fn is_scalar(self) -> bool {
        self.0.container == ContainerKind::Scalar
    }

    /// Type name, e.g. `float64_t` or `Vec(int32_t)`.
    #[must_use]
    pub fn name(self) -> &'static str {
        &self.0.name
    }

    /// Number of distinct types interned so far in this process.
    #[must_use]
    pub fn interned_count() -> usize {
        TYPE_CACHE.iter().filter(|slot| slot.get().is_some()).count()
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for ValueType {}

impl Hash for ValueType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state);
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
