//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable domain objects defined entirely by their
/// attribute values: two with the same values are equal. Contrast with
/// [`crate::Entity`], where identity matters and values may change over time.
///
/// The trait requires `Clone + PartialEq + Debug` so values can be copied,
/// compared and logged like primitives. To "modify" a value object, build a
/// new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
