//! Runtime type identity for payloads stored in type-erased values.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Copyable token identifying the concrete Rust type of a stored payload.
///
/// Equality and hashing consider only the `TypeId`; the type name rides
/// along so mismatch diagnostics can print both sides.
#[derive(Debug, Clone, Copy)]
pub struct ValueTypeId {
    id: TypeId,
    name: &'static str,
}

impl ValueTypeId {
    /// Returns the identity token for `T`.
    pub fn of<T: 'static>() -> Self {
        ValueTypeId {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Tests whether the token identifies `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Returns the diagnostic type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ValueTypeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueTypeId {}

impl Hash for ValueTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ValueTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn identity_is_per_type() {
        assert_eq!(ValueTypeId::of::<Tensor>(), ValueTypeId::of::<Tensor>());
        assert_ne!(ValueTypeId::of::<Tensor>(), ValueTypeId::of::<i64>());
        assert!(ValueTypeId::of::<Tensor>().is::<Tensor>());
        assert!(!ValueTypeId::of::<Tensor>().is::<f32>());
    }

    #[test]
    fn name_is_diagnostic_only() {
        assert!(ValueTypeId::of::<Tensor>().name().contains("Tensor"));
    }
}
