//! Forward Resolver
//!
//! Decides which real member a stub refers to.
//!
//! This crate provides:
//! - [`variable`]: field/property storage behind one get/set handle, cached per (type, name)
//! - [`method`]: receiver conventions and overload matching for callable stubs
//! - [`accessor`]: storage-shaped forwards (property stubs and the getter/setter fallback)
//!
//! # Resolution outcome
//!
//! Lookups that can legitimately find nothing return [`Lookup`] instead of an
//! error. Only [`Lookup::NotFound`] lets the method resolver move on to the
//! accessor strategy; a target that exists but fails validation is a hard
//! error.

pub mod accessor;
pub mod method;
pub mod variable;

pub use accessor::{
    AccessorForward, AccessorResolver, PropertyForward, PropertyStub, ReadOnlySetterPolicy,
};
pub use method::{
    MethodResolver, ReceiverConvention, Resolution, StubSignature, RECEIVER_PARAM_NAME,
};
pub use variable::{StorageKind, VariableHandle, VariableResolver};

/// Result of a lookup that may find nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}
