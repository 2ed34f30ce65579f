//! Shared types for the member-forward workspace.
//!
//! This crate holds the runtime model the forwarding engine operates on and
//! the small value types every other crate passes around:
//!
//! - [`model`] / [`value`]: types, members, boxed values and objects
//! - [`directory`]: the [`TypeDirectory`](directory::TypeDirectory) trait and
//!   its in-memory implementation
//! - [`annotation`]: declaration-time annotations on stubs
//! - [`symbol`] / [`key`]: member descriptors and registry keys
//! - [`errors`]: activation errors and call-time faults

pub mod annotation;
pub mod directory;
pub mod env_utils;
pub mod errors;
pub mod key;
pub mod model;
pub mod symbol;
pub mod value;

pub use annotation::{Annotation, AnnotationSet, MemberSelector, TypeSelector};
pub use directory::{LocalTypeDirectory, PropertyShape, TypeBuilder, TypeDirectory};
pub use errors::{Fault, ForwardError};
pub use key::RegistryKey;
pub use model::{
    FieldDef, Invocation, MethodDef, MethodRef, NativeBody, Param, PropertyDef, TypeDef, TypeId,
    TypeKind,
};
pub use symbol::SymbolRef;
pub use value::{Object, ObjectRef, Value};
