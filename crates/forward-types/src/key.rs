//! Registry keys.
//!
//! A key identifies one member: `"{module}:{type full name}.{member}"`.
//! Dispatch routines carry only their key and look everything else up with
//! it at call time.

use std::fmt;

use serde::Serialize;

use crate::model::TypeDef;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RegistryKey(String);

impl RegistryKey {
    pub fn new(module: &str, type_full_name: &str, member: &str) -> Self {
        Self(format!("{}:{}.{}", module, type_full_name, member))
    }

    /// Key of a member declared on `owner`.
    pub fn for_member(owner: &TypeDef, member: &str) -> Self {
        Self::new(&owner.module, &owner.full_name, member)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
