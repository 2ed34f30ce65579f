//! Symbol descriptors: a validated (owner type, member name) pair.

use std::fmt;

use crate::annotation::{MemberSelector, TypeSelector};
use crate::directory::TypeDirectory;
use crate::errors::ForwardError;
use crate::model::TypeId;

/// What a forward or receiver annotation points at.
///
/// The member name is trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    owner: TypeId,
    name: String,
}

impl SymbolRef {
    /// Validate a descriptor against an already known owner.
    pub fn new(owner: TypeId, name: &str) -> Result<Self, ForwardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ForwardError::argument("name", "must not be empty or blank"));
        }
        Ok(Self {
            owner,
            name: name.to_string(),
        })
    }

    /// Resolve an annotation's selector through the directory.
    ///
    /// An id must name a registered type (`ArgumentError` otherwise); a full
    /// name is looked up with its module hint (`TypeNotFound` otherwise).
    pub fn bind(
        directory: &dyn TypeDirectory,
        selector: &MemberSelector,
    ) -> Result<Self, ForwardError> {
        let owner = match &selector.owner {
            TypeSelector::Id(id) => {
                if directory.type_def(*id).is_none() {
                    return Err(ForwardError::argument(
                        "type",
                        format!("{} is not a registered type", id),
                    ));
                }
                *id
            }
            TypeSelector::Named { full_name, module } => {
                directory.find_type(full_name.trim(), module.as_deref())?
            }
        };
        Self::new(owner, &selector.name)
    }

    /// Resolve the owner by full name, optionally within one module.
    pub fn resolve(
        directory: &dyn TypeDirectory,
        full_name: &str,
        module_hint: Option<&str>,
        name: &str,
    ) -> Result<Self, ForwardError> {
        let owner = directory.find_type(full_name.trim(), module_hint)?;
        Self::new(owner, name)
    }

    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Full.Type.Name.member` for messages.
    pub fn describe(&self, directory: &dyn TypeDirectory) -> String {
        format!("{}.{}", directory.type_name(self.owner), self.name)
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)
    }
}
