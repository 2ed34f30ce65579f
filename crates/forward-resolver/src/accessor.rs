//! Storage-shaped forwards.
//!
//! Two entry points share the checks here: property stubs, which are always
//! resolved against storage, and method stubs that found no callable and fall
//! back to a getter or setter over a field or property of the same name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use forward_types::directory::TypeDirectory;
use forward_types::errors::ForwardError;
use forward_types::model::TypeId;
use forward_types::symbol::SymbolRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::method::{ReceiverConvention, StubSignature};
use crate::variable::{VariableHandle, VariableResolver};

/// What to do when a setter is forwarded to storage that cannot be written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOnlySetterPolicy {
    /// Activation fails with `MissingTarget`.
    #[default]
    Fail,
    /// The setter is installed and silently drops every write.
    Ignore,
}

impl fmt::Display for ReadOnlySetterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadOnlySetterPolicy::Fail => write!(f, "fail"),
            ReadOnlySetterPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for ReadOnlySetterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(ReadOnlySetterPolicy::Fail),
            "ignore" => Ok(ReadOnlySetterPolicy::Ignore),
            other => Err(format!(
                "unknown read-only setter policy '{}' (expected 'fail' or 'ignore')",
                other
            )),
        }
    }
}

/// Declared shape of a property stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyStub {
    /// Registry key or other label used in errors.
    pub label: String,
    pub value_type: TypeId,
    pub is_static: bool,
    pub readable: bool,
    pub writable: bool,
}

/// A resolved property stub.
#[derive(Debug, Clone)]
pub struct PropertyForward {
    pub variable: Arc<VariableHandle>,
    pub convention: ReceiverConvention,
    pub getter: bool,
    pub setter: bool,
    /// Writes are dropped because the storage is read-only and the policy
    /// allows it.
    pub discard_writes: bool,
}

/// Method-form accessor fallback: which half of the storage a stub reaches.
#[derive(Debug, Clone)]
pub enum AccessorForward {
    Getter(Arc<VariableHandle>),
    Setter {
        variable: Arc<VariableHandle>,
        discard_writes: bool,
    },
}

#[derive(Debug, Clone)]
pub struct AccessorResolver {
    variables: Arc<VariableResolver>,
    setter_policy: ReadOnlySetterPolicy,
}

impl AccessorResolver {
    pub fn new(variables: Arc<VariableResolver>) -> Self {
        Self {
            variables,
            setter_policy: ReadOnlySetterPolicy::default(),
        }
    }

    pub fn with_setter_policy(mut self, policy: ReadOnlySetterPolicy) -> Self {
        self.setter_policy = policy;
        self
    }

    pub fn setter_policy(&self) -> ReadOnlySetterPolicy {
        self.setter_policy
    }

    pub fn variables(&self) -> &Arc<VariableResolver> {
        &self.variables
    }

    /// Reinterpret a method stub as a getter or setter over instance storage.
    ///
    /// A getter takes one parameter and a setter two, whatever the receiver
    /// convention. The first parameter is the receiver slot and must share a
    /// hierarchy with the target type; under an injected receiver its value
    /// is ignored and the receiver comes from the source.
    pub fn resolve_method_form(
        &self,
        directory: &dyn TypeDirectory,
        stub: &StubSignature,
        target: &SymbolRef,
        convention: ReceiverConvention,
    ) -> Result<AccessorForward, ForwardError> {
        let arity = stub.params.len();
        let is_setter = match arity {
            1 => false,
            2 => true,
            _ => {
                return Err(ForwardError::shape(
                    &stub.label,
                    format!(
                        "no method '{}' matches and {} parameter(s) fit neither a getter nor a setter",
                        target.describe(directory),
                        arity
                    ),
                ))
            }
        };

        let variable = self
            .variables
            .resolve(directory, target.owner(), target.name(), false)?;
        if variable.is_static() {
            return Err(ForwardError::StaticMismatch {
                target: variable.label().to_string(),
                expected_static: false,
            });
        }

        let receiver = &stub.params[0];
        if !directory.in_same_hierarchy(receiver.ty, target.owner()) {
            return Err(ForwardError::ValueTypeMismatch {
                target: variable.label().to_string(),
                parameter: 0,
                declared: directory.type_name(receiver.ty),
                required: directory.type_name(target.owner()),
            });
        }
        trace!(stub = %stub.label, ?convention, "receiver slot checked");

        if !is_setter {
            self.check_readable(directory, &variable, stub.return_type)?;
            debug!(stub = %stub.label, target = %variable.label(), "resolved getter fallback");
            return Ok(AccessorForward::Getter(variable));
        }

        if stub.return_type != TypeId::VOID {
            return Err(ForwardError::shape(
                &stub.label,
                format!(
                    "setter forward must return System.Void, found {}",
                    directory.type_name(stub.return_type)
                ),
            ));
        }
        let discard_writes = self.check_writable(directory, &variable, 1, stub.params[1].ty)?;
        debug!(stub = %stub.label, target = %variable.label(), discard_writes, "resolved setter fallback");
        Ok(AccessorForward::Setter {
            variable,
            discard_writes,
        })
    }

    /// Resolve a property stub against storage.
    ///
    /// Without a receiver source the storage has to be static; with one it
    /// has to be instance-scoped.
    pub fn resolve_property(
        &self,
        directory: &dyn TypeDirectory,
        stub: &PropertyStub,
        target: &SymbolRef,
        has_receiver_source: bool,
    ) -> Result<PropertyForward, ForwardError> {
        if !stub.is_static {
            return Err(ForwardError::shape(
                &stub.label,
                "property stubs must be static",
            ));
        }
        let variable = self
            .variables
            .resolve(directory, target.owner(), target.name(), !has_receiver_source)?;
        if has_receiver_source && variable.is_static() {
            return Err(ForwardError::StaticMismatch {
                target: variable.label().to_string(),
                expected_static: false,
            });
        }
        if stub.readable {
            self.check_readable(directory, &variable, stub.value_type)?;
        }
        let discard_writes = if stub.writable {
            self.check_writable(directory, &variable, 0, stub.value_type)?
        } else {
            false
        };
        let convention = if has_receiver_source {
            ReceiverConvention::ReceiverInjected
        } else {
            ReceiverConvention::Static
        };
        debug!(stub = %stub.label, target = %variable.label(), ?convention, "resolved property forward");
        Ok(PropertyForward {
            variable,
            convention,
            getter: stub.readable,
            setter: stub.writable,
            discard_writes,
        })
    }

    fn check_readable(
        &self,
        directory: &dyn TypeDirectory,
        variable: &VariableHandle,
        declared: TypeId,
    ) -> Result<(), ForwardError> {
        if !variable.gettable() {
            return Err(ForwardError::missing(
                &directory.type_name(variable.owner()),
                variable.name(),
                "storage has no getter",
            ));
        }
        if !directory.is_assignable_from(declared, variable.value_type()) {
            return Err(ForwardError::ReturnTypeMismatch {
                target: variable.label().to_string(),
                stub_type: directory.type_name(declared),
                target_type: directory.type_name(variable.value_type()),
            });
        }
        Ok(())
    }

    /// Returns whether writes are to be discarded.
    fn check_writable(
        &self,
        directory: &dyn TypeDirectory,
        variable: &VariableHandle,
        parameter: usize,
        declared: TypeId,
    ) -> Result<bool, ForwardError> {
        if !directory.in_same_hierarchy(declared, variable.value_type()) {
            return Err(ForwardError::ValueTypeMismatch {
                target: variable.label().to_string(),
                parameter,
                declared: directory.type_name(declared),
                required: directory.type_name(variable.value_type()),
            });
        }
        if variable.settable() {
            return Ok(false);
        }
        match self.setter_policy {
            ReadOnlySetterPolicy::Fail => Err(ForwardError::missing(
                &directory.type_name(variable.owner()),
                variable.name(),
                "storage is read-only",
            )),
            ReadOnlySetterPolicy::Ignore => {
                debug!(target = %variable.label(), "read-only storage, writes will be dropped");
                Ok(true)
            }
        }
    }
}
