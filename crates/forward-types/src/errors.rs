//! Error types for activation and dispatch.
//!
//! [`ForwardError`] is raised while activating forwards (resolution,
//! validation, installation) and aborts the remaining scan of that activation
//! call. [`Fault`] is raised at call time by an installed dispatch routine or a
//! member body and travels back to whoever invoked the stub.

use std::fmt;

/// Activation-time failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// A descriptor argument was invalid (blank member name, unknown owner type).
    Argument {
        /// Name of the offending argument
        argument: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A type named by full name could not be found in the directory.
    TypeNotFound {
        /// Namespace-qualified type name that was requested
        full_name: String,
        /// Module the lookup was restricted to, if any
        module: Option<String>,
    },

    /// Neither a callable nor a storage location matches the forward target.
    MissingTarget {
        /// Owner type full name
        owner: String,
        /// Member name that was looked up
        member: String,
        /// Which shape was being searched for
        detail: String,
    },

    /// The target was found but its static-ness contradicts the stub.
    StaticMismatch {
        /// `Type.Member` of the target
        target: String,
        /// Whether the stub expected a static target
        expected_static: bool,
    },

    /// The stub's return type is not assignable from the target's.
    ReturnTypeMismatch {
        /// `Type.Member` of the target
        target: String,
        /// Declared return type of the stub
        stub_type: String,
        /// Return or value type of the target
        target_type: String,
    },

    /// A receiver or value parameter lies outside the required type hierarchy.
    ValueTypeMismatch {
        /// `Type.Member` of the target
        target: String,
        /// Index of the offending stub parameter
        parameter: usize,
        /// Type the parameter was declared with
        declared: String,
        /// Type the parameter has to share a hierarchy with
        required: String,
    },

    /// The stub's declaration shape cannot be forwarded.
    UnsupportedShape {
        /// Registry key of the stub declaration
        stub: String,
        /// Why the shape is rejected
        reason: String,
    },

    /// A collaborator needed for activation is not configured.
    DependencyUnavailable {
        /// Name of the missing collaborator
        dependency: String,
        /// How to provide it
        hint: String,
    },
}

impl ForwardError {
    /// Convenience constructor for [`ForwardError::Argument`].
    pub fn argument(argument: &'static str, reason: impl Into<String>) -> Self {
        ForwardError::Argument {
            argument,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`ForwardError::MissingTarget`].
    pub fn missing(owner: &str, member: &str, detail: impl Into<String>) -> Self {
        ForwardError::MissingTarget {
            owner: owner.to_string(),
            member: member.to_string(),
            detail: detail.into(),
        }
    }

    /// Convenience constructor for [`ForwardError::UnsupportedShape`].
    pub fn shape(stub: impl fmt::Display, reason: impl Into<String>) -> Self {
        ForwardError::UnsupportedShape {
            stub: stub.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable short name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Argument { .. } => "ArgumentError",
            ForwardError::TypeNotFound { .. } => "TypeNotFound",
            ForwardError::MissingTarget { .. } => "MissingTarget",
            ForwardError::StaticMismatch { .. } => "StaticMismatch",
            ForwardError::ReturnTypeMismatch { .. } => "ReturnTypeMismatch",
            ForwardError::ValueTypeMismatch { .. } => "ValueTypeMismatch",
            ForwardError::UnsupportedShape { .. } => "UnsupportedShape",
            ForwardError::DependencyUnavailable { .. } => "DependencyUnavailable",
        }
    }
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardError::Argument { argument, reason } => {
                write!(f, "ArgumentError: `{}` {}", argument, reason)
            }
            ForwardError::TypeNotFound { full_name, module } => {
                write!(f, "TypeNotFound: type '{}' could not be found", full_name)?;
                if let Some(m) = module {
                    write!(f, " in module '{}'", m)?;
                }
                Ok(())
            }
            ForwardError::MissingTarget {
                owner,
                member,
                detail,
            } => write!(f, "MissingTarget: '{}.{}' ({})", owner, member, detail),
            ForwardError::StaticMismatch {
                target,
                expected_static,
            } => write!(
                f,
                "StaticMismatch: could not find a {}static member '{}' matching the stub",
                if *expected_static { "" } else { "non-" },
                target
            ),
            ForwardError::ReturnTypeMismatch {
                target,
                stub_type,
                target_type,
            } => write!(
                f,
                "ReturnTypeMismatch: stub returns {} which is not assignable from {} ('{}')",
                stub_type, target_type, target
            ),
            ForwardError::ValueTypeMismatch {
                target,
                parameter,
                declared,
                required,
            } => write!(
                f,
                "ValueTypeMismatch: parameter {} of type {} is outside the hierarchy of {} ('{}')",
                parameter, declared, required, target
            ),
            ForwardError::UnsupportedShape { stub, reason } => {
                write!(f, "UnsupportedShape: {}: {}", stub, reason)
            }
            ForwardError::DependencyUnavailable { dependency, hint } => {
                write!(f, "DependencyUnavailable: {} is not available. {}", dependency, hint)
            }
        }
    }
}

impl std::error::Error for ForwardError {}

/// Call-time failures raised by dispatch routines and member bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// An instance member was reached with a null receiver.
    NullReference {
        /// Member being accessed
        member: String,
    },

    /// A value could not be converted to the type a routine expects.
    InvalidCast {
        /// Type that was expected
        expected: String,
        /// Runtime type that was found
        found: String,
    },

    /// The catastrophic class: the host ran out of a resource.
    ResourceExhausted {
        /// What was exhausted
        resource: String,
    },

    /// A call supplied the wrong number of arguments.
    ArgumentCount {
        /// Member being called
        member: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// A dispatch routine found no binding under its key.
    MissingBinding {
        /// Registry key that was looked up
        key: String,
    },

    /// No callable member of this name exists at the call site.
    MissingMember {
        /// `Type.Member` that was called
        member: String,
    },

    /// A fault raised by a member body.
    Raised {
        /// Short classification, e.g. `InvalidOperation`
        kind: String,
        /// Human-readable message
        message: String,
    },
}

impl Fault {
    /// Build a [`Fault::Raised`].
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::NullReference { member } => {
                write!(f, "NullReference: '{}' accessed without an instance", member)
            }
            Fault::InvalidCast { expected, found } => {
                write!(f, "InvalidCast: expected {}, found {}", expected, found)
            }
            Fault::ResourceExhausted { resource } => {
                write!(f, "ResourceExhausted: {}", resource)
            }
            Fault::ArgumentCount {
                member,
                expected,
                got,
            } => write!(
                f,
                "ArgumentCount: '{}' takes {} argument(s), got {}",
                member, expected, got
            ),
            Fault::MissingBinding { key } => {
                write!(f, "MissingBinding: no forward is registered under '{}'", key)
            }
            Fault::MissingMember { member } => write!(f, "MissingMember: '{}'", member),
            Fault::Raised { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

impl std::error::Error for Fault {}
