//! Dispatch routines installed in place of stub bodies.
//!
//! There are three fixed shapes. Each routine is parameterized only by the
//! stub's [`RegistryKey`]; everything else (target, receiver source, storage
//! handle) is looked up in the [`ForwardRegistry`] at call time, so one shape
//! serves every stub of its kind.
//!
//! ```text
//! Method:  lookup(key) -> receiver -> args[n..] -> invoke target -> ret
//! Getter:  lookup(key) -> receiver -> get(receiver) -> unbox -> ret
//! Setter:  lookup(key) -> receiver -> box(value) -> set(receiver, value)
//! ```

use std::fmt;
use std::sync::Arc;

use forward_resolver::ReceiverConvention;
use forward_types::directory::TypeDirectory;
use forward_types::errors::Fault;
use forward_types::key::RegistryKey;
use forward_types::model::TypeId;
use forward_types::value::Value;
use serde::Serialize;

use crate::registry::{ForwardBinding, ForwardRegistry, ResolvedTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrampolineShape {
    Method,
    Getter,
    Setter,
}

impl fmt::Display for TrampolineShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrampolineShape::Method => write!(f, "method"),
            TrampolineShape::Getter => write!(f, "getter"),
            TrampolineShape::Setter => write!(f, "setter"),
        }
    }
}

/// A routine the code patcher can install as a stub's body.
pub trait Dispatch: Send + Sync {
    /// Run the routine with the stub's arguments.
    fn dispatch(&self, args: &[Value]) -> Result<Value, Fault>;

    /// Key the routine looks its binding up with.
    fn key(&self) -> &RegistryKey;

    fn shape(&self) -> TrampolineShape;

    /// Steps the routine performs, one per line, for generation-time tracing.
    fn listing(&self) -> &[String];
}

/// Hook run on every fault escaping a dispatch.
pub type FaultHook = Arc<dyn Fn(Fault) -> Fault + Send + Sync>;

/// Remaps the catastrophic fault class to a documented, benign one.
///
/// `ResourceExhausted` becomes `InvalidCast`; every other fault passes
/// through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultGuard;

impl FaultGuard {
    pub fn remap(fault: Fault) -> Fault {
        match fault {
            Fault::ResourceExhausted { resource } => Fault::InvalidCast {
                expected: "completed dispatch".to_string(),
                found: format!("exhausted {}", resource),
            },
            other => other,
        }
    }

    pub fn hook() -> FaultHook {
        Arc::new(Self::remap)
    }
}

/// Key-parameterized dispatch routine.
pub struct Trampoline {
    shape: TrampolineShape,
    key: RegistryKey,
    /// Declared return type of the stub (value type for getters).
    return_type: TypeId,
    registry: Arc<ForwardRegistry>,
    directory: Arc<dyn TypeDirectory>,
    listing: Vec<String>,
}

impl Trampoline {
    /// Build the routine for one stub of an already recorded binding.
    pub fn generate(
        shape: TrampolineShape,
        binding: &ForwardBinding,
        return_type: TypeId,
        registry: Arc<ForwardRegistry>,
        directory: Arc<dyn TypeDirectory>,
    ) -> Self {
        let listing = Self::render(shape, binding, return_type, directory.as_ref());
        Self {
            shape,
            key: binding.key().clone(),
            return_type,
            registry,
            directory,
            listing,
        }
    }

    fn render(
        shape: TrampolineShape,
        binding: &ForwardBinding,
        return_type: TypeId,
        directory: &dyn TypeDirectory,
    ) -> Vec<String> {
        let mut steps = vec![
            format!("ldkey \"{}\"", binding.key()),
            "call ForwardRegistry::get".to_string(),
        ];
        match (binding.resolved().convention(), binding.receiver_source()) {
            (ReceiverConvention::ReceiverInjected, Some(source)) => {
                steps.push(format!("ldsfld {}", source.label()));
                steps.push(format!("unbox {}", directory.type_name(source.value_type())));
            }
            (ReceiverConvention::ReceiverFromArg0, _) => steps.push("ldarg.0".to_string()),
            _ => steps.push("ldnull".to_string()),
        }
        let first_arg = binding.resolved().convention().consumed_args();
        let target = binding.resolved().describe(directory);
        match shape {
            TrampolineShape::Method => {
                steps.push(format!("ldargs {}..", first_arg));
                let op = if binding.resolved().convention().expects_static() {
                    "call"
                } else {
                    "callvirt"
                };
                steps.push(format!("{} {}", op, target));
            }
            TrampolineShape::Getter => {
                steps.push(format!("call VariableHandle::get {}", target));
                steps.push(format!("unbox {}", directory.type_name(return_type)));
            }
            TrampolineShape::Setter => {
                steps.push("ldarg.last".to_string());
                steps.push("box".to_string());
                steps.push(format!("call VariableHandle::set {}", target));
            }
        }
        steps.push("ret".to_string());
        steps
    }

    fn binding(&self) -> Result<Arc<ForwardBinding>, Fault> {
        self.registry
            .get(&self.key)
            .ok_or_else(|| Fault::MissingBinding {
                key: self.key.to_string(),
            })
    }

    /// Split the stub arguments into receiver and remaining arguments.
    fn receiver<'a>(
        &self,
        binding: &ForwardBinding,
        args: &'a [Value],
    ) -> Result<(Option<Value>, &'a [Value]), Fault> {
        match binding.resolved().convention() {
            ReceiverConvention::Static => Ok((None, args)),
            ReceiverConvention::ReceiverFromArg0 => match args.split_first() {
                Some((first, rest)) => Ok((Some(first.clone()), rest)),
                None => Err(Fault::ArgumentCount {
                    member: self.key.to_string(),
                    expected: 1,
                    got: 0,
                }),
            },
            ReceiverConvention::ReceiverInjected => {
                let source = binding.receiver_source().ok_or_else(|| Fault::MissingBinding {
                    key: format!("{} (receiver source)", self.key),
                })?;
                let value = source.get(self.directory.as_ref(), None)?;
                let value = self.directory.unbox(value, source.value_type())?;
                Ok((Some(value), args))
            }
        }
    }

    fn shape_error(&self, binding: &ForwardBinding) -> Fault {
        Fault::raised(
            "InvalidOperation",
            format!(
                "{} routine installed for {} target {}",
                self.shape,
                match binding.resolved() {
                    ResolvedTarget::Method { .. } => "method",
                    ResolvedTarget::Storage { .. } => "storage",
                },
                binding.resolved().describe(self.directory.as_ref())
            ),
        )
    }
}

impl Dispatch for Trampoline {
    fn dispatch(&self, args: &[Value]) -> Result<Value, Fault> {
        let binding = self.binding()?;
        let (receiver, rest) = self.receiver(&binding, args)?;
        let directory = self.directory.as_ref();
        match (self.shape, binding.resolved()) {
            (TrampolineShape::Method, ResolvedTarget::Method { method, .. }) => {
                let virtual_call = receiver.is_some();
                directory.invoke(*method, receiver.as_ref(), rest, virtual_call)
            }
            (TrampolineShape::Getter, ResolvedTarget::Storage { variable, .. }) => {
                let value = variable.get(directory, receiver.as_ref())?;
                directory.unbox(value, self.return_type)
            }
            (
                TrampolineShape::Setter,
                ResolvedTarget::Storage {
                    variable,
                    discard_writes,
                    ..
                },
            ) => {
                let value = rest.last().cloned().ok_or_else(|| Fault::ArgumentCount {
                    member: self.key.to_string(),
                    expected: 1,
                    got: 0,
                })?;
                if !*discard_writes {
                    variable.set(directory, receiver.as_ref(), value)?;
                }
                Ok(Value::Null)
            }
            _ => Err(self.shape_error(&binding)),
        }
    }

    fn key(&self) -> &RegistryKey {
        &self.key
    }

    fn shape(&self) -> TrampolineShape {
        self.shape
    }

    fn listing(&self) -> &[String] {
        &self.listing
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("shape", &self.shape)
            .field("key", &self.key)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_types::directory::{LocalTypeDirectory, TypeBuilder};
    use forward_types::model::{FieldDef, MethodDef, MethodRef, Param};
    use forward_types::symbol::SymbolRef;

    struct Fixture {
        dir: Arc<LocalTypeDirectory>,
        registry: Arc<ForwardRegistry>,
        b: TypeId,
    }

    fn fixture() -> Fixture {
        let dir = LocalTypeDirectory::new();
        let b = dir
            .register(
                TypeBuilder::class("Demo", "Demo.B")
                    .field(FieldDef::instance("count", TypeId::INT32))
                    .method(MethodDef::new(
                        "Compute",
                        vec![Param::new("x", TypeId::INT32)],
                        TypeId::INT32,
                        |inv| Ok(Value::Int32(inv.arg_i32(0)? + 100)),
                    ))
                    .method(MethodDef::new_static("Exhaust", vec![], TypeId::INT32, |_| {
                        Err(Fault::ResourceExhausted {
                            resource: "stack".into(),
                        })
                    })),
            )
            .unwrap();
        Fixture {
            dir: Arc::new(dir),
            registry: Arc::new(ForwardRegistry::new()),
            b,
        }
    }

    fn record(f: &Fixture, member: &str, resolved: ResolvedTarget) -> Arc<ForwardBinding> {
        f.registry.insert(ForwardBinding::new(
            RegistryKey::new("Demo", "Demo.Stubs", member),
            SymbolRef::new(f.b, member).unwrap(),
            resolved,
            None,
            Vec::new(),
            "test",
        ))
    }

    #[test]
    fn test_method_routine_passes_receiver() {
        let f = fixture();
        let binding = record(
            &f,
            "Compute",
            ResolvedTarget::Method {
                method: MethodRef::new(f.b, 0),
                convention: ReceiverConvention::ReceiverFromArg0,
            },
        );
        let routine = Trampoline::generate(
            TrampolineShape::Method,
            &binding,
            TypeId::INT32,
            f.registry.clone(),
            f.dir.clone(),
        );
        let obj = f.dir.instantiate(f.b).unwrap();
        assert_eq!(
            routine.dispatch(&[obj, Value::Int32(5)]),
            Ok(Value::Int32(105))
        );
        assert_eq!(
            routine.dispatch(&[Value::Null, Value::Int32(5)]),
            Err(Fault::NullReference {
                member: "Demo.B.Compute".into()
            })
        );
        assert!(routine.listing().iter().any(|s| s == "callvirt Demo.B.Compute"));
    }

    #[test]
    fn test_getter_and_setter_routines() {
        let f = fixture();
        let variable = f
            .registry
            .variables()
            .resolve(f.dir.as_ref(), f.b, "count", false)
            .unwrap();
        let binding = record(
            &f,
            "count",
            ResolvedTarget::Storage {
                variable,
                convention: ReceiverConvention::ReceiverFromArg0,
                discard_writes: false,
            },
        );
        let getter = Trampoline::generate(
            TrampolineShape::Getter,
            &binding,
            TypeId::INT32,
            f.registry.clone(),
            f.dir.clone(),
        );
        let setter = Trampoline::generate(
            TrampolineShape::Setter,
            &binding,
            TypeId::VOID,
            f.registry.clone(),
            f.dir.clone(),
        );
        let obj = f.dir.instantiate(f.b).unwrap();
        assert_eq!(
            setter.dispatch(&[obj.clone(), Value::Int32(7)]),
            Ok(Value::Null)
        );
        assert_eq!(getter.dispatch(&[obj]), Ok(Value::Int32(7)));
    }

    #[test]
    fn test_missing_binding() {
        let f = fixture();
        let binding = record(
            &f,
            "Compute",
            ResolvedTarget::Method {
                method: MethodRef::new(f.b, 0),
                convention: ReceiverConvention::ReceiverFromArg0,
            },
        );
        let routine = Trampoline::generate(
            TrampolineShape::Method,
            &binding,
            TypeId::INT32,
            f.registry.clone(),
            f.dir.clone(),
        );
        f.registry.clear();
        assert_eq!(
            routine.dispatch(&[Value::Null, Value::Int32(1)]),
            Err(Fault::MissingBinding {
                key: "Demo:Demo.Stubs.Compute".into()
            })
        );
    }

    #[test]
    fn test_fault_guard_remaps_only_exhaustion() {
        let exhausted = Fault::ResourceExhausted {
            resource: "stack".into(),
        };
        assert!(matches!(
            FaultGuard::remap(exhausted),
            Fault::InvalidCast { .. }
        ));
        let null = Fault::NullReference {
            member: "x".into(),
        };
        assert_eq!(FaultGuard::remap(null.clone()), null);

        let f = fixture();
        let binding = record(
            &f,
            "Exhaust",
            ResolvedTarget::Method {
                method: MethodRef::new(f.b, 1),
                convention: ReceiverConvention::Static,
            },
        );
        let routine = Trampoline::generate(
            TrampolineShape::Method,
            &binding,
            TypeId::INT32,
            f.registry.clone(),
            f.dir.clone(),
        );
        let hook = FaultGuard::hook();
        let fault = routine.dispatch(&[]).map_err(|e| hook(e)).unwrap_err();
        assert!(matches!(fault, Fault::InvalidCast { .. }));
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let f = fixture();
        let binding = record(
            &f,
            "Compute",
            ResolvedTarget::Method {
                method: MethodRef::new(f.b, 0),
                convention: ReceiverConvention::Static,
            },
        );
        let routine = Trampoline::generate(
            TrampolineShape::Getter,
            &binding,
            TypeId::INT32,
            f.registry.clone(),
            f.dir.clone(),
        );
        assert!(matches!(
            routine.dispatch(&[]),
            Err(Fault::Raised { ref kind, .. }) if kind == "InvalidOperation"
        ));
    }
}
