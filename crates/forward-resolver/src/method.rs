//! Method stub resolution.
//!
//! A method stub is matched against its target in three steps: pick a
//! receiver convention, look up the callable by exact signature, validate
//! static-ness and return type. Only when no callable with that name and
//! signature exists does resolution move on to the accessor fallback.

use std::sync::Arc;

use forward_types::directory::TypeDirectory;
use forward_types::errors::ForwardError;
use forward_types::model::{MethodDef, MethodRef, Param, TypeId};
use forward_types::symbol::SymbolRef;
use serde::Serialize;
use tracing::{debug, trace};

use crate::accessor::{AccessorForward, AccessorResolver, ReadOnlySetterPolicy};
use crate::variable::{VariableHandle, VariableResolver};
use crate::Lookup;

/// Parameter name that marks an explicit receiver under strict naming.
pub const RECEIVER_PARAM_NAME: &str = "__instance";

/// Where a forwarded call gets its receiver from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiverConvention {
    /// No receiver; the target is static.
    Static,
    /// The stub's first argument is the receiver.
    ReceiverFromArg0,
    /// A static storage location named by a receiver source supplies it.
    ReceiverInjected,
}

impl ReceiverConvention {
    /// Whether the target has to be static under this convention.
    pub fn expects_static(self) -> bool {
        self == ReceiverConvention::Static
    }

    /// Number of leading stub arguments consumed by the receiver.
    pub fn consumed_args(self) -> usize {
        match self {
            ReceiverConvention::ReceiverFromArg0 => 1,
            _ => 0,
        }
    }
}

/// The parts of a stub declaration resolution looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubSignature {
    /// Registry key or other label used in errors.
    pub label: String,
    pub params: Vec<Param>,
    pub return_type: TypeId,
    pub is_static: bool,
}

impl StubSignature {
    pub fn of(label: impl Into<String>, method: &MethodDef) -> Self {
        Self {
            label: label.into(),
            params: method.params.clone(),
            return_type: method.return_type,
            is_static: method.is_static,
        }
    }
}

/// What a method stub resolved to.
#[derive(Debug, Clone)]
pub enum Resolution {
    Method {
        method: MethodRef,
        convention: ReceiverConvention,
    },
    Getter {
        variable: Arc<VariableHandle>,
        convention: ReceiverConvention,
    },
    Setter {
        variable: Arc<VariableHandle>,
        convention: ReceiverConvention,
        discard_writes: bool,
    },
}

impl Resolution {
    pub fn convention(&self) -> ReceiverConvention {
        match self {
            Resolution::Method { convention, .. }
            | Resolution::Getter { convention, .. }
            | Resolution::Setter { convention, .. } => *convention,
        }
    }

    /// `method`, `getter` or `setter`.
    pub fn shape(&self) -> &'static str {
        match self {
            Resolution::Method { .. } => "method",
            Resolution::Getter { .. } => "getter",
            Resolution::Setter { .. } => "setter",
        }
    }

    /// `Type.Member` of the resolved target.
    pub fn describe(&self, directory: &dyn TypeDirectory) -> String {
        match self {
            Resolution::Method { method, .. } => directory.method_label(*method),
            Resolution::Getter { variable, .. } | Resolution::Setter { variable, .. } => {
                variable.label().to_string()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodResolver {
    accessors: AccessorResolver,
    strict_naming: bool,
}

impl MethodResolver {
    pub fn new(variables: Arc<VariableResolver>) -> Self {
        Self {
            accessors: AccessorResolver::new(variables),
            strict_naming: true,
        }
    }

    /// Require the explicit receiver parameter to be named
    /// [`RECEIVER_PARAM_NAME`]. On by default; when off, any first parameter
    /// sharing a hierarchy with the target type is taken as the receiver.
    pub fn strict_naming(mut self, strict: bool) -> Self {
        self.strict_naming = strict;
        self
    }

    pub fn setter_policy(mut self, policy: ReadOnlySetterPolicy) -> Self {
        self.accessors = self.accessors.with_setter_policy(policy);
        self
    }

    pub fn accessors(&self) -> &AccessorResolver {
        &self.accessors
    }

    /// Decide how the receiver reaches the target.
    ///
    /// A receiver source always wins. Otherwise the first parameter is the
    /// receiver when its type shares a hierarchy with the target type (and,
    /// under strict naming, it carries the reserved name).
    pub fn receiver_convention(
        &self,
        directory: &dyn TypeDirectory,
        stub: &StubSignature,
        target: &SymbolRef,
        has_receiver_source: bool,
    ) -> ReceiverConvention {
        if has_receiver_source {
            return ReceiverConvention::ReceiverInjected;
        }
        match stub.params.first() {
            Some(first)
                if directory.in_same_hierarchy(first.ty, target.owner())
                    && (!self.strict_naming || first.name == RECEIVER_PARAM_NAME) =>
            {
                ReceiverConvention::ReceiverFromArg0
            }
            _ => ReceiverConvention::Static,
        }
    }

    /// Exact-signature lookup of the target callable, ignoring the
    /// parameters consumed by the receiver convention.
    pub fn lookup(
        &self,
        directory: &dyn TypeDirectory,
        stub: &StubSignature,
        target: &SymbolRef,
        convention: ReceiverConvention,
    ) -> Lookup<MethodRef> {
        let param_types: Vec<TypeId> = stub
            .params
            .iter()
            .skip(convention.consumed_args())
            .map(|p| p.ty)
            .collect();
        directory
            .find_method(target.owner(), target.name(), &param_types)
            .into()
    }

    /// Resolve a method stub to a callable or, failing that, to storage.
    pub fn resolve(
        &self,
        directory: &dyn TypeDirectory,
        stub: &StubSignature,
        target: &SymbolRef,
        has_receiver_source: bool,
    ) -> Result<Resolution, ForwardError> {
        if !stub.is_static {
            return Err(ForwardError::shape(&stub.label, "method stubs must be static"));
        }
        let convention = self.receiver_convention(directory, stub, target, has_receiver_source);
        trace!(stub = %stub.label, ?convention, "receiver convention");

        let method = match self.lookup(directory, stub, target, convention) {
            Lookup::Found(method) => method,
            Lookup::NotFound => {
                debug!(
                    stub = %stub.label,
                    target = %target.describe(directory),
                    "no matching method, trying storage"
                );
                return self.resolve_accessor(directory, stub, target, convention);
            }
        };

        let label = directory.method_label(method);
        let def = directory.method_def(method).ok_or_else(|| {
            ForwardError::missing(
                &directory.type_name(target.owner()),
                target.name(),
                "method slot vanished",
            )
        })?;
        if def.is_static != convention.expects_static() {
            return Err(ForwardError::StaticMismatch {
                target: label,
                expected_static: convention.expects_static(),
            });
        }
        if !directory.is_assignable_from(stub.return_type, def.return_type) {
            return Err(ForwardError::ReturnTypeMismatch {
                target: label,
                stub_type: directory.type_name(stub.return_type),
                target_type: directory.type_name(def.return_type),
            });
        }
        debug!(stub = %stub.label, target = %label, ?convention, "resolved method forward");
        Ok(Resolution::Method { method, convention })
    }

    fn resolve_accessor(
        &self,
        directory: &dyn TypeDirectory,
        stub: &StubSignature,
        target: &SymbolRef,
        convention: ReceiverConvention,
    ) -> Result<Resolution, ForwardError> {
        let forward = self
            .accessors
            .resolve_method_form(directory, stub, target, convention)?;
        // Explicit receivers become arg0 once the stub is read as an accessor.
        let convention = match convention {
            ReceiverConvention::ReceiverInjected => ReceiverConvention::ReceiverInjected,
            _ => ReceiverConvention::ReceiverFromArg0,
        };
        Ok(match forward {
            AccessorForward::Getter(variable) => Resolution::Getter {
                variable,
                convention,
            },
            AccessorForward::Setter {
                variable,
                discard_writes,
            } => Resolution::Setter {
                variable,
                convention,
                discard_writes,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_types::directory::{LocalTypeDirectory, TypeBuilder};
    use forward_types::model::FieldDef;
    use forward_types::value::Value;

    struct Fixture {
        dir: LocalTypeDirectory,
        a: TypeId,
        b: TypeId,
        c: TypeId,
    }

    /// A <- B <- C, with `Compute` on B, factories returning A and C, a
    /// static helper and an instance field.
    fn fixture() -> Fixture {
        let dir = LocalTypeDirectory::new();
        let a = dir.register(TypeBuilder::class("Demo", "Demo.A")).unwrap();
        let b = dir.declare("Demo", "Demo.B").unwrap();
        let c = dir.declare("Demo", "Demo.C").unwrap();
        dir.define(
            b,
            TypeBuilder::class("Demo", "Demo.B")
                .extends(a)
                .field(FieldDef::instance("count", TypeId::INT32))
                .method(MethodDef::new(
                    "Compute",
                    vec![Param::new("x", TypeId::INT32)],
                    TypeId::INT32,
                    |inv| Ok(Value::Int32(inv.arg_i32(0)? * 3)),
                ))
                .method(MethodDef::new("MakeC", vec![], c, |_| Ok(Value::Null)))
                .method(MethodDef::new("MakeA", vec![], a, |_| Ok(Value::Null)))
                .method(MethodDef::new_static(
                    "Echo",
                    vec![Param::new("o", TypeId::OBJECT)],
                    TypeId::OBJECT,
                    |inv| Ok(inv.arg(0)?.clone()),
                ))
                .method(MethodDef::new_static(
                    "Twice",
                    vec![Param::new("x", TypeId::INT32)],
                    TypeId::INT32,
                    |inv| Ok(Value::Int32(inv.arg_i32(0)? * 2)),
                )),
        )
        .unwrap();
        dir.define(c, TypeBuilder::class("Demo", "Demo.C").extends(b))
            .unwrap();
        Fixture { dir, a, b, c }
    }

    fn stub(params: Vec<Param>, return_type: TypeId) -> StubSignature {
        StubSignature {
            label: "Demo:Demo.Stubs.Stub".to_string(),
            params,
            return_type,
            is_static: true,
        }
    }

    fn resolver() -> MethodResolver {
        MethodResolver::new(Arc::new(VariableResolver::new()))
    }

    #[test]
    fn test_arg0_receiver_excluded_from_matching() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Compute").unwrap();
        let s = stub(
            vec![
                Param::new(RECEIVER_PARAM_NAME, TypeId::OBJECT),
                Param::new("x", TypeId::INT32),
            ],
            TypeId::INT32,
        );
        let resolved = resolver().resolve(&f.dir, &s, &target, false).unwrap();
        assert!(matches!(
            resolved,
            Resolution::Method {
                convention: ReceiverConvention::ReceiverFromArg0,
                ..
            }
        ));
        assert_eq!(resolved.describe(&f.dir), "Demo.B.Compute");
    }

    #[test]
    fn test_derived_receiver_is_compatible() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Compute").unwrap();
        let s = stub(
            vec![Param::new(RECEIVER_PARAM_NAME, f.c), Param::new("x", TypeId::INT32)],
            TypeId::INT32,
        );
        let r = resolver();
        assert_eq!(
            r.receiver_convention(&f.dir, &s, &target, false),
            ReceiverConvention::ReceiverFromArg0
        );
    }

    #[test]
    fn test_strict_naming_requires_reserved_name() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Compute").unwrap();
        let unnamed = stub(
            vec![Param::new("inst", f.b), Param::new("x", TypeId::INT32)],
            TypeId::INT32,
        );
        assert_eq!(
            resolver().receiver_convention(&f.dir, &unnamed, &target, false),
            ReceiverConvention::Static
        );
        let loose = resolver().strict_naming(false);
        assert_eq!(
            loose.receiver_convention(&f.dir, &unnamed, &target, false),
            ReceiverConvention::ReceiverFromArg0
        );
        let named = stub(
            vec![
                Param::new(RECEIVER_PARAM_NAME, f.b),
                Param::new("x", TypeId::INT32),
            ],
            TypeId::INT32,
        );
        assert_eq!(
            resolver().receiver_convention(&f.dir, &named, &target, false),
            ReceiverConvention::ReceiverFromArg0
        );
    }

    #[test]
    fn test_static_target_with_object_parameter() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Echo").unwrap();
        let s = stub(vec![Param::new("o", TypeId::OBJECT)], TypeId::OBJECT);

        let resolved = resolver().resolve(&f.dir, &s, &target, false).unwrap();
        assert_eq!(resolved.convention(), ReceiverConvention::Static);
        assert_eq!(resolved.describe(&f.dir), "Demo.B.Echo");

        // Without strict naming `o` is read as a receiver and nothing matches.
        let err = resolver()
            .strict_naming(false)
            .resolve(&f.dir, &s, &target, false)
            .unwrap_err();
        assert_eq!(err.kind(), "MissingTarget");
    }

    #[test]
    fn test_receiver_source_always_wins() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Compute").unwrap();
        let s = stub(
            vec![Param::new("inst", f.b), Param::new("x", TypeId::INT32)],
            TypeId::INT32,
        );
        let r = resolver();
        assert_eq!(
            r.receiver_convention(&f.dir, &s, &target, true),
            ReceiverConvention::ReceiverInjected
        );
        let injected = stub(vec![Param::new("x", TypeId::INT32)], TypeId::INT32);
        let resolved = r.resolve(&f.dir, &injected, &target, true).unwrap();
        assert_eq!(resolved.convention(), ReceiverConvention::ReceiverInjected);
    }

    #[test]
    fn test_static_target() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Twice").unwrap();
        let s = stub(vec![Param::new("x", TypeId::INT32)], TypeId::INT32);
        let resolved = resolver().resolve(&f.dir, &s, &target, false).unwrap();
        assert_eq!(resolved.convention(), ReceiverConvention::Static);
        assert_eq!(resolved.shape(), "method");
    }

    #[test]
    fn test_static_mismatch() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "MakeA").unwrap();
        let err = resolver()
            .resolve(&f.dir, &stub(vec![], f.a), &target, false)
            .unwrap_err();
        assert_eq!(
            err,
            ForwardError::StaticMismatch {
                target: "Demo.B.MakeA".into(),
                expected_static: true
            }
        );
    }

    #[test]
    fn test_return_covariance() {
        let f = fixture();
        let r = resolver();
        let receiver = vec![Param::new(RECEIVER_PARAM_NAME, f.b)];

        let make_c = SymbolRef::new(f.b, "MakeC").unwrap();
        assert!(r
            .resolve(&f.dir, &stub(receiver.clone(), f.a), &make_c, false)
            .is_ok());

        let make_a = SymbolRef::new(f.b, "MakeA").unwrap();
        let err = r
            .resolve(&f.dir, &stub(receiver, f.c), &make_a, false)
            .unwrap_err();
        assert_eq!(err.kind(), "ReturnTypeMismatch");
    }

    #[test]
    fn test_inherited_method_found_on_base_chain() {
        let f = fixture();
        let target = SymbolRef::new(f.c, "Compute").unwrap();
        let s = stub(
            vec![Param::new(RECEIVER_PARAM_NAME, f.c), Param::new("x", TypeId::INT32)],
            TypeId::INT32,
        );
        let r = resolver();
        let convention = r.receiver_convention(&f.dir, &s, &target, false);
        let found = r.lookup(&f.dir, &s, &target, convention).found().unwrap();
        assert_eq!(found.owner, f.b);
    }

    #[test]
    fn test_accessor_fallback() {
        let f = fixture();
        let r = resolver();
        let count = SymbolRef::new(f.b, "count").unwrap();

        let getter = stub(vec![Param::new("inst", f.b)], TypeId::INT32);
        let resolved = r.resolve(&f.dir, &getter, &count, false).unwrap();
        assert_eq!(resolved.shape(), "getter");
        assert_eq!(resolved.convention(), ReceiverConvention::ReceiverFromArg0);

        let setter = stub(
            vec![Param::new("inst", f.b), Param::new("v", TypeId::INT32)],
            TypeId::VOID,
        );
        assert_eq!(r.resolve(&f.dir, &setter, &count, false).unwrap().shape(), "setter");

        let three = stub(
            vec![
                Param::new("inst", f.b),
                Param::new("v", TypeId::INT32),
                Param::new("w", TypeId::INT32),
            ],
            TypeId::VOID,
        );
        let err = r.resolve(&f.dir, &three, &count, false).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedShape");
    }

    #[test]
    fn test_mismatch_does_not_fall_back() {
        let f = fixture();
        // `Compute` exists with this signature but is instance-scoped.
        let target = SymbolRef::new(f.b, "Compute").unwrap();
        let s = stub(vec![Param::new("x", TypeId::INT32)], TypeId::INT32);
        let err = resolver().resolve(&f.dir, &s, &target, false).unwrap_err();
        assert_eq!(err.kind(), "StaticMismatch");
    }

    #[test]
    fn test_nothing_to_forward_to() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Missing").unwrap();
        let s = stub(vec![Param::new("inst", f.b)], TypeId::INT32);
        let err = resolver().resolve(&f.dir, &s, &target, false).unwrap_err();
        assert_eq!(err.kind(), "MissingTarget");
    }

    #[test]
    fn test_instance_stub_rejected() {
        let f = fixture();
        let target = SymbolRef::new(f.b, "Twice").unwrap();
        let s = StubSignature {
            is_static: false,
            ..stub(vec![Param::new("x", TypeId::INT32)], TypeId::INT32)
        };
        let err = resolver().resolve(&f.dir, &s, &target, false).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedShape");
    }
}
