//! Patch group activation.
//!
//! [`PatchGroupManager`] scans declarations for forward annotations, resolves
//! each one, installs its dispatch routine through the group's
//! [`CodePatcher`](crate::patcher::CodePatcher) and records the binding.
//!
//! Activation holds one lock across check, resolve, install and mark for each
//! declaration, so a stub is never installed twice no matter how many threads
//! or groups activate it. The first hard error aborts the rest of the call;
//! stubs activated before it stay active.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use forward_resolver::{
    MethodResolver, PropertyStub, ReceiverConvention, Resolution, StubSignature,
    VariableHandle,
};
use forward_types::annotation::{AnnotationSet, MemberSelector};
use forward_types::directory::TypeDirectory;
use forward_types::errors::ForwardError;
use forward_types::key::RegistryKey;
use forward_types::model::{MethodDef, MethodRef, PropertyDef, TypeDef, TypeId, CORE_MODULE};
use forward_types::symbol::SymbolRef;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::ForwardConfig;
use crate::patcher::{CodePatcher, PatcherProvider};
use crate::registry::{ForwardBinding, ForwardRegistry, ResolvedTarget};
use crate::trampoline::{Dispatch, FaultGuard, Trampoline, TrampolineShape};

/// One routine installed by an activation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledForward {
    pub key: RegistryKey,
    pub shape: TrampolineShape,
    pub target: String,
    pub convention: ReceiverConvention,
}

/// Outcome of one activation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub group: String,
    /// Types visited, nested types included.
    pub types_scanned: usize,
    pub installed: Vec<InstalledForward>,
    /// Declarations whose binding was already active.
    pub skipped: Vec<RegistryKey>,
}

impl ActivationReport {
    fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            ..Self::default()
        }
    }

    pub fn installed_count(&self) -> usize {
        self.installed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// A forward declaration found on a type.
#[derive(Clone, Copy)]
enum Declaration<'a> {
    Method {
        stub: MethodRef,
        def: &'a MethodDef,
    },
    Property {
        owner: TypeId,
        def: &'a PropertyDef,
    },
}

pub struct PatchGroupManager {
    directory: Arc<dyn TypeDirectory>,
    registry: Arc<ForwardRegistry>,
    resolver: MethodResolver,
    config: ForwardConfig,
    provider: Option<Arc<dyn PatcherProvider>>,
    patchers: RwLock<HashMap<String, Arc<dyn CodePatcher>>>,
    activation_lock: Mutex<()>,
}

impl PatchGroupManager {
    pub fn new(
        directory: Arc<dyn TypeDirectory>,
        registry: Arc<ForwardRegistry>,
        config: ForwardConfig,
    ) -> Self {
        let resolver = MethodResolver::new(registry.variables().clone())
            .strict_naming(config.strict_naming)
            .setter_policy(config.read_only_setter);
        Self {
            directory,
            registry,
            resolver,
            config,
            provider: None,
            patchers: RwLock::new(HashMap::new()),
            activation_lock: Mutex::new(()),
        }
    }

    /// Set the factory for per-group patcher contexts. Without one every
    /// activation fails with `DependencyUnavailable`.
    pub fn with_patcher_provider(mut self, provider: Arc<dyn PatcherProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn registry(&self) -> &Arc<ForwardRegistry> {
        &self.registry
    }

    pub fn directory(&self) -> &Arc<dyn TypeDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Group ids that have a patcher context.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<_> = self.patchers.read().keys().cloned().collect();
        groups.sort();
        groups
    }

    /// The patcher context of `group`, created on first use.
    pub fn patcher_for(&self, group: &str) -> Result<Arc<dyn CodePatcher>, ForwardError> {
        if let Some(patcher) = self.patchers.read().get(group) {
            return Ok(patcher.clone());
        }
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ForwardError::DependencyUnavailable {
                dependency: "CodePatcher".to_string(),
                hint: "configure a PatcherProvider with with_patcher_provider()".to_string(),
            })?;
        let mut patchers = self.patchers.write();
        if let Some(patcher) = patchers.get(group) {
            return Ok(patcher.clone());
        }
        let patcher = provider.create(group)?;
        patchers.insert(group.to_string(), patcher.clone());
        Ok(patcher)
    }

    /// Activate every forward declared on `types` and their nested types.
    pub fn forward_types(
        &self,
        group: &str,
        types: &[TypeId],
    ) -> Result<ActivationReport, ForwardError> {
        let patcher = self.patcher_for(group)?;
        let mut report = ActivationReport::new(group);
        let mut visited = HashSet::new();
        for ty in types {
            self.activate_type(patcher.as_ref(), *ty, &mut visited, &mut report)?;
        }
        info!(
            group,
            types = report.types_scanned,
            installed = report.installed_count(),
            skipped = report.skipped_count(),
            "activation finished"
        );
        Ok(report)
    }

    /// Activate every forward declared in one module.
    pub fn forward_scope(&self, group: &str, module: &str) -> Result<ActivationReport, ForwardError> {
        let roots = self.top_level_types(module);
        debug!(group, module, types = roots.len(), "scanning scope");
        self.forward_types(group, &roots)
    }

    /// Activate every forward in every module except the core library.
    pub fn forward_all(&self, group: &str) -> Result<ActivationReport, ForwardError> {
        let roots: Vec<TypeId> = self
            .directory
            .modules()
            .iter()
            .filter(|m| m.as_str() != CORE_MODULE)
            .flat_map(|m| self.top_level_types(m))
            .collect();
        self.forward_types(group, &roots)
    }

    fn top_level_types(&self, module: &str) -> Vec<TypeId> {
        self.directory
            .list_types(module)
            .into_iter()
            .filter(|id| {
                self.directory
                    .type_def(*id)
                    .map(|def| def.declaring.is_none())
                    .unwrap_or(false)
            })
            .collect()
    }

    fn activate_type(
        &self,
        patcher: &dyn CodePatcher,
        ty: TypeId,
        visited: &mut HashSet<TypeId>,
        report: &mut ActivationReport,
    ) -> Result<(), ForwardError> {
        if !visited.insert(ty) {
            return Ok(());
        }
        let def = self.directory.type_def(ty).ok_or_else(|| {
            ForwardError::argument("types", format!("{} is not a registered type", ty))
        })?;
        if let Some(reason) = &def.load_error {
            warn!(type_name = %def.full_name, %reason, "skipping type that failed to load");
            return Ok(());
        }
        report.types_scanned += 1;
        trace!(type_name = %def.full_name, "scanning type");

        for decl in declarations(&def) {
            self.activate(patcher, &def, decl, report)?;
        }
        for nested in &def.nested {
            self.activate_type(patcher, *nested, visited, report)?;
        }
        Ok(())
    }

    fn activate(
        &self,
        patcher: &dyn CodePatcher,
        owner: &TypeDef,
        decl: Declaration<'_>,
        report: &mut ActivationReport,
    ) -> Result<(), ForwardError> {
        let (name, annotations) = match decl {
            Declaration::Method { def, .. } => (def.name.as_str(), def.annotations.as_slice()),
            Declaration::Property { def, .. } => (def.name.as_str(), def.annotations.as_slice()),
        };
        let key = RegistryKey::for_member(owner, name);
        let stubs = decl.stub_slots();

        let _guard = self.activation_lock.lock();
        if let Some(existing) = self.registry.get(&key) {
            if existing.is_activated() {
                if existing.stubs() != stubs.as_slice() {
                    return Err(ForwardError::shape(
                        &key,
                        "another stub with this key is already active (overloaded stubs share a key)",
                    ));
                }
                debug!(key = %key, group = existing.group(), "already active, skipping");
                report.skipped.push(key);
                return Ok(());
            }
        }

        let Some(selector) = annotations.forward_target() else {
            return Ok(());
        };
        let target = SymbolRef::bind(self.directory.as_ref(), selector)?;
        let receiver_source = match annotations.receiver_source() {
            Some(source) => Some(self.resolve_receiver_source(source, &target)?),
            None => None,
        };
        let debug_listing = self.config.debug || annotations.has_debug();

        let (resolved, slots) = match decl {
            Declaration::Method { stub, def } => {
                let signature = StubSignature::of(key.as_str(), def);
                let resolution = self.resolver.resolve(
                    self.directory.as_ref(),
                    &signature,
                    &target,
                    receiver_source.is_some(),
                )?;
                let (shape, resolved) = match resolution {
                    Resolution::Method { method, convention } => (
                        TrampolineShape::Method,
                        ResolvedTarget::Method { method, convention },
                    ),
                    Resolution::Getter {
                        variable,
                        convention,
                    } => (
                        TrampolineShape::Getter,
                        ResolvedTarget::Storage {
                            variable,
                            convention,
                            discard_writes: false,
                        },
                    ),
                    Resolution::Setter {
                        variable,
                        convention,
                        discard_writes,
                    } => (
                        TrampolineShape::Setter,
                        ResolvedTarget::Storage {
                            variable,
                            convention,
                            discard_writes,
                        },
                    ),
                };
                (resolved, vec![(stub, shape, def.return_type)])
            }
            Declaration::Property { owner: stub_owner, def } => {
                let stub = PropertyStub {
                    label: key.to_string(),
                    value_type: def.value_type,
                    is_static: def.is_static,
                    readable: def.getter.is_some(),
                    writable: def.setter.is_some(),
                };
                let forward = self.resolver.accessors().resolve_property(
                    self.directory.as_ref(),
                    &stub,
                    &target,
                    receiver_source.is_some(),
                )?;
                let mut slots = Vec::new();
                if let Some(index) = def.getter {
                    slots.push((
                        MethodRef::new(stub_owner, index),
                        TrampolineShape::Getter,
                        def.value_type,
                    ));
                }
                if let Some(index) = def.setter {
                    slots.push((
                        MethodRef::new(stub_owner, index),
                        TrampolineShape::Setter,
                        TypeId::VOID,
                    ));
                }
                let resolved = ResolvedTarget::Storage {
                    variable: forward.variable,
                    convention: forward.convention,
                    discard_writes: forward.discard_writes,
                };
                (resolved, slots)
            }
        };

        let binding = self.registry.insert(ForwardBinding::new(
            key.clone(),
            target,
            resolved,
            receiver_source,
            stubs,
            patcher.group(),
        ));
        let guard = self.config.fault_guard.then(FaultGuard::hook);
        let target_label = binding.resolved().describe(self.directory.as_ref());
        for (slot, shape, return_type) in slots {
            let routine = Trampoline::generate(
                shape,
                &binding,
                return_type,
                self.registry.clone(),
                self.directory.clone(),
            );
            log_listing(&key, &routine, debug_listing);
            patcher.install(slot, Arc::new(routine), guard.clone())?;
            report.installed.push(InstalledForward {
                key: key.clone(),
                shape,
                target: target_label.clone(),
                convention: binding.resolved().convention(),
            });
        }
        binding.mark_activated();
        debug!(key = %key, target = %target_label, group = patcher.group(), "forward active");
        Ok(())
    }

    /// Resolve the static storage that supplies receivers for `target`.
    fn resolve_receiver_source(
        &self,
        selector: &MemberSelector,
        target: &SymbolRef,
    ) -> Result<Arc<VariableHandle>, ForwardError> {
        let directory = self.directory.as_ref();
        let source = SymbolRef::bind(directory, selector)?;
        let handle = self
            .registry
            .variables()
            .resolve(directory, source.owner(), source.name(), true)?;
        if !handle.gettable() {
            return Err(ForwardError::missing(
                &directory.type_name(source.owner()),
                source.name(),
                "receiver source has no getter",
            ));
        }
        if !directory.in_same_hierarchy(handle.value_type(), target.owner()) {
            return Err(ForwardError::ValueTypeMismatch {
                target: target.describe(directory),
                parameter: 0,
                declared: directory.type_name(handle.value_type()),
                required: directory.type_name(target.owner()),
            });
        }
        Ok(handle)
    }
}

impl Declaration<'_> {
    fn stub_slots(&self) -> Vec<MethodRef> {
        match self {
            Declaration::Method { stub, .. } => vec![*stub],
            Declaration::Property { owner, def } => def
                .getter
                .iter()
                .chain(def.setter.iter())
                .map(|i| MethodRef::new(*owner, *i))
                .collect(),
        }
    }
}

/// Forward-annotated methods and properties of one type, in declaration
/// order.
fn declarations(def: &TypeDef) -> Vec<Declaration<'_>> {
    let mut found: Vec<Declaration<'_>> = def
        .methods
        .iter()
        .enumerate()
        .filter(|(_, m)| m.annotations.forward_target().is_some())
        .map(|(index, m)| Declaration::Method {
            stub: MethodRef::new(def.id, index),
            def: m,
        })
        .collect();
    found.extend(
        def.properties
            .iter()
            .filter(|p| p.annotations.forward_target().is_some())
            .map(|p| Declaration::Property { owner: def.id, def: p }),
    );
    found
}

fn log_listing(key: &RegistryKey, routine: &Trampoline, verbose: bool) {
    let listing = routine.listing().join("\n");
    if verbose {
        info!(key = %key, shape = %routine.shape(), "generated routine:\n{}", listing);
    } else {
        trace!(key = %key, shape = %routine.shape(), "generated routine:\n{}", listing);
    }
}
