//! Forward binding registry.
//!
//! One registry is built per process (or per test) and shared through an
//! `Arc` by the patch group manager and every dispatch routine. Routines carry
//! only their [`RegistryKey`] and look their binding up here on each call.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use forward_resolver::{ReceiverConvention, VariableHandle, VariableResolver};
use forward_types::directory::TypeDirectory;
use forward_types::key::RegistryKey;
use forward_types::model::MethodRef;
use forward_types::symbol::SymbolRef;
use parking_lot::RwLock;
use tracing::debug;

/// The real member behind a binding.
#[derive(Debug, Clone)]
pub enum ResolvedTarget {
    Method {
        method: MethodRef,
        convention: ReceiverConvention,
    },
    Storage {
        variable: Arc<VariableHandle>,
        convention: ReceiverConvention,
        /// Setter writes are dropped (read-only storage under the lenient policy).
        discard_writes: bool,
    },
}

impl ResolvedTarget {
    pub fn convention(&self) -> ReceiverConvention {
        match self {
            ResolvedTarget::Method { convention, .. }
            | ResolvedTarget::Storage { convention, .. } => *convention,
        }
    }

    /// `Type.Member` of the target.
    pub fn describe(&self, directory: &dyn TypeDirectory) -> String {
        match self {
            ResolvedTarget::Method { method, .. } => directory.method_label(*method),
            ResolvedTarget::Storage { variable, .. } => variable.label().to_string(),
        }
    }
}

/// Resolved metadata linking one stub declaration to its target.
#[derive(Debug)]
pub struct ForwardBinding {
    key: RegistryKey,
    target: SymbolRef,
    resolved: ResolvedTarget,
    receiver_source: Option<Arc<VariableHandle>>,
    /// Stub method slots routed through this binding (two for a property
    /// with both accessors).
    stubs: Vec<MethodRef>,
    group: String,
    activated: AtomicBool,
}

impl ForwardBinding {
    pub fn new(
        key: RegistryKey,
        target: SymbolRef,
        resolved: ResolvedTarget,
        receiver_source: Option<Arc<VariableHandle>>,
        stubs: Vec<MethodRef>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            key,
            target,
            resolved,
            receiver_source,
            stubs,
            group: group.into(),
            activated: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    pub fn target(&self) -> &SymbolRef {
        &self.target
    }

    pub fn resolved(&self) -> &ResolvedTarget {
        &self.resolved
    }

    pub fn receiver_source(&self) -> Option<&Arc<VariableHandle>> {
        self.receiver_source.as_ref()
    }

    pub fn stubs(&self) -> &[MethodRef] {
        &self.stubs
    }

    /// Group the binding was activated under.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// Flip the activated flag. Returns `false` if it was already set.
    pub fn mark_activated(&self) -> bool {
        self.activated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Process-wide cache of bindings and resolved storage.
#[derive(Debug, Default)]
pub struct ForwardRegistry {
    variables: Arc<VariableResolver>,
    bindings: RwLock<HashMap<RegistryKey, Arc<ForwardBinding>>>,
}

impl ForwardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage handles shared by every resolver built on this registry.
    pub fn variables(&self) -> &Arc<VariableResolver> {
        &self.variables
    }

    pub fn get(&self, key: &RegistryKey) -> Option<Arc<ForwardBinding>> {
        self.bindings.read().get(key).cloned()
    }

    pub fn is_activated(&self, key: &RegistryKey) -> bool {
        self.get(key).map(|b| b.is_activated()).unwrap_or(false)
    }

    /// Record a binding and return the one stored under its key.
    ///
    /// An activated binding is never replaced. One left inactive by a failed
    /// activation is replaced by the fresh resolution.
    pub fn insert(&self, binding: ForwardBinding) -> Arc<ForwardBinding> {
        let mut bindings = self.bindings.write();
        match bindings.entry(binding.key.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_activated() {
                    debug!(key = %binding.key, group = %binding.group, "replaced inactive binding");
                    entry.insert(Arc::new(binding));
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                debug!(key = %binding.key, group = %binding.group, "recorded binding");
                entry.insert(Arc::new(binding)).clone()
            }
        }
    }

    /// All bindings ordered by key.
    pub fn bindings(&self) -> Vec<Arc<ForwardBinding>> {
        let mut all: Vec<_> = self.bindings.read().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Drop every binding and resolved storage handle.
    ///
    /// Routines already installed keep their keys and fail with
    /// `MissingBinding` until their stubs are activated again.
    pub fn clear(&self) {
        self.bindings.write().clear();
        self.variables.clear();
        debug!("forward registry cleared");
    }
}
