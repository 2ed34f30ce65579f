//! Forward Core
//!
//! Activation and dispatch engine for member forwarding.
//!
//! A stub is a static placeholder method or property annotated with the
//! member it stands for. Activating a patch group resolves each stub's target,
//! builds a dispatch routine for it and installs that routine in place of the
//! stub body, so calling the stub reaches the real member.
//!
//! # Core Modules
//!
//! - [`groups`]: `PatchGroupManager`, bulk activation per group id
//! - [`registry`]: `ForwardRegistry`, bindings looked up by routines at call time
//! - [`trampoline`]: the three dispatch shapes and the fault guard
//! - [`patcher`]: `CodePatcher` seam and the in-memory `PatchTable`
//! - [`config`]: `ForwardConfig`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use forward_core::{ForwardConfig, ForwardRegistry, MemoryPatcherProvider, PatchGroupManager, PatchTable};
//! use forward_types::LocalTypeDirectory;
//!
//! let directory = Arc::new(LocalTypeDirectory::new());
//! // ... register target types and stub types ...
//! let table = Arc::new(PatchTable::new(directory.clone()));
//! let manager = PatchGroupManager::new(directory, Arc::new(ForwardRegistry::new()), ForwardConfig::default())
//!     .with_patcher_provider(Arc::new(MemoryPatcherProvider::new(table.clone())));
//! let report = manager.forward_all("app")?;
//! let result = table.call_static(stubs, "Stub", &[receiver, 5.into()])?;
//! ```

pub mod config;
pub mod groups;
pub mod patcher;
pub mod registry;
pub mod trampoline;

pub use config::ForwardConfig;
pub use groups::{ActivationReport, InstalledForward, PatchGroupManager};
pub use patcher::{CodePatcher, MemoryPatcher, MemoryPatcherProvider, PatchTable, PatcherProvider};
pub use registry::{ForwardBinding, ForwardRegistry, ResolvedTarget};
pub use trampoline::{Dispatch, FaultGuard, FaultHook, Trampoline, TrampolineShape};
