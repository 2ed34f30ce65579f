//! Member Forward
//!
//! Static stub methods and properties bound to hidden members of other types:
//!
//! - **Types**: runtime model, annotations and errors ([`forward_types`])
//! - **Resolution**: stub-to-target matching and storage access ([`forward_resolver`])
//! - **Activation**: registry, dispatch routines and patch groups ([`forward_core`])
//!
//! This crate holds the demo model and output formatting behind the
//! `member-forward` binary.

pub mod demo;
pub mod output;

pub use demo::{build_model, DemoSession, DemoTypes, DEFAULT_GROUP, DEMO_MODULE};
pub use forward_core;
pub use forward_resolver;
pub use forward_types;
