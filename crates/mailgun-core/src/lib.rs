// # mailgun-core
//
// Core library for declaratively managing Mailgun resources.
//
// ## Architecture Overview
//
// This library reconciles desired Mailgun configuration against the live API:
// - **MailgunApi**: Trait for the region-bound Mailgun REST capability
// - **Reconcile**: Per-kind create/read/update/delete/import sequences
// - **StateStore**: Trait for persisting what was last observed
// - **Reconciler**: Engine that drives a whole manifest through the above
//
// Supporting pieces:
// - **identity**: `[region:]key` import identifier codec
// - **poll**: Bounded confirmation that a deleted entity is gone
// - **diff**: Field-by-field desired-state comparison
//
// ## Design Principles
//
// 1. **Explicit Capabilities**: One API handle per region, passed into every call
// 2. **Typed State**: Enumerated fields are enums, checked before any remote call
// 3. **Library-First**: The binary only wires configuration to the engine
// 4. **Idempotency**: Re-applying an unchanged manifest issues no mutations

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod hashcode;
pub mod identity;
pub mod model;
pub mod poll;
pub mod resources;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, PollConfig, ProviderConfig};
pub use engine::{Manifest, ReconcileEvent, ReconcileReport, Reconciler};
pub use error::{Error, Result};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{ClientSet, MailgunApi, MailgunApiFactory, StateStore};
