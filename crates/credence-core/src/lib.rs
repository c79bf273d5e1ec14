//! Core primitives for the Credence registry.
//!
//! This crate exposes the building blocks that the rest of the Credence
//! stack relies upon:
//!
//! * [`token`] — the fungible balance ledger used as the fee currency.
//! * [`directory`] — freezable contract-name → implementation maps.
//! * [`unit`] — named, versioned release units with parent inheritance.
//! * [`stakes`] — the vouching ledger with proportional developer fees.
//! * [`registry`] — the orchestrator coupling registration to vouching.
//! * [`proxy`] — late-bound dispatch handles resolved through the registry.
//! * [`event`] — the typed notification stream appended by every mutation.
//!
//! The modules are intentionally small and focused so that higher level
//! crates (CLI, indexers, …) can be combined without bespoke plumbing in
//! each consumer.

pub mod directory;
pub mod event;
pub mod proxy;
pub mod registry;
pub mod stakes;
pub mod token;
pub mod unit;

mod error;

pub use error::RegistryError;
