//! Extension bounded context
//!
//! The contract between the signaling engine and pluggable decision logic:
//! what a unit may implement, how units are loaded and selected, and the
//! boundary that keeps a failing unit from taking the engine down.

mod boundary;
pub mod capability;
pub mod catalog;
pub mod registry;
pub mod unit;

pub use capability::{Capability, CapabilitySet};
pub use catalog::{UnitCatalog, UnitFactory};
pub use registry::{ExtensionRegistry, HookOutcome, LoadedUnit};
pub use unit::{ExtensionUnit, IncomingParticipant};
