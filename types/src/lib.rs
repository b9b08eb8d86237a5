//! Core domain types for the fcs engine client.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer: the session plumbing decodes
//! engine responses into these types, the explorer trees store them, and the
//! host renders them.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod category;
mod definitions;
mod ids;
mod listing;
mod record;
mod settings;

pub use category::{Collapsible, TreeCategory, icon_for, is_expandable};
pub use definitions::{DefinitionError, TestDefinition, TestReference, parse_definitions};
pub use ids::RootId;
pub use listing::{TreeItem, TreeResponse, child_path};
pub use record::TestResultRecord;
pub use settings::{EngineSettings, EngineSettingsError, SessionMode};
