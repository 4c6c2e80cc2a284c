//! The tool executor (C9): fixed tool catalog, parameter validation, and
//! the dangerous-command denylist.

pub mod denylist;
pub mod executor;
pub mod schema;

pub use executor::{CapabilitySummary, RoutedBackend, RoutedExecResult, ToolExecutor};
