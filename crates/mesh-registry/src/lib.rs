//! The device registry (C1) and routing/selection engine (C2).

pub mod channel;
pub mod registry;
pub mod selection;

pub use channel::PendingRequests;
pub use registry::Registry;
pub use selection::select;
