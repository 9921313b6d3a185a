//! Services - refresh logic and trigger scheduling
//!
//! - `refresh` - One fetch/validate/render cycle with failure handling
//! - `tracker` - Startup, timer, manual and connectivity triggers
//! - `debounce` - Trailing-edge debounce for manual triggers
//! - `view` - Rendering seam: dashboard state and log view

pub mod debounce;
pub mod refresh;
#[cfg(test)]
pub(crate) mod test_support;
pub mod tracker;
pub mod view;

pub use refresh::{CycleOutcome, RefreshCycle, RenderSettings, Trigger};
pub use tracker::{Tracker, TriggerHandle};
pub use view::{DashboardState, LogView, PositionUpdate, PositionView, SharedDashboard};
