//! IO modules - external system interfaces
//!
//! - `position_source` - HTTP client for the position endpoint
//! - `connectivity` - TCP reachability probe emitting online/offline transitions
//! - `prometheus` - Prometheus metrics HTTP endpoint and manual refresh trigger

pub mod connectivity;
pub mod position_source;
pub mod prometheus;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use position_source::{FetchError, HttpPositionSource, PositionSource};
pub use prometheus::{start_metrics_server, MetricsEndpoint};
