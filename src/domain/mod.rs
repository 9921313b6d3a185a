//! Domain models - position readings and notifications
//!
//! - `position` - `PositionReading`, coordinate parsing and validation
//! - `notification` - user-facing notifications and failure classification

pub mod notification;
pub mod position;

pub use notification::{FailureKind, Notification, NotificationLevel, NotifyStyle};
pub use position::{
    Coordinate, DisplayTimezone, ObservedAt, PositionError, PositionFix, PositionReading,
    TimestampSource,
};
