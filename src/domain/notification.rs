//! User-facing notifications and failure classification

use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        }
    }
}

/// A transient message for the user; never retained as state between cycles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Error, message: message.into() }
    }

    /// Notification for a failed refresh of `subject` (e.g. "ISS")
    pub fn for_failure(kind: FailureKind, subject: &str) -> Self {
        Self::error(kind.user_message(subject))
    }

    pub fn connection_lost() -> Self {
        Self::warning("Connection lost. Location updates are paused until it returns.")
    }

    pub fn connection_restored(subject: &str) -> Self {
        Self::info(format!("Connection restored. Refreshing {} location.", subject))
    }
}

/// Failure categories of a refresh; only used to pick display text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ServerError(u16),
    NoResponse,
    MalformedResponse,
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ServerError(_) => "server_error",
            FailureKind::NoResponse => "no_response",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Other => "other",
        }
    }

    pub fn user_message(&self, subject: &str) -> String {
        match self {
            FailureKind::Timeout => {
                format!("Request timed out while fetching {} location. Please try again.", subject)
            }
            FailureKind::ServerError(status) => {
                format!("Server error {} while fetching {} location.", status, subject)
            }
            FailureKind::NoResponse => format!(
                "No response from the {} location service. Check your connection.",
                subject
            ),
            FailureKind::MalformedResponse => {
                format!("Received invalid {} location data.", subject)
            }
            FailureKind::Other => format!("Failed to fetch {} location.", subject),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ServerError(status) => write!(f, "server_error({})", status),
            other => f.write_str(other.as_str()),
        }
    }
}

/// How notifications reach the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyStyle {
    /// Diagnostics log only
    Log,
    /// Log plus a non-blocking, auto-dismissed toast in the view
    Toast,
}
