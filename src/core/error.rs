//! Error taxonomy shared by every component

use std::time::Duration;

use super::geometry::{ScreenPoint, ScreenRect};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Window resolution or geometry failure, including ambiguous titles and
    /// handles whose window has since closed
    #[error("window not found: {reason}")]
    WindowNotFound { reason: String },

    #[error("point {point} lies outside the window client area {client}")]
    PointOutsideWindow { point: ScreenPoint, client: ScreenRect },

    #[error("capture failed: {reason}")]
    Capture { reason: String },

    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("template '{template}' cannot be matched: {reason}")]
    MatchInput { template: String, reason: String },

    #[error("timed out waiting for template '{template}' after {attempts} attempts ({elapsed:?})")]
    MatchTimeout { template: String, attempts: u32, elapsed: Duration },

    #[error("wait for template '{template}' cancelled after {attempts} attempts ({elapsed:?})")]
    Cancelled { template: String, attempts: u32, elapsed: Duration },

    #[error("input dispatch failed ({action}): {reason}")]
    InputDispatch { action: String, reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl Error {
    pub(crate) fn window(reason: impl Into<String>) -> Self {
        Self::WindowNotFound { reason: reason.into() }
    }

    pub(crate) fn capture(reason: impl std::fmt::Display) -> Self {
        Self::Capture { reason: reason.to_string() }
    }

    pub(crate) fn match_input(template: &str, reason: impl Into<String>) -> Self {
        Self::MatchInput { template: template.to_string(), reason: reason.into() }
    }

    pub(crate) fn dispatch(action: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InputDispatch { action: action.into(), reason: reason.to_string() }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config { reason: reason.into() }
    }

    /// Expected outcome of a bounded wait rather than a misconfiguration
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::MatchTimeout { .. })
    }

    /// The window went away and the handle should be re-acquired
    pub fn is_window_lost(&self) -> bool {
        matches!(self, Self::WindowNotFound { .. })
    }
}
