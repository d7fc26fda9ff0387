//! Window resolution and coordinate mapping
//!
//! A [`WindowHandle`] names the target window; its geometry is a live external
//! resource, so every conversion re-queries the backend instead of trusting
//! the rectangle captured at resolution time.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::backend::{Geometry, PlatformWindowId, WindowBackend, WindowInfo};
use crate::core::error::{Error, Result};
use crate::core::geometry::{ScreenPoint, ScreenRect, WindowPoint};

const FOCUS_SETTLE: Duration = Duration::from_millis(200);
const FOCUS_POLL: Duration = Duration::from_millis(20);

/// How a window title is matched
#[derive(Debug, Clone)]
pub enum TitlePattern {
    /// Case-insensitive substring
    Contains(String),
    Regex(Regex),
}

impl TitlePattern {
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| Error::config(format!("invalid window title regex: {}", e)))
    }

    pub fn matches(&self, title: &str) -> bool {
        match self {
            Self::Contains(needle) => title.to_lowercase().contains(&needle.to_lowercase()),
            Self::Regex(re) => re.is_match(title),
        }
    }
}

impl fmt::Display for TitlePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(needle) => write!(f, "*{}*", needle),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Reference to the target window plus its client rect at resolution time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    id: PlatformWindowId,
    title: String,
    last_known: ScreenRect,
}

impl WindowHandle {
    pub fn id(&self) -> PlatformWindowId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Geometry observed when the handle was resolved; may be stale
    pub fn last_known_rect(&self) -> ScreenRect {
        self.last_known
    }
}

/// Result of a best-effort focus request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusOutcome {
    AlreadyFocused,
    Focused,
    /// The window manager declined or ignored the request
    Denied(String),
}

impl FocusOutcome {
    pub fn has_focus(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }
}

/// Resolves the target window and translates between window-local and
/// screen-global coordinates
#[derive(Clone)]
pub struct CoordinateMapper {
    backend: Arc<dyn WindowBackend>,
}

impl CoordinateMapper {
    pub fn new(backend: Arc<dyn WindowBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn WindowBackend> {
        &self.backend
    }

    /// Visible windows known to the backend
    pub fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let windows = self
            .backend
            .list_windows()
            .map_err(|e| Error::window(format!("cannot enumerate windows: {}", e)))?;
        Ok(windows.into_iter().filter(|w| w.visible).collect())
    }

    /// Find the single visible window whose title matches `pattern`
    ///
    /// Fails when nothing matches and when more than one window matches; an
    /// ambiguous pattern is never resolved by picking one.
    pub fn resolve_window(&self, pattern: &TitlePattern) -> Result<WindowHandle> {
        let mut candidates: Vec<WindowInfo> = self
            .list_windows()?
            .into_iter()
            .filter(|w| pattern.matches(&w.title))
            .collect();

        let window = match candidates.len() {
            0 => return Err(Error::window(format!("no visible window title matches {}", pattern))),
            1 => candidates.remove(0),
            _ => {
                let titles: Vec<&str> = candidates.iter().map(|w| w.title.as_str()).collect();
                return Err(Error::window(format!(
                    "{} windows match {}: {:?}",
                    candidates.len(),
                    pattern,
                    titles
                )));
            }
        };

        let last_known = client_rect_of(&window.title, window.geometry)?;
        tracing::info!(
            title = %window.title,
            id = ?window.id,
            client = %last_known,
            "Resolved target window"
        );

        Ok(WindowHandle { id: window.id, title: window.title, last_known })
    }

    /// Current client-area rectangle in screen space
    pub fn client_rect(&self, handle: &WindowHandle) -> Result<ScreenRect> {
        let geometry = self
            .backend
            .window_geometry(&handle.id)
            .map_err(|e| Error::window(format!("cannot query '{}': {}", handle.title, e)))?
            .ok_or_else(|| Error::window(format!("window '{}' ({:?}) no longer exists", handle.title, handle.id)))?;
        client_rect_of(&handle.title, geometry)
    }

    pub fn to_screen(&self, handle: &WindowHandle, point: WindowPoint) -> Result<ScreenPoint> {
        let client = self.client_rect(handle)?;
        Ok(ScreenPoint::new(client.x() + point.x, client.y() + point.y))
    }

    /// Inverse of [`to_screen`](Self::to_screen); points outside the current
    /// client area are rejected rather than clamped
    pub fn to_window(&self, handle: &WindowHandle, point: ScreenPoint) -> Result<WindowPoint> {
        let client = self.client_rect(handle)?;
        if !client.contains(point) {
            return Err(Error::PointOutsideWindow { point, client });
        }
        Ok(WindowPoint::new(point.x - client.x(), point.y - client.y()))
    }

    pub fn is_foreground(&self, handle: &WindowHandle) -> Result<bool> {
        let active = self
            .backend
            .active_window()
            .map_err(|e| Error::window(format!("cannot query active window: {}", e)))?;
        Ok(active == Some(handle.id))
    }

    /// Ask for the window to be focused and report whether it was
    ///
    /// Only an invalid handle is an error; a refusal from the window manager
    /// comes back as [`FocusOutcome::Denied`].
    pub fn bring_to_foreground(&self, handle: &WindowHandle) -> Result<FocusOutcome> {
        // Fails with WindowNotFound for a stale handle
        self.client_rect(handle)?;

        if self.is_foreground(handle).unwrap_or(false) {
            return Ok(FocusOutcome::AlreadyFocused);
        }

        if let Err(e) = self.backend.focus_window(&handle.id) {
            tracing::warn!(title = %handle.title, "Focus request failed: {}", e);
            return Ok(FocusOutcome::Denied(e.to_string()));
        }

        let deadline = Instant::now() + FOCUS_SETTLE;
        loop {
            if self.is_foreground(handle).unwrap_or(false) {
                tracing::debug!(title = %handle.title, "Window focused");
                return Ok(FocusOutcome::Focused);
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(FOCUS_POLL);
        }

        tracing::warn!(title = %handle.title, "Window manager did not focus the window");
        Ok(FocusOutcome::Denied(format!("'{}' did not become active within {:?}", handle.title, FOCUS_SETTLE)))
    }
}

fn client_rect_of(title: &str, geometry: Geometry) -> Result<ScreenRect> {
    ScreenRect::new(geometry.x, geometry.y, geometry.width, geometry.height)
        .ok_or_else(|| Error::window(format!("window '{}' has an empty client area (minimized?)", title)))
}
