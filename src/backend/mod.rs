//! Window backend abstraction
//!
//! This module provides a platform-agnostic interface for window enumeration,
//! geometry queries and focus requests, with implementations for X11 and
//! KWin on Wayland.

mod kwin;
mod x11;

use std::sync::Arc;

pub use x11::X11Backend;

/// Unique identifier for a window across platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformWindowId {
    /// X11 window ID (also covers XWayland clients)
    X11(u32),
}

/// Client-area geometry in root window coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Information about a window from the backend
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub id: PlatformWindowId,
    pub title: String,
    pub class: String,
    pub geometry: Geometry,
    pub focused: bool,
    pub visible: bool,
}

/// Trait for window backend implementations
pub trait WindowBackend: Send + Sync {
    /// List all top-level client windows
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>>;

    /// Current client-area geometry, or `None` if the window no longer exists
    fn window_geometry(&self, id: &PlatformWindowId) -> anyhow::Result<Option<Geometry>>;

    /// Window currently holding input focus
    fn active_window(&self) -> anyhow::Result<Option<PlatformWindowId>>;

    /// Ask the window manager to activate a window
    fn focus_window(&self, id: &PlatformWindowId) -> anyhow::Result<()>;
}

/// Create the appropriate backend for the current environment
pub fn create_backend() -> anyhow::Result<Arc<dyn WindowBackend>> {
    let display_env = std::env::var("DISPLAY").ok();

    let Some(disp) = display_env else {
        anyhow::bail!("No display server detected. Set DISPLAY for X11 or XWayland.")
    };

    let x11: Arc<dyn WindowBackend> = Arc::new(X11Backend::new()?);

    // On KDE Wayland, _NET_ACTIVE_WINDOW only requests attention; KWin's
    // scripting API actually raises the window
    if is_kde_wayland() {
        match kwin::KWinBackend::new(x11.clone()) {
            Ok(backend) => {
                tracing::info!("Using KWin backend over XWayland (DISPLAY={})", disp);
                return Ok(Arc::new(backend));
            }
            Err(e) => {
                tracing::warn!("KWin D-Bus unavailable, using plain X11 backend: {}", e);
            }
        }
    }

    tracing::info!("Using X11 backend (DISPLAY={})", disp);
    Ok(x11)
}

fn is_kde_wayland() -> bool {
    let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
    let kde = std::env::var("XDG_CURRENT_DESKTOP")
        .map(|d| d.to_uppercase().contains("KDE"))
        .unwrap_or(false);
    wayland && kde
}
