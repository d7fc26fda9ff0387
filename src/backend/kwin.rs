//! KWin backend for KDE Plasma on Wayland
//!
//! This backend wraps the X11 backend for window enumeration and geometry (via
//! XWayland) but uses KWin's D-Bus scripting API for window focus, which
//! properly raises windows on Wayland instead of just requesting attention.

use std::sync::Arc;
use std::time::Duration;

use zbus::blocking::Connection;
use zbus::zvariant::ObjectPath;

use super::{Geometry, PlatformWindowId, WindowBackend, WindowInfo};

/// KWin backend that uses D-Bus for focus operations
pub struct KWinBackend {
    /// Wrapped X11 backend for listing/geometry operations
    x11_backend: Arc<dyn WindowBackend>,
    /// D-Bus session connection
    dbus: Connection,
}

impl KWinBackend {
    pub fn new(x11_backend: Arc<dyn WindowBackend>) -> anyhow::Result<Self> {
        let dbus = Connection::session()?;
        Ok(Self { x11_backend, dbus })
    }

    /// Focus a window using KWin's scripting API
    fn focus_via_kwin(&self, window_title: &str) -> anyhow::Result<()> {
        // workspace.windowList() is KDE 6, workspace.clientList() is KDE 5
        let script = format!(
            r#"
            (function() {{
                var windows = typeof workspace.windowList === 'function'
                    ? workspace.windowList()
                    : workspace.clientList();
                for (var i = 0; i < windows.length; i++) {{
                    var w = windows[i];
                    var title = w.caption || w.title || '';
                    if (title === '{}') {{
                        workspace.activeWindow = w;
                        workspace.activeClient = w;
                        break;
                    }}
                }}
            }})();
            "#,
            escape_js(window_title)
        );

        // KWin only loads scripts from a file path
        let script_path = std::env::temp_dir().join(format!("spotter_focus_{}.js", std::process::id()));
        std::fs::write(&script_path, &script)?;

        let result = self.run_script(&script_path.to_string_lossy());
        let _ = std::fs::remove_file(&script_path);
        result
    }

    fn run_script(&self, script_path: &str) -> anyhow::Result<()> {
        let reply = self.dbus.call_method(
            Some("org.kde.KWin"),
            "/Scripting",
            Some("org.kde.kwin.Scripting"),
            "loadScript",
            &(script_path,),
        )?;

        let script_id: i32 = reply.body().deserialize()?;
        if script_id < 0 {
            anyhow::bail!("KWin refused to load focus script");
        }

        let script_obj_path = format!("/{}", script_id);
        let script_obj_path = ObjectPath::try_from(script_obj_path.as_str())?;

        self.dbus.call_method(
            Some("org.kde.KWin"),
            script_obj_path.clone(),
            Some("org.kde.kwin.Script"),
            "run",
            &(),
        )?;

        std::thread::sleep(Duration::from_millis(50));

        // Unload the script (ignore errors)
        let _ = self.dbus.call_method(
            Some("org.kde.KWin"),
            script_obj_path.clone(),
            Some("org.kde.kwin.Script"),
            "stop",
            &(),
        );

        Ok(())
    }
}

fn escape_js(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'").replace('"', "\\\"")
}

impl WindowBackend for KWinBackend {
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        self.x11_backend.list_windows()
    }

    fn window_geometry(&self, id: &PlatformWindowId) -> anyhow::Result<Option<Geometry>> {
        self.x11_backend.window_geometry(id)
    }

    fn active_window(&self) -> anyhow::Result<Option<PlatformWindowId>> {
        self.x11_backend.active_window()
    }

    fn focus_window(&self, id: &PlatformWindowId) -> anyhow::Result<()> {
        // KWin addresses windows by caption, so look the title up first
        let windows = self.x11_backend.list_windows()?;
        let window = windows
            .iter()
            .find(|w| &w.id == id)
            .ok_or_else(|| anyhow::anyhow!("Window not found"))?;

        match self.focus_via_kwin(&window.title) {
            Ok(()) => {
                tracing::debug!("Focused window via KWin D-Bus: {}", window.title);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("KWin D-Bus focus failed, falling back to X11: {}", e);
                self.x11_backend.focus_window(id)
            }
        }
    }
}
