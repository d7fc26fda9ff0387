//! X11 window backend using x11rb

use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{self, Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use super::{Geometry, PlatformWindowId, WindowBackend, WindowInfo};

/// X11 window backend
pub struct X11Backend {
    conn: RustConnection,
    root: Window,
    atoms: X11Atoms,
}

/// Cached X11 atoms for efficiency
struct X11Atoms {
    net_client_list: Atom,
    net_wm_name: Atom,
    net_active_window: Atom,
    wm_class: Atom,
    wm_name: Atom,
    utf8_string: Atom,
    net_wm_state: Atom,
    net_wm_state_hidden: Atom,
}

impl X11Backend {
    /// Create a new X11 backend
    pub fn new() -> anyhow::Result<Self> {
        let (conn, screen_num) = RustConnection::connect(None)?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;

        let atoms = Self::intern_atoms(&conn)?;

        Ok(Self { conn, root, atoms })
    }

    fn intern_atoms(conn: &RustConnection) -> anyhow::Result<X11Atoms> {
        let intern = |name: &[u8]| -> anyhow::Result<Atom> {
            Ok(conn.intern_atom(false, name)?.reply()?.atom)
        };

        Ok(X11Atoms {
            net_client_list: intern(b"_NET_CLIENT_LIST")?,
            net_wm_name: intern(b"_NET_WM_NAME")?,
            net_active_window: intern(b"_NET_ACTIVE_WINDOW")?,
            wm_class: intern(b"WM_CLASS")?,
            wm_name: intern(b"WM_NAME")?,
            utf8_string: intern(b"UTF8_STRING")?,
            net_wm_state: intern(b"_NET_WM_STATE")?,
            net_wm_state_hidden: intern(b"_NET_WM_STATE_HIDDEN")?,
        })
    }

    fn get_window_property(&self, window: Window, property: Atom, type_: Atom) -> anyhow::Result<Option<Vec<u8>>> {
        let reply = self.conn.get_property(false, window, property, type_, 0, u32::MAX)?.reply()?;

        if reply.value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reply.value))
        }
    }

    fn get_window_title(&self, window: Window) -> String {
        // Try _NET_WM_NAME first (UTF-8)
        if let Ok(Some(data)) = self.get_window_property(window, self.atoms.net_wm_name, self.atoms.utf8_string) {
            if let Ok(s) = String::from_utf8(data) {
                return s;
            }
        }

        // Fall back to WM_NAME
        if let Ok(Some(data)) = self.get_window_property(window, self.atoms.wm_name, AtomEnum::STRING.into()) {
            return String::from_utf8_lossy(&data).into_owned();
        }

        String::new()
    }

    fn get_window_class(&self, window: Window) -> String {
        let Ok(Some(data)) = self.get_window_property(window, self.atoms.wm_class, AtomEnum::STRING.into()) else {
            return String::new();
        };

        // WM_CLASS is two null-separated strings: instance name and class name
        let parts: Vec<&[u8]> = data.split(|&b| b == 0).collect();
        parts
            .get(1)
            .or(parts.first())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .unwrap_or_default()
    }

    fn client_geometry(&self, window: Window) -> Result<Geometry, ReplyError> {
        let geom = self.conn.get_geometry(window)?.reply()?;

        // Client origin in root window coordinates, excluding WM decorations
        let translated = self.conn.translate_coordinates(window, self.root, 0, 0)?.reply()?;

        Ok(Geometry {
            x: translated.dst_x as i32,
            y: translated.dst_y as i32,
            width: geom.width as u32,
            height: geom.height as u32,
        })
    }

    fn get_active_window(&self) -> Option<Window> {
        let data = self
            .get_window_property(self.root, self.atoms.net_active_window, AtomEnum::WINDOW.into())
            .ok()??;
        parse_windows(&data).next().filter(|&w| w != 0)
    }

    fn is_window_visible(&self, window: Window) -> bool {
        if let Ok(Some(data)) = self.get_window_property(window, self.atoms.net_wm_state, AtomEnum::ATOM.into()) {
            if parse_windows(&data).any(|atom| atom == self.atoms.net_wm_state_hidden) {
                return false;
            }
        }

        if let Ok(attrs) = self.conn.get_window_attributes(window) {
            if let Ok(reply) = attrs.reply() {
                return reply.map_state == xproto::MapState::VIEWABLE;
            }
        }

        true
    }
}

/// Parse a 32-bit format property into window/atom IDs
fn parse_windows(data: &[u8]) -> impl Iterator<Item = u32> + '_ {
    data.chunks_exact(4).map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
}

impl WindowBackend for X11Backend {
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        let data = match self.get_window_property(self.root, self.atoms.net_client_list, AtomEnum::WINDOW.into())? {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };

        let active_window = self.get_active_window();

        let windows = parse_windows(&data)
            .map(|window_id| WindowInfo {
                id: PlatformWindowId::X11(window_id),
                title: self.get_window_title(window_id),
                class: self.get_window_class(window_id),
                geometry: self.client_geometry(window_id).unwrap_or_default(),
                focused: active_window == Some(window_id),
                visible: self.is_window_visible(window_id),
            })
            .collect();

        Ok(windows)
    }

    fn window_geometry(&self, id: &PlatformWindowId) -> anyhow::Result<Option<Geometry>> {
        let PlatformWindowId::X11(window_id) = *id;

        match self.client_geometry(window_id) {
            Ok(geometry) => Ok(Some(geometry)),
            // BadWindow / BadDrawable: the window was destroyed
            Err(ReplyError::X11Error(e)) => {
                tracing::debug!("Window {:#x} is gone: {:?}", window_id, e.error_kind);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn active_window(&self) -> anyhow::Result<Option<PlatformWindowId>> {
        Ok(self.get_active_window().map(PlatformWindowId::X11))
    }

    fn focus_window(&self, id: &PlatformWindowId) -> anyhow::Result<()> {
        let PlatformWindowId::X11(window_id) = *id;

        // Use _NET_ACTIVE_WINDOW client message
        let event = xproto::ClientMessageEvent::new(
            32,
            window_id,
            self.atoms.net_active_window,
            [1, 0, 0, 0, 0], // Source indication: 1 = application
        );

        self.conn.send_event(
            false,
            self.root,
            xproto::EventMask::SUBSTRUCTURE_REDIRECT | xproto::EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )?;

        self.conn.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::parse_windows;

    #[test]
    fn parses_32_bit_property_values() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0040_0001u32.to_ne_bytes());
        data.extend_from_slice(&0x0060_0002u32.to_ne_bytes());
        data.push(0xff); // trailing partial value is ignored

        let ids: Vec<u32> = parse_windows(&data).collect();
        assert_eq!(ids, vec![0x0040_0001, 0x0060_0002]);
    }
}
