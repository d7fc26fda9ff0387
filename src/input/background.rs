//! Input delivered straight to the target window
//!
//! Synthetic X events are sent to the window with `SendEvent`, so neither the
//! real pointer nor keyboard focus moves. Clients may ignore events that carry
//! the synthetic flag; many toolkits accept them.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, ConnectionExt, EventMask, KeyButMask, Window};
use x11rb::rust_connection::RustConnection;
use x11rb::CURRENT_TIME;

use super::{Button, DOUBLE_CLICK_GAP, InputController, ReleaseGuard, keymap, press_key};
use crate::backend::PlatformWindowId;
use crate::core::error::{Error, Result};
use crate::core::geometry::{ScreenPoint, WindowPoint};
use crate::window::{CoordinateMapper, WindowHandle};

/// X keycodes are Linux input codes offset by 8
const X_KEYCODE_OFFSET: u16 = 8;

#[derive(Debug, Clone, Copy)]
struct Target {
    root: Window,
    window: Window,
}

/// Event coordinates in both spaces, narrowed to the protocol's `i16`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EventPosition {
    root_x: i16,
    root_y: i16,
    event_x: i16,
    event_y: i16,
}

impl EventPosition {
    fn new(action: &str, local: WindowPoint, screen: ScreenPoint) -> Result<Self> {
        let narrow = |v: i32| {
            i16::try_from(v).map_err(|_| {
                Error::dispatch(action, format!("{} (screen {}) exceeds the X coordinate range", local, screen))
            })
        };
        Ok(Self { root_x: narrow(screen.x)?, root_y: narrow(screen.y)?, event_x: narrow(local.x)?, event_y: narrow(local.y)? })
    }
}

#[derive(Debug, Clone, Copy)]
struct PointerState {
    position: WindowPoint,
    /// Held buttons as an X `KeyButMask`
    buttons: u16,
}

pub struct BackgroundInput {
    conn: RustConnection,
    target: Target,
    mapper: CoordinateMapper,
    handle: WindowHandle,
    pointer: Mutex<PointerState>,
}

impl BackgroundInput {
    pub fn connect(mapper: CoordinateMapper, handle: WindowHandle) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(None).map_err(|e| Error::dispatch("connect", e))?;
        let root = conn.setup().roots[screen_num].root;
        let PlatformWindowId::X11(window) = handle.id();

        tracing::debug!(window = format!("{:#x}", window), "Background input ready");

        Ok(Self {
            conn,
            target: Target { root, window },
            mapper,
            handle,
            pointer: Mutex::new(PointerState { position: WindowPoint::new(0, 0), buttons: 0 }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PointerState> {
        self.pointer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send(&self, action: &str, mask: EventMask, event: [u8; 32]) -> Result<()> {
        self.conn
            .send_event(false, self.target.window, mask, event)
            .map_err(|e| Error::dispatch(action, e))?
            .check()
            .map_err(|e| Error::dispatch(action, format!("window '{}': {}", self.handle.title(), e)))
    }

    fn event_position(&self, action: &str, local: WindowPoint) -> Result<EventPosition> {
        let screen = self.mapper.to_screen(&self.handle, local).map_err(|e| Error::dispatch(action, e))?;
        EventPosition::new(action, local, screen)
    }

    fn button_transition(&self, action: &str, button: Button, down: bool) -> Result<()> {
        let mut state = self.state();
        let position = self.event_position(action, state.position)?;
        // The event carries the state from before the transition
        let event = button_event(self.target, down, button_number(button), position, state.buttons);
        let mask = if down { EventMask::BUTTON_PRESS } else { EventMask::BUTTON_RELEASE };
        self.send(action, mask, event.into())?;

        if down {
            state.buttons |= button_mask(button);
        } else {
            state.buttons &= !button_mask(button);
        }
        Ok(())
    }

    fn send_key(&self, action: &str, code: u16, down: bool) -> Result<()> {
        let keycode = u8::try_from(code + X_KEYCODE_OFFSET)
            .map_err(|_| Error::dispatch(action, format!("key code {} has no X keycode", code)))?;
        let state = *self.state();
        let position = self.event_position(action, state.position)?;
        let event = key_event(self.target, down, keycode, position, state.buttons);
        let mask = if down { EventMask::KEY_PRESS } else { EventMask::KEY_RELEASE };
        self.send(action, mask, event.into())
    }
}

impl InputController for BackgroundInput {
    fn move_to(&self, point: WindowPoint, relative: bool) -> Result<()> {
        let mut state = self.state();
        let position = if relative { state.position.offset(point.x, point.y) } else { point };
        let coords = self.event_position("move", position)?;

        let event = motion_event(self.target, coords, state.buttons);
        self.send("move", EventMask::POINTER_MOTION | EventMask::BUTTON_MOTION, event.into())?;
        state.position = position;
        tracing::debug!(local = %position, root_x = coords.root_x, root_y = coords.root_y, "Synthetic motion");
        Ok(())
    }

    fn click(&self, button: Button) -> Result<()> {
        self.button_transition("click", button, true)?;
        self.button_transition("click", button, false)
    }

    fn double_click(&self, button: Button) -> Result<()> {
        self.click(button)?;
        thread::sleep(DOUBLE_CLICK_GAP);
        self.click(button)
    }

    fn mouse_down(&self, button: Button) -> Result<()> {
        self.button_transition("mouse down", button, true)
    }

    fn mouse_up(&self, button: Button) -> Result<()> {
        self.button_transition("mouse up", button, false)
    }

    fn drag_to(&self, point: WindowPoint, button: Button) -> Result<()> {
        self.button_transition("drag", button, true)?;
        let guard = ReleaseGuard::new(|| self.button_transition("drag", button, false));
        self.move_to(point, false)?;
        guard.release()
    }

    fn key_down(&self, key: &str) -> Result<()> {
        self.send_key("key down", keymap::key_code(key)?, true)
    }

    fn key_up(&self, key: &str) -> Result<()> {
        self.send_key("key up", keymap::key_code(key)?, false)
    }

    fn key_press(&self, key: &str, duration: Option<Duration>) -> Result<()> {
        press_key(key, duration, |code, down| self.send_key("key press", code, down))
    }
}

fn button_number(button: Button) -> u8 {
    match button {
        Button::Left => 1,
        Button::Middle => 2,
        Button::Right => 3,
    }
}

fn button_mask(button: Button) -> u16 {
    let mask = match button {
        Button::Left => KeyButMask::BUTTON1,
        Button::Middle => KeyButMask::BUTTON2,
        Button::Right => KeyButMask::BUTTON3,
    };
    u16::from(mask)
}

fn button_event(
    target: Target,
    down: bool,
    detail: u8,
    position: EventPosition,
    buttons: u16,
) -> xproto::ButtonPressEvent {
    xproto::ButtonPressEvent {
        response_type: if down { xproto::BUTTON_PRESS_EVENT } else { xproto::BUTTON_RELEASE_EVENT },
        detail,
        sequence: 0,
        time: CURRENT_TIME,
        root: target.root,
        event: target.window,
        child: x11rb::NONE,
        root_x: position.root_x,
        root_y: position.root_y,
        event_x: position.event_x,
        event_y: position.event_y,
        state: KeyButMask::from(buttons),
        same_screen: true,
    }
}

fn key_event(
    target: Target,
    down: bool,
    keycode: u8,
    position: EventPosition,
    buttons: u16,
) -> xproto::KeyPressEvent {
    xproto::KeyPressEvent {
        response_type: if down { xproto::KEY_PRESS_EVENT } else { xproto::KEY_RELEASE_EVENT },
        detail: keycode,
        sequence: 0,
        time: CURRENT_TIME,
        root: target.root,
        event: target.window,
        child: x11rb::NONE,
        root_x: position.root_x,
        root_y: position.root_y,
        event_x: position.event_x,
        event_y: position.event_y,
        state: KeyButMask::from(buttons),
        same_screen: true,
    }
}

fn motion_event(target: Target, position: EventPosition, buttons: u16) -> xproto::MotionNotifyEvent {
    xproto::MotionNotifyEvent {
        response_type: xproto::MOTION_NOTIFY_EVENT,
        detail: xproto::Motion::NORMAL,
        sequence: 0,
        time: CURRENT_TIME,
        root: target.root,
        event: target.window,
        child: x11rb::NONE,
        root_x: position.root_x,
        root_y: position.root_y,
        event_x: position.event_x,
        event_y: position.event_y,
        state: KeyButMask::from(buttons),
        same_screen: true,
    }
}
