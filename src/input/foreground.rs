//! Input that goes through the global pointer and keyboard
//!
//! The target window is focused before each action. When the window manager
//! refuses, the action still goes out and lands wherever focus is.

use std::thread;

use super::{Button, DOUBLE_CLICK_GAP, InputController, ReleaseGuard, press_key};
use crate::core::error::{Error, Result};
use crate::core::geometry::{ScreenPoint, WindowPoint};
use crate::window::{CoordinateMapper, FocusOutcome, WindowHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Down,
    Up,
    Click,
}

/// Screen-wide input device
pub trait ScreenDevice: Send + Sync {
    fn move_absolute(&self, point: ScreenPoint) -> Result<()>;

    fn move_relative(&self, dx: i32, dy: i32) -> Result<()>;

    fn button(&self, button: Button, press: Press) -> Result<()>;

    /// `code` is a Linux input event code
    fn key(&self, code: u16, down: bool) -> Result<()>;
}

pub struct ForegroundInput {
    mapper: CoordinateMapper,
    handle: WindowHandle,
    device: Box<dyn ScreenDevice>,
}

impl ForegroundInput {
    pub fn new(mapper: CoordinateMapper, handle: WindowHandle, device: Box<dyn ScreenDevice>) -> Self {
        Self { mapper, handle, device }
    }

    /// Make the target window active and report what happened
    ///
    /// A stale handle is an error; a refused focus request is not.
    pub fn ensure_focus(&self) -> Result<FocusOutcome> {
        self.mapper.bring_to_foreground(&self.handle)
    }

    fn focus_for(&self, action: &str) -> Result<()> {
        match self.ensure_focus() {
            Ok(FocusOutcome::Denied(reason)) => {
                tracing::warn!(window = self.handle.title(), action, "Dispatching without focus: {}", reason);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(Error::dispatch(action, e)),
        }
    }
}

impl InputController for ForegroundInput {
    fn move_to(&self, point: WindowPoint, relative: bool) -> Result<()> {
        self.focus_for("move")?;
        if relative {
            tracing::debug!(dx = point.x, dy = point.y, "Relative move");
            return self.device.move_relative(point.x, point.y);
        }
        let target = self.mapper.to_screen(&self.handle, point).map_err(|e| Error::dispatch("move", e))?;
        tracing::debug!(local = %point, screen = %target, "Absolute move");
        self.device.move_absolute(target)
    }

    fn click(&self, button: Button) -> Result<()> {
        self.focus_for("click")?;
        self.device.button(button, Press::Click)
    }

    fn double_click(&self, button: Button) -> Result<()> {
        self.focus_for("double click")?;
        self.device.button(button, Press::Click)?;
        thread::sleep(DOUBLE_CLICK_GAP);
        self.device.button(button, Press::Click)
    }

    fn mouse_down(&self, button: Button) -> Result<()> {
        self.focus_for("mouse down")?;
        self.device.button(button, Press::Down)
    }

    fn mouse_up(&self, button: Button) -> Result<()> {
        self.focus_for("mouse up")?;
        self.device.button(button, Press::Up)
    }

    fn drag_to(&self, point: WindowPoint, button: Button) -> Result<()> {
        self.focus_for("drag")?;
        let target = self.mapper.to_screen(&self.handle, point).map_err(|e| Error::dispatch("drag", e))?;
        self.device.button(button, Press::Down)?;
        let guard = ReleaseGuard::new(|| self.device.button(button, Press::Up));
        self.device.move_absolute(target)?;
        guard.release()
    }

    fn key_down(&self, key: &str) -> Result<()> {
        let code = super::keymap::key_code(key)?;
        self.focus_for("key down")?;
        self.device.key(code, true)
    }

    fn key_up(&self, key: &str) -> Result<()> {
        let code = super::keymap::key_code(key)?;
        self.focus_for("key up")?;
        self.device.key(code, false)
    }

    fn key_press(&self, key: &str, duration: Option<std::time::Duration>) -> Result<()> {
        self.focus_for("key press")?;
        press_key(key, duration, |code, down| self.device.key(code, down))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DeviceCall, FakeBackend, RecordingDevice};
    use crate::window::TitlePattern;
    use std::sync::Arc;

    fn setup() -> (Arc<FakeBackend>, ForegroundInput, RecordingDevice) {
        let backend = FakeBackend::new();
        backend.add_window(7, "Game", (200, 100, 640, 480));
        let mapper = CoordinateMapper::new(backend.clone());
        let handle = mapper.resolve_window(&TitlePattern::contains("game")).unwrap();
        let device = RecordingDevice::new();
        let input = ForegroundInput::new(mapper, handle, Box::new(device.clone()));
        (backend, input, device)
    }

    #[test]
    fn click_at_focuses_then_moves_in_screen_space() {
        let (backend, input, device) = setup();

        input.click_at(WindowPoint::new(10, 20), Button::Left).unwrap();

        assert!(backend.focus_requests() >= 1);
        assert_eq!(
            device.calls(),
            vec![DeviceCall::MoveAbsolute(ScreenPoint::new(210, 120)), DeviceCall::Button(Button::Left, Press::Click)]
        );
    }

    #[test]
    fn follows_window_moves_between_actions() {
        let (backend, input, device) = setup();

        backend.move_window(7, 500, 300);
        input.move_to(WindowPoint::new(1, 2), false).unwrap();

        assert_eq!(device.calls(), vec![DeviceCall::MoveAbsolute(ScreenPoint::new(501, 302))]);
    }

    #[test]
    fn denied_focus_still_dispatches() {
        let (backend, input, device) = setup();
        backend.deny_focus(true);

        input.click(Button::Right).unwrap();

        assert_eq!(device.calls(), vec![DeviceCall::Button(Button::Right, Press::Click)]);
    }

    #[test]
    fn closed_window_is_dispatch_error() {
        let (backend, input, device) = setup();
        backend.destroy(7);

        let err = input.click(Button::Left).unwrap_err();

        assert!(matches!(err, Error::InputDispatch { .. }));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn ensure_focus_reports_outcome() {
        let (backend, input, _device) = setup();

        assert_eq!(input.ensure_focus().unwrap(), FocusOutcome::Focused);
        assert_eq!(input.ensure_focus().unwrap(), FocusOutcome::AlreadyFocused);
        backend.set_active(None);
        backend.deny_focus(true);
        assert!(matches!(input.ensure_focus().unwrap(), FocusOutcome::Denied(_)));
    }

    #[test]
    fn drag_releases_at_target() {
        let (_backend, input, device) = setup();

        input.drag_to(WindowPoint::new(40, 40), Button::Left).unwrap();

        assert_eq!(
            device.calls(),
            vec![
                DeviceCall::Button(Button::Left, Press::Down),
                DeviceCall::MoveAbsolute(ScreenPoint::new(240, 140)),
                DeviceCall::Button(Button::Left, Press::Up),
            ]
        );
    }

    #[test]
    fn key_press_sends_down_then_up() {
        let (_backend, input, device) = setup();

        input.key_press("esc", None).unwrap();

        assert_eq!(device.calls(), vec![DeviceCall::Key(1, true), DeviceCall::Key(1, false)]);
    }
}
