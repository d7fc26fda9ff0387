//! Synthetic pointer and keyboard input
//!
//! [`InputController`] is the one contract callers program against. Points are
//! window-local; each implementation translates them through the
//! [`CoordinateMapper`] at dispatch time, so a window that moved between
//! detection and action still receives input in the right place.

mod background;
mod foreground;
pub mod keymap;
mod ydotool;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use background::BackgroundInput;
pub use foreground::{ForegroundInput, Press, ScreenDevice};
pub use ydotool::Ydotool;

pub use crate::core::config::InputMode;
use crate::core::error::{Error, Result};
use crate::core::geometry::WindowPoint;
use crate::window::{CoordinateMapper, WindowHandle};

/// Pause between the two clicks of a double click
pub(crate) const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Button {
    #[default]
    Left,
    Right,
    Middle,
}

impl FromStr for Button {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => Err(Error::dispatch("parse button", format!("unsupported mouse button '{}'", other))),
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        })
    }
}

/// Pointer and keyboard actuation against the target window
pub trait InputController {
    /// Move to a window-local point, or by `(point.x, point.y)` pixels when
    /// `relative` is set
    fn move_to(&self, point: WindowPoint, relative: bool) -> Result<()>;

    fn click(&self, button: Button) -> Result<()>;

    fn double_click(&self, button: Button) -> Result<()>;

    fn mouse_down(&self, button: Button) -> Result<()>;

    fn mouse_up(&self, button: Button) -> Result<()>;

    /// Press `button` at the current position, move to `point`, release
    fn drag_to(&self, point: WindowPoint, button: Button) -> Result<()>;

    fn key_down(&self, key: &str) -> Result<()>;

    fn key_up(&self, key: &str) -> Result<()>;

    /// Press and release `key`, holding it for `duration` if given
    fn key_press(&self, key: &str, duration: Option<Duration>) -> Result<()>;

    fn click_at(&self, point: WindowPoint, button: Button) -> Result<()> {
        self.move_to(point, false)?;
        self.click(button)
    }
}

/// Build the controller selected for this session
pub fn create_input(mode: InputMode, mapper: CoordinateMapper, handle: WindowHandle) -> Result<Box<dyn InputController>> {
    tracing::info!(?mode, window = handle.title(), "Creating input controller");
    match mode {
        InputMode::Foreground => Ok(Box::new(ForegroundInput::new(mapper, handle, Box::new(Ydotool::new())))),
        InputMode::Background => Ok(Box::new(BackgroundInput::connect(mapper, handle)?)),
    }
}

/// Runs a release action when dropped unless [`release`](Self::release) ran
/// it first, so a held key or button is let go even if the hold unwinds
pub(crate) struct ReleaseGuard<F: FnOnce() -> Result<()>> {
    release: Option<F>,
}

impl<F: FnOnce() -> Result<()>> ReleaseGuard<F> {
    pub(crate) fn new(release: F) -> Self {
        Self { release: Some(release) }
    }

    pub(crate) fn release(mut self) -> Result<()> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl<F: FnOnce() -> Result<()>> Drop for ReleaseGuard<F> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            if let Err(e) = release() {
                tracing::warn!("Release during unwind failed: {}", e);
            }
        }
    }
}

/// Shared `key_press` behavior: down, optional hold, guaranteed up
pub(crate) fn press_key(
    key: &str,
    duration: Option<Duration>,
    send: impl Fn(u16, bool) -> Result<()>,
) -> Result<()> {
    let code = keymap::key_code(key)?;
    send(code, true)?;
    let guard = ReleaseGuard::new(|| send(code, false));
    if let Some(hold) = duration.filter(|d| !d.is_zero()) {
        std::thread::sleep(hold);
    }
    guard.release()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn parses_buttons() {
        assert_eq!("LEFT".parse::<Button>().unwrap(), Button::Left);
        assert_eq!("middle".parse::<Button>().unwrap(), Button::Middle);
        assert!("thumb".parse::<Button>().is_err());
        assert_eq!(Button::Right.to_string(), "right");
    }

    #[test]
    fn press_key_holds_then_releases() {
        let events = RefCell::new(Vec::new());
        let start = std::time::Instant::now();
        press_key("space", Some(Duration::from_millis(40)), |code, down| {
            events.borrow_mut().push((code, down, start.elapsed()));
            Ok(())
        })
        .unwrap();

        let events = events.into_inner();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].0, events[0].1), (57, true));
        assert_eq!((events[1].0, events[1].1), (57, false));
        assert!(events[1].2 - events[0].2 >= Duration::from_millis(40));
    }

    #[test]
    fn guard_releases_on_unwind() {
        let released = std::sync::atomic::AtomicBool::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ReleaseGuard::new(|| {
                released.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            });
            panic!("interrupted while holding");
        }));
        assert!(result.is_err());
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn unknown_key_sends_nothing() {
        let sent = RefCell::new(0);
        let err = press_key("nope", None, |_, _| {
            *sent.borrow_mut() += 1;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, Error::InputDispatch { .. }));
        assert_eq!(*sent.borrow(), 0);
    }
}
