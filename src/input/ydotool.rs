//! Foreground input via ydotool
//!
//! Shells out to the `ydotool` client, which injects events through uinput and
//! therefore works under both X11 and Wayland. The `ydotoold` daemon must be
//! running.

use std::process::Command;

use super::Button;
use super::foreground::{Press, ScreenDevice};
use crate::core::error::{Error, Result};
use crate::core::geometry::ScreenPoint;

#[derive(Debug, Clone)]
pub struct Ydotool {
    program: String,
}

impl Default for Ydotool {
    fn default() -> Self {
        Self::new()
    }
}

impl Ydotool {
    pub fn new() -> Self {
        Self { program: "ydotool".to_string() }
    }

    /// Use a specific client binary instead of `ydotool` from `PATH`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn run(&self, action: &str, args: &[String]) -> Result<()> {
        tracing::debug!("Executing {} with args: {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| Error::dispatch(action, format!("failed to spawn {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::dispatch(action, format!("{} exited with {}: {}", self.program, output.status, stderr.trim())));
        }
        Ok(())
    }
}

/// `ydotool click` takes a button index with 0x40 for down and 0x80 for up
fn click_code(button: Button, press: Press) -> String {
    let index = match button {
        Button::Left => 0x00,
        Button::Right => 0x01,
        Button::Middle => 0x02,
    };
    let state = match press {
        Press::Down => 0x40,
        Press::Up => 0x80,
        Press::Click => 0xC0,
    };
    format!("0x{:02X}", state | index)
}

impl ScreenDevice for Ydotool {
    fn move_absolute(&self, point: ScreenPoint) -> Result<()> {
        self.run(
            "mousemove",
            &["mousemove".into(), "--absolute".into(), "-x".into(), point.x.to_string(), "-y".into(), point.y.to_string()],
        )
    }

    fn move_relative(&self, dx: i32, dy: i32) -> Result<()> {
        self.run("mousemove", &["mousemove".into(), "-x".into(), dx.to_string(), "-y".into(), dy.to_string()])
    }

    fn button(&self, button: Button, press: Press) -> Result<()> {
        self.run("click", &["click".into(), click_code(button, press)])
    }

    fn key(&self, code: u16, down: bool) -> Result<()> {
        self.run("key", &["key".into(), format!("{}:{}", code, if down { 1 } else { 0 })])
    }
}
