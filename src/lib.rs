//! Spotter - template-matching UI detection and window-mapped input for Linux
//!
//! This library locates a target application window, captures its pixels,
//! finds known UI elements in them by normalized cross-correlation, and drives
//! synthetic pointer and keyboard input at the places it found.
//!
//! ## Components
//!
//! - [`window::CoordinateMapper`]: window resolution and window/screen
//!   coordinate conversion
//! - [`screenshot::FrameSource`]: screen and window captures
//! - [`vision::TemplateStore`] and [`vision::TemplateMatcher`]: reference
//!   images and matching
//! - [`detection::DetectionService`]: polling waits with timeout and
//!   cancellation
//! - [`input::InputController`]: foreground (ydotool) and background (X11
//!   synthetic events) input
//! - [`session::Session`]: wires everything together from a config file
//!
//! ## Supported Environments
//!
//! - X11 (native)
//! - XWayland clients on Wayland sessions, with KWin focus handling on KDE

pub mod backend;
pub mod core;
pub mod detection;
pub mod input;
pub mod screenshot;
pub mod session;
pub mod vision;
pub mod window;

#[cfg(test)]
mod testing;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
