//! Polling detection built on capture and matching
//!
//! Every attempt captures a fresh frame, so a wait observes the screen as it
//! changes. Waits are bounded by a timeout and can be cut short from another
//! thread through the service's [`CancelToken`].

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::cancel::CancelToken;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::input::{Button, InputController};
use crate::screenshot::FrameSource;
use crate::vision::{MatchOptions, MatchResult, Template, TemplateMatcher, frame_similarity};
use crate::window::{CoordinateMapper, WindowHandle};

/// Floor for the pause between attempts
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), interval: Duration::from_millis(300) }
    }
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self { timeout: config.timeout(), interval: config.poll_interval() }
    }
}

/// When a run of consecutive frames counts as a settled screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StableSettings {
    /// Frame-to-frame similarity that must be exceeded
    pub similarity: f32,
    pub timeout: Duration,
    pub interval: Duration,
    /// How long the screen must stay similar
    pub settle: Duration,
}

impl Default for StableSettings {
    fn default() -> Self {
        Self {
            similarity: 0.9995,
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(100),
            settle: Duration::from_millis(750),
        }
    }
}

impl StableSettings {
    /// Consecutive similar comparisons that cover `settle`
    fn comparisons(&self) -> u32 {
        let interval = self.interval.max(MIN_INTERVAL).as_nanos();
        self.settle.as_nanos().div_ceil(interval).max(1) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickOptions {
    pub button: Button,
    /// Accept at this score instead of the template's threshold
    pub threshold: Option<f32>,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self { button: Button::Left, threshold: None }
    }
}

pub struct DetectionService {
    matcher: TemplateMatcher,
    defaults: PollSettings,
    cancel: CancelToken,
}

impl DetectionService {
    pub fn new(defaults: PollSettings) -> Self {
        Self::with_cancel(defaults, CancelToken::new())
    }

    /// Use an existing token, so whoever holds a clone can stop waits
    pub fn with_cancel(defaults: PollSettings, cancel: CancelToken) -> Self {
        Self { matcher: TemplateMatcher::new(), defaults, cancel }
    }

    pub fn defaults(&self) -> PollSettings {
        self.defaults
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Poll until `template` appears
    ///
    /// The first attempt happens immediately. Fails with
    /// [`Error::MatchTimeout`] once `timeout` has elapsed without a match, or
    /// [`Error::Cancelled`] if the token fires. Capture and matching errors end
    /// the wait at once.
    pub fn wait_for(
        &self,
        source: &dyn FrameSource,
        template: &Template,
        timeout: Duration,
        interval: Duration,
    ) -> Result<MatchResult> {
        self.poll(source, template, timeout, interval, |found| found)
    }

    pub fn wait_for_default(&self, source: &dyn FrameSource, template: &Template) -> Result<MatchResult> {
        self.wait_for(source, template, self.defaults.timeout, self.defaults.interval)
    }

    /// Poll until `template` is no longer visible and return how long that took
    pub fn wait_until_gone(
        &self,
        source: &dyn FrameSource,
        template: &Template,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Duration> {
        let start = Instant::now();
        self.poll(source, template, timeout, interval, |found| match found {
            Some(_) => None,
            None => Some(start.elapsed()),
        })
    }

    /// Single capture-and-match
    pub fn exists(&self, source: &dyn FrameSource, template: &Template) -> Result<bool> {
        let frame = source.capture(None)?;
        self.matcher.exists(&frame, template)
    }

    /// Left-click the center of `template` if it is visible right now
    ///
    /// Returns whether a click was dispatched. No input is sent when the
    /// template is absent.
    pub fn click_if_exists(
        &self,
        source: &dyn FrameSource,
        template: &Template,
        input: &dyn InputController,
        mapper: &CoordinateMapper,
        handle: &WindowHandle,
    ) -> Result<bool> {
        self.click_if_exists_with(source, template, input, mapper, handle, ClickOptions::default())
    }

    /// Click the center of `template` with the given button and threshold
    ///
    /// A match whose center falls outside the window's client area is
    /// skipped like a miss.
    pub fn click_if_exists_with(
        &self,
        source: &dyn FrameSource,
        template: &Template,
        input: &dyn InputController,
        mapper: &CoordinateMapper,
        handle: &WindowHandle,
        options: ClickOptions,
    ) -> Result<bool> {
        let frame = source.capture(None)?;
        let match_options = MatchOptions { threshold: options.threshold, ..MatchOptions::default() };
        let Some(found) = self.matcher.find_with(&frame, template, match_options)? else {
            tracing::debug!(template = template.name(), "Not visible, skipping click");
            return Ok(false);
        };

        let local = match mapper.to_window(handle, found.center) {
            Ok(local) => local,
            Err(Error::PointOutsideWindow { point, client }) => {
                tracing::debug!(template = template.name(), %point, %client, "Match lies outside the window, skipping click");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        tracing::info!(template = template.name(), score = found.score, at = %local, "Clicking match");
        input.click_at(local, options.button)?;
        Ok(true)
    }

    /// Wait until consecutive frames stop changing
    ///
    /// Returns `false` if the screen is still changing when `timeout` runs out.
    pub fn wait_until_stable(&self, source: &dyn FrameSource, settings: StableSettings) -> Result<bool> {
        const LABEL: &str = "<stable screen>";
        let interval = settings.interval.max(MIN_INTERVAL);
        let needed = settings.comparisons();
        let start = Instant::now();
        let mut attempts = 1u32;
        let mut streak = 0u32;
        let mut previous = source.capture(None)?.to_luma();

        loop {
            let elapsed = start.elapsed();
            if elapsed >= settings.timeout {
                tracing::warn!(attempts, ?elapsed, "Screen did not settle before the timeout");
                return Ok(false);
            }
            if self.cancel.wait(interval.min(settings.timeout - elapsed)) {
                tracing::info!(attempts, "Stability wait cancelled");
                return Err(Error::Cancelled { template: LABEL.to_string(), attempts, elapsed: start.elapsed() });
            }

            attempts += 1;
            let current = source.capture(None)?.to_luma();
            let similarity = frame_similarity(&previous, &current);
            tracing::trace!(similarity, streak, "Compared consecutive frames");
            if similarity > settings.similarity {
                streak += 1;
                if streak >= needed {
                    tracing::debug!(attempts, elapsed = ?start.elapsed(), "Screen settled");
                    return Ok(true);
                }
            } else {
                streak = 0;
            }
            previous = current;
        }
    }

    /// Shared attempt loop; `done` turns a match outcome into the final value
    fn poll<T>(
        &self,
        source: &dyn FrameSource,
        template: &Template,
        timeout: Duration,
        interval: Duration,
        mut done: impl FnMut(Option<MatchResult>) -> Option<T>,
    ) -> Result<T> {
        let name = template.name();
        let interval = interval.max(MIN_INTERVAL);
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled { template: name.to_string(), attempts, elapsed: start.elapsed() });
            }

            attempts += 1;
            let found = {
                let frame = source.capture(None)?;
                self.matcher.find(&frame, template)?
            };
            if let Some(value) = done(found) {
                tracing::debug!(template = name, attempts, elapsed = ?start.elapsed(), "Wait satisfied");
                return Ok(value);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::warn!(template = name, attempts, ?elapsed, "Wait timed out");
                return Err(Error::MatchTimeout { template: name.to_string(), attempts, elapsed });
            }

            if self.cancel.wait(interval.min(timeout - elapsed)) {
                tracing::info!(template = name, attempts, "Wait cancelled");
                return Err(Error::Cancelled { template: name.to_string(), attempts, elapsed: start.elapsed() });
            }
        }
    }
}

/// Capture one frame and write it to `dir` as a timestamped PNG
///
/// The file is named `<reason>_<YYYYmmdd_HHMMSS>.png`, or `snapshot_...`
/// when `reason` is empty. Returns the written path.
pub fn save_snapshot(source: &dyn FrameSource, dir: &Path, reason: &str) -> Result<PathBuf> {
    let frame = source.capture(None)?;
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::capture(format!("cannot create {}: {}", dir.display(), e)))?;

    let label: String =
        reason.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect();
    let label = if label.is_empty() { "snapshot".to_string() } else { label };
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.png", label, timestamp));

    frame
        .to_image()
        .to_rgb8()
        .save(&path)
        .map_err(|e| Error::capture(format!("cannot write {}: {}", path.display(), e)))?;
    tracing::warn!(path = %path.display(), "Saved snapshot");
    Ok(path)
}
