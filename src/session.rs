//! Composition root for one automation session
//!
//! A [`Session`] wires the backend, mapper, capture, template store, detection
//! service and input controller together from a [`Config`]. The target window
//! is resolved once; call [`Session::reacquire`] after a `WindowNotFound`.

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{self, WindowBackend};
use crate::core::cancel::CancelToken;
use crate::core::config::{Config, InputMode};
use crate::core::error::{Error, Result};
use crate::detection::{self, ClickOptions, DetectionService, PollSettings, StableSettings};
use crate::input::{self, InputController};
use crate::screenshot::{WindowCapture, WindowCaptureMethod};
use crate::vision::{MatchResult, Template, TemplateStore};
use crate::window::{CoordinateMapper, TitlePattern, WindowHandle};

pub struct Session {
    config: Config,
    pattern: TitlePattern,
    mapper: CoordinateMapper,
    handle: WindowHandle,
    frames: WindowCapture,
    templates: TemplateStore,
    detection: DetectionService,
    input: Box<dyn InputController>,
}

impl Session {
    /// Connect to the display and resolve the configured window
    pub fn start(config: Config) -> Result<Self> {
        let backend = backend::create_backend().map_err(|e| Error::window(format!("no window backend: {}", e)))?;
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: Config, backend: Arc<dyn WindowBackend>) -> Result<Self> {
        config.validate()?;
        let pattern = title_pattern(&config)?;
        let mapper = CoordinateMapper::new(backend);
        let handle = mapper.resolve_window(&pattern)?;

        let frames = WindowCapture::new(mapper.clone(), handle.clone(), capture_method(config.input_mode));
        let input = input::create_input(config.input_mode, mapper.clone(), handle.clone())?;
        let templates = TemplateStore::from_dir(&config.template_root);
        let detection = DetectionService::new(PollSettings::from(&config));

        tracing::info!(
            window = handle.title(),
            mode = ?config.input_mode,
            templates = %config.template_root.display(),
            "Session started"
        );

        Ok(Self { config, pattern, mapper, handle, frames, templates, detection, input })
    }

    /// Resolve the window again and rebind capture and input to it
    pub fn reacquire(&mut self) -> Result<()> {
        let handle = self.mapper.resolve_window(&self.pattern)?;
        let mode = self.config.input_mode;
        self.input = input::create_input(mode, self.mapper.clone(), handle.clone())?;
        self.frames = WindowCapture::new(self.mapper.clone(), handle.clone(), capture_method(mode));
        tracing::info!(window = handle.title(), previous = ?self.handle.id(), current = ?handle.id(), "Window re-acquired");
        self.handle = handle;
        Ok(())
    }

    /// Token that cancels this session's waits from any thread
    pub fn cancel_token(&self) -> CancelToken {
        self.detection.cancel_token().clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn handle(&self) -> &WindowHandle {
        &self.handle
    }

    pub fn frames(&self) -> &WindowCapture {
        &self.frames
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn detection(&self) -> &DetectionService {
        &self.detection
    }

    pub fn input(&self) -> &dyn InputController {
        self.input.as_ref()
    }

    pub fn template(&self, name: &str) -> Result<Arc<Template>> {
        self.templates.load(name)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let template = self.template(name)?;
        self.detection.exists(&self.frames, &template)
    }

    /// Wait for `name` with the configured timeout and interval
    pub fn wait_for(&self, name: &str) -> Result<MatchResult> {
        let template = self.template(name)?;
        self.detection.wait_for_default(&self.frames, &template)
    }

    pub fn click_if_exists(&self, name: &str) -> Result<bool> {
        self.click_if_exists_with(name, ClickOptions::default())
    }

    pub fn click_if_exists_with(&self, name: &str, options: ClickOptions) -> Result<bool> {
        let template = self.template(name)?;
        self.detection.click_if_exists_with(
            &self.frames,
            &template,
            self.input.as_ref(),
            &self.mapper,
            &self.handle,
            options,
        )
    }

    pub fn wait_until_stable(&self, settings: StableSettings) -> Result<bool> {
        self.detection.wait_until_stable(&self.frames, settings)
    }

    /// Save the current window contents under the configured snapshot directory
    pub fn save_snapshot(&self, reason: &str) -> Result<PathBuf> {
        detection::save_snapshot(&self.frames, &self.config.snapshot_dir, reason)
    }
}

fn title_pattern(config: &Config) -> Result<TitlePattern> {
    if config.title_is_regex {
        TitlePattern::regex(&config.window_title)
    } else {
        Ok(TitlePattern::contains(config.window_title.as_str()))
    }
}

/// Background input pairs with reading the window's own contents so neither
/// needs the window on top
fn capture_method(mode: InputMode) -> WindowCaptureMethod {
    match mode {
        InputMode::Foreground => WindowCaptureMethod::ScreenRegion,
        InputMode::Background => WindowCaptureMethod::WindowContents,
    }
}
