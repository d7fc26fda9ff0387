//! In-memory fakes shared by unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::{DynamicImage, GrayImage, Luma, imageops};

use crate::backend::{Geometry, PlatformWindowId, WindowBackend, WindowInfo};
use crate::core::error::{Error, Result};
use crate::core::geometry::{ScreenPoint, WindowPoint};
use crate::input::{Button, InputController, Press, ScreenDevice};
use crate::screenshot::{Frame, FrameSource};
use crate::vision::{Template, TemplateMeta, TemplateSource};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Images

/// High-contrast pattern with no zero pixels, so it never correlates with a
/// black background
pub(crate) fn checker(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Luma([(40 + (x * 13 + y * 7) % 60) as u8])
        } else {
            Luma([(180 + (x * 11 + y * 5) % 60) as u8])
        }
    })
}

pub(crate) fn blank_frame(width: u32, height: u32) -> GrayImage {
    GrayImage::new(width, height)
}

pub(crate) fn paste(mut canvas: GrayImage, patch: &GrayImage, x: u32, y: u32) -> GrayImage {
    imageops::replace(&mut canvas, patch, x as i64, y as i64);
    canvas
}

pub(crate) fn template(name: &str, image: &GrayImage, threshold: f32) -> Template {
    let meta = TemplateMeta { threshold, ..TemplateMeta::default() };
    Template::new(name, DynamicImage::ImageLuma8(image.clone()), meta).expect("valid test template")
}

// Window backend

struct FakeWindow {
    id: u32,
    title: String,
    geometry: Geometry,
    visible: bool,
}

#[derive(Default)]
struct FakeState {
    windows: Vec<FakeWindow>,
    active: Option<u32>,
    deny_focus: bool,
    focus_requests: usize,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_window(&self, id: u32, title: &str, (x, y, width, height): (i32, i32, u32, u32)) {
        locked(&self.state).windows.push(FakeWindow {
            id,
            title: title.to_string(),
            geometry: Geometry { x, y, width, height },
            visible: true,
        });
    }

    fn with_window(&self, id: u32, f: impl FnOnce(&mut FakeWindow)) {
        let mut state = locked(&self.state);
        let window = state.windows.iter_mut().find(|w| w.id == id).expect("window added by the test");
        f(window);
    }

    pub(crate) fn set_visible(&self, id: u32, visible: bool) {
        self.with_window(id, |w| w.visible = visible);
    }

    pub(crate) fn move_window(&self, id: u32, x: i32, y: i32) {
        self.with_window(id, |w| {
            w.geometry.x = x;
            w.geometry.y = y;
        });
    }

    pub(crate) fn resize_window(&self, id: u32, width: u32, height: u32) {
        self.with_window(id, |w| {
            w.geometry.width = width;
            w.geometry.height = height;
        });
    }

    pub(crate) fn destroy(&self, id: u32) {
        let mut state = locked(&self.state);
        state.windows.retain(|w| w.id != id);
        if state.active == Some(id) {
            state.active = None;
        }
    }

    pub(crate) fn set_active(&self, id: Option<u32>) {
        locked(&self.state).active = id;
    }

    pub(crate) fn deny_focus(&self, deny: bool) {
        locked(&self.state).deny_focus = deny;
    }

    pub(crate) fn focus_requests(&self) -> usize {
        locked(&self.state).focus_requests
    }
}

impl WindowBackend for FakeBackend {
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        let state = locked(&self.state);
        Ok(state
            .windows
            .iter()
            .map(|w| WindowInfo {
                id: PlatformWindowId::X11(w.id),
                title: w.title.clone(),
                class: "fake".to_string(),
                geometry: w.geometry,
                focused: state.active == Some(w.id),
                visible: w.visible,
            })
            .collect())
    }

    fn window_geometry(&self, id: &PlatformWindowId) -> anyhow::Result<Option<Geometry>> {
        let PlatformWindowId::X11(id) = *id;
        Ok(locked(&self.state).windows.iter().find(|w| w.id == id).map(|w| w.geometry))
    }

    fn active_window(&self) -> anyhow::Result<Option<PlatformWindowId>> {
        Ok(locked(&self.state).active.map(PlatformWindowId::X11))
    }

    fn focus_window(&self, id: &PlatformWindowId) -> anyhow::Result<()> {
        let PlatformWindowId::X11(id) = *id;
        let mut state = locked(&self.state);
        state.focus_requests += 1;
        if !state.deny_focus {
            state.active = Some(id);
        }
        Ok(())
    }
}

// Templates

/// Shared read counter that outlives the source moved into a store
#[derive(Clone, Default)]
pub(crate) struct Reads(Arc<AtomicUsize>);

impl Reads {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct CountingSource {
    images: HashMap<String, GrayImage>,
    reads: Reads,
}

impl CountingSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, name: &str, image: GrayImage) -> Self {
        self.images.insert(name.to_string(), image);
        self
    }

    pub(crate) fn reads(&self) -> Reads {
        self.reads.clone()
    }
}

impl TemplateSource for CountingSource {
    fn read(&self, name: &str) -> Result<(DynamicImage, TemplateMeta)> {
        self.reads.0.fetch_add(1, Ordering::SeqCst);
        let image = self.images.get(name).ok_or_else(|| Error::TemplateNotFound { name: name.to_string() })?;
        Ok((DynamicImage::ImageLuma8(image.clone()), TemplateMeta::default()))
    }
}

// Frames

type Script = Box<dyn Fn(usize) -> GrayImage + Send + Sync>;

/// Frame source whose n-th capture (starting at 1) is produced by a script
pub(crate) struct ScriptedFrames {
    origin: ScreenPoint,
    script: Script,
    captures: AtomicUsize,
}

impl ScriptedFrames {
    pub(crate) fn new(origin: ScreenPoint, script: impl Fn(usize) -> GrayImage + Send + Sync + 'static) -> Self {
        Self { origin, script: Box::new(script), captures: AtomicUsize::new(0) }
    }

    pub(crate) fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedFrames {
    fn capture(&self, _region: Option<crate::core::geometry::ScreenRect>) -> Result<Frame> {
        let attempt = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        Frame::from_luma((self.script)(attempt), self.origin)
    }
}

// Input

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InputCall {
    Move(WindowPoint, bool),
    Click(Button),
    DoubleClick(Button),
    Down(Button),
    Up(Button),
    Drag(WindowPoint, Button),
    KeyDown(String),
    KeyUp(String),
    KeyPress(String, Option<Duration>),
}

#[derive(Default)]
pub(crate) struct RecordingInput {
    calls: Mutex<Vec<InputCall>>,
}

impl RecordingInput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<InputCall> {
        locked(&self.calls).clone()
    }

    fn record(&self, call: InputCall) -> Result<()> {
        locked(&self.calls).push(call);
        Ok(())
    }
}

impl InputController for RecordingInput {
    fn move_to(&self, point: WindowPoint, relative: bool) -> Result<()> {
        self.record(InputCall::Move(point, relative))
    }

    fn click(&self, button: Button) -> Result<()> {
        self.record(InputCall::Click(button))
    }

    fn double_click(&self, button: Button) -> Result<()> {
        self.record(InputCall::DoubleClick(button))
    }

    fn mouse_down(&self, button: Button) -> Result<()> {
        self.record(InputCall::Down(button))
    }

    fn mouse_up(&self, button: Button) -> Result<()> {
        self.record(InputCall::Up(button))
    }

    fn drag_to(&self, point: WindowPoint, button: Button) -> Result<()> {
        self.record(InputCall::Drag(point, button))
    }

    fn key_down(&self, key: &str) -> Result<()> {
        self.record(InputCall::KeyDown(key.to_string()))
    }

    fn key_up(&self, key: &str) -> Result<()> {
        self.record(InputCall::KeyUp(key.to_string()))
    }

    fn key_press(&self, key: &str, duration: Option<Duration>) -> Result<()> {
        self.record(InputCall::KeyPress(key.to_string(), duration))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DeviceCall {
    MoveAbsolute(ScreenPoint),
    MoveRelative(i32, i32),
    Button(Button, Press),
    Key(u16, bool),
}

#[derive(Clone, Default)]
pub(crate) struct RecordingDevice {
    calls: Arc<Mutex<Vec<DeviceCall>>>,
}

impl RecordingDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<DeviceCall> {
        locked(&self.calls).clone()
    }

    fn record(&self, call: DeviceCall) -> Result<()> {
        locked(&self.calls).push(call);
        Ok(())
    }
}

impl ScreenDevice for RecordingDevice {
    fn move_absolute(&self, point: ScreenPoint) -> Result<()> {
        self.record(DeviceCall::MoveAbsolute(point))
    }

    fn move_relative(&self, dx: i32, dy: i32) -> Result<()> {
        self.record(DeviceCall::MoveRelative(dx, dy))
    }

    fn button(&self, button: Button, press: Press) -> Result<()> {
        self.record(DeviceCall::Button(button, press))
    }

    fn key(&self, code: u16, down: bool) -> Result<()> {
        self.record(DeviceCall::Key(code, down))
    }
}
