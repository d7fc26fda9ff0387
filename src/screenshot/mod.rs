//! Screen capture using xcap
//!
//! Captures are synchronous snapshots of live, externally mutated pixels;
//! nothing here caches a frame between calls.

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::core::error::{Error, Result};
use crate::core::geometry::{ScreenPoint, ScreenRect};
use crate::window::{CoordinateMapper, WindowHandle};

/// Byte layout of a frame's pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
    Rgb,
    Bgr,
    Luma,
}

impl ChannelOrder {
    pub fn channels(self) -> usize {
        match self {
            Self::Rgba | Self::Bgra => 4,
            Self::Rgb | Self::Bgr => 3,
            Self::Luma => 1,
        }
    }
}

/// Immutable captured pixel buffer plus the screen position it came from
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    rect: ScreenRect,
    order: ChannelOrder,
}

impl Frame {
    /// Wrap a raw buffer; its length must equal `width * height * channels`
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, order: ChannelOrder, origin: ScreenPoint) -> Result<Self> {
        let rect = ScreenRect::new(origin.x, origin.y, width, height)
            .ok_or_else(|| Error::capture(format!("empty frame {}x{}", width, height)))?;
        let expected = width as usize * height as usize * order.channels();
        if pixels.len() != expected {
            return Err(Error::capture(format!(
                "{}x{} {:?} frame needs {} bytes, got {}",
                width,
                height,
                order,
                expected,
                pixels.len()
            )));
        }
        Ok(Self { pixels, rect, order })
    }

    pub fn from_rgba(image: RgbaImage, origin: ScreenPoint) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, ChannelOrder::Rgba, origin)
    }

    pub fn from_luma(image: GrayImage, origin: ScreenPoint) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, ChannelOrder::Luma, origin)
    }

    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Screen position of the frame's top-left pixel
    pub fn origin(&self) -> ScreenPoint {
        self.rect.origin()
    }

    /// Screen area covered by the frame
    pub fn screen_rect(&self) -> ScreenRect {
        self.rect
    }

    /// Frame as a gray, RGB or RGBA image with channels in RGB order
    pub fn to_image(&self) -> DynamicImage {
        let (w, h) = (self.width(), self.height());
        let image = match self.order {
            ChannelOrder::Luma => GrayImage::from_raw(w, h, self.pixels.clone()).map(DynamicImage::ImageLuma8),
            ChannelOrder::Rgba => RgbaImage::from_raw(w, h, self.pixels.clone()).map(DynamicImage::ImageRgba8),
            ChannelOrder::Rgb => RgbImage::from_raw(w, h, self.pixels.clone()).map(DynamicImage::ImageRgb8),
            ChannelOrder::Bgra => RgbaImage::from_raw(w, h, swap_red_blue(&self.pixels, 4)).map(DynamicImage::ImageRgba8),
            ChannelOrder::Bgr => RgbImage::from_raw(w, h, swap_red_blue(&self.pixels, 3)).map(DynamicImage::ImageRgb8),
        };
        // Buffer length was validated in Frame::new
        image.unwrap_or_else(|| DynamicImage::new_luma8(w, h))
    }

    /// 8-bit luma view, the common color space used for matching
    pub fn to_luma(&self) -> GrayImage {
        self.to_image().into_luma8()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("rect", &self.rect)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

fn swap_red_blue(pixels: &[u8], channels: usize) -> Vec<u8> {
    let mut out = pixels.to_vec();
    for px in out.chunks_exact_mut(channels) {
        px.swap(0, 2);
    }
    out
}

/// Anything that can produce a fresh frame on demand
pub trait FrameSource {
    /// Capture `region` (screen space), or the source's default area when
    /// `None`
    fn capture(&self, region: Option<ScreenRect>) -> Result<Frame>;
}

/// Captures the virtual screen spanning all monitors
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenCapture;

impl ScreenCapture {
    pub fn new() -> Self {
        Self
    }

    fn monitors() -> Result<Vec<(ScreenRect, xcap::Monitor)>> {
        let monitors = xcap::Monitor::all().map_err(|e| Error::capture(format!("cannot list monitors: {}", e)))?;

        let mut out = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            let rect = monitor_rect(&monitor)?;
            out.push((rect, monitor));
        }
        if out.is_empty() {
            return Err(Error::capture("No monitors found"));
        }
        Ok(out)
    }
}

fn monitor_rect(monitor: &xcap::Monitor) -> Result<ScreenRect> {
    let x = monitor.x().map_err(Error::capture)?;
    let y = monitor.y().map_err(Error::capture)?;
    let width = monitor.width().map_err(Error::capture)?;
    let height = monitor.height().map_err(Error::capture)?;
    ScreenRect::new(x, y, width, height).ok_or_else(|| Error::capture("monitor reports zero size"))
}

impl FrameSource for ScreenCapture {
    fn capture(&self, region: Option<ScreenRect>) -> Result<Frame> {
        let monitors = Self::monitors()?;

        let bounds = monitors
            .iter()
            .map(|(rect, _)| *rect)
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| Error::capture("No monitors found"))?;

        let target = match region {
            Some(region) => {
                if region.intersect(&bounds) != Some(region) {
                    return Err(Error::capture(format!("region {} is outside the virtual screen {}", region, bounds)));
                }
                region
            }
            None => bounds,
        };

        let mut tiles = Vec::new();
        for (rect, monitor) in &monitors {
            if rect.intersect(&target).is_none() {
                continue;
            }
            let image = monitor.capture_image().map_err(|e| {
                tracing::warn!("Monitor capture failed: {}", e);
                Error::capture(e)
            })?;
            tiles.push((rect.origin(), image));
        }

        let canvas = compose(target, &tiles);
        tracing::debug!(region = %target, "Captured screen region");
        Frame::from_rgba(canvas, target.origin())
    }
}

/// Paste monitor images into a canvas covering `target`; uncovered pixels
/// stay black
fn compose(target: ScreenRect, tiles: &[(ScreenPoint, RgbaImage)]) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(target.width(), target.height(), image::Rgba([0, 0, 0, 255]));
    for (origin, image) in tiles {
        image::imageops::replace(
            &mut canvas,
            image,
            (origin.x - target.x()) as i64,
            (origin.y - target.y()) as i64,
        );
    }
    canvas
}

/// How a [`WindowCapture`] reads pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowCaptureMethod {
    /// Read the screen where the window sits; overlapping windows show through
    #[default]
    ScreenRegion,
    /// Read the window's own contents, which works while it is covered
    WindowContents,
}

/// Frame source bound to the target window; `None` captures its client area
pub struct WindowCapture {
    mapper: CoordinateMapper,
    handle: WindowHandle,
    method: WindowCaptureMethod,
    screen: ScreenCapture,
}

impl WindowCapture {
    pub fn new(mapper: CoordinateMapper, handle: WindowHandle, method: WindowCaptureMethod) -> Self {
        Self { mapper, handle, method, screen: ScreenCapture::new() }
    }

    pub fn handle(&self) -> &WindowHandle {
        &self.handle
    }

    fn capture_contents(&self, client: ScreenRect, region: ScreenRect) -> Result<Frame> {
        let crate::backend::PlatformWindowId::X11(window_id) = self.handle.id();

        let windows = xcap::Window::all().map_err(|e| Error::capture(format!("cannot list windows: {}", e)))?;
        let window = windows
            .into_iter()
            .find(|w| w.id().ok() == Some(window_id))
            .ok_or_else(|| Error::window(format!("window '{}' not available for capture", self.handle.title())))?;

        let image = window.capture_image().map_err(Error::capture)?;
        let (w, h) = image.dimensions();
        let contents = ScreenRect::new(client.x(), client.y(), w, h)
            .ok_or_else(|| Error::capture("window capture returned an empty image"))?;

        if contents.intersect(&region) != Some(region) {
            return Err(Error::capture(format!("region {} is outside window contents {}", region, contents)));
        }

        let cropped = image::imageops::crop_imm(
            &image,
            (region.x() - contents.x()) as u32,
            (region.y() - contents.y()) as u32,
            region.width(),
            region.height(),
        )
        .to_image();

        Frame::from_rgba(cropped, region.origin())
    }
}

impl FrameSource for WindowCapture {
    fn capture(&self, region: Option<ScreenRect>) -> Result<Frame> {
        let client = self.mapper.client_rect(&self.handle)?;
        let region = region.unwrap_or(client);

        match self.method {
            WindowCaptureMethod::ScreenRegion => self.screen.capture(Some(region)),
            WindowCaptureMethod::WindowContents => self.capture_contents(client, region),
        }
    }
}
