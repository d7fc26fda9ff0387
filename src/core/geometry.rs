//! Points and rectangles tagged with the coordinate space they live in
//!
//! Screen-global and window-local coordinates are both plain pixel offsets, so
//! mixing them up compiles fine and clicks in the wrong place. The space is
//! therefore part of the type: a `Point<WindowSpace>` cannot be handed to an
//! API that wants a `Point<ScreenSpace>` without going through the mapper.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker for a coordinate space
pub trait Space: Copy + fmt::Debug + Eq + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Screen-global coordinates (root window / virtual screen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenSpace;

/// Coordinates relative to the target window's client-area origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSpace;

impl Space for ScreenSpace {
    const NAME: &'static str = "screen";
}

impl Space for WindowSpace {
    const NAME: &'static str = "window";
}

pub type ScreenPoint = Point<ScreenSpace>;
pub type WindowPoint = Point<WindowSpace>;
pub type ScreenRect = Rect<ScreenSpace>;
pub type WindowRect = Rect<WindowSpace>;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point<S: Space> {
    pub x: i32,
    pub y: i32,
    space: PhantomData<S>,
}

impl<S: Space> Point<S> {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y, space: PhantomData }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl<S: Space> fmt::Debug for Point<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})@{}", self.x, self.y, S::NAME)
    }
}

impl<S: Space> fmt::Display for Point<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) [{}]", self.x, self.y, S::NAME)
    }
}

/// Axis-aligned rectangle with `width > 0 && height > 0`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect<S: Space> {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    space: PhantomData<S>,
}

impl<S: Space> Rect<S> {
    /// Returns `None` for a degenerate (zero-width or zero-height) rectangle
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { x, y, width, height, space: PhantomData })
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> Point<S> {
        Point::new(self.x, self.y)
    }

    /// Exclusive right edge
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn center(&self) -> Point<S> {
        Point::new(self.x + (self.width / 2) as i32, self.y + (self.height / 2) as i32)
    }

    pub fn contains(&self, point: Point<S>) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Overlapping area of two rectangles, if any
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Self::new(left, top, (right - left) as u32, (bottom - top) as u32)
    }

    /// Same rectangle moved by `(dx, dy)`
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..*self }
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Self) -> Self {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self { x: left, y: top, width: (right - left) as u32, height: (bottom - top) as u32, space: PhantomData }
    }
}

impl<S: Space> fmt::Debug for Rect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}@{}", self.width, self.height, self.x, self.y, S::NAME)
    }
}

impl<S: Space> fmt::Display for Rect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} at ({}, {}) [{}]", self.width, self.height, self.x, self.y, S::NAME)
    }
}

/// On-disk shape of a rectangle (template metadata, config)
#[derive(Serialize, Deserialize)]
struct RawRect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl<S: Space> Serialize for Rect<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        RawRect { x: self.x, y: self.y, width: self.width, height: self.height }.serialize(serializer)
    }
}

impl<'de, S: Space> Deserialize<'de> for Rect<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRect::deserialize(deserializer)?;
        Rect::new(raw.x, raw.y, raw.width, raw.height).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "rectangle must have non-zero size, got {}x{}",
                raw.width, raw.height
            ))
        })
    }
}
