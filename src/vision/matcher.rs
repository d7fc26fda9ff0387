//! Zero-mean normalized cross-correlation template matching
//!
//! Scores are Pearson correlations in [-1, 1] between the template and each
//! frame window, so uniform brightness offsets and flat regions do not pass
//! for a match. The raw cross-correlation comes from imageproc (in parallel);
//! the window means and variances come from integral images.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{MatchTemplateMethod, match_template_parallel};

use super::template::Template;
use crate::core::error::{Error, Result};
use crate::core::geometry::{ScreenPoint, ScreenRect, WindowRect};
use crate::screenshot::Frame;

type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Windows whose gray-level variance is below this are treated as flat
const MIN_VARIANCE: f64 = 1e-3;

/// Best location of a template in a frame, in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub score: f32,
    pub rect: ScreenRect,
    pub center: ScreenPoint,
}

/// Per-call overrides that leave the template's stored defaults untouched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchOptions {
    /// Match at this scale instead of `template.scale()`
    pub scale: Option<f32>,
    /// Accept at this score instead of `template.threshold()`
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateMatcher;

impl TemplateMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Best match of `template` in `frame`, or `None` if the best score is
    /// below the template's threshold
    pub fn find(&self, frame: &Frame, template: &Template) -> Result<Option<MatchResult>> {
        self.find_with(frame, template, MatchOptions::default())
    }

    pub fn exists(&self, frame: &Frame, template: &Template) -> Result<bool> {
        Ok(self.find(frame, template)?.is_some())
    }

    pub fn find_with(&self, frame: &Frame, template: &Template, options: MatchOptions) -> Result<Option<MatchResult>> {
        let name = template.name();
        let threshold = options.threshold.unwrap_or(template.threshold());
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::match_input(name, format!("threshold override {} is outside (0, 1]", threshold)));
        }
        let needle = scaled_luma(template, options.scale.unwrap_or(template.scale()))?;

        // Search area in frame-local pixels
        let frame_area = WindowRect::new(0, 0, frame.width(), frame.height())
            .ok_or_else(|| Error::match_input(name, "frame is empty"))?;
        let area = match template.roi() {
            Some(roi) => roi.intersect(&frame_area).ok_or_else(|| {
                Error::match_input(name, format!("ROI {} lies outside the {}x{} frame", roi, frame.width(), frame.height()))
            })?,
            None => frame_area,
        };

        if needle.width() > area.width() || needle.height() > area.height() {
            tracing::debug!(
                template = name,
                "Search area {}x{} is smaller than the {}x{} template",
                area.width(),
                area.height(),
                needle.width(),
                needle.height()
            );
            return Ok(None);
        }

        let luma = frame.to_luma();
        let haystack =
            imageops::crop_imm(&luma, area.x() as u32, area.y() as u32, area.width(), area.height()).to_image();

        let scores = zero_mean_ncc(&haystack, &needle)
            .ok_or_else(|| Error::match_input(name, "template has no contrast to correlate"))?;
        let (score, (bx, by)) = best_location(&scores);

        let origin = frame.origin();
        let rect = ScreenRect::new(
            origin.x + area.x() + bx as i32,
            origin.y + area.y() + by as i32,
            needle.width(),
            needle.height(),
        )
        .ok_or_else(|| Error::match_input(name, "scaled template is empty"))?;

        tracing::debug!(template = name, score, x = rect.x(), y = rect.y(), threshold, "Match attempt");

        if score < threshold {
            return Ok(None);
        }

        Ok(Some(MatchResult { score, rect, center: rect.center() }))
    }
}

/// Zero-mean correlation of two same-sized frames, 1.0 when identical
///
/// Frames of different sizes score 0. When either frame is flat, only an
/// exact pixel match scores 1.
pub fn frame_similarity(a: &GrayImage, b: &GrayImage) -> f32 {
    if a.dimensions() != b.dimensions() {
        return 0.0;
    }
    match zero_mean_ncc(a, b) {
        Some(scores) if !moments(a).is_flat() => scores.get_pixel(0, 0).0[0],
        _ => {
            if a == b {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn scaled_luma(template: &Template, scale: f32) -> Result<GrayImage> {
    let name = template.name();
    if !(scale.is_finite() && scale > 0.0) {
        return Err(Error::match_input(name, format!("scale {} must be a positive number", scale)));
    }

    let luma = template.luma();
    if scale == 1.0 {
        return Ok(luma.clone());
    }

    let width = (luma.width() as f32 * scale).round() as u32;
    let height = (luma.height() as f32 * scale).round() as u32;
    if width == 0 || height == 0 {
        return Err(Error::match_input(name, format!("scale {} shrinks the template to nothing", scale)));
    }
    Ok(imageops::resize(luma, width, height, FilterType::Triangle))
}

/// Pixel count, sum and centered sum of squares of a gray patch
#[derive(Debug, Clone, Copy)]
struct Moments {
    n: f64,
    sum: f64,
    centered: f64,
}

impl Moments {
    fn new(n: f64, sum: u64, squares: u64) -> Self {
        let sum = sum as f64;
        Self { n, sum, centered: squares as f64 - sum * sum / n }
    }

    fn is_flat(&self) -> bool {
        self.centered < MIN_VARIANCE * self.n
    }
}

fn moments(image: &GrayImage) -> Moments {
    let (sum, squares) = image.pixels().fold((0u64, 0u64), |(s, q), p| {
        let v = p.0[0] as u64;
        (s + v, q + v * v)
    });
    Moments::new((image.width() * image.height()) as f64, sum, squares)
}

/// Sum over the `w`x`h` window at `(x, y)` of a zero-padded integral image
fn window_sum(integral: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let at = |x, y| integral.get_pixel(x, y).0[0];
    at(x + w, y + h) + at(x, y) - at(x, y + h) - at(x + w, y)
}

/// Score map of zero-mean NCC for every placement of `needle` in `haystack`
///
/// `None` when the needle itself is flat. Flat haystack windows score 0.
fn zero_mean_ncc(haystack: &GrayImage, needle: &GrayImage) -> Option<ScoreMap> {
    let tpl = moments(needle);
    if tpl.is_flat() {
        return None;
    }

    let (w, h) = needle.dimensions();
    let mut scores = match_template_parallel(haystack, needle, MatchTemplateMethod::CrossCorrelation);
    let sums = integral_image::<_, u64>(haystack);
    let squares = integral_squared_image::<_, u64>(haystack);

    for (x, y, px) in scores.enumerate_pixels_mut() {
        let window = Moments::new(tpl.n, window_sum(&sums, x, y, w, h), window_sum(&squares, x, y, w, h));
        px.0[0] = if window.is_flat() {
            0.0
        } else {
            let covariance = px.0[0] as f64 - window.sum * tpl.sum / tpl.n;
            (covariance / (window.centered * tpl.centered).sqrt()).clamp(-1.0, 1.0) as f32
        };
    }
    Some(scores)
}

/// Highest score in row-major order; the first of equal maxima wins
fn best_location(scores: &ScoreMap) -> (f32, (u32, u32)) {
    let mut best = (f32::NEG_INFINITY, (0, 0));
    for (x, y, px) in scores.enumerate_pixels() {
        let score = if px.0[0].is_finite() { px.0[0] } else { 0.0 };
        if score > best.0 {
            best = (score, (x, y));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screenshot::ChannelOrder;
    use crate::testing::{blank_frame, checker, paste, template};
    use crate::vision::template::TemplateMeta;
    use image::DynamicImage;

    #[test]
    fn finds_template_and_reports_screen_coordinates() {
        let needle = checker(6, 5);
        let frame = paste(blank_frame(40, 30), &needle, 12, 7);
        let frame = Frame::from_luma(frame, ScreenPoint::new(100, 200)).unwrap();

        let result = TemplateMatcher::new().find(&frame, &template("btn", &needle, 0.95)).unwrap().unwrap();
        assert!(result.score > 0.999, "score {}", result.score);
        assert_eq!(result.rect, ScreenRect::new(112, 207, 6, 5).unwrap());
        assert_eq!(result.center, ScreenPoint::new(115, 209));
    }

    #[test]
    fn below_threshold_is_none() {
        let needle = checker(6, 5);
        let frame = Frame::from_luma(blank_frame(40, 30), ScreenPoint::new(0, 0)).unwrap();

        let matcher = TemplateMatcher::new();
        assert!(matcher.find(&frame, &template("btn", &needle, 0.5)).unwrap().is_none());
        assert!(!matcher.exists(&frame, &template("btn", &needle, 0.5)).unwrap());
    }

    #[test]
    fn score_equal_to_threshold_matches() {
        let needle = checker(6, 5);
        // A slightly altered copy keeps the best score below 1.0
        let mut altered = needle.clone();
        altered.put_pixel(0, 0, image::Luma([255]));
        let frame = Frame::from_luma(paste(blank_frame(30, 20), &altered, 4, 4), ScreenPoint::new(0, 0)).unwrap();

        let matcher = TemplateMatcher::new();
        let best = matcher.find(&frame, &template("btn", &needle, 0.01)).unwrap().unwrap();
        assert!(best.score < 1.0);

        let at = matcher.find(&frame, &template("btn", &needle, best.score)).unwrap();
        assert_eq!(at.map(|m| m.score), Some(best.score));

        let above = f32::from_bits(best.score.to_bits() + 1);
        assert!(matcher.find(&frame, &template("btn", &needle, above)).unwrap().is_none());
    }

    #[test]
    fn identical_regions_resolve_to_top_left() {
        let needle = checker(5, 5);
        let mut canvas = paste(blank_frame(50, 40), &needle, 30, 5);
        canvas = paste(canvas, &needle, 8, 20);
        canvas = paste(canvas, &needle, 40, 20);
        let frame = Frame::from_luma(canvas, ScreenPoint::new(0, 0)).unwrap();
        let tmpl = template("dup", &needle, 0.9);

        for _ in 0..5 {
            let result = TemplateMatcher::new().find(&frame, &tmpl).unwrap().unwrap();
            assert_eq!(result.rect.origin(), ScreenPoint::new(30, 5));
        }
    }

    #[test]
    fn roi_restricts_search_and_offsets_result() {
        let needle = checker(4, 4);
        let mut canvas = paste(blank_frame(60, 40), &needle, 2, 2);
        canvas = paste(canvas, &needle, 45, 30);
        let frame = Frame::from_luma(canvas, ScreenPoint::new(1000, 500)).unwrap();

        let meta = TemplateMeta { threshold: 0.95, roi: WindowRect::new(40, 20, 20, 20), ..TemplateMeta::default() };
        let tmpl = Template::new("roi", DynamicImage::ImageLuma8(needle), meta).unwrap();

        let result = TemplateMatcher::new().find(&frame, &tmpl).unwrap().unwrap();
        assert_eq!(result.rect.origin(), ScreenPoint::new(1045, 530));
    }

    #[test]
    fn roi_outside_frame_is_input_error() {
        let needle = checker(4, 4);
        let frame = Frame::from_luma(blank_frame(20, 20), ScreenPoint::new(0, 0)).unwrap();
        let meta = TemplateMeta { roi: WindowRect::new(100, 100, 10, 10), ..TemplateMeta::default() };
        let tmpl = Template::new("far", DynamicImage::ImageLuma8(needle), meta).unwrap();

        let err = TemplateMatcher::new().find(&frame, &tmpl).unwrap_err();
        assert!(matches!(err, Error::MatchInput { .. }));
    }

    #[test]
    fn template_larger_than_frame_is_no_match() {
        let frame = Frame::from_luma(blank_frame(4, 4), ScreenPoint::new(0, 0)).unwrap();
        let tmpl = template("big", &checker(8, 8), 0.5);
        assert!(TemplateMatcher::new().find(&frame, &tmpl).unwrap().is_none());
    }

    #[test]
    fn color_frame_matches_gray_template() {
        let needle = checker(6, 6);
        let gray = paste(blank_frame(20, 20), &needle, 7, 3);
        let bgra: Vec<u8> = gray.pixels().flat_map(|p| [p.0[0], p.0[0], p.0[0], 255]).collect();
        let frame = Frame::new(bgra, 20, 20, ChannelOrder::Bgra, ScreenPoint::new(0, 0)).unwrap();

        let result = TemplateMatcher::new().find(&frame, &template("gray", &needle, 0.95)).unwrap().unwrap();
        assert_eq!(result.rect.origin(), ScreenPoint::new(7, 3));
    }

    #[test]
    fn scale_override_changes_footprint_only_for_that_call() {
        let needle = checker(8, 8);
        let small = imageops::resize(&needle, 4, 4, FilterType::Triangle);
        let frame = Frame::from_luma(paste(blank_frame(30, 30), &small, 10, 12), ScreenPoint::new(0, 0)).unwrap();
        let tmpl = template("scaled", &needle, 0.95);
        let matcher = TemplateMatcher::new();

        let half = MatchOptions { scale: Some(0.5), ..MatchOptions::default() };
        let result = matcher.find_with(&frame, &tmpl, half).unwrap().unwrap();
        assert_eq!(result.rect, ScreenRect::new(10, 12, 4, 4).unwrap());
        assert_eq!(tmpl.scale(), 1.0);

        let tiny = MatchOptions { scale: Some(0.01), ..MatchOptions::default() };
        let err = matcher.find_with(&frame, &tmpl, tiny).unwrap_err();
        assert!(matches!(err, Error::MatchInput { .. }));
        let negative = MatchOptions { scale: Some(-1.0), ..MatchOptions::default() };
        let err = matcher.find_with(&frame, &tmpl, negative).unwrap_err();
        assert!(matches!(err, Error::MatchInput { .. }));
    }

    #[test]
    fn flat_bright_frame_does_not_match_low_contrast_template() {
        let needle = GrayImage::from_fn(20, 10, |x, y| Luma([if (x / 2 + y / 2) % 2 == 0 { 170 } else { 200 }]));
        let flat = GrayImage::from_pixel(200, 100, Luma([90]));
        let frame = Frame::from_luma(flat, ScreenPoint::new(0, 0)).unwrap();

        let matcher = TemplateMatcher::new();
        assert!(matcher.find(&frame, &template("faint", &needle, 0.5)).unwrap().is_none());
        assert!(matcher.find(&frame, &template("faint", &needle, 0.01)).unwrap().is_none());
    }

    #[test]
    fn brightness_offset_still_matches() {
        let needle = checker(8, 6);
        let brighter = GrayImage::from_fn(8, 6, |x, y| Luma([needle.get_pixel(x, y).0[0] / 2 + 100]));
        let canvas = paste(GrayImage::from_pixel(50, 40, Luma([120])), &brighter, 21, 9);
        let frame = Frame::from_luma(canvas, ScreenPoint::new(0, 0)).unwrap();

        let result = TemplateMatcher::new().find(&frame, &template("shifted", &needle, 0.95)).unwrap().unwrap();
        assert_eq!(result.rect.origin(), ScreenPoint::new(21, 9));
    }

    #[test]
    fn flat_template_is_input_error() {
        let frame = Frame::from_luma(checker(30, 30), ScreenPoint::new(0, 0)).unwrap();
        let solid = GrayImage::from_pixel(5, 5, Luma([128]));

        let err = TemplateMatcher::new().find(&frame, &template("solid", &solid, 0.9)).unwrap_err();
        assert!(matches!(err, Error::MatchInput { .. }));
    }

    #[test]
    fn threshold_override_applies_to_one_call() {
        let needle = checker(6, 5);
        let mut altered = needle.clone();
        altered.put_pixel(0, 0, Luma([255]));
        let frame = Frame::from_luma(paste(blank_frame(30, 20), &altered, 4, 4), ScreenPoint::new(0, 0)).unwrap();
        let tmpl = template("btn", &needle, 0.5);
        let matcher = TemplateMatcher::new();

        let strict = MatchOptions { threshold: Some(1.0), ..MatchOptions::default() };
        assert!(matcher.find_with(&frame, &tmpl, strict).unwrap().is_none());
        assert!(matcher.find(&frame, &tmpl).unwrap().is_some());

        let invalid = MatchOptions { threshold: Some(0.0), ..MatchOptions::default() };
        assert!(matches!(matcher.find_with(&frame, &tmpl, invalid), Err(Error::MatchInput { .. })));
    }

    #[test]
    fn frame_similarity_separates_changed_frames() {
        let base = paste(blank_frame(40, 30), &checker(8, 8), 5, 5);
        let moved = paste(blank_frame(40, 30), &checker(8, 8), 25, 15);

        assert!(frame_similarity(&base, &base.clone()) > 0.9999);
        assert!(frame_similarity(&base, &moved) < 0.5);
        assert_eq!(frame_similarity(&blank_frame(4, 4), &blank_frame(4, 4)), 1.0);
        assert_eq!(frame_similarity(&blank_frame(4, 4), &GrayImage::from_pixel(4, 4, Luma([9]))), 0.0);
        assert_eq!(frame_similarity(&base, &blank_frame(4, 4)), 0.0);
    }
}
