//! Template definitions and the lazily populated template cache

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::geometry::WindowRect;

/// Matching metadata stored beside each template image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMeta {
    /// Minimum score in (0, 1] for a location to count as a match
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Search area relative to the frame's top-left corner
    #[serde(default)]
    pub roi: Option<WindowRect>,
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Image file name, if it is not `<name>.png`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn default_threshold() -> f32 {
    0.8
}

fn default_scale() -> f32 {
    1.0
}

impl Default for TemplateMeta {
    fn default() -> Self {
        Self { threshold: default_threshold(), roi: None, scale: default_scale(), image: None }
    }
}

/// A reference image identifying one UI element, immutable once built
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    image: DynamicImage,
    luma: GrayImage,
    threshold: f32,
    roi: Option<WindowRect>,
    scale: f32,
}

impl Template {
    pub fn new(name: impl Into<String>, image: DynamicImage, meta: TemplateMeta) -> Result<Self> {
        let name = name.into();

        if image.width() == 0 || image.height() == 0 {
            return Err(Error::match_input(&name, "template image is empty"));
        }
        if !(meta.threshold > 0.0 && meta.threshold <= 1.0) {
            return Err(Error::match_input(&name, format!("threshold {} is outside (0, 1]", meta.threshold)));
        }
        if !(meta.scale.is_finite() && meta.scale > 0.0) {
            return Err(Error::match_input(&name, format!("scale {} must be a positive number", meta.scale)));
        }

        let luma = image.to_luma8();
        Ok(Self { name, image, luma, threshold: meta.threshold, roi: meta.roi, scale: meta.scale })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Luma copy of the image, converted once at load time
    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn roi(&self) -> Option<WindowRect> {
        self.roi
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

/// Backing storage for templates
pub trait TemplateSource: Send + Sync {
    /// Read the image and metadata for `name`; a missing resource is
    /// [`Error::TemplateNotFound`]
    fn read(&self, name: &str) -> Result<(DynamicImage, TemplateMeta)>;
}

/// Templates stored as `<root>/<name>.png` with an optional
/// `<root>/<name>.json` metadata sidecar
#[derive(Debug, Clone)]
pub struct DiskTemplateSource {
    root: PathBuf,
}

impl DiskTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical name onto the asset tree without escaping it
    fn base_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let valid = !name.is_empty()
            && !name.split('/').any(str::is_empty)
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(Error::TemplateNotFound { name: name.to_string() });
        }
        Ok(self.root.join(relative))
    }
}

impl TemplateSource for DiskTemplateSource {
    fn read(&self, name: &str) -> Result<(DynamicImage, TemplateMeta)> {
        let base = self.base_path(name)?;
        let meta_path = base.with_extension("json");

        let meta = match std::fs::read_to_string(&meta_path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                Error::match_input(name, format!("bad metadata in {}: {}", meta_path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TemplateMeta::default(),
            Err(e) => {
                return Err(Error::match_input(name, format!("cannot read {}: {}", meta_path.display(), e)));
            }
        };

        let image_path = match &meta.image {
            Some(file) => base.parent().unwrap_or(&self.root).join(file),
            None => base.with_extension("png"),
        };

        if !image_path.is_file() {
            return Err(Error::TemplateNotFound { name: name.to_string() });
        }

        let image = image::open(&image_path)
            .map_err(|e| Error::match_input(name, format!("cannot decode {}: {}", image_path.display(), e)))?;

        tracing::debug!(template = name, path = %image_path.display(), "Read template from disk");
        Ok((image, meta))
    }
}

/// Name-keyed template cache owned by one session
///
/// Entries load on first request and stay until [`invalidate`] drops them;
/// edits on disk are not noticed otherwise. Concurrent `load` calls are safe.
///
/// [`invalidate`]: TemplateStore::invalidate
pub struct TemplateStore {
    source: Box<dyn TemplateSource>,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateStore {
    pub fn new(source: impl TemplateSource + 'static) -> Self {
        Self { source: Box::new(source), cache: RwLock::new(HashMap::new()) }
    }

    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(DiskTemplateSource::new(root))
    }

    /// Cached template, or read, validate and cache it
    pub fn load(&self, name: &str) -> Result<Arc<Template>> {
        if let Some(template) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            return Ok(template.clone());
        }

        let (image, meta) = self.source.read(name)?;
        let template = Arc::new(Template::new(name, image, meta)?);

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have loaded it meanwhile; keep the first one
        let entry = cache.entry(name.to_string()).or_insert(template);
        tracing::info!(
            template = name,
            width = entry.luma().width(),
            height = entry.luma().height(),
            threshold = entry.threshold(),
            "Loaded template"
        );
        Ok(entry.clone())
    }

    /// Register an in-memory template, replacing any cached entry of that name
    pub fn insert(&self, template: Template) -> Arc<Template> {
        let template = Arc::new(template);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template.name().to_string(), template.clone());
        template
    }

    /// Drop one cached entry, or all of them with `None`
    pub fn invalidate(&self, name: Option<&str>) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match name {
            Some(name) => {
                cache.remove(name);
            }
            None => cache.clear(),
        }
        tracing::debug!(template = ?name, "Invalidated template cache");
    }

    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.cache.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        names.sort();
        names
    }
}
