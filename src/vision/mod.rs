//! Reference templates and the matcher that locates them in captured frames

pub mod matcher;
pub mod template;

pub use matcher::{MatchOptions, MatchResult, TemplateMatcher, frame_similarity};
pub use template::{DiskTemplateSource, Template, TemplateMeta, TemplateSource, TemplateStore};
