//! Output path templates.
//!
//! A template is an ordered list of segments; each segment joins its
//! parts with a per-segment concatenator. Parts can be literals or
//! deferred callables invoked at render time (timestamps, sequence
//! numbers).

use std::fmt;
use std::sync::Arc;

/// One part of a path segment.
#[derive(Clone)]
pub enum PathPart {
    Literal(String),
    /// Evaluated on every render.
    Deferred(Arc<dyn Fn() -> String + Send + Sync>),
}

impl PathPart {
    pub fn deferred(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        PathPart::Deferred(Arc::new(f))
    }

    fn render(&self) -> String {
        match self {
            PathPart::Literal(s) => s.clone(),
            PathPart::Deferred(f) => f(),
        }
    }
}

impl fmt::Debug for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPart::Literal(s) => write!(f, "Literal({s:?})"),
            PathPart::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

impl From<&str> for PathPart {
    fn from(s: &str) -> Self {
        PathPart::Literal(s.to_string())
    }
}

impl From<String> for PathPart {
    fn from(s: String) -> Self {
        PathPart::Literal(s)
    }
}

/// Ordered, concatenated group of parts.
#[derive(Debug, Clone)]
pub struct PathSegment {
    pub concatenator: String,
    pub order: u32,
    pub parts: Vec<PathPart>,
}

impl PathSegment {
    pub fn new(concatenator: &str, order: u32, parts: Vec<PathPart>) -> Self {
        Self {
            concatenator: concatenator.to_string(),
            order,
            parts,
        }
    }

    pub fn add_part(&mut self, part: impl Into<PathPart>) {
        self.parts.push(part.into());
    }

    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(PathPart::render)
            .collect::<Vec<_>>()
            .join(&self.concatenator)
    }
}

/// Template rendering object paths for flushed records.
#[derive(Debug, Clone, Default)]
pub struct PathTemplate {
    segments: Vec<PathSegment>,
    /// Local templates join with the platform separator, remote ones
    /// always with `/`.
    pub is_local: bool,
}

impl PathTemplate {
    pub fn new(segments: Vec<PathSegment>, is_local: bool) -> Self {
        Self { segments, is_local }
    }

    pub fn add_segment(&mut self, concatenator: &str, order: u32, parts: Vec<PathPart>) -> &mut Self {
        self.segments.push(PathSegment::new(concatenator, order, parts));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn separator(&self) -> String {
        if self.is_local {
            std::path::MAIN_SEPARATOR.to_string()
        } else {
            "/".to_string()
        }
    }

    /// Rendered segment strings in order, empty ones dropped.
    pub fn segment_strings(&self) -> Vec<String> {
        let mut ordered: Vec<&PathSegment> = self.segments.iter().collect();
        ordered.sort_by_key(|s| s.order);
        ordered
            .iter()
            .map(|s| s.render())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Join the segments and append `.ext` when given.
    pub fn render_path(&self, ext: &str) -> String {
        let joined = self.segment_strings().join(&self.separator());
        if ext.is_empty() {
            joined
        } else {
            format!("{joined}.{ext}")
        }
    }
}
