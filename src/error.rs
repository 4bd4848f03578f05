//! Error types shared by the document model and the layout engine.

use core::fmt;

use crate::document::FontHandle;

/// Failure reported by a `FontMetrics` collaborator for one measurement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsError {
    /// Font handle the collaborator could not resolve, when known.
    pub font: Option<FontHandle>,
    /// Collaborator-provided reason.
    pub reason: String,
}

impl MetricsError {
    /// Create a metrics error for an unresolvable font handle.
    pub fn unknown_font(font: Option<FontHandle>) -> Self {
        Self {
            font,
            reason: "unknown font handle".to_string(),
        }
    }

    /// Create a metrics error with a free-form reason.
    pub fn new(font: Option<FontHandle>, reason: impl Into<String>) -> Self {
        Self {
            font,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.font {
            Some(font) => write!(f, "font {}: {}", font.0, self.reason),
            None => write!(f, "default font: {}", self.reason),
        }
    }
}

impl std::error::Error for MetricsError {}

/// Errors raised while building a document or paginating it.
///
/// Pagination never recovers partially: any of these aborts the whole run
/// and no pages or anchor index are returned.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutError {
    /// Font metrics lookup failed for a run of a text element.
    MetricsFailure {
        element_index: usize,
        run_index: usize,
        source: MetricsError,
    },
    /// Image or icon box wider than the usable page width.
    BoxTooWide {
        element_index: usize,
        width: f32,
        max_width: f32,
    },
    /// Image or icon box taller than the page content area.
    BoxTooTall {
        element_index: usize,
        height: f32,
        max_height: f32,
    },
    /// A single word wider than the page content width at density 1.0.
    WordTooWide {
        element_index: usize,
        word: String,
        width: f32,
        max_width: f32,
    },
    /// Heading uid appended twice to one document.
    DuplicateAnchor { uid: String },
    /// Page geometry that cannot hold any content.
    InvalidGeometry { reason: &'static str },
    /// Format range outside the text or not on a character boundary.
    InvalidTextRange { start: usize, end: usize, len: usize },
}

impl LayoutError {
    /// Element index the error refers to, when it refers to one.
    pub fn element_index(&self) -> Option<usize> {
        match self {
            Self::MetricsFailure { element_index, .. }
            | Self::BoxTooWide { element_index, .. }
            | Self::BoxTooTall { element_index, .. }
            | Self::WordTooWide { element_index, .. } => Some(*element_index),
            Self::DuplicateAnchor { .. }
            | Self::InvalidGeometry { .. }
            | Self::InvalidTextRange { .. } => None,
        }
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetricsFailure {
                element_index,
                run_index,
                source,
            } => write!(
                f,
                "font metrics failed for element {} run {}: {}",
                element_index, run_index, source
            ),
            Self::BoxTooWide {
                element_index,
                width,
                max_width,
            } => write!(
                f,
                "element {} is {:.1} wide but the usable page width is {:.1}",
                element_index, width, max_width
            ),
            Self::BoxTooTall {
                element_index,
                height,
                max_height,
            } => write!(
                f,
                "element {} is {:.1} tall but the page content height is {:.1}",
                element_index, height, max_height
            ),
            Self::WordTooWide {
                element_index,
                word,
                width,
                max_width,
            } => write!(
                f,
                "word {:?} in element {} is {:.1} wide but the page content width is {:.1}",
                word, element_index, width, max_width
            ),
            Self::DuplicateAnchor { uid } => write!(f, "duplicate heading uid {:?}", uid),
            Self::InvalidGeometry { reason } => write!(f, "invalid page geometry: {}", reason),
            Self::InvalidTextRange { start, end, len } => write!(
                f,
                "format range {}..{} is invalid for text of {} bytes",
                start, end, len
            ),
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MetricsFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}
