//! Formatted document model: rich text, layout elements, and the
//! append-only document handed to the paginator.

use core::fmt;
use core::ops::{BitOr, BitOrAssign, Range};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::LayoutError;

/// Opaque font identity resolved by a font metrics collaborator.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FontHandle(pub u32);

/// Text decoration flag set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decorations(u8);

impl Decorations {
    pub const NONE: Self = Self(0);
    pub const BOLD: Self = Self(1);
    pub const ITALIC: Self = Self(1 << 1);
    pub const UNDERLINE: Self = Self(1 << 2);
    pub const STRIKETHROUGH: Self = Self(1 << 3);

    /// Raw flag bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every flag in `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for Decorations {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Decorations {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// 8-bit RGB text color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Formatting applied to a run of text.
///
/// A `None` font means "inherit": the paginator substitutes the page
/// geometry's default body or heading format before measuring.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextFormat {
    /// Font used for measurement and rendering.
    pub font: Option<FontHandle>,
    /// Weight and decoration flags.
    pub decorations: Decorations,
    /// Optional text color; renderer default when absent.
    pub color: Option<Color>,
}

impl TextFormat {
    /// Format with an explicit font and no decorations.
    pub fn new(font: FontHandle) -> Self {
        Self {
            font: Some(font),
            ..Self::default()
        }
    }

    pub fn with_decorations(mut self, decorations: Decorations) -> Self {
        self.decorations = decorations;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    /// Fill inherited fields from `default`.
    ///
    /// Decorations accumulate so a bold heading default keeps an italic
    /// run italic as well.
    pub fn resolve(&self, default: &TextFormat) -> TextFormat {
        TextFormat {
            font: self.font.or(default.font),
            decorations: self.decorations | default.decorations,
            color: self.color.or(default.color),
        }
    }
}

/// One formatting run: a byte range of the owning text plus its format.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatRun {
    /// First byte of the run.
    pub start: usize,
    /// One past the last byte of the run.
    pub end: usize,
    pub format: TextFormat,
}

impl FormatRun {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Text annotated with ordered, non-overlapping formatting runs.
///
/// Runs are sorted, never empty, and cover every byte of `text` exactly
/// once. Offsets always fall on `char` boundaries. Values are immutable once
/// built; the `with_*` helpers consume and return a new value.
///
/// Deserialization checks the run list and rejects values breaking these
/// rules with [`LayoutError::InvalidTextRange`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFormattedText")]
pub struct FormattedText {
    text: String,
    runs: Vec<FormatRun>,
}

/// Unchecked wire form of [`FormattedText`].
#[derive(Deserialize)]
struct RawFormattedText {
    text: String,
    runs: Vec<FormatRun>,
}

impl TryFrom<RawFormattedText> for FormattedText {
    type Error = LayoutError;

    fn try_from(raw: RawFormattedText) -> Result<Self, Self::Error> {
        let RawFormattedText { text, runs } = raw;
        Self::from_runs(text, runs)
    }
}

impl FormattedText {
    /// Plain text carrying a single inherited-format run.
    pub fn new(text: impl Into<String>) -> Self {
        Self::styled(text, TextFormat::default())
    }

    /// Text carrying a single run in `format`.
    pub fn styled(text: impl Into<String>, format: TextFormat) -> Self {
        let text = text.into();
        let runs = if text.is_empty() {
            Vec::with_capacity(0)
        } else {
            vec![FormatRun {
                start: 0,
                end: text.len(),
                format,
            }]
        };
        Self { text, runs }
    }

    /// Text with an explicit run list.
    ///
    /// Runs must be sorted, non-empty, contiguous from byte 0 to the end of
    /// `text`, and start and end on `char` boundaries. Empty text takes no
    /// runs. The first offending run is reported as `InvalidTextRange`.
    pub fn from_runs(text: impl Into<String>, runs: Vec<FormatRun>) -> Result<Self, LayoutError> {
        let text = text.into();
        let len = text.len();
        let mut expected_start = 0;
        for run in &runs {
            if run.start != expected_start
                || run.end <= run.start
                || run.end > len
                || !text.is_char_boundary(run.end)
            {
                return Err(LayoutError::InvalidTextRange {
                    start: run.start,
                    end: run.end,
                    len,
                });
            }
            expected_start = run.end;
        }
        if expected_start != len {
            return Err(LayoutError::InvalidTextRange {
                start: expected_start,
                end: len,
                len,
            });
        }
        Ok(Self { text, runs })
    }

    /// Start building text span by span.
    pub fn builder() -> FormattedTextBuilder {
        FormattedTextBuilder::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn runs(&self) -> &[FormatRun] {
        &self.runs
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Sub-slice of the text, `None` when the range is not valid.
    pub fn slice(&self, range: Range<usize>) -> Option<&str> {
        self.text.get(range)
    }

    /// Run covering byte `offset`, with its index.
    pub fn run_at(&self, offset: usize) -> Option<(usize, &FormatRun)> {
        if offset >= self.text.len() {
            return None;
        }
        let idx = self.runs.partition_point(|run| run.end <= offset);
        self.runs.get(idx).map(|run| (idx, run))
    }

    /// Runs intersecting `range`, each clipped to it.
    pub fn runs_in(
        &self,
        range: Range<usize>,
    ) -> impl Iterator<Item = (usize, Range<usize>, &TextFormat)> + '_ {
        let first = self.runs.partition_point(|run| run.end <= range.start);
        self.runs[first..]
            .iter()
            .enumerate()
            .take_while(move |(_, run)| run.start < range.end)
            .map(move |(offset, run)| {
                let start = run.start.max(range.start);
                let end = run.end.min(range.end);
                (first + offset, start..end, &run.format)
            })
            .filter(|(_, clipped, _)| !clipped.is_empty())
    }

    /// Replace the format of every run.
    pub fn apply_format(mut self, format: TextFormat) -> Self {
        if self.text.is_empty() {
            return self;
        }
        self.runs.clear();
        self.runs.push(FormatRun {
            start: 0,
            end: self.text.len(),
            format,
        });
        self
    }

    /// Replace the format of `range`, splitting runs at its edges.
    pub fn with_format(
        mut self,
        range: Range<usize>,
        format: TextFormat,
    ) -> Result<Self, LayoutError> {
        let len = self.text.len();
        if range.start > range.end
            || range.end > len
            || !self.text.is_char_boundary(range.start)
            || !self.text.is_char_boundary(range.end)
        {
            return Err(LayoutError::InvalidTextRange {
                start: range.start,
                end: range.end,
                len,
            });
        }
        if range.is_empty() {
            return Ok(self);
        }

        let mut runs = Vec::with_capacity(self.runs.len() + 2);
        for run in self.runs.drain(..) {
            if run.end <= range.start || run.start >= range.end {
                runs.push(run);
                continue;
            }
            if run.start < range.start {
                runs.push(FormatRun {
                    start: run.start,
                    end: range.start,
                    format: run.format.clone(),
                });
            }
            if run.end > range.end {
                runs.push(FormatRun {
                    start: range.end,
                    end: run.end,
                    format: run.format,
                });
            }
        }
        let insert_at = runs.partition_point(|run| run.end <= range.start);
        runs.insert(
            insert_at,
            FormatRun {
                start: range.start,
                end: range.end,
                format,
            },
        );
        self.runs = merge_adjacent_runs(runs);
        Ok(self)
    }
}

fn merge_adjacent_runs(runs: Vec<FormatRun>) -> Vec<FormatRun> {
    let mut merged: Vec<FormatRun> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if last.end == run.start && last.format == run.format => {
                last.end = run.end;
            }
            _ => merged.push(run),
        }
    }
    merged
}

impl From<&str> for FormattedText {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FormattedText {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for FormattedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Span-by-span builder for [`FormattedText`].
#[derive(Clone, Debug, Default)]
pub struct FormattedTextBuilder {
    text: String,
    runs: Vec<FormatRun>,
}

impl FormattedTextBuilder {
    /// Append a span in `format`.
    pub fn push(mut self, text: &str, format: TextFormat) -> Self {
        if text.is_empty() {
            return self;
        }
        let start = self.text.len();
        self.text.push_str(text);
        let end = self.text.len();
        match self.runs.last_mut() {
            Some(last) if last.format == format => last.end = end,
            _ => self.runs.push(FormatRun { start, end, format }),
        }
        self
    }

    /// Append a span in the inherited default format.
    pub fn push_plain(self, text: &str) -> Self {
        self.push(text, TextFormat::default())
    }

    pub fn build(self) -> FormattedText {
        FormattedText {
            text: self.text,
            runs: self.runs,
        }
    }
}

/// Horizontal alignment of paragraph lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    /// Stretch word gaps so every line but the last fills the band.
    Justify,
}

/// How an image-like box participates in the flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    /// Fixed box at the cursor, left edge of the band.
    #[default]
    Inline,
    /// Out of flow, reserving width on the left of following lines.
    FloatLeft,
    /// Out of flow, reserving width on the right of following lines.
    FloatRight,
    /// Fixed box at the cursor, centered in the band.
    AlignCenter,
}

impl Placement {
    pub fn is_float(self) -> bool {
        matches!(self, Self::FloatLeft | Self::FloatRight)
    }
}

/// Zero-size layout control element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompilerHint {
    /// Close the current page even when it is not full.
    PageBreak,
    /// Drop every active float.
    FloatBreak,
}

/// Opaque image resource identity, e.g. `"fontbox:textures/rocket.png"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque render-time payload identity for icon boxes, typically an index
/// into a registry owned by the host application.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PayloadHandle(pub u64);

/// One semantic document element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Element {
    /// Emphasized single-line heading, registered as an anchor.
    Heading { uid: String, text: FormattedText },
    /// Word-wrapped body text.
    Paragraph {
        text: FormattedText,
        alignment: Alignment,
    },
    /// Word-wrapped interactive text pointing at a heading uid.
    Link {
        text: FormattedText,
        target_uid: String,
    },
    Image {
        source: ResourceHandle,
        width: u32,
        height: u32,
        placement: Placement,
    },
    /// Behaves like an image for layout; only the payload differs.
    IconBox {
        payload: PayloadHandle,
        width: u32,
        height: u32,
        placement: Placement,
    },
    CompilerHint(CompilerHint),
}

impl Element {
    /// Stable variant name for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "Heading",
            Self::Paragraph { .. } => "Paragraph",
            Self::Link { .. } => "Link",
            Self::Image { .. } => "Image",
            Self::IconBox { .. } => "IconBox",
            Self::CompilerHint(CompilerHint::PageBreak) => "PageBreak",
            Self::CompilerHint(CompilerHint::FloatBreak) => "FloatBreak",
        }
    }

    /// Box size and placement for image-like elements.
    pub fn box_size(&self) -> Option<(u32, u32, Placement)> {
        match self {
            Self::Image {
                width,
                height,
                placement,
                ..
            }
            | Self::IconBox {
                width,
                height,
                placement,
                ..
            } => Some((*width, *height, *placement)),
            _ => None,
        }
    }

    /// Anchor uid introduced by this element.
    pub fn anchor_uid(&self) -> Option<&str> {
        match self {
            Self::Heading { uid, .. } => Some(uid),
            _ => None,
        }
    }

    /// Formatted text carried by text-like elements.
    pub fn formatted_text(&self) -> Option<&FormattedText> {
        match self {
            Self::Heading { text, .. } | Self::Paragraph { text, .. } | Self::Link { text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }
}

/// Ordered, append-only element sequence with unique heading uids.
///
/// Serializes as the bare element list; deserializing replays every element
/// through [`Document::push`] so duplicate heading uids are rejected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Element>", into = "Vec<Element>")]
pub struct Document {
    elements: Vec<Element>,
    headings: HashMap<String, usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
            headings: HashMap::new(),
        }
    }

    /// Append any element, returning its sequence position.
    ///
    /// A heading whose uid is already present is rejected and the document
    /// is left unchanged.
    pub fn push(&mut self, element: Element) -> Result<usize, LayoutError> {
        let position = self.elements.len();
        if let Some(uid) = element.anchor_uid() {
            if self.headings.contains_key(uid) {
                return Err(LayoutError::DuplicateAnchor {
                    uid: uid.to_string(),
                });
            }
            self.headings.insert(uid.to_string(), position);
        }
        self.elements.push(element);
        Ok(position)
    }

    pub fn add_heading(
        &mut self,
        uid: impl Into<String>,
        text: impl Into<FormattedText>,
    ) -> Result<&mut Self, LayoutError> {
        self.push(Element::Heading {
            uid: uid.into(),
            text: text.into(),
        })?;
        Ok(self)
    }

    pub fn add_paragraph(&mut self, text: impl Into<FormattedText>) -> &mut Self {
        self.add_aligned_paragraph(text, Alignment::Left)
    }

    pub fn add_aligned_paragraph(
        &mut self,
        text: impl Into<FormattedText>,
        alignment: Alignment,
    ) -> &mut Self {
        self.elements.push(Element::Paragraph {
            text: text.into(),
            alignment,
        });
        self
    }

    /// Append interactive text that navigates to `target_uid` when clicked.
    pub fn add_link(
        &mut self,
        text: impl Into<FormattedText>,
        target_uid: impl Into<String>,
    ) -> &mut Self {
        self.elements.push(Element::Link {
            text: text.into(),
            target_uid: target_uid.into(),
        });
        self
    }

    pub fn add_image(
        &mut self,
        source: impl Into<ResourceHandle>,
        width: u32,
        height: u32,
        placement: Placement,
    ) -> &mut Self {
        self.elements.push(Element::Image {
            source: source.into(),
            width,
            height,
            placement,
        });
        self
    }

    pub fn add_icon_box(
        &mut self,
        payload: PayloadHandle,
        width: u32,
        height: u32,
        placement: Placement,
    ) -> &mut Self {
        self.elements.push(Element::IconBox {
            payload,
            width,
            height,
            placement,
        });
        self
    }

    pub fn add_page_break(&mut self) -> &mut Self {
        self.elements
            .push(Element::CompilerHint(CompilerHint::PageBreak));
        self
    }

    pub fn add_float_break(&mut self) -> &mut Self {
        self.elements
            .push(Element::CompilerHint(CompilerHint::FloatBreak));
        self
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn get(&self, position: usize) -> Option<&Element> {
        self.elements.get(position)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Sequence position of the heading with `uid`.
    pub fn heading_position(&self, uid: &str) -> Option<usize> {
        self.headings.get(uid).copied()
    }

    /// Heading uids in document order.
    pub fn heading_uids(&self) -> impl Iterator<Item = &str> + '_ {
        self.elements.iter().filter_map(Element::anchor_uid)
    }

    /// `(position, target uid)` of every link element.
    pub fn link_targets(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(idx, element)| match element {
                Element::Link { target_uid, .. } => Some((idx, target_uid.as_str())),
                _ => None,
            })
    }
}

impl TryFrom<Vec<Element>> for Document {
    type Error = LayoutError;

    fn try_from(elements: Vec<Element>) -> Result<Self, Self::Error> {
        let mut doc = Self::with_capacity(elements.len());
        for element in elements {
            doc.push(element)?;
        }
        Ok(doc)
    }
}

impl From<Document> for Vec<Element> {
    fn from(doc: Document) -> Self {
        doc.elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold(font: u32) -> TextFormat {
        TextFormat::new(FontHandle(font)).with_decorations(Decorations::BOLD)
    }

    fn assert_runs_cover(text: &FormattedText) {
        let mut cursor = 0;
        for run in text.runs() {
            assert_eq!(run.start, cursor, "runs must be contiguous");
            assert!(run.end > run.start, "runs must not be empty");
            cursor = run.end;
        }
        assert_eq!(cursor, text.len());
    }

    #[test]
    fn plain_text_has_single_inherited_run() {
        let text = FormattedText::new("The classic fable");
        assert_eq!(text.runs().len(), 1);
        assert_eq!(text.runs()[0].format, TextFormat::default());
        assert_runs_cover(&text);
    }

    #[test]
    fn empty_text_has_no_runs() {
        let text = FormattedText::new("");
        assert!(text.runs().is_empty());
        assert!(text.run_at(0).is_none());
    }

    #[test]
    fn builder_merges_spans_with_equal_format() {
        let text = FormattedText::builder()
            .push_plain("slow ")
            .push_plain("and ")
            .push("steady", bold(2))
            .build();
        assert_eq!(text.text(), "slow and steady");
        assert_eq!(text.runs().len(), 2);
        assert_eq!(text.runs()[1].range(), 9..15);
        assert_runs_cover(&text);
    }

    #[test]
    fn with_format_splits_and_merges_runs() {
        let text = FormattedText::new("tortoise and hare")
            .with_format(9..12, bold(1))
            .expect("valid range");
        assert_eq!(text.runs().len(), 3);
        assert_eq!(text.runs()[1].range(), 9..12);
        assert_eq!(text.runs()[1].format, bold(1));
        assert_runs_cover(&text);

        let restored = text
            .with_format(9..12, TextFormat::default())
            .expect("valid range");
        assert_eq!(restored.runs().len(), 1);
        assert_runs_cover(&restored);
    }

    #[test]
    fn with_format_rejects_non_char_boundary() {
        let err = FormattedText::new("h\u{e9}llo")
            .with_format(0..2, bold(1))
            .expect_err("byte 2 is inside a two-byte char");
        assert_eq!(
            err,
            LayoutError::InvalidTextRange {
                start: 0,
                end: 2,
                len: 6
            }
        );
    }

    #[test]
    fn run_queries_clip_to_range() {
        let text = FormattedText::builder()
            .push_plain("ab")
            .push("cd", bold(1))
            .push_plain("ef")
            .build();
        assert_eq!(text.run_at(3).map(|(idx, _)| idx), Some(1));
        let clipped: Vec<_> = text
            .runs_in(1..5)
            .map(|(idx, range, _)| (idx, range))
            .collect();
        assert_eq!(clipped, vec![(0, 1..2), (1, 2..4), (2, 4..5)]);
        assert_eq!(text.slice(2..4), Some("cd"));
    }

    #[test]
    fn resolve_inherits_font_and_accumulates_decorations() {
        let default = TextFormat::new(FontHandle(7))
            .with_decorations(Decorations::BOLD)
            .with_color(Color::rgb(255, 128, 64));
        let run = TextFormat::default().with_decorations(Decorations::ITALIC);
        let resolved = run.resolve(&default);
        assert_eq!(resolved.font, Some(FontHandle(7)));
        assert!(resolved
            .decorations
            .contains(Decorations::BOLD | Decorations::ITALIC));
        assert_eq!(resolved.color, Some(Color::rgb(255, 128, 64)));
    }

    #[test]
    fn duplicate_heading_uid_is_rejected_at_append() {
        let mut doc = Document::new();
        doc.add_heading("title", "The Tortoise and the Hare")
            .expect("first heading");
        doc.add_paragraph("Once upon a time.");
        let err = doc
            .add_heading("title", "Again")
            .expect_err("duplicate uid");
        assert_eq!(
            err,
            LayoutError::DuplicateAnchor {
                uid: "title".to_string()
            }
        );
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.heading_position("title"), Some(0));
    }

    #[test]
    fn builder_surface_records_elements_in_order() {
        let mut doc = Document::new();
        doc.add_image("fontbox:rocket.png", 128, 128, Placement::FloatLeft)
            .add_heading("title", "Title")
            .expect("heading")
            .add_float_break()
            .add_icon_box(PayloadHandle(264), 32, 32, Placement::AlignCenter)
            .add_link("Skip to the end", "ending")
            .add_page_break();
        let kinds: Vec<_> = doc.elements().iter().map(Element::kind).collect();
        assert_eq!(
            kinds,
            vec!["Image", "Heading", "FloatBreak", "IconBox", "Link", "PageBreak"]
        );
        assert_eq!(doc.link_targets().collect::<Vec<_>>(), vec![(4, "ending")]);
        assert_eq!(doc.heading_uids().collect::<Vec<_>>(), vec!["title"]);
    }

    #[test]
    fn json_document_rebuilds_heading_index() {
        let styled = FormattedText::new("slow and steady")
            .with_format(0..4, bold(2))
            .expect("range");
        let mut doc = Document::new();
        doc.add_heading("hare", "The Hare")
            .expect("heading")
            .add_paragraph(styled)
            .add_link("Back", "hare");
        let json = serde_json::to_string(&doc).expect("encode");
        let decoded: Document = serde_json::from_str(&json).expect("decode");
        assert_eq!(decoded, doc);
        assert_eq!(decoded.heading_position("hare"), Some(0));

        let heading = Element::Heading {
            uid: "hare".to_string(),
            text: FormattedText::new("Again"),
        };
        let duplicated = serde_json::to_string(&vec![heading.clone(), heading]).expect("encode");
        assert!(serde_json::from_str::<Document>(&duplicated).is_err());
    }

    #[test]
    fn from_runs_rejects_gaps_overlaps_and_bad_boundaries() {
        let run = |start, end| FormatRun {
            start,
            end,
            format: TextFormat::default(),
        };
        let ok = FormattedText::from_runs("hare race", vec![run(0, 4), run(4, 9)]).expect("valid");
        assert_eq!(ok.runs().len(), 2);
        assert!(FormattedText::from_runs("", Vec::new()).is_ok());

        let uncovered = FormattedText::from_runs("hare race", Vec::new());
        assert_eq!(
            uncovered,
            Err(LayoutError::InvalidTextRange {
                start: 0,
                end: 9,
                len: 9
            })
        );
        assert!(FormattedText::from_runs("hare race", vec![run(0, 4), run(5, 9)]).is_err());
        assert!(FormattedText::from_runs("hare race", vec![run(0, 5), run(4, 9)]).is_err());
        assert!(FormattedText::from_runs("hare race", vec![run(0, 0), run(0, 9)]).is_err());
        assert!(FormattedText::from_runs("hare race", vec![run(0, 12)]).is_err());
        assert!(FormattedText::from_runs("h\u{e9}", vec![run(0, 2), run(2, 3)]).is_err());
    }

    #[test]
    fn json_rejects_text_with_uncovered_runs() {
        let json = r#"[{"Paragraph":{"text":{"text":"hello world","runs":[]},"alignment":"Left"}}]"#;
        assert!(serde_json::from_str::<Document>(json).is_err());

        let backwards =
            r#"{"text":"hello","runs":[{"start":3,"end":1,"format":{"font":null,"decorations":0,"color":null}}]}"#;
        assert!(serde_json::from_str::<FormattedText>(backwards).is_err());

        let text: FormattedText = serde_json::from_str(
            &serde_json::to_string(&FormattedText::new("hello world")).expect("encode"),
        )
        .expect("decode");
        assert_eq!(text.runs().len(), 1);
    }
}
