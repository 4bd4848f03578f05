use core::ops::Range;
use fontbox::navigation::AnchorIndex;
use fontbox::{
    Alignment, CompilerHint, Decorations, Document, Element, FontHandle, FormattedText,
    LayoutError, MetricsError, Placement, TextFormat,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::page_ir::{LineFragment, LineSpan, Page, PositionedContent, PositionedElement, Rect};

/// Page size, margins, and typographic defaults for one pagination run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    /// Page width in layout units.
    pub width: u32,
    /// Page height in layout units.
    pub height: u32,
    pub margin_left: u32,
    pub margin_right: u32,
    pub margin_top: u32,
    pub margin_bottom: u32,
    /// Minimum height of every text line.
    pub base_line_height: f32,
    /// Gap after each paragraph, heading, and fixed box.
    pub inter_paragraph_spacing: f32,
    /// Extra width reserved beside every float.
    pub float_gutter: f32,
    /// Format inherited by paragraph and link runs.
    pub default_body_format: TextFormat,
    /// Format inherited by heading runs.
    pub default_heading_format: TextFormat,
    /// Fraction of the content width available to text and boxes, in (0, 1].
    pub density: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 400,
            height: 450,
            margin_left: 2,
            margin_right: 2,
            margin_top: 2,
            margin_bottom: 2,
            base_line_height: 30.0,
            inter_paragraph_spacing: 4.0,
            float_gutter: 4.0,
            default_body_format: TextFormat::default(),
            default_heading_format: TextFormat::default().with_decorations(Decorations::BOLD),
            density: 0.66,
        }
    }
}

impl PageGeometry {
    /// Convenience for a page size with the default typography.
    pub fn for_page(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_margins(mut self, left: u32, right: u32, top: u32, bottom: u32) -> Self {
        self.margin_left = left;
        self.margin_right = right;
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Density-scaled width available to lines and boxes.
    pub fn usable_width(&self) -> f32 {
        self.width as f32 * self.density - self.margin_left as f32 - self.margin_right as f32
    }

    /// Content width at density 1.0. Nothing may ever be wider.
    pub fn absolute_usable_width(&self) -> f32 {
        self.width as f32 - self.margin_left as f32 - self.margin_right as f32
    }

    pub fn content_left(&self) -> f32 {
        self.margin_left as f32
    }

    pub fn content_top(&self) -> f32 {
        self.margin_top as f32
    }

    /// Lines may not extend below this y.
    pub fn content_bottom(&self) -> f32 {
        self.height as f32 - self.margin_bottom as f32
    }

    pub fn content_height(&self) -> f32 {
        self.content_bottom() - self.content_top()
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        let invalid = |reason| Err(LayoutError::InvalidGeometry { reason });
        if self.width == 0 || self.height == 0 {
            return invalid("page width and height must be positive");
        }
        if !self.density.is_finite() || self.density <= 0.0 || self.density > 1.0 {
            return invalid("density must be in (0, 1]");
        }
        if !(self.base_line_height.is_finite() && self.base_line_height > 0.0) {
            return invalid("base line height must be positive");
        }
        if !(self.inter_paragraph_spacing.is_finite() && self.inter_paragraph_spacing >= 0.0) {
            return invalid("inter-paragraph spacing must not be negative");
        }
        if !(self.float_gutter.is_finite() && self.float_gutter >= 0.0) {
            return invalid("float gutter must not be negative");
        }
        if self.usable_width() <= 0.0 {
            return invalid("margins leave no usable width");
        }
        if self.content_height() < self.base_line_height {
            return invalid("margins leave no room for a single line");
        }
        Ok(())
    }
}

/// Advance width and line height of a measured text slice.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextMeasure {
    pub advance_width: f32,
    pub line_height: f32,
}

/// Text measurement hook used for line fitting.
///
/// Implementations must be deterministic: equal arguments always give equal
/// results. Caching is the implementation's concern.
pub trait FontMetrics: Send + Sync {
    /// Measure `text` rendered in `format`.
    fn measure(&self, format: &TextFormat, text: &str) -> Result<TextMeasure, MetricsError>;
}

/// Glyph-class width model used when no real font backend is installed.
#[derive(Clone, Debug, PartialEq)]
pub struct HeuristicFontMetrics {
    default_size: f32,
    line_height_factor: f32,
    fonts: Vec<(FontHandle, f32)>,
    strict: bool,
}

impl Default for HeuristicFontMetrics {
    fn default() -> Self {
        Self {
            default_size: 16.0,
            line_height_factor: 1.4,
            fonts: Vec::with_capacity(0),
            strict: false,
        }
    }
}

impl HeuristicFontMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pixel size used for inherited or unregistered fonts.
    pub fn with_default_size(mut self, size: f32) -> Self {
        self.default_size = size;
        self
    }

    pub fn with_line_height_factor(mut self, factor: f32) -> Self {
        self.line_height_factor = factor;
        self
    }

    /// Register `font` at `size` pixels.
    pub fn with_font(mut self, font: FontHandle, size: f32) -> Self {
        match self.fonts.iter_mut().find(|(handle, _)| *handle == font) {
            Some(entry) => entry.1 = size,
            None => self.fonts.push((font, size)),
        }
        self
    }

    /// Fail on font handles that were never registered instead of falling
    /// back to the default size.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn size_for(&self, font: Option<FontHandle>) -> Result<f32, MetricsError> {
        let Some(font) = font else {
            return Ok(self.default_size);
        };
        match self.fonts.iter().find(|(handle, _)| *handle == font) {
            Some((_, size)) => Ok(*size),
            None if self.strict => Err(MetricsError::unknown_font(Some(font))),
            None => Ok(self.default_size),
        }
    }
}

impl FontMetrics for HeuristicFontMetrics {
    fn measure(&self, format: &TextFormat, text: &str) -> Result<TextMeasure, MetricsError> {
        let size = self.size_for(format.font)?;
        let mut em_sum = 0.0f32;
        for ch in text.chars() {
            em_sum += proportional_glyph_em_width(ch);
        }
        let mut scale = 1.0f32;
        if format.decorations.contains(Decorations::BOLD) {
            scale += 0.03;
        }
        if format.decorations.contains(Decorations::ITALIC) {
            scale += 0.01;
        }
        Ok(TextMeasure {
            advance_width: em_sum * size * scale,
            line_height: (size * self.line_height_factor).round(),
        })
    }
}

fn proportional_glyph_em_width(ch: char) -> f32 {
    match ch {
        ' ' => 0.32,
        '\t' => 1.28,
        '\u{00A0}' => 0.32,
        'i' | 'l' | 'I' | '|' | '!' => 0.24,
        '.' | ',' | ':' | ';' | '\'' | '"' | '`' => 0.23,
        '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => 0.34,
        '(' | ')' | '[' | ']' | '{' | '}' => 0.30,
        'f' | 't' | 'j' | 'r' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' | '&' | '#' => 0.74,
        c if c.is_ascii_digit() => 0.52,
        c if c.is_ascii_uppercase() => 0.64,
        c if c.is_ascii_lowercase() => 0.52,
        c if c.is_whitespace() => 0.32,
        c if c.is_ascii_punctuation() => 0.42,
        _ => 0.56,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct WordPiece {
    run_index: usize,
    start: usize,
    end: usize,
    width: f32,
}

#[derive(Clone, Debug, PartialEq)]
struct MeasuredWord {
    start: usize,
    end: usize,
    width: f32,
    line_height: f32,
    /// Width of one space in the format of the word's last piece.
    space_after: f32,
    pieces: SmallVec<[WordPiece; 2]>,
}

/// A run of whole words chosen for one line, not yet positioned.
#[derive(Clone, Debug, PartialEq)]
pub struct BrokenLine {
    /// Word indices covered by the line.
    pub words: Range<usize>,
    /// Natural width: words plus one space per gap.
    pub width: f32,
    pub line_height: f32,
}

impl BrokenLine {
    pub fn gaps(&self) -> usize {
        self.words.len().saturating_sub(1)
    }
}

/// Greedy word wrapper over one formatted text.
///
/// Words are split on whitespace and measured once, per run piece, when the
/// breaker is built. Lines are then produced on demand against whatever band
/// width the caller currently has, so a paragraph flowing past a float can
/// narrow and widen line by line.
pub struct LineBreaker<'a> {
    text: &'a FormattedText,
    formats: Vec<TextFormat>,
    words: Vec<MeasuredWord>,
    next: usize,
    base_line_height: f32,
}

impl<'a> LineBreaker<'a> {
    pub fn new(
        text: &'a FormattedText,
        default_format: &TextFormat,
        base_line_height: f32,
        metrics: &dyn FontMetrics,
        element_index: usize,
    ) -> Result<Self, LayoutError> {
        let formats: Vec<TextFormat> = text
            .runs()
            .iter()
            .map(|run| run.format.resolve(default_format))
            .collect();
        let mut space_widths: Vec<Option<f32>> = vec![None; formats.len()];
        let measure = |run_index: usize, slice: &str| {
            metrics
                .measure(&formats[run_index], slice)
                .map_err(|source| LayoutError::MetricsFailure {
                    element_index,
                    run_index,
                    source,
                })
        };

        let mut words = Vec::with_capacity(text.len() / 5 + 1);
        for range in split_words(text.text()) {
            let mut pieces = SmallVec::<[WordPiece; 2]>::new();
            let mut width = 0.0f32;
            let mut line_height = base_line_height;
            for (run_index, piece, _) in text.runs_in(range.clone()) {
                let slice = text
                    .slice(piece.clone())
                    .ok_or_else(|| LayoutError::InvalidTextRange {
                        start: piece.start,
                        end: piece.end,
                        len: text.len(),
                    })?;
                let measured = measure(run_index, slice)?;
                width += measured.advance_width;
                line_height = line_height.max(measured.line_height);
                pieces.push(WordPiece {
                    run_index,
                    start: piece.start,
                    end: piece.end,
                    width: measured.advance_width,
                });
            }
            let Some(last_run) = pieces.last().map(|piece| piece.run_index) else {
                continue;
            };
            let space_after = match space_widths[last_run] {
                Some(space) => space,
                None => {
                    let space = measure(last_run, " ")?.advance_width;
                    space_widths[last_run] = Some(space);
                    space
                }
            };
            words.push(MeasuredWord {
                start: range.start,
                end: range.end,
                width,
                line_height,
                space_after,
                pieces,
            });
        }

        Ok(Self {
            text,
            formats,
            words,
            next: 0,
            base_line_height,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.words.len()
    }

    /// Width of the next word to be placed.
    pub fn peek_word_width(&self) -> Option<f32> {
        self.words.get(self.next).map(|word| word.width)
    }

    /// Line height of the next word, at least the base line height.
    pub fn peek_line_height(&self) -> f32 {
        self.words
            .get(self.next)
            .map_or(self.base_line_height, |word| word.line_height)
    }

    /// Widest word in the text.
    pub fn widest_word(&self) -> Option<(&str, f32)> {
        self.words
            .iter()
            .max_by(|a, b| a.width.total_cmp(&b.width))
            .map(|word| (self.text.slice(word.start..word.end).unwrap_or_default(), word.width))
    }

    /// Choose the next line for `band_width` without consuming it.
    ///
    /// The first word is always taken, even when it alone overflows the band.
    pub fn peek_line(&self, band_width: f32) -> Option<BrokenLine> {
        let first = self.words.get(self.next)?;
        let mut width = first.width;
        let mut line_height = first.line_height;
        let mut end = self.next + 1;
        while let Some(word) = self.words.get(end) {
            let gap = self.words[end - 1].space_after;
            let candidate = width + gap + word.width;
            if candidate > band_width {
                break;
            }
            width = candidate;
            line_height = line_height.max(word.line_height);
            end += 1;
        }
        Some(BrokenLine {
            words: self.next..end,
            width,
            line_height,
        })
    }

    /// Consume a line previously returned by [`LineBreaker::peek_line`].
    pub fn commit(&mut self, line: &BrokenLine) {
        self.next = self.next.max(line.words.end);
    }

    pub fn next_line(&mut self, band_width: f32) -> Option<BrokenLine> {
        let line = self.peek_line(band_width)?;
        self.commit(&line);
        Some(line)
    }

    fn is_last(&self, line: &BrokenLine) -> bool {
        line.words.end >= self.words.len()
    }

    /// Position `line` in a band starting at `band_x`.
    ///
    /// Returns the fragment and its drawn width.
    pub fn fragment(
        &self,
        line: &BrokenLine,
        band_x: f32,
        band_width: f32,
        alignment: Alignment,
    ) -> (LineFragment, f32, f32) {
        let slack = (band_width - line.width).max(0.0);
        let gaps = line.gaps();
        let (offset, extra_gap) = match alignment {
            Alignment::Left => (0.0, 0.0),
            Alignment::Center => (slack / 2.0, 0.0),
            Alignment::Right => (slack, 0.0),
            Alignment::Justify if gaps > 0 && !self.is_last(line) => (0.0, slack / gaps as f32),
            Alignment::Justify => (0.0, 0.0),
        };

        let words = &self.words[line.words.clone()];
        let mut text = String::with_capacity(
            words
                .iter()
                .map(|word| word.end - word.start + 1)
                .sum::<usize>(),
        );
        let mut spans = Vec::with_capacity(words.len());
        let mut x = band_x + offset;
        for (idx, word) in words.iter().enumerate() {
            if idx > 0 {
                text.push(' ');
            }
            text.push_str(self.text.slice(word.start..word.end).unwrap_or_default());
            for piece in &word.pieces {
                spans.push(LineSpan {
                    text: self
                        .text
                        .slice(piece.start..piece.end)
                        .unwrap_or_default()
                        .to_string(),
                    run_index: piece.run_index,
                    x,
                    width: piece.width,
                    format: self.formats[piece.run_index].clone(),
                });
                x += piece.width;
            }
            x += word.space_after + extra_gap;
        }

        let (text_start, text_end) = match (words.first(), words.last()) {
            (Some(first), Some(last)) => (first.start, last.end),
            _ => (0, 0),
        };
        let drawn_width = line.width + extra_gap * gaps as f32;
        (
            LineFragment {
                text,
                text_start,
                text_end,
                band_width,
                spans,
            },
            band_x + offset,
            drawn_width,
        )
    }
}

fn split_words(text: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices();
    core::iter::from_fn(move || loop {
        match chars.next() {
            Some((idx, ch)) if ch.is_whitespace() => {
                if let Some(begin) = start.take() {
                    return Some(begin..idx);
                }
            }
            Some((idx, _)) => {
                if start.is_none() {
                    start = Some(idx);
                }
            }
            None => return start.take().map(|begin| begin..text.len()),
        }
    })
}

/// Side a float is anchored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatSide {
    Left,
    Right,
}

/// One active float reservation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveFloat {
    pub side: FloatSide,
    pub top: f32,
    pub bottom: f32,
    /// Box width plus gutter.
    pub reserved: f32,
}

impl ActiveFloat {
    fn overlaps(&self, y: f32, height: f32) -> bool {
        self.top < y + height && self.bottom > y
    }
}

/// Horizontal space available to a line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Band {
    pub x: f32,
    pub width: f32,
}

/// Active float rectangles narrowing the text band.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatSet {
    active: SmallVec<[ActiveFloat; 4]>,
}

impl FloatSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, float: ActiveFloat) {
        self.active.push(float);
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveFloat> + '_ {
        self.active.iter()
    }

    /// Left and right reserved widths over `[y, y + height)`.
    pub fn reserved_at(&self, y: f32, height: f32) -> (f32, f32) {
        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for float in self.active.iter().filter(|f| f.overlaps(y, height)) {
            match float.side {
                FloatSide::Left => left += float.reserved,
                FloatSide::Right => right += float.reserved,
            }
        }
        (left, right)
    }

    /// Band left after reservations, inside `[content_x, content_x + width)`.
    pub fn band_at(&self, content_x: f32, width: f32, y: f32, height: f32) -> Band {
        let (left, right) = self.reserved_at(y, height);
        Band {
            x: content_x + left,
            width: width - left - right,
        }
    }

    /// True when any float overlaps `[y, y + height)`.
    pub fn narrows(&self, y: f32, height: f32) -> bool {
        self.active.iter().any(|f| f.overlaps(y, height))
    }

    /// Smallest bottom edge among floats overlapping `[y, y + height)`.
    pub fn earliest_bottom(&self, y: f32, height: f32) -> Option<f32> {
        self.active
            .iter()
            .filter(|f| f.overlaps(y, height))
            .map(|f| f.bottom)
            .min_by(f32::total_cmp)
    }

    /// Drop floats whose bottom edge is at or above `y`.
    pub fn expire_above(&mut self, y: f32) {
        self.active.retain(|f| f.bottom > y);
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Keep the part of each float that hangs below `old_bottom`, re-anchored
    /// at `new_top` of the next page.
    pub fn carry_to_next_page(&mut self, old_bottom: f32, new_top: f32) {
        self.active.retain(|f| f.bottom > old_bottom);
        for float in &mut self.active {
            let remaining = float.bottom - old_bottom.max(float.top);
            float.top = new_top;
            float.bottom = new_top + remaining;
        }
    }
}

/// Non-fatal layout events worth surfacing to a diagnostics sink.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutNote {
    /// Text or a box was moved down past floats to regain width.
    FloatCleared {
        element_index: usize,
        page: usize,
        from_y: f32,
        to_y: f32,
    },
    /// A single word wider than its band was placed alone on a line.
    OversizedWordPlaced {
        element_index: usize,
        page: usize,
        width: f32,
        band_width: f32,
    },
}

/// Result of one pagination pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pagination {
    pub pages: Vec<Page>,
    pub index: AnchorIndex,
    pub notes: Vec<LayoutNote>,
}

/// Stateless document-to-pages paginator.
#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentProcessor;

impl DocumentProcessor {
    /// Lay out `document` into pages.
    ///
    /// Single forward pass over the elements. Any error aborts the whole run.
    pub fn generate_pages(
        document: &Document,
        geometry: &PageGeometry,
        metrics: &dyn FontMetrics,
    ) -> Result<Pagination, LayoutError> {
        geometry.validate()?;
        validate_boxes(document, geometry)?;

        let mut st = LayoutState::new(geometry, metrics);
        for (element_index, element) in document.elements().iter().enumerate() {
            match element {
                Element::Heading { uid, text } => st.place_heading(element_index, uid, text)?,
                Element::Paragraph { text, alignment } => {
                    st.place_text(element_index, text, TextRole::Body(*alignment))?
                }
                Element::Link { text, target_uid } => {
                    st.place_text(element_index, text, TextRole::Link(target_uid))?
                }
                Element::Image {
                    source,
                    width,
                    height,
                    placement,
                } => st.place_box(
                    element_index,
                    *width as f32,
                    *height as f32,
                    *placement,
                    PositionedContent::Image {
                        source: source.clone(),
                        placement: *placement,
                    },
                ),
                Element::IconBox {
                    payload,
                    width,
                    height,
                    placement,
                } => st.place_box(
                    element_index,
                    *width as f32,
                    *height as f32,
                    *placement,
                    PositionedContent::IconBox {
                        payload: *payload,
                        placement: *placement,
                    },
                ),
                Element::CompilerHint(CompilerHint::PageBreak) => st.explicit_page_break(),
                Element::CompilerHint(CompilerHint::FloatBreak) => st.floats.clear(),
            }
        }
        Ok(st.into_pagination())
    }
}

fn validate_boxes(document: &Document, geometry: &PageGeometry) -> Result<(), LayoutError> {
    let max_width = geometry.usable_width();
    let max_height = geometry.content_height();
    for (element_index, element) in document.elements().iter().enumerate() {
        let Some((width, height, _)) = element.box_size() else {
            continue;
        };
        if width as f32 > max_width {
            return Err(LayoutError::BoxTooWide {
                element_index,
                width: width as f32,
                max_width,
            });
        }
        if height as f32 > max_height {
            return Err(LayoutError::BoxTooTall {
                element_index,
                height: height as f32,
                max_height,
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum TextRole<'d> {
    Heading(&'d str),
    Body(Alignment),
    Link(&'d str),
}

impl TextRole<'_> {
    fn alignment(self) -> Alignment {
        match self {
            Self::Body(alignment) => alignment,
            Self::Heading(_) | Self::Link(_) => Alignment::Left,
        }
    }

    fn content(self, line: LineFragment) -> PositionedContent {
        match self {
            Self::Heading(uid) => PositionedContent::HeadingLine {
                uid: uid.to_string(),
                line,
            },
            Self::Body(alignment) => PositionedContent::TextLine { line, alignment },
            Self::Link(target) => PositionedContent::LinkLine {
                target_uid: target.to_string(),
                line,
            },
        }
    }
}

/// Accumulator threaded through one pagination pass.
struct LayoutState<'a> {
    geometry: &'a PageGeometry,
    metrics: &'a dyn FontMetrics,
    cursor_y: f32,
    page: Page,
    floats: FloatSet,
    emitted: Vec<Page>,
    index: AnchorIndex,
    notes: Vec<LayoutNote>,
}

impl<'a> LayoutState<'a> {
    fn new(geometry: &'a PageGeometry, metrics: &'a dyn FontMetrics) -> Self {
        Self {
            geometry,
            metrics,
            cursor_y: geometry.content_top(),
            page: Page::new(0, geometry.width, geometry.height),
            floats: FloatSet::new(),
            emitted: Vec::with_capacity(4),
            index: AnchorIndex::new(),
            notes: Vec::with_capacity(0),
        }
    }

    fn page_no(&self) -> usize {
        self.emitted.len()
    }

    fn at_page_top(&self) -> bool {
        self.page.is_empty() && self.cursor_y <= self.geometry.content_top()
    }

    fn band(&self, height: f32) -> Band {
        self.floats.band_at(
            self.geometry.content_left(),
            self.geometry.usable_width(),
            self.cursor_y,
            height,
        )
    }

    /// Close the current page when `height` more units would cross the
    /// bottom margin. Returns whether a new page was started.
    fn ensure_room(&mut self, height: f32) -> bool {
        if self.cursor_y + height <= self.geometry.content_bottom() || self.at_page_top() {
            return false;
        }
        self.start_next_page(true);
        true
    }

    fn start_next_page(&mut self, carry_floats: bool) {
        let old_bottom = self.geometry.content_bottom();
        self.flush_page_if_non_empty();
        self.cursor_y = self.geometry.content_top();
        if carry_floats {
            self.floats.carry_to_next_page(old_bottom, self.cursor_y);
        } else {
            self.floats.clear();
        }
    }

    fn flush_page_if_non_empty(&mut self) {
        if self.page.is_empty() {
            return;
        }
        let next = Page::new(
            self.emitted.len() + 1,
            self.geometry.width,
            self.geometry.height,
        );
        let mut page = core::mem::replace(&mut self.page, next);
        page.seal();
        log::trace!(
            "closed page {} with {} static and {} dynamic elements",
            page.index,
            page.static_elements.len(),
            page.dynamic_elements.len()
        );
        self.emitted.push(page);
    }

    fn explicit_page_break(&mut self) {
        self.start_next_page(false);
    }

    fn clear_floats_to(&mut self, element_index: usize, to_y: f32) {
        self.notes.push(LayoutNote::FloatCleared {
            element_index,
            page: self.page_no(),
            from_y: self.cursor_y,
            to_y,
        });
        self.cursor_y = to_y;
        self.floats.expire_above(self.cursor_y);
    }

    /// Place a heading as one unwrapped line spanning the usable width.
    ///
    /// Floats overlapping the line are cleared first. Text wider than the
    /// usable width overflows the band; it is never wrapped or truncated.
    fn place_heading(
        &mut self,
        element_index: usize,
        uid: &str,
        text: &FormattedText,
    ) -> Result<(), LayoutError> {
        let format = self.geometry.default_heading_format.clone();
        let breaker = LineBreaker::new(
            text,
            &format,
            self.geometry.base_line_height,
            self.metrics,
            element_index,
        )?;
        let Some(line) = breaker.peek_line(f32::INFINITY) else {
            self.index.record(uid, self.page_no());
            return Ok(());
        };

        self.floats.expire_above(self.cursor_y);
        self.ensure_room(line.line_height);
        self.clear_all_floats_in(element_index, line.line_height);
        self.index.record(uid, self.page_no());

        let band_width = self.geometry.usable_width();
        if line.width > band_width {
            log::debug!(
                "heading {:?} is {:.1} wide, overflowing band {:.1}",
                uid,
                line.width,
                band_width
            );
        }
        let (fragment, x, width) = breaker.fragment(
            &line,
            self.geometry.content_left(),
            band_width,
            Alignment::Left,
        );
        self.page.push(PositionedElement {
            element_index,
            bounds: Rect::new(x, self.cursor_y, width, line.line_height),
            content: TextRole::Heading(uid).content(fragment),
        });
        self.cursor_y += line.line_height + self.geometry.inter_paragraph_spacing;
        Ok(())
    }

    /// Move the cursor below every float overlapping `[cursor_y, cursor_y +
    /// height)`, turning the page when that leaves no room.
    fn clear_all_floats_in(&mut self, element_index: usize, height: f32) {
        while let Some(bottom) = self.floats.earliest_bottom(self.cursor_y, height) {
            self.clear_floats_to(element_index, bottom);
            self.ensure_room(height);
        }
    }

    fn place_text(
        &mut self,
        element_index: usize,
        text: &FormattedText,
        role: TextRole<'_>,
    ) -> Result<(), LayoutError> {
        let format = self.geometry.default_body_format.clone();
        self.place_lines(element_index, text, &format, role)
    }

    fn place_lines(
        &mut self,
        element_index: usize,
        text: &FormattedText,
        default_format: &TextFormat,
        role: TextRole<'_>,
    ) -> Result<(), LayoutError> {
        let mut breaker = LineBreaker::new(
            text,
            default_format,
            self.geometry.base_line_height,
            self.metrics,
            element_index,
        )?;
        if let Some((word, width)) = breaker.widest_word() {
            let max_width = self.geometry.absolute_usable_width();
            if width > max_width {
                return Err(LayoutError::WordTooWide {
                    element_index,
                    word: word.to_string(),
                    width,
                    max_width,
                });
            }
        }
        if breaker.is_finished() {
            return Ok(());
        }

        while !breaker.is_finished() {
            self.floats.expire_above(self.cursor_y);
            let (line, band) = self.fit_next_line(element_index, &breaker);
            if self.ensure_room(line.line_height) {
                continue;
            }
            if line.words.len() == 1 && line.width > band.width {
                self.notes.push(LayoutNote::OversizedWordPlaced {
                    element_index,
                    page: self.page_no(),
                    width: line.width,
                    band_width: band.width,
                });
            }
            let (fragment, x, width) =
                breaker.fragment(&line, band.x, band.width, role.alignment());
            self.page.push(PositionedElement {
                element_index,
                bounds: Rect::new(x, self.cursor_y, width, line.line_height),
                content: role.content(fragment),
            });
            self.cursor_y += line.line_height;
            breaker.commit(&line);
        }
        self.cursor_y += self.geometry.inter_paragraph_spacing;
        Ok(())
    }

    /// Pick the next line at the cursor, clearing down past floats when the
    /// narrowed band cannot take even its first word.
    fn fit_next_line(
        &mut self,
        element_index: usize,
        breaker: &LineBreaker<'_>,
    ) -> (BrokenLine, Band) {
        loop {
            let mut height = breaker.peek_line_height();
            let mut band = self.band(height);
            let word_width = breaker.peek_word_width().unwrap_or_default();
            if word_width > band.width && self.floats.narrows(self.cursor_y, height) {
                if let Some(bottom) = self.floats.earliest_bottom(self.cursor_y, height) {
                    self.clear_floats_to(element_index, bottom);
                    continue;
                }
            }
            // A taller line can reach floats the first guess did not cover.
            for _ in 0..4 {
                let Some(line) = breaker.peek_line(band.width) else {
                    break;
                };
                if line.line_height <= height {
                    return (line, band);
                }
                height = line.line_height;
                band = self.band(height);
            }
            if let Some(line) = breaker.peek_line(band.width) {
                return (line, band);
            }
            return (
                BrokenLine {
                    words: 0..0,
                    width: 0.0,
                    line_height: height,
                },
                band,
            );
        }
    }

    fn place_box(
        &mut self,
        element_index: usize,
        width: f32,
        height: f32,
        placement: Placement,
        content: PositionedContent,
    ) {
        self.floats.expire_above(self.cursor_y);
        self.ensure_room(height);
        match placement {
            Placement::FloatLeft | Placement::FloatRight => {
                self.place_float(element_index, width, height, placement, content)
            }
            Placement::AlignCenter => {
                self.clear_all_floats_in(element_index, height);
                let x = self.geometry.content_left()
                    + ((self.geometry.usable_width() - width) / 2.0).max(0.0);
                self.page.push(PositionedElement {
                    element_index,
                    bounds: Rect::new(x, self.cursor_y, width, height),
                    content,
                });
                self.cursor_y += height + self.geometry.inter_paragraph_spacing;
            }
            Placement::Inline => {
                loop {
                    let band = self.band(height);
                    if width <= band.width || !self.floats.narrows(self.cursor_y, height) {
                        break;
                    }
                    let Some(bottom) = self.floats.earliest_bottom(self.cursor_y, height) else {
                        break;
                    };
                    self.clear_floats_to(element_index, bottom);
                    self.ensure_room(height);
                }
                let band = self.band(height);
                self.page.push(PositionedElement {
                    element_index,
                    bounds: Rect::new(band.x, self.cursor_y, width, height),
                    content,
                });
                self.cursor_y += height + self.geometry.inter_paragraph_spacing;
            }
        }
    }

    /// Register a float at the cursor without advancing it.
    fn place_float(
        &mut self,
        element_index: usize,
        width: f32,
        height: f32,
        placement: Placement,
        content: PositionedContent,
    ) {
        let reserved = width + self.geometry.float_gutter;
        let mut top = self.stack_float_top(self.cursor_y, width, height);
        if top + height > self.geometry.content_bottom() && !self.at_page_top() {
            self.start_next_page(true);
            top = self.stack_float_top(self.cursor_y, width, height);
        }

        let (left, right) = self.floats.reserved_at(top, height);
        let (side, x) = match placement {
            Placement::FloatRight => (
                FloatSide::Right,
                self.geometry.content_left() + self.geometry.usable_width() - right - width,
            ),
            _ => (FloatSide::Left, self.geometry.content_left() + left),
        };
        self.floats.push(ActiveFloat {
            side,
            top,
            bottom: top + height,
            reserved,
        });
        self.page.push(PositionedElement {
            element_index,
            bounds: Rect::new(x, top, width, height),
            content,
        });
    }

    /// First y at or below `top` where a float of `width` fits beside the
    /// floats already active. Side-by-side floats that no longer fit stack
    /// below the earliest one.
    fn stack_float_top(&self, mut top: f32, width: f32, height: f32) -> f32 {
        loop {
            let (left, right) = self.floats.reserved_at(top, height);
            if left + right + width <= self.geometry.usable_width() {
                return top;
            }
            match self.floats.earliest_bottom(top, height) {
                Some(bottom) if bottom > top => top = bottom,
                _ => return top,
            }
        }
    }

    fn into_pagination(mut self) -> Pagination {
        self.flush_page_if_non_empty();
        Pagination {
            pages: self.emitted,
            index: self.index,
            notes: self.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fontbox::PayloadHandle;

    /// Every char is 10 units wide, lines are 10 units tall.
    struct FixedMetrics;

    impl FontMetrics for FixedMetrics {
        fn measure(&self, _format: &TextFormat, text: &str) -> Result<TextMeasure, MetricsError> {
            Ok(TextMeasure {
                advance_width: text.chars().count() as f32 * 10.0,
                line_height: 10.0,
            })
        }
    }

    struct FailingMetrics(FontHandle);

    impl FontMetrics for FailingMetrics {
        fn measure(&self, format: &TextFormat, text: &str) -> Result<TextMeasure, MetricsError> {
            if format.font == Some(self.0) {
                return Err(MetricsError::unknown_font(format.font));
            }
            FixedMetrics.measure(format, text)
        }
    }

    fn geometry(width: u32, height: u32) -> PageGeometry {
        PageGeometry {
            width,
            height,
            margin_left: 0,
            margin_right: 0,
            margin_top: 0,
            margin_bottom: 0,
            base_line_height: 10.0,
            inter_paragraph_spacing: 0.0,
            float_gutter: 0.0,
            density: 1.0,
            ..PageGeometry::default()
        }
    }

    fn text_lines(page: &Page) -> Vec<&PositionedElement> {
        page.elements()
            .filter(|el| el.content.line().is_some())
            .collect()
    }

    #[test]
    fn split_words_collapses_whitespace() {
        let words: Vec<_> = split_words("  slow \t and\nsteady ").collect();
        assert_eq!(words, vec![2..6, 9..12, 13..19]);
    }

    #[test]
    fn breaker_fills_band_greedily() {
        let text = FormattedText::new("aa bb cc dd");
        let mut breaker =
            LineBreaker::new(&text, &TextFormat::default(), 10.0, &FixedMetrics, 0).expect("ok");
        let first = breaker.next_line(50.0).expect("line");
        assert_eq!(first.words, 0..2);
        assert_eq!(first.width, 50.0);
        let second = breaker.next_line(80.0).expect("line");
        assert_eq!(second.words, 2..4);
        assert!(breaker.next_line(80.0).is_none());
    }

    #[test]
    fn breaker_places_oversized_word_alone() {
        let text = FormattedText::new("a enormous b");
        let mut breaker =
            LineBreaker::new(&text, &TextFormat::default(), 10.0, &FixedMetrics, 0).expect("ok");
        assert_eq!(breaker.next_line(40.0).expect("line").words, 0..1);
        let oversized = breaker.next_line(40.0).expect("line");
        assert_eq!(oversized.words, 1..2);
        assert_eq!(oversized.width, 80.0);
    }

    #[test]
    fn breaker_measures_run_pieces_separately() {
        let bold = TextFormat::new(FontHandle(1)).with_decorations(Decorations::BOLD);
        let text = FormattedText::builder()
            .push_plain("tor")
            .push("toise", bold.clone())
            .build();
        let breaker =
            LineBreaker::new(&text, &TextFormat::default(), 10.0, &FixedMetrics, 0).expect("ok");
        let line = breaker.peek_line(200.0).expect("line");
        let (fragment, _, _) = breaker.fragment(&line, 0.0, 200.0, Alignment::Left);
        assert_eq!(fragment.text, "tortoise");
        assert_eq!(fragment.spans.len(), 2);
        assert_eq!(fragment.spans[1].x, 30.0);
        assert_eq!(fragment.spans[1].format, bold);
    }

    #[test]
    fn breaker_reports_failing_run() {
        let text = FormattedText::builder()
            .push_plain("fine ")
            .push("broken", TextFormat::new(FontHandle(9)))
            .build();
        let err = match LineBreaker::new(
            &text,
            &TextFormat::default(),
            10.0,
            &FailingMetrics(FontHandle(9)),
            3,
        ) {
            Ok(_) => panic!("expected metrics failure"),
            Err(err) => err,
        };
        assert_eq!(err.element_index(), Some(3));
        assert!(matches!(err, LayoutError::MetricsFailure { run_index: 1, .. }));
    }

    #[test]
    fn alignment_shifts_and_justifies_lines() {
        let text = FormattedText::new("aa bb cc");
        let breaker =
            LineBreaker::new(&text, &TextFormat::default(), 10.0, &FixedMetrics, 0).expect("ok");
        let line = breaker.peek_line(60.0).expect("line");
        assert_eq!(line.width, 50.0);

        let (_, x, width) = breaker.fragment(&line, 0.0, 60.0, Alignment::Right);
        assert_eq!((x, width), (10.0, 50.0));
        let (_, x, _) = breaker.fragment(&line, 0.0, 60.0, Alignment::Center);
        assert_eq!(x, 5.0);
        let (fragment, x, width) = breaker.fragment(&line, 0.0, 60.0, Alignment::Justify);
        assert_eq!((x, width), (0.0, 60.0));
        assert_eq!(fragment.spans[1].x, 40.0);
    }

    #[test]
    fn justify_leaves_last_line_ragged() {
        let text = FormattedText::new("aa bb");
        let breaker =
            LineBreaker::new(&text, &TextFormat::default(), 10.0, &FixedMetrics, 0).expect("ok");
        let line = breaker.peek_line(100.0).expect("line");
        let (_, _, width) = breaker.fragment(&line, 0.0, 100.0, Alignment::Justify);
        assert_eq!(width, 50.0);
    }

    #[test]
    fn float_set_narrows_and_expires() {
        let mut floats = FloatSet::new();
        floats.push(ActiveFloat {
            side: FloatSide::Left,
            top: 0.0,
            bottom: 20.0,
            reserved: 30.0,
        });
        floats.push(ActiveFloat {
            side: FloatSide::Right,
            top: 10.0,
            bottom: 40.0,
            reserved: 20.0,
        });
        assert_eq!(floats.band_at(0.0, 100.0, 0.0, 10.0), Band { x: 30.0, width: 70.0 });
        assert_eq!(floats.band_at(0.0, 100.0, 10.0, 10.0), Band { x: 30.0, width: 50.0 });
        assert_eq!(floats.earliest_bottom(10.0, 10.0), Some(20.0));
        floats.expire_above(20.0);
        assert_eq!(floats.len(), 1);
        assert_eq!(floats.band_at(0.0, 100.0, 20.0, 10.0), Band { x: 0.0, width: 80.0 });
    }

    #[test]
    fn float_set_carries_remaining_span() {
        let mut floats = FloatSet::new();
        floats.push(ActiveFloat {
            side: FloatSide::Left,
            top: 80.0,
            bottom: 130.0,
            reserved: 10.0,
        });
        floats.push(ActiveFloat {
            side: FloatSide::Left,
            top: 10.0,
            bottom: 50.0,
            reserved: 10.0,
        });
        floats.carry_to_next_page(100.0, 5.0);
        let carried: Vec<_> = floats.iter().copied().collect();
        assert_eq!(carried.len(), 1);
        assert_eq!((carried[0].top, carried[0].bottom), (5.0, 35.0));
    }

    #[test]
    fn geometry_validation_rejects_bad_density() {
        let err = geometry(100, 100).with_density(1.5).validate();
        assert!(matches!(err, Err(LayoutError::InvalidGeometry { .. })));
        assert!(geometry(100, 100).validate().is_ok());
        let no_width = geometry(100, 100).with_margins(50, 50, 0, 0).validate();
        assert!(no_width.is_err());
    }

    #[test]
    fn usable_width_applies_density_before_margins() {
        let geometry = PageGeometry::for_page(400, 450);
        assert!((geometry.usable_width() - (400.0 * 0.66 - 4.0)).abs() < 1e-3);
        assert_eq!(geometry.absolute_usable_width(), 396.0);
    }

    #[test]
    fn heuristic_metrics_strict_mode_rejects_unknown_font() {
        let metrics = HeuristicFontMetrics::new()
            .with_font(FontHandle(1), 12.0)
            .strict(true);
        assert!(metrics
            .measure(&TextFormat::new(FontHandle(1)), "hare")
            .is_ok());
        assert!(metrics.measure(&TextFormat::default(), "hare").is_ok());
        let err = metrics
            .measure(&TextFormat::new(FontHandle(2)), "hare")
            .expect_err("unknown font");
        assert_eq!(err.font, Some(FontHandle(2)));
    }

    #[test]
    fn heuristic_metrics_bold_is_wider() {
        let metrics = HeuristicFontMetrics::new();
        let plain = metrics.measure(&TextFormat::default(), "tortoise").expect("ok");
        let bold = metrics
            .measure(
                &TextFormat::default().with_decorations(Decorations::BOLD),
                "tortoise",
            )
            .expect("ok");
        assert!(bold.advance_width > plain.advance_width);
        assert_eq!(plain.line_height, bold.line_height);
    }

    #[test]
    fn paragraph_overflows_onto_new_page() {
        let mut doc = Document::new();
        doc.add_paragraph("aa bb cc dd ee ff");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(50, 20), &FixedMetrics)
            .expect("paginate");
        assert_eq!(out.pages.len(), 2);
        assert_eq!(out.pages[0].plain_text(), "aa bb\ncc dd");
        assert_eq!(out.pages[1].plain_text(), "ee ff");
        assert_eq!(out.pages[1].index, 1);
    }

    #[test]
    fn heading_anchor_records_page_after_break() {
        let mut doc = Document::new();
        doc.add_paragraph("aa bb cc dd");
        doc.add_heading("moral", "moral").expect("heading");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(50, 20), &FixedMetrics)
            .expect("paginate");
        assert_eq!(out.pages.len(), 2);
        assert_eq!(out.index.find("moral"), Some(1));
        let heading = &out.pages[1].static_elements[0];
        assert!(matches!(
            heading.content,
            PositionedContent::HeadingLine { ref uid, .. } if uid == "moral"
        ));
    }

    #[test]
    fn heading_wider_than_band_stays_one_line() {
        let mut doc = Document::new();
        doc.add_heading("t", "aaaa bbbb cccc").expect("heading");
        doc.add_paragraph("zz");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(60, 100), &FixedMetrics)
            .expect("paginate");
        assert_eq!(out.pages.len(), 1);
        let lines = text_lines(&out.pages[0]);
        assert_eq!(lines.len(), 2);
        match &lines[0].content {
            PositionedContent::HeadingLine { uid, line } => {
                assert_eq!(uid, "t");
                assert_eq!(line.text, "aaaa bbbb cccc");
                assert_eq!(line.band_width, 60.0);
            }
            other => panic!("expected heading, got {:?}", other),
        }
        assert_eq!(lines[0].bounds, Rect::new(0.0, 0.0, 140.0, 10.0));
        assert_eq!(lines[1].bounds.y, 10.0);
        assert_eq!(out.index.find("t"), Some(0));
    }

    #[test]
    fn heading_is_never_split_across_pages() {
        let mut doc = Document::new();
        doc.add_paragraph("aa bb cc dd");
        doc.add_heading("h", "xx yy zz").expect("heading");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(30, 30), &FixedMetrics)
            .expect("paginate");
        let headings: Vec<_> = out
            .pages
            .iter()
            .flat_map(|page| page.elements().map(move |el| (page.index, el)))
            .filter(|(_, el)| matches!(el.content, PositionedContent::HeadingLine { .. }))
            .collect();
        assert_eq!(headings.len(), 1);
        let (page, heading) = headings[0];
        assert_eq!(out.index.find("h"), Some(page));
        assert_eq!(heading.bounds.height, 10.0);
        assert_eq!(heading.content.line().map(|l| l.text.as_str()), Some("xx yy zz"));
    }

    #[test]
    fn heading_clears_active_float() {
        let mut doc = Document::new();
        doc.add_image("fontbox:hare.png", 30, 20, Placement::FloatLeft);
        doc.add_heading("h", "moral").expect("heading");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(80, 100), &FixedMetrics)
            .expect("paginate");
        let heading = text_lines(&out.pages[0])[0];
        assert_eq!((heading.bounds.x, heading.bounds.y), (0.0, 20.0));
        assert_eq!(heading.content.line().map(|l| l.band_width), Some(80.0));
    }

    #[test]
    fn float_narrows_following_lines_until_its_bottom() {
        let mut doc = Document::new();
        doc.add_image("fontbox:hare.png", 30, 20, Placement::FloatLeft);
        doc.add_paragraph("aa bb cc dd ee");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(80, 100), &FixedMetrics)
            .expect("paginate");
        let lines = text_lines(&out.pages[0]);
        assert_eq!(lines[0].bounds.x, 30.0);
        assert_eq!(lines[0].bounds.width, 50.0);
        assert_eq!(lines[1].bounds.x, 30.0);
        assert_eq!(lines[2].bounds.x, 0.0);
        assert_eq!(out.pages[0].plain_text(), "aa bb\ncc dd\nee");
    }

    #[test]
    fn right_float_reserves_right_edge() {
        let mut doc = Document::new();
        doc.add_icon_box(PayloadHandle(1), 30, 20, Placement::FloatRight);
        doc.add_paragraph("aa bb cc");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(80, 100), &FixedMetrics)
            .expect("paginate");
        let page = &out.pages[0];
        assert_eq!(page.dynamic_elements[0].bounds.x, 50.0);
        let lines = text_lines(page);
        assert_eq!(lines[0].bounds.x, 0.0);
        assert!(lines[0].bounds.right() <= 50.0);
    }

    #[test]
    fn word_wider_than_narrowed_band_clears_past_float() {
        let mut doc = Document::new();
        doc.add_image("fontbox:rocket.png", 50, 20, Placement::FloatLeft);
        doc.add_paragraph("abcdef");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(80, 100), &FixedMetrics)
            .expect("paginate");
        let line = text_lines(&out.pages[0])[0];
        assert_eq!((line.bounds.x, line.bounds.y), (0.0, 20.0));
        assert!(matches!(
            out.notes[0],
            LayoutNote::FloatCleared { to_y, .. } if to_y == 20.0
        ));
    }

    #[test]
    fn word_wider_than_page_is_rejected() {
        let mut doc = Document::new();
        doc.add_paragraph("ok unbreakablefoxtrot");
        let err = DocumentProcessor::generate_pages(&doc, &geometry(100, 100), &FixedMetrics)
            .expect_err("too wide");
        assert!(matches!(err, LayoutError::WordTooWide { element_index: 0, .. }));
    }

    #[test]
    fn oversized_word_within_page_width_is_placed_alone() {
        let mut doc = Document::new();
        doc.add_paragraph("a abcdefgh b");
        let geometry = geometry(100, 100).with_density(0.5);
        let out =
            DocumentProcessor::generate_pages(&doc, &geometry, &FixedMetrics).expect("paginate");
        assert_eq!(out.pages[0].plain_text(), "a\nabcdefgh\nb");
        assert!(out
            .notes
            .iter()
            .any(|note| matches!(note, LayoutNote::OversizedWordPlaced { width, .. } if *width == 80.0)));
    }

    #[test]
    fn inline_and_centered_boxes_advance_cursor() {
        let mut doc = Document::new();
        doc.add_image("fontbox:a.png", 20, 30, Placement::Inline);
        doc.add_image("fontbox:b.png", 20, 30, Placement::AlignCenter);
        let out = DocumentProcessor::generate_pages(&doc, &geometry(100, 100), &FixedMetrics)
            .expect("paginate");
        let elements = &out.pages[0].static_elements;
        assert_eq!(elements[0].bounds, Rect::new(0.0, 0.0, 20.0, 30.0));
        assert_eq!(elements[1].bounds, Rect::new(40.0, 30.0, 20.0, 30.0));
    }

    #[test]
    fn centered_box_beside_float_centers_in_usable_width() {
        let mut doc = Document::new();
        doc.add_image("fontbox:hare.png", 30, 20, Placement::FloatLeft);
        doc.add_image("fontbox:race.png", 20, 10, Placement::AlignCenter);
        let out = DocumentProcessor::generate_pages(&doc, &geometry(100, 100), &FixedMetrics)
            .expect("paginate");
        let elements = &out.pages[0].static_elements;
        let (float, centered) = (elements[0].bounds, elements[1].bounds);
        assert_eq!(centered, Rect::new(40.0, 20.0, 20.0, 10.0));
        assert!(!centered.intersects(&float));
    }

    #[test]
    fn float_moved_to_next_page_stacks_below_carried_float() {
        let geometry = geometry(100, 50);
        let mut state = LayoutState::new(&geometry, &FixedMetrics);
        let icon = |n| PositionedContent::IconBox {
            payload: PayloadHandle(n),
            placement: Placement::FloatLeft,
        };
        state.page.push(PositionedElement {
            element_index: 0,
            bounds: Rect::new(0.0, 30.0, 60.0, 40.0),
            content: icon(0),
        });
        state.floats.push(ActiveFloat {
            side: FloatSide::Left,
            top: 30.0,
            bottom: 70.0,
            reserved: 60.0,
        });
        state.cursor_y = 30.0;

        state.place_float(1, 60.0, 30.0, Placement::FloatLeft, icon(1));
        assert_eq!(state.page_no(), 1);
        let carried = state.floats.iter().next().copied().expect("carried float");
        assert_eq!((carried.top, carried.bottom), (0.0, 20.0));
        let placed = state.page.dynamic_elements.last().expect("placed float").bounds;
        assert_eq!(placed.y, 20.0);
        let carried_rect = Rect::new(0.0, carried.top, 60.0, carried.bottom - carried.top);
        assert!(!placed.intersects(&carried_rect));
    }

    #[test]
    fn float_that_does_not_fit_moves_to_next_page() {
        let mut doc = Document::new();
        doc.add_paragraph("aa");
        doc.add_image("fontbox:tall.png", 20, 40, Placement::FloatLeft);
        let out = DocumentProcessor::generate_pages(&doc, &geometry(100, 45), &FixedMetrics)
            .expect("paginate");
        assert_eq!(out.pages.len(), 2);
        assert_eq!(out.pages[1].static_elements[0].bounds.y, 0.0);
    }

    #[test]
    fn page_break_drops_floats() {
        let mut doc = Document::new();
        doc.add_image("fontbox:hare.png", 30, 50, Placement::FloatLeft);
        doc.add_page_break();
        doc.add_paragraph("aa");
        let out = DocumentProcessor::generate_pages(&doc, &geometry(80, 100), &FixedMetrics)
            .expect("paginate");
        assert_eq!(out.pages.len(), 2);
        assert_eq!(text_lines(&out.pages[1])[0].bounds.x, 0.0);
    }

    #[test]
    fn leading_and_repeated_page_breaks_do_not_emit_blank_pages() {
        let mut doc = Document::new();
        doc.add_page_break();
        doc.add_paragraph("aa");
        doc.add_page_break();
        doc.add_page_break();
        let out = DocumentProcessor::generate_pages(&doc, &geometry(80, 100), &FixedMetrics)
            .expect("paginate");
        assert_eq!(out.pages.len(), 1);
    }

    #[test]
    fn metrics_failure_aborts_whole_run() {
        let mut doc = Document::new();
        doc.add_paragraph("fine");
        doc.add_paragraph(FormattedText::styled("broken", TextFormat::new(FontHandle(4))));
        let err = DocumentProcessor::generate_pages(
            &doc,
            &geometry(100, 100),
            &FailingMetrics(FontHandle(4)),
        )
        .expect_err("metrics failure");
        assert!(matches!(
            err,
            LayoutError::MetricsFailure {
                element_index: 1,
                run_index: 0,
                ..
            }
        ));
    }

    #[test]
    fn box_taller_than_content_area_is_rejected() {
        let mut doc = Document::new();
        doc.add_image("fontbox:tall.png", 10, 200, Placement::Inline);
        let err = DocumentProcessor::generate_pages(&doc, &geometry(100, 100), &FixedMetrics)
            .expect_err("too tall");
        assert!(matches!(err, LayoutError::BoxTooTall { element_index: 0, .. }));
    }
}
