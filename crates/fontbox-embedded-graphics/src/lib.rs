//! embedded-graphics backend for `fontbox-layout` pages.
//!
//! [`MonoFontMetrics`] measures text with the same mono fonts that
//! [`EgPageRenderer`] draws with, so line fitting during pagination matches
//! what ends up on the display.

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

use embedded_graphics::{
    mono_font::{
        ascii::{
            FONT_10X20, FONT_6X13_BOLD, FONT_6X13_ITALIC, FONT_6X9, FONT_7X13_ITALIC, FONT_7X14,
            FONT_7X14_BOLD, FONT_8X13, FONT_8X13_BOLD, FONT_8X13_ITALIC, FONT_9X18,
            FONT_9X18_BOLD,
        },
        MonoFont, MonoTextStyle, MonoTextStyleBuilder,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use fontbox::{Decorations, FontHandle, MetricsError, TextFormat};
use fontbox_layout::{
    BookView, FontMetrics, LineFragment, Page, PositionedContent, PositionedElement, TextMeasure,
};
use std::sync::Arc;

/// Size bucket a font handle maps to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MonoFontSize {
    Small,
    #[default]
    Medium,
    Large,
    ExtraLarge,
}

/// Why face selection had to fall back to a substitute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontFallbackReason {
    UnknownFontHandle,
    UnsupportedWeightItalic,
}

/// Resolved face for a text format.
#[derive(Clone, Copy, Debug)]
pub struct FaceSelection {
    pub font: &'static MonoFont<'static>,
    pub fallback_reason: Option<FontFallbackReason>,
}

/// `FontMetrics` adapter over embedded-graphics mono fonts.
#[derive(Clone, Debug)]
pub struct MonoFontMetrics {
    fonts: Vec<(FontHandle, MonoFontSize)>,
    default_size: MonoFontSize,
    line_gap: u32,
    strict: bool,
}

impl Default for MonoFontMetrics {
    fn default() -> Self {
        Self {
            fonts: Vec::new(),
            default_size: MonoFontSize::default(),
            line_gap: 2,
            strict: false,
        }
    }
}

impl MonoFontMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared metrics trait object for engine wiring.
    pub fn shared(self) -> Arc<dyn FontMetrics> {
        Arc::new(self)
    }

    /// Map `font` to a size bucket.
    pub fn with_font(mut self, font: FontHandle, size: MonoFontSize) -> Self {
        match self.fonts.iter_mut().find(|(handle, _)| *handle == font) {
            Some(entry) => entry.1 = size,
            None => self.fonts.push((font, size)),
        }
        self
    }

    /// Size used for inherited formats (no font handle).
    pub fn with_default_size(mut self, size: MonoFontSize) -> Self {
        self.default_size = size;
        self
    }

    /// Extra pixels between lines on top of the glyph cell height.
    pub fn with_line_gap(mut self, line_gap: u32) -> Self {
        self.line_gap = line_gap;
        self
    }

    /// Reject unmapped font handles instead of using the default size.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn size_for(&self, font: Option<FontHandle>) -> (MonoFontSize, Option<FontFallbackReason>) {
        let Some(font) = font else {
            return (self.default_size, None);
        };
        match self.fonts.iter().find(|(handle, _)| *handle == font) {
            Some((_, size)) => (*size, None),
            None => (
                self.default_size,
                Some(FontFallbackReason::UnknownFontHandle),
            ),
        }
    }

    /// Face used to draw and measure `format`, never failing.
    pub fn select_face(&self, format: &TextFormat) -> FaceSelection {
        let (size, size_fallback) = self.size_for(format.font);
        let bold = format.decorations.contains(Decorations::BOLD);
        let italic = format.decorations.contains(Decorations::ITALIC);
        let (font, face_fallback) = face_for(size, bold, italic);
        FaceSelection {
            font,
            fallback_reason: size_fallback.or(face_fallback),
        }
    }

    fn face(&self, format: &TextFormat) -> Result<&'static MonoFont<'static>, MetricsError> {
        let selection = self.select_face(format);
        match selection.fallback_reason {
            Some(FontFallbackReason::UnknownFontHandle) if self.strict => {
                Err(MetricsError::unknown_font(format.font))
            }
            Some(reason) => {
                log::trace!("font {:?} fell back: {:?}", format.font, reason);
                Ok(selection.font)
            }
            None => Ok(selection.font),
        }
    }
}

impl FontMetrics for MonoFontMetrics {
    fn measure(&self, format: &TextFormat, text: &str) -> Result<TextMeasure, MetricsError> {
        let font = self.face(format)?;
        let advance = font.character_size.width + font.character_spacing;
        let chars = text.chars().count() as u32;
        Ok(TextMeasure {
            advance_width: (chars * advance) as f32,
            line_height: (font.character_size.height + self.line_gap) as f32,
        })
    }
}

fn face_for(
    size: MonoFontSize,
    bold: bool,
    italic: bool,
) -> (&'static MonoFont<'static>, Option<FontFallbackReason>) {
    let unsupported = Some(FontFallbackReason::UnsupportedWeightItalic);
    match (size, bold, italic) {
        (MonoFontSize::Small, false, false) => (&FONT_6X9, None),
        (MonoFontSize::Small, false, true) => (&FONT_6X13_ITALIC, None),
        (MonoFontSize::Small, true, false) => (&FONT_6X13_BOLD, None),
        (MonoFontSize::Small, true, true) => (&FONT_6X13_BOLD, unsupported),
        (MonoFontSize::Medium, false, false) => (&FONT_7X14, None),
        (MonoFontSize::Medium, false, true) => (&FONT_7X13_ITALIC, None),
        (MonoFontSize::Medium, true, false) => (&FONT_7X14_BOLD, None),
        (MonoFontSize::Medium, true, true) => (&FONT_7X14_BOLD, unsupported),
        (MonoFontSize::Large, false, false) => (&FONT_8X13, None),
        (MonoFontSize::Large, false, true) => (&FONT_8X13_ITALIC, None),
        (MonoFontSize::Large, true, false) => (&FONT_8X13_BOLD, None),
        (MonoFontSize::Large, true, true) => (&FONT_8X13_BOLD, unsupported),
        (MonoFontSize::ExtraLarge, false, false) => (&FONT_10X20, None),
        (MonoFontSize::ExtraLarge, false, true) => (&FONT_9X18, unsupported),
        (MonoFontSize::ExtraLarge, true, false) => (&FONT_9X18_BOLD, None),
        (MonoFontSize::ExtraLarge, true, true) => (&FONT_9X18_BOLD, unsupported),
    }
}

/// Page executor drawing positioned elements to a binary display.
#[derive(Clone, Debug, Default)]
pub struct EgPageRenderer {
    metrics: MonoFontMetrics,
}

impl EgPageRenderer {
    /// Render with the faces `metrics` selects, so drawing matches measurement.
    pub fn new(metrics: MonoFontMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &MonoFontMetrics {
        &self.metrics
    }

    /// Draw static then dynamic elements of `page` with its top-left at
    /// `origin`.
    pub fn draw_page<D>(&self, page: &Page, origin: Point, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        self.draw_page_statics(page, origin, display)?;
        self.draw_page_dynamics(page, origin, display)
    }

    /// Draw only the cacheable part of `page`.
    pub fn draw_page_statics<D>(
        &self,
        page: &Page,
        origin: Point,
        display: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        for element in &page.static_elements {
            self.draw_element(element, origin, display)?;
        }
        Ok(())
    }

    /// Draw only the per-frame part of `page`.
    pub fn draw_page_dynamics<D>(
        &self,
        page: &Page,
        origin: Point,
        display: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        for element in &page.dynamic_elements {
            self.draw_element(element, origin, display)?;
        }
        Ok(())
    }

    /// Draw every visible page of `view` at its slot offset from `origin`.
    pub fn draw_spread<D>(&self, view: &BookView, origin: Point, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        for (slot, page) in view.visible() {
            self.draw_page(page, origin + Point::new(slot.x, slot.y), display)?;
        }
        Ok(())
    }

    fn draw_element<D>(
        &self,
        element: &PositionedElement,
        origin: Point,
        display: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let top_left = origin + Point::new(element.bounds.x as i32, element.bounds.y as i32);
        let size = Size::new(
            (element.bounds.width.max(1.0)) as u32,
            (element.bounds.height.max(1.0)) as u32,
        );
        match &element.content {
            PositionedContent::HeadingLine { line, .. } | PositionedContent::TextLine { line, .. } => {
                self.draw_line(line, origin, top_left.y, false, display)
            }
            PositionedContent::LinkLine { line, .. } => {
                self.draw_line(line, origin, top_left.y, true, display)
            }
            PositionedContent::Image { source, .. } => {
                Rectangle::new(top_left, size)
                    .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
                    .draw(display)?;
                self.draw_image_label(source.as_str(), top_left, size, display)
            }
            PositionedContent::IconBox { .. } => {
                Rectangle::new(top_left, size)
                    .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
                    .draw(display)
            }
        }
    }

    fn draw_line<D>(
        &self,
        line: &LineFragment,
        origin: Point,
        y: i32,
        link: bool,
        display: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        for span in &line.spans {
            let style = self.span_style(&span.format, link);
            Text::with_baseline(
                &span.text,
                Point::new(origin.x + span.x as i32, y),
                style,
                Baseline::Top,
            )
            .draw(display)?;
        }
        Ok(())
    }

    fn span_style(&self, format: &TextFormat, link: bool) -> MonoTextStyle<'static, BinaryColor> {
        let font = self.metrics.select_face(format).font;
        let mut builder = MonoTextStyleBuilder::new()
            .font(font)
            .text_color(BinaryColor::On);
        if link || format.decorations.contains(Decorations::UNDERLINE) {
            builder = builder.underline();
        }
        if format.decorations.contains(Decorations::STRIKETHROUGH) {
            builder = builder.strikethrough();
        }
        builder.build()
    }

    fn draw_image_label<D>(
        &self,
        label: &str,
        top_left: Point,
        size: Size,
        display: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        if size.width < 10 || size.height < 10 {
            return Ok(());
        }
        let style = MonoTextStyle::new(&FONT_6X9, BinaryColor::On);
        let char_width = style.font.character_size.width.max(1) as usize;
        let max_chars = size.width.saturating_sub(4) as usize / char_width;
        let text = truncate_ascii_with_ellipsis(label, max_chars);
        if text.is_empty() {
            return Ok(());
        }
        Text::with_baseline(&text, top_left + Point::new(2, 2), style, Baseline::Top)
            .draw(display)?;
        Ok(())
    }
}

fn truncate_ascii_with_ellipsis(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::with_capacity(0);
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.into();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let mut out: String = chars[..(max_chars - 3)].iter().collect();
    out.push_str("...");
    out
}
