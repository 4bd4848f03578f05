use fontbox::{
    Alignment, Decorations, Document, FontHandle, FormattedText, PayloadHandle, Placement,
    TextFormat,
};
use fontbox_embedded_graphics::{MonoFontMetrics, MonoFontSize};
use fontbox_layout::{BookEngine, BookEngineOptions, PageGeometry, PageMode};

pub const DISPLAY_WIDTH: u32 = 480;
pub const DISPLAY_HEIGHT: u32 = 800;

pub const HEADING_FONT: FontHandle = FontHandle(1);

pub const FABLE: &str = "A Hare was making fun of the Tortoise one day for being so slow. \
Do you ever get anywhere? he asked with a mocking laugh. Yes, replied the Tortoise, \
and I get there sooner than you think. I will run you a race and prove it. The Hare \
was much amused at the idea of running a race with the Tortoise, but for the fun of \
the thing he agreed.";

pub fn chapter_uid(chapter: usize) -> String {
    format!("chapter-{chapter}")
}

/// Synthetic book mixing every element kind the layout engine places.
pub fn fable_document(chapters: usize) -> Document {
    let mut doc = Document::with_capacity(chapters * 7);
    for chapter in 0..chapters {
        let title = FormattedText::styled(
            format!("Chapter {}", chapter + 1),
            TextFormat::new(HEADING_FONT),
        );
        doc.add_heading(chapter_uid(chapter), title)
            .unwrap_or_else(|e| panic!("heading {chapter}: {e}"));
        if chapter % 2 == 0 {
            doc.add_image("fontbox:hare.png", 120, 90, Placement::FloatLeft);
        } else {
            doc.add_icon_box(PayloadHandle(chapter as u64), 64, 64, Placement::FloatRight);
        }
        let styled = FormattedText::new(FABLE)
            .with_format(
                2..6,
                TextFormat::default().with_decorations(Decorations::BOLD),
            )
            .unwrap_or_else(|e| panic!("format {chapter}: {e}"));
        doc.add_paragraph(styled);
        doc.add_aligned_paragraph(FABLE, Alignment::Justify);
        doc.add_image("fontbox:race.png", 160, 60, Placement::AlignCenter);
        if chapter > 0 {
            doc.add_link("Back to the start", chapter_uid(0));
        }
        doc.add_page_break();
    }
    doc
}

pub fn metrics() -> MonoFontMetrics {
    MonoFontMetrics::new().with_font(HEADING_FONT, MonoFontSize::ExtraLarge)
}

pub fn geometry() -> PageGeometry {
    PageGeometry {
        base_line_height: 16.0,
        density: 1.0,
        ..PageGeometry::for_page(DISPLAY_WIDTH, DISPLAY_HEIGHT).with_margins(12, 12, 16, 16)
    }
}

pub fn engine(mode: PageMode) -> BookEngine {
    let opts = BookEngineOptions {
        geometry: geometry(),
        mode,
    };
    BookEngine::new(opts).with_font_metrics(metrics().shared())
}
