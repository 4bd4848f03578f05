//! DHAT heap profiler for fontbox.
//!
//! Profiles allocation patterns across the layout pipeline:
//! build -> paginate -> reflow -> navigate -> draw.
//!
//! Usage:
//!   cargo run -p fontbox-heap-profile --release -- [OPTIONS] [CHAPTER_COUNTS...]
//!
//! Outputs dhat-<phase>.json files in the output directory (default: target/memory).
//! Open in https://nnethercote.github.io/dh_view/dh_view.html

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::convert::Infallible;
use std::path::PathBuf;
use std::process::Command;

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use fontbox::{
    Alignment, Decorations, Document, FontHandle, FormattedText, PayloadHandle, Placement,
    TextFormat,
};
use fontbox_embedded_graphics::{EgPageRenderer, MonoFontMetrics, MonoFontSize};
use fontbox_layout::{BookEngine, BookEngineOptions, PageGeometry, PageMode};

const DISPLAY_WIDTH: u32 = 480;
const DISPLAY_HEIGHT: u32 = 800;

const DEFAULT_SCENARIOS: &[usize] = &[4, 32, 128];

const FABLE: &str = "A Hare was making fun of the Tortoise one day for being so slow. \
Do you ever get anywhere? he asked with a mocking laugh. Yes, replied the Tortoise, \
and I get there sooner than you think. I will run you a race and prove it.";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Build,
    Paginate,
    Reflow,
    Navigate,
    Draw,
}

impl Phase {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "build" => Some(Self::Build),
            "paginate" => Some(Self::Paginate),
            "reflow" => Some(Self::Reflow),
            "navigate" => Some(Self::Navigate),
            "draw" => Some(Self::Draw),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Paginate => "paginate",
            Self::Reflow => "reflow",
            Self::Navigate => "navigate",
            Self::Draw => "draw",
        }
    }
}

/// Display that drops every pixel; only allocation behaviour matters here.
struct NullDisplay {
    size: Size,
    lit: usize,
}

impl OriginDimensions for NullDisplay {
    fn size(&self) -> Size {
        self.size
    }
}

impl DrawTarget for NullDisplay {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.lit += pixels
            .into_iter()
            .filter(|Pixel(_, color)| *color == BinaryColor::On)
            .count();
        Ok(())
    }
}

fn build_document(chapters: usize) -> Document {
    let mut doc = Document::with_capacity(chapters * 6);
    for chapter in 0..chapters {
        let title = FormattedText::styled(
            format!("Chapter {}", chapter + 1),
            TextFormat::new(FontHandle(1)),
        );
        doc.add_heading(format!("chapter-{chapter}"), title)
            .unwrap_or_else(|e| panic!("heading {chapter}: {e}"));
        if chapter % 2 == 0 {
            doc.add_image("fontbox:hare.png", 120, 90, Placement::FloatLeft);
        } else {
            doc.add_icon_box(PayloadHandle(chapter as u64), 64, 64, Placement::FloatRight);
        }
        let styled = FormattedText::new(FABLE)
            .with_format(2..6, TextFormat::default().with_decorations(Decorations::BOLD))
            .unwrap_or_else(|e| panic!("format {chapter}: {e}"));
        doc.add_paragraph(styled);
        doc.add_aligned_paragraph(FABLE, Alignment::Justify);
        doc.add_link("Back to the start", "chapter-0");
        if chapter % 8 == 7 {
            doc.add_page_break();
        }
    }
    doc
}

fn metrics() -> MonoFontMetrics {
    MonoFontMetrics::new().with_font(FontHandle(1), MonoFontSize::ExtraLarge)
}

fn engine() -> BookEngine {
    let opts = BookEngineOptions::for_page(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .with_mode(PageMode::single());
    BookEngine::new(opts).with_font_metrics(metrics().shared())
}

fn profile_scenario(chapters: usize, phase: Phase) {
    match phase {
        Phase::Build => {
            let _doc = build_document(chapters);
        }
        Phase::Paginate => {
            let doc = build_document(chapters);
            let _book = engine()
                .paginate(&doc)
                .unwrap_or_else(|e| panic!("paginate {chapters}: {e}"));
        }
        Phase::Reflow => {
            let doc = build_document(chapters);
            let mut engine = engine();
            let mut book = engine
                .paginate(&doc)
                .unwrap_or_else(|e| panic!("paginate {chapters}: {e}"));
            for (width, height) in [(400, 640), (600, 800), (DISPLAY_WIDTH, DISPLAY_HEIGHT)] {
                let geometry = PageGeometry::for_page(width, height);
                engine
                    .reflow(&mut book, &doc, geometry)
                    .unwrap_or_else(|e| panic!("reflow {chapters} at {width}x{height}: {e}"));
            }
        }
        Phase::Navigate => {
            let doc = build_document(chapters);
            let mut view = engine()
                .open(&doc)
                .unwrap_or_else(|e| panic!("open {chapters}: {e}"));
            while view.next() {}
            for chapter in (0..chapters).rev() {
                view.go_to_anchor(&format!("chapter-{chapter}"));
            }
        }
        Phase::Draw => {
            let doc = build_document(chapters);
            let mut view = engine()
                .open(&doc)
                .unwrap_or_else(|e| panic!("open {chapters}: {e}"));
            let renderer = EgPageRenderer::new(metrics());
            let mut display = NullDisplay {
                size: Size::new(DISPLAY_WIDTH, DISPLAY_HEIGHT),
                lit: 0,
            };
            loop {
                let Ok(()) = renderer.draw_spread(&view, Point::zero(), &mut display);
                if !view.next() {
                    break;
                }
            }
            if display.lit == 0 {
                panic!("draw {chapters} lit zero pixels");
            }
        }
    }
}

fn usage() {
    eprintln!("Usage: heap-profile [OPTIONS] [CHAPTER_COUNTS...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!(
        "  --phase <build|paginate|reflow|navigate|draw>  Pipeline phase to profile (default: paginate)"
    );
    eprintln!("  --out-dir <DIR>                      Output directory for dhat JSON (default: target/memory)");
    eprintln!(
        "  --aggregate                          Single profile for all scenarios (default: per-scenario)"
    );
    eprintln!();
    eprintln!("Each chapter count builds a synthetic document of that many chapters.");
    eprintln!("By default, each scenario gets its own clean DHAT profile (separate process).");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut phase = Phase::Paginate;
    let mut out_dir = PathBuf::from("target/memory");
    let mut scenarios: Vec<usize> = Vec::with_capacity(4);
    let mut aggregate = false;
    // Internal flag: when set, we're a child process profiling a single scenario.
    let mut single_mode = false;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--phase" => {
                i += 1;
                phase = args
                    .get(i)
                    .and_then(|arg| Phase::from_str(arg))
                    .unwrap_or_else(|| {
                        eprintln!("Unknown phase: {:?}", args.get(i));
                        usage();
                        std::process::exit(1);
                    });
            }
            "--out-dir" => {
                i += 1;
                out_dir = args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    usage();
                    std::process::exit(1);
                });
            }
            "--aggregate" => aggregate = true,
            "--single" => single_mode = true,
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            other => match other.parse::<usize>() {
                Ok(chapters) if chapters > 0 => scenarios.push(chapters),
                _ => {
                    eprintln!("Not a chapter count: {other}");
                    usage();
                    std::process::exit(1);
                }
            },
        }
        i += 1;
    }

    if scenarios.is_empty() {
        scenarios.extend_from_slice(DEFAULT_SCENARIOS);
    }

    std::fs::create_dir_all(&out_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create output dir {}: {}", out_dir.display(), e);
        std::process::exit(1);
    });

    let phase_name = phase.name();

    if single_mode {
        assert!(scenarios.len() == 1, "--single expects exactly one scenario");
        let chapters = scenarios[0];
        let json_path = out_dir.join(format!("dhat-{phase_name}-{chapters}ch.json"));
        let _profiler = dhat::Profiler::builder().file_name(json_path).build();
        profile_scenario(chapters, phase);
        return;
    }

    if aggregate {
        let json_path = out_dir.join(format!("dhat-{phase_name}.json"));
        eprintln!(
            "heap-profile: phase={}, scenarios={} (aggregate), out={}",
            phase_name,
            scenarios.len(),
            out_dir.display()
        );
        let _profiler = dhat::Profiler::builder()
            .file_name(json_path.clone())
            .build();
        for chapters in &scenarios {
            eprintln!("  profiling: {chapters} chapters");
            profile_scenario(*chapters, phase);
        }
        eprintln!(
            "Done. Open {} in https://nnethercote.github.io/dh_view/dh_view.html",
            json_path.display()
        );
        return;
    }

    let self_exe = std::env::current_exe().unwrap_or_else(|e| {
        eprintln!("Failed to determine own executable path: {}", e);
        std::process::exit(1);
    });

    eprintln!(
        "heap-profile: phase={}, scenarios={} (per-scenario), out={}",
        phase_name,
        scenarios.len(),
        out_dir.display()
    );

    let mut any_failed = false;
    for chapters in &scenarios {
        eprintln!("  profiling: {chapters} chapters -> dhat-{phase_name}-{chapters}ch.json");
        let status = Command::new(&self_exe)
            .arg("--single")
            .arg("--phase")
            .arg(phase_name)
            .arg("--out-dir")
            .arg(&out_dir)
            .arg(chapters.to_string())
            .status();
        match status {
            Ok(s) if s.success() => {}
            Ok(s) => {
                eprintln!("    FAILED (exit {})", s.code().unwrap_or(-1));
                any_failed = true;
            }
            Err(e) => {
                eprintln!("    FAILED to spawn: {}", e);
                any_failed = true;
            }
        }
    }

    eprintln!();
    eprintln!("Profiles saved to {}", out_dir.display());
    if any_failed {
        std::process::exit(1);
    }
}
