use fontbox::navigation::{AnchorIndex, BookCursor, PageMode, PageSlot};
use fontbox::{Document, LayoutError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::page_ir::{Page, PaginationProfileId, PositionedKind};
use crate::page_layout::{
    DocumentProcessor, FontMetrics, HeuristicFontMetrics, LayoutNote, PageGeometry,
};

/// Runtime diagnostics from pagination.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutDiagnostic {
    PaginationTimeMs(u32),
    /// A link points at a uid no heading in the document carries.
    DanglingLink {
        element_index: usize,
        target_uid: String,
    },
    FloatCleared {
        element_index: usize,
        page: usize,
        from_y: f32,
        to_y: f32,
    },
    OversizedWordPlaced {
        element_index: usize,
        page: usize,
        width: f32,
        band_width: f32,
    },
}

impl From<LayoutNote> for LayoutDiagnostic {
    fn from(value: LayoutNote) -> Self {
        match value {
            LayoutNote::FloatCleared {
                element_index,
                page,
                from_y,
                to_y,
            } => Self::FloatCleared {
                element_index,
                page,
                from_y,
                to_y,
            },
            LayoutNote::OversizedWordPlaced {
                element_index,
                page,
                width,
                band_width,
            } => Self::OversizedWordPlaced {
                element_index,
                page,
                width,
                band_width,
            },
        }
    }
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(LayoutDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

/// Book-engine options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookEngineOptions {
    /// Geometry every page is laid out against.
    pub geometry: PageGeometry,
    /// Page slots shown per spread.
    pub mode: PageMode,
}

impl BookEngineOptions {
    /// Build options for a target page size.
    pub fn for_page(width: u32, height: u32) -> Self {
        Self {
            geometry: PageGeometry::for_page(width, height),
            mode: PageMode::single(),
        }
    }

    pub fn with_mode(mut self, mode: PageMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Pages and anchors produced by one pagination run.
#[derive(Clone, Debug, PartialEq)]
pub struct PaginatedBook {
    pub pages: Vec<Page>,
    pub index: AnchorIndex,
    /// Profile of the settings the pages were laid out with.
    pub profile: PaginationProfileId,
}

impl PaginatedBook {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn find_anchor(&self, uid: &str) -> Option<usize> {
        self.index.find(uid)
    }
}

/// Orchestrates pagination: metrics selection, diagnostics, and profiling.
#[derive(Clone)]
pub struct BookEngine {
    opts: BookEngineOptions,
    metrics: Arc<dyn FontMetrics>,
    pagination_profile: PaginationProfileId,
    diagnostic_sink: DiagnosticSink,
}

impl fmt::Debug for BookEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookEngine")
            .field("opts", &self.opts)
            .field("pagination_profile", &self.pagination_profile)
            .finish_non_exhaustive()
    }
}

impl BookEngine {
    fn compute_pagination_profile_id(opts: &BookEngineOptions) -> PaginationProfileId {
        let payload = format!("{:?}", opts.geometry);
        PaginationProfileId::from_bytes(payload.as_bytes())
    }

    /// Create an engine measuring text with [`HeuristicFontMetrics`].
    pub fn new(opts: BookEngineOptions) -> Self {
        let pagination_profile = Self::compute_pagination_profile_id(&opts);
        Self {
            opts,
            metrics: Arc::new(HeuristicFontMetrics::default()),
            pagination_profile,
            diagnostic_sink: None,
        }
    }

    /// Measure text with `metrics` instead of the heuristic model.
    pub fn with_font_metrics(mut self, metrics: Arc<dyn FontMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn options(&self) -> &BookEngineOptions {
        &self.opts
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(LayoutDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: LayoutDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    /// Stable fingerprint for all layout-affecting settings.
    pub fn pagination_profile_id(&self) -> PaginationProfileId {
        self.pagination_profile
    }

    /// Paginate `document` with the current geometry.
    pub fn paginate(&self, document: &Document) -> Result<PaginatedBook, LayoutError> {
        let started = Instant::now();
        let out =
            DocumentProcessor::generate_pages(document, &self.opts.geometry, self.metrics.as_ref())?;
        let elapsed_ms = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
        self.emit_diagnostic(LayoutDiagnostic::PaginationTimeMs(elapsed_ms));

        for (element_index, target_uid) in document.link_targets() {
            if out.index.contains(target_uid) {
                continue;
            }
            log::warn!(
                "link in element {} targets unknown heading {:?}",
                element_index,
                target_uid
            );
            self.emit_diagnostic(LayoutDiagnostic::DanglingLink {
                element_index,
                target_uid: target_uid.to_string(),
            });
        }
        for note in out.notes {
            if let LayoutNote::FloatCleared {
                element_index,
                page,
                to_y,
                ..
            } = note
            {
                log::warn!(
                    "element {} cleared floats down to y={:.1} on page {}",
                    element_index,
                    to_y,
                    page
                );
            }
            self.emit_diagnostic(note.into());
        }

        log::debug!(
            "paginated {} elements into {} pages ({} anchors) in {}ms",
            document.len(),
            out.pages.len(),
            out.index.len(),
            elapsed_ms
        );
        Ok(PaginatedBook {
            pages: out.pages,
            index: out.index,
            profile: self.pagination_profile,
        })
    }

    /// Re-paginate `book` against a new geometry.
    ///
    /// On error both the engine and `book` keep their previous state.
    /// Returns whether the page content changed.
    pub fn reflow(
        &mut self,
        book: &mut PaginatedBook,
        document: &Document,
        geometry: PageGeometry,
    ) -> Result<bool, LayoutError> {
        let mut opts = self.opts.clone();
        opts.geometry = geometry;
        let previous = core::mem::replace(&mut self.opts, opts);
        let fresh = match self.paginate_with_profile(document) {
            Ok(fresh) => fresh,
            Err(err) => {
                self.opts = previous;
                return Err(err);
            }
        };
        let changed = fresh.pages != book.pages;
        *book = fresh;
        Ok(changed)
    }

    fn paginate_with_profile(&mut self, document: &Document) -> Result<PaginatedBook, LayoutError> {
        let profile = Self::compute_pagination_profile_id(&self.opts);
        let previous = core::mem::replace(&mut self.pagination_profile, profile);
        let result = self.paginate(document);
        if result.is_err() {
            self.pagination_profile = previous;
        }
        result
    }

    /// Paginate `document` and open a view on its first spread.
    pub fn open(&self, document: &Document) -> Result<BookView, LayoutError> {
        let book = self.paginate(document)?;
        Ok(BookView::new(book, self.opts.mode.clone()))
    }
}

/// What a screen point resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HitTarget {
    pub page_index: usize,
    pub element_index: usize,
    pub kind: PositionedKind,
    /// Heading uid the element navigates to, for links.
    pub link_target: Option<String>,
}

/// Navigable view over a paginated book.
#[derive(Clone, Debug)]
pub struct BookView {
    book: PaginatedBook,
    mode: PageMode,
    cursor: BookCursor,
}

impl BookView {
    pub fn new(book: PaginatedBook, mode: PageMode) -> Self {
        let cursor = BookCursor::new(&mode, book.page_count());
        Self { book, mode, cursor }
    }

    pub fn book(&self) -> &PaginatedBook {
        &self.book
    }

    pub fn mode(&self) -> &PageMode {
        &self.mode
    }

    pub fn cursor(&self) -> &BookCursor {
        &self.cursor
    }

    /// Pages of the current spread with the slot each is drawn in.
    pub fn visible(&self) -> Vec<(PageSlot, &Page)> {
        self.mode
            .slots()
            .iter()
            .copied()
            .zip(self.cursor.visible_pages())
            .filter_map(|(slot, index)| self.book.page(index).map(|page| (slot, page)))
            .collect()
    }

    pub fn next(&mut self) -> bool {
        self.cursor.next()
    }

    pub fn previous(&mut self) -> bool {
        self.cursor.previous()
    }

    pub fn go_to_page(&mut self, page: usize) -> bool {
        self.cursor.go_to_page(page)
    }

    /// Show the spread holding heading `uid`; unknown uids are a no-op.
    pub fn go_to_anchor(&mut self, uid: &str) -> bool {
        self.cursor.go_to_anchor(&self.book.index, uid)
    }

    /// Resolve a screen point against the visible page slots.
    pub fn hit_test(&self, screen_x: i32, screen_y: i32) -> Option<HitTarget> {
        for (slot, page) in self.visible() {
            let x = (screen_x - slot.x) as f32;
            let y = (screen_y - slot.y) as f32;
            if x < 0.0 || y < 0.0 || x >= page.width as f32 || y >= page.height as f32 {
                continue;
            }
            let Some(element) = page.element_at(x, y) else {
                continue;
            };
            return Some(HitTarget {
                page_index: page.index,
                element_index: element.element_index,
                kind: element.content.kind(),
                link_target: element.link_target().map(str::to_string),
            });
        }
        None
    }

    /// Handle a click: links navigate to their target heading.
    ///
    /// Returns whether the visible spread changed.
    pub fn click(&mut self, screen_x: i32, screen_y: i32) -> bool {
        let Some(target) = self
            .hit_test(screen_x, screen_y)
            .and_then(|hit| hit.link_target)
        else {
            return false;
        };
        log::trace!("following link to {:?}", target);
        self.go_to_anchor(&target)
    }

    /// Swap in a re-paginated book, keeping the cursor when it still fits.
    pub fn replace_book(&mut self, book: PaginatedBook) -> bool {
        let changed = self.cursor.set_page_count(book.page_count());
        self.book = book;
        changed
    }

    pub fn set_mode(&mut self, mode: PageMode) -> bool {
        let changed = self.cursor.set_mode(&mode);
        self.mode = mode;
        changed
    }
}
