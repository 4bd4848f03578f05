//! Page IR, pagination, and book-view orchestration for `fontbox`.

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

mod book_engine;
mod page_ir;
mod page_layout;

pub use book_engine::{
    BookEngine, BookEngineOptions, BookView, HitTarget, LayoutDiagnostic, PaginatedBook,
};
pub use fontbox::navigation::{AnchorIndex, BookCursor, PageMode, PageSlot};
pub use page_ir::{
    LineFragment, LineSpan, Page, PageContentId, PaginationProfileId, PositionedContent,
    PositionedElement, PositionedKind, Rect,
};
pub use page_layout::{
    ActiveFloat, Band, BrokenLine, DocumentProcessor, FloatSet, FloatSide, FontMetrics,
    HeuristicFontMetrics, LayoutNote, LineBreaker, PageGeometry, Pagination, TextMeasure,
};
