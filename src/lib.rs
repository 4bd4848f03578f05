//! Formatted document model and anchor navigation for paged book views.
//!
//! `fontbox` holds the input side of the layout pipeline: rich text with
//! formatting runs, the element sequence a book is made of, and the
//! append-only [`Document`] builder. It also owns the navigation
//! primitives a presentation shell drives once pages exist:
//! [`AnchorIndex`] resolves heading uids to page numbers and
//! [`BookCursor`] walks spreads of one or more pages.
//!
//! Pagination itself lives in the `fontbox-layout` crate.
//!
//! ```rust
//! use fontbox::{Document, Placement};
//!
//! # fn example() -> Result<(), fontbox::LayoutError> {
//! let mut doc = Document::new();
//! doc.add_heading("title", "The Tortoise and the Hare")?
//!     .add_image("fontbox:hare.png", 64, 48, Placement::FloatLeft)
//!     .add_paragraph("A hare one day ridiculed the short feet of a tortoise.")
//!     .add_page_break()
//!     .add_link("Back to the title", "title");
//! assert_eq!(doc.len(), 5);
//! # Ok(())
//! # }
//! ```

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

pub mod document;
pub mod error;
pub mod navigation;

pub use document::{
    Alignment, Color, CompilerHint, Decorations, Document, Element, FontHandle, FormatRun,
    FormattedText, FormattedTextBuilder, PayloadHandle, Placement, ResourceHandle, TextFormat,
};
pub use error::{LayoutError, MetricsError};
pub use navigation::{AnchorIndex, BookCursor, PageMode, PageSlot};
