//! Anchor resolution and spread navigation over paginated output.
//!
//! [`AnchorIndex`] maps heading uids to the page they were placed on. It is
//! built by the paginator during its single pass and is read-only after.
//! [`BookCursor`] tracks which pages a [`PageMode`] currently shows and
//! implements the next/previous/go-to moves a presentation shell binds to
//! its input.
//!
//! # Usage
//!
//! ```rust
//! use fontbox::navigation::{AnchorIndex, BookCursor, PageMode};
//!
//! let mut index = AnchorIndex::new();
//! index.record("ending", 5);
//!
//! let mode = PageMode::two_up(200);
//! let mut cursor = BookCursor::new(&mode, 7);
//! assert!(cursor.go_to_anchor(&index, "ending"));
//! assert_eq!(cursor.visible_pages(), 4..6);
//! assert!(!cursor.go_to_anchor(&index, "missing"));
//! ```

use core::ops::Range;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Heading uid to page number mapping produced by one pagination pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorIndex {
    entries: HashMap<String, usize>,
}

impl AnchorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `uid` as placed on `page`.
    ///
    /// The first placement wins; documents never carry duplicate uids, so a
    /// second record for the same uid is ignored.
    pub fn record(&mut self, uid: impl Into<String>, page: usize) {
        self.entries.entry(uid.into()).or_insert(page);
    }

    /// Page number of the heading with `uid`, `None` when it was never
    /// placed.
    pub fn find(&self, uid: &str) -> Option<usize> {
        self.entries.get(uid).copied()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.entries.iter().map(|(uid, page)| (uid.as_str(), *page))
    }

    /// Entries ordered by page, then uid. Suitable for a table of contents.
    pub fn sorted_entries(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// Screen offset of one page within a spread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageSlot {
    pub x: i32,
    pub y: i32,
}

impl PageSlot {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// How many pages are shown at once and where each one sits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageMode {
    slots: Vec<PageSlot>,
}

impl Default for PageMode {
    fn default() -> Self {
        Self::single()
    }
}

impl PageMode {
    /// One page at the origin.
    pub fn single() -> Self {
        Self {
            slots: vec![PageSlot::default()],
        }
    }

    /// Facing pages: left at the origin, right at `second_x`.
    pub fn two_up(second_x: i32) -> Self {
        Self {
            slots: vec![PageSlot::default(), PageSlot::new(second_x, 0)],
        }
    }

    /// Arbitrary slot list. An empty list falls back to [`PageMode::single`].
    pub fn new(slots: Vec<PageSlot>) -> Self {
        if slots.is_empty() {
            return Self::single();
        }
        Self { slots }
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    /// Pages per spread, never zero.
    pub fn pages_per_view(&self) -> usize {
        self.slots.len().max(1)
    }
}

/// Spread pointer over a fixed page count.
///
/// The pointer always sits on a spread boundary (a multiple of
/// `pages_per_view`). Mutating calls return `true` when the visible spread
/// changed so the caller knows to drop cached page renders.
///
/// A cursor is only built through [`BookCursor::new`], so `pages_per_view`
/// is never zero. Persist the [`PageMode`] and [`BookCursor::current`]
/// page instead of the cursor itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BookCursor {
    pages_per_view: usize,
    page_count: usize,
    first: usize,
}

impl BookCursor {
    pub fn new(mode: &PageMode, page_count: usize) -> Self {
        Self {
            pages_per_view: mode.pages_per_view(),
            page_count,
            first: 0,
        }
    }

    /// First page of the current spread.
    pub fn current(&self) -> usize {
        self.first
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn pages_per_view(&self) -> usize {
        self.pages_per_view
    }

    /// Pages shown by the current spread, clipped to the page count.
    pub fn visible_pages(&self) -> Range<usize> {
        let start = self.first.min(self.page_count);
        let end = self
            .first
            .saturating_add(self.pages_per_view)
            .min(self.page_count);
        start..end
    }

    /// Zero-based spread number.
    pub fn spread_index(&self) -> usize {
        self.first / self.pages_per_view
    }

    /// Number of spreads needed to show every page.
    pub fn spread_count(&self) -> usize {
        self.page_count.div_ceil(self.pages_per_view)
    }

    pub fn next(&mut self) -> bool {
        let next = self.first + self.pages_per_view;
        if next >= self.page_count {
            return false;
        }
        self.first = next;
        true
    }

    pub fn previous(&mut self) -> bool {
        match self.first.checked_sub(self.pages_per_view) {
            Some(prev) => {
                self.first = prev;
                true
            }
            None => false,
        }
    }

    /// Show the spread containing `page`. Out-of-range pages are ignored.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        if page >= self.page_count {
            return false;
        }
        let start = page - page % self.pages_per_view;
        if start == self.first {
            return false;
        }
        self.first = start;
        true
    }

    /// Show the spread holding heading `uid`. Unknown uids are a no-op.
    pub fn go_to_anchor(&mut self, index: &AnchorIndex, uid: &str) -> bool {
        match index.find(uid) {
            Some(page) => self.go_to_page(page),
            None => {
                log::trace!("anchor {:?} not found; staying on page {}", uid, self.first);
                false
            }
        }
    }

    /// Adopt a new page count after re-pagination.
    ///
    /// The pointer resets to the first spread when it no longer points at an
    /// existing page.
    pub fn set_page_count(&mut self, page_count: usize) -> bool {
        self.page_count = page_count;
        if self.first >= page_count && self.first != 0 {
            self.first = 0;
            return true;
        }
        false
    }

    /// Adopt a different page mode, keeping the current page visible.
    pub fn set_mode(&mut self, mode: &PageMode) -> bool {
        let page = self.first;
        self.pages_per_view = mode.pages_per_view();
        let start = page - page % self.pages_per_view;
        let changed = start != self.first;
        self.first = start;
        changed
    }
}
