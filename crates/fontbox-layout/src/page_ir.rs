use core::fmt;
use fontbox::{Alignment, PayloadHandle, Placement, ResourceHandle, TextFormat};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page layout units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Half-open containment: left/top edges are inside, right/bottom are not.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// One formatted piece of a laid-out line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSpan {
    /// Text drawn by this span.
    pub text: String,
    /// Index of the source run in the element's formatted text.
    pub run_index: usize,
    /// Absolute page x of the span's left edge.
    pub x: f32,
    /// Measured advance width.
    pub width: f32,
    /// Resolved format (document default already applied).
    pub format: TextFormat,
}

/// A laid-out line of text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineFragment {
    /// Line text with collapsed inter-word whitespace.
    pub text: String,
    /// First byte of the line in the source element text.
    pub text_start: usize,
    /// One past the last byte of the line in the source element text.
    pub text_end: usize,
    /// Width of the band the line was fitted into.
    pub band_width: f32,
    pub spans: Vec<LineSpan>,
}

/// What a positioned element draws.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PositionedContent {
    HeadingLine { uid: String, line: LineFragment },
    TextLine { line: LineFragment, alignment: Alignment },
    LinkLine { target_uid: String, line: LineFragment },
    Image {
        source: ResourceHandle,
        placement: Placement,
    },
    IconBox {
        payload: PayloadHandle,
        placement: Placement,
    },
}

impl PositionedContent {
    /// Interactive content must be re-rendered every frame; everything else
    /// can be cached by the presentation shell.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::LinkLine { .. } | Self::IconBox { .. })
    }

    pub fn line(&self) -> Option<&LineFragment> {
        match self {
            Self::HeadingLine { line, .. }
            | Self::TextLine { line, .. }
            | Self::LinkLine { line, .. } => Some(line),
            Self::Image { .. } | Self::IconBox { .. } => None,
        }
    }

    pub fn kind(&self) -> PositionedKind {
        match self {
            Self::HeadingLine { .. } => PositionedKind::Heading,
            Self::TextLine { .. } => PositionedKind::Text,
            Self::LinkLine { .. } => PositionedKind::Link,
            Self::Image { .. } => PositionedKind::Image,
            Self::IconBox { .. } => PositionedKind::IconBox,
        }
    }
}

/// Coarse positioned element classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PositionedKind {
    Heading,
    Text,
    Link,
    Image,
    IconBox,
}

impl PositionedKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Text => "text",
            Self::Link => "link",
            Self::Image => "image",
            Self::IconBox => "icon_box",
        }
    }
}

impl fmt::Display for PositionedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An element (or one line of a text element) placed on a page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionedElement {
    /// Position of the source element in the document.
    pub element_index: usize,
    pub bounds: Rect,
    pub content: PositionedContent,
}

impl PositionedElement {
    pub fn is_dynamic(&self) -> bool {
        self.content.is_dynamic()
    }

    /// Link target when this element is clickable.
    pub fn link_target(&self) -> Option<&str> {
        match &self.content {
            PositionedContent::LinkLine { target_uid, .. } => Some(target_uid),
            _ => None,
        }
    }
}

/// Stable fingerprint of a page's static element list.
///
/// Equal static content always yields an equal id, so a presentation shell
/// can key its display cache on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageContentId(pub [u8; 32]);

impl PageContentId {
    pub fn of_elements(elements: &[PositionedElement]) -> Self {
        match postcard::to_allocvec(elements) {
            Ok(bytes) => Self(fingerprint(&bytes)),
            Err(_) => Self(fingerprint(format!("{:?}", elements).as_bytes())),
        }
    }
}

/// One laid-out page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 0-based page number.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Cacheable content: text lines, headings, images.
    pub static_elements: Vec<PositionedElement>,
    /// Content redrawn each frame: links, icon boxes.
    pub dynamic_elements: Vec<PositionedElement>,
    /// Fingerprint of `static_elements`, set when the page is closed.
    pub content_id: PageContentId,
}

impl Page {
    pub fn new(index: usize, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            static_elements: Vec::with_capacity(16),
            dynamic_elements: Vec::with_capacity(0),
            content_id: PageContentId::default(),
        }
    }

    /// Route an element to the static or dynamic list.
    pub fn push(&mut self, element: PositionedElement) {
        if element.is_dynamic() {
            self.dynamic_elements.push(element);
        } else {
            self.static_elements.push(element);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.static_elements.is_empty() && self.dynamic_elements.is_empty()
    }

    pub fn element_count(&self) -> usize {
        self.static_elements.len() + self.dynamic_elements.len()
    }

    /// Static elements followed by dynamic ones.
    pub fn elements(&self) -> impl Iterator<Item = &PositionedElement> + '_ {
        self.static_elements
            .iter()
            .chain(self.dynamic_elements.iter())
    }

    /// Recompute [`Page::content_id`] from the static list.
    pub fn seal(&mut self) {
        self.content_id = PageContentId::of_elements(&self.static_elements);
    }

    /// Innermost element containing `(x, y)`.
    ///
    /// Innermost means the smallest containing box. Dynamic elements are
    /// checked first and win ties, since they are the interactive ones.
    pub fn element_at(&self, x: f32, y: f32) -> Option<&PositionedElement> {
        let mut best: Option<&PositionedElement> = None;
        for element in self
            .dynamic_elements
            .iter()
            .chain(self.static_elements.iter())
        {
            if !element.bounds.contains(x, y) {
                continue;
            }
            match best {
                Some(current) if current.bounds.area() <= element.bounds.area() => {}
                _ => best = Some(element),
            }
        }
        best
    }

    /// Concatenated text of every text-like element, one line per row.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for line in self.elements().filter_map(|el| el.content.line()) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&line.text);
        }
        out
    }
}

/// Stable pagination profile id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaginationProfileId(pub [u8; 32]);

impl PaginationProfileId {
    /// Build a deterministic profile id from arbitrary payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(fingerprint(bytes))
    }
}

fn fingerprint(bytes: &[u8]) -> [u8; 32] {
    fn fnv64(seed: u64, payload: &[u8]) -> u64 {
        let mut hash = seed;
        for b in payload {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
    let mut out = [0u8; 32];
    let h0 = fnv64(0xcbf29ce484222325, bytes).to_le_bytes();
    let h1 = fnv64(0x9e3779b97f4a7c15, bytes).to_le_bytes();
    let h2 = fnv64(0xd6e8feb86659fd93, bytes).to_le_bytes();
    let h3 = fnv64(0xa0761d6478bd642f, bytes).to_le_bytes();
    out[0..8].copy_from_slice(&h0);
    out[8..16].copy_from_slice(&h1);
    out[16..24].copy_from_slice(&h2);
    out[24..32].copy_from_slice(&h3);
    out
}
