// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability traits for the document library.
//
// Orchestration code never touches a document's encoding directly. It loads,
// copies, stamps, and saves through these traits, so any conforming backend
// (the lopdf-backed `PdfLibrary`, the in-memory `MemoryLibrary`) can be
// substituted.

use pagewerk_core::error::Result;
use pagewerk_core::types::{CompressionLevel, RgbColor};
use serde::{Deserialize, Serialize};

/// How tolerant a load should be of structural damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Accept malformed cross-reference structures that a strict parse rejects.
    pub lenient: bool,
    /// Keep going when individual objects (pages) are invalid instead of
    /// rejecting the whole document. Invalid pages then fail on copy.
    pub tolerate_invalid_objects: bool,
}

impl LoadOptions {
    /// Strict structural validation.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Relaxed structure, invalid objects still rejected.
    pub fn lenient() -> Self {
        Self {
            lenient: true,
            tolerate_invalid_objects: false,
        }
    }

    /// Everything that can be parsed is kept.
    pub fn salvage() -> Self {
        Self {
            lenient: true,
            tolerate_invalid_objects: true,
        }
    }
}

/// Options for serialising a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    pub compression: Option<CompressionLevel>,
}

/// Page dimensions in document units (points for PDF).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }
}

/// A text stamp positioned in page coordinates (origin bottom-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDraw {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: RgbColor,
    pub opacity: f32,
    /// Degrees, counter-clockwise about `(x, y)`.
    pub rotation: f32,
}

/// An image stamp positioned in page coordinates (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageDraw {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub opacity: f32,
    /// Degrees, counter-clockwise about `(x, y)`.
    pub rotation: f32,
}

/// An image embedded into a document, with its pixel dimensions.
#[derive(Debug, Clone)]
pub struct EmbeddedImage<H> {
    pub handle: H,
    pub width: u32,
    pub height: u32,
}

/// Entry point of a document library: creates and parses documents.
pub trait DocumentLibrary {
    type Document: PageDocument;

    /// A new, empty document.
    fn create(&self) -> Self::Document;

    /// Parse a byte stream.
    fn load(&self, bytes: &[u8], options: LoadOptions) -> Result<Self::Document>;
}

/// An ordered sequence of pages that can be copied, stamped, and saved.
pub trait PageDocument: Sized {
    /// A page copied out of another document, not yet placed.
    type PageRef;
    /// An image resource embedded in this document.
    type Image;

    fn page_count(&self) -> usize;

    /// Size of the page at 0-based `index`.
    fn page_size(&self, index: usize) -> Result<PageSize>;

    /// Rotation already stored on the page at `index` (0, 90, 180, or 270).
    fn page_rotation(&self, index: usize) -> Result<i32>;

    /// Copy the pages at `indices` from `source`. The returned references
    /// must be placed with [`PageDocument::add_page`]. A failure on one index
    /// fails the call, so copy one index at a time to isolate bad pages.
    fn copy_pages(&mut self, source: &Self, indices: &[usize]) -> Result<Vec<Self::PageRef>>;

    /// Append a copied page as the last page.
    fn add_page(&mut self, page: Self::PageRef) -> Result<()>;

    /// Set the absolute rotation of the page at `index`.
    fn set_rotation(&mut self, index: usize, degrees: i32) -> Result<()>;

    /// Rendered width of `text` in the stamp font at `font_size`.
    fn text_width(&self, text: &str, font_size: f32) -> f32;

    /// Decode and embed an image (JPEG or PNG).
    fn embed_image(&mut self, bytes: &[u8]) -> Result<EmbeddedImage<Self::Image>>;

    fn draw_text(&mut self, index: usize, draw: &TextDraw) -> Result<()>;

    fn draw_image(&mut self, index: usize, image: &Self::Image, draw: &ImageDraw) -> Result<()>;

    /// Serialise the whole document.
    fn save(&mut self, options: &SaveOptions) -> Result<Vec<u8>>;
}
