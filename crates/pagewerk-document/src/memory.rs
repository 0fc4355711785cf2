// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory document library.
//
// Documents are plain page lists serialised as JSON, with knobs for the kinds
// of damage the recovery cascade has to cope with. Used to exercise the
// orchestration layer without a real PDF encoder.

use std::io::Cursor;

use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::CompressionLevel;
use serde::{Deserialize, Serialize};

use crate::library::{
    DocumentLibrary, EmbeddedImage, ImageDraw, LoadOptions, PageDocument, PageSize, SaveOptions,
    TextDraw,
};

/// How intact a serialised document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Structure {
    #[default]
    Intact,
    /// Damaged cross-reference data: only a lenient load succeeds.
    Malformed,
    /// Nothing can be parsed.
    Unreadable,
}

/// Something drawn onto a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stamp {
    Text(TextDraw),
    Image { width: u32, height: u32, draw: ImageDraw },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPage {
    /// Identifies the page across copies.
    pub label: String,
    pub width: f32,
    pub height: f32,
    pub rotation: i32,
    /// An invalid page object: rejected by non-tolerant loads, fails to copy.
    #[serde(default)]
    pub corrupt: bool,
    #[serde(default)]
    pub stamps: Vec<Stamp>,
}

impl MemoryPage {
    /// US Letter page with no rotation.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            width: 612.0,
            height: 792.0,
            rotation: 0,
            corrupt: false,
            stamps: Vec::new(),
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_rotation(mut self, rotation: i32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn corrupted(mut self) -> Self {
        self.corrupt = true;
        self
    }
}

/// A document held entirely in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default)]
    pub structure: Structure,
    pub pages: Vec<MemoryPage>,
    /// Make every save fail.
    #[serde(default)]
    pub fail_on_save: bool,
    /// Compression level of the last save, if any.
    #[serde(default)]
    pub compression: Option<CompressionLevel>,
    #[serde(skip)]
    rotation_calls: usize,
    #[serde(skip)]
    save_calls: usize,
}

impl MemoryDocument {
    pub fn with_pages(pages: Vec<MemoryPage>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    pub fn with_structure(mut self, structure: Structure) -> Self {
        self.structure = structure;
        self
    }

    /// Serialise as-is, damage flags included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse without any structural checks.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| PagewerkError::Parse(err.to_string()))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.pages.iter().map(|p| p.label.as_str()).collect()
    }

    /// Number of `set_rotation` calls made on this handle.
    pub fn rotation_calls(&self) -> usize {
        self.rotation_calls
    }

    /// Number of `save` calls made on this handle.
    pub fn save_calls(&self) -> usize {
        self.save_calls
    }

    fn page_mut(&mut self, index: usize) -> Result<&mut MemoryPage> {
        let count = self.pages.len();
        self.pages
            .get_mut(index)
            .ok_or(PagewerkError::PageOutOfRange { page: index + 1, count })
    }

    fn page(&self, index: usize) -> Result<&MemoryPage> {
        self.pages.get(index).ok_or(PagewerkError::PageOutOfRange {
            page: index + 1,
            count: self.pages.len(),
        })
    }
}

/// Library producing [`MemoryDocument`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryLibrary;

impl DocumentLibrary for MemoryLibrary {
    type Document = MemoryDocument;

    fn create(&self) -> MemoryDocument {
        MemoryDocument::default()
    }

    fn load(&self, bytes: &[u8], options: LoadOptions) -> Result<MemoryDocument> {
        let document = MemoryDocument::from_bytes(bytes)?;

        match document.structure {
            Structure::Unreadable => {
                return Err(PagewerkError::Parse("no readable objects".into()));
            }
            Structure::Malformed if !options.lenient => {
                return Err(PagewerkError::Parse("invalid cross-reference table".into()));
            }
            _ => {}
        }

        if !options.tolerate_invalid_objects {
            if let Some(index) = document.pages.iter().position(|p| p.corrupt) {
                return Err(PagewerkError::Parse(format!(
                    "invalid object for page {}",
                    index + 1
                )));
            }
        }

        Ok(document)
    }
}

impl PageDocument for MemoryDocument {
    type PageRef = MemoryPage;
    type Image = (u32, u32);

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, index: usize) -> Result<PageSize> {
        let page = self.page(index)?;
        Ok(PageSize::new(page.width, page.height))
    }

    fn page_rotation(&self, index: usize) -> Result<i32> {
        Ok(self.page(index)?.rotation)
    }

    fn copy_pages(&mut self, source: &Self, indices: &[usize]) -> Result<Vec<MemoryPage>> {
        indices
            .iter()
            .map(|&index| {
                let page = source.page(index)?;
                if page.corrupt {
                    return Err(PagewerkError::Copy {
                        page: index,
                        reason: "page object is invalid".into(),
                    });
                }
                Ok(page.clone())
            })
            .collect()
    }

    fn add_page(&mut self, page: MemoryPage) -> Result<()> {
        self.pages.push(page);
        Ok(())
    }

    fn set_rotation(&mut self, index: usize, degrees: i32) -> Result<()> {
        self.page_mut(index)?.rotation = degrees;
        self.rotation_calls += 1;
        Ok(())
    }

    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        0.5 * font_size * text.chars().count() as f32
    }

    fn embed_image(&mut self, bytes: &[u8]) -> Result<EmbeddedImage<(u32, u32)>> {
        let (width, height) = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|err| PagewerkError::Image(err.to_string()))?
            .into_dimensions()
            .map_err(|err| PagewerkError::Image(err.to_string()))?;

        Ok(EmbeddedImage {
            handle: (width, height),
            width,
            height,
        })
    }

    fn draw_text(&mut self, index: usize, draw: &TextDraw) -> Result<()> {
        self.page_mut(index)?.stamps.push(Stamp::Text(draw.clone()));
        Ok(())
    }

    fn draw_image(&mut self, index: usize, image: &(u32, u32), draw: &ImageDraw) -> Result<()> {
        self.page_mut(index)?.stamps.push(Stamp::Image {
            width: image.0,
            height: image.1,
            draw: *draw,
        });
        Ok(())
    }

    fn save(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        self.save_calls += 1;
        if self.fail_on_save {
            return Err(PagewerkError::Save("disk full".into()));
        }

        let mut saved = self.clone();
        saved.structure = Structure::Intact;
        saved.compression = options.compression;
        saved.to_bytes()
    }
}
