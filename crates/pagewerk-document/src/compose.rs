// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Composition driver — merge, split, watermark, rotate, and compress.
//
// Each operation loads its inputs, drives the document library through one
// strictly sequential pass, and serialises exactly once per output. Nothing
// is written back when any step fails.

use pagewerk_core::config::WatermarkDefaults;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::{CompressionLevel, PageRange, RgbColor, WatermarkPosition};
use tracing::{debug, info, instrument, warn};

use crate::layout::{image_overlay_size, overlay_font_size, overlay_origin};
use crate::library::{
    DocumentLibrary, ImageDraw, LoadOptions, PageDocument, SaveOptions, TextDraw,
};
use crate::range::{normalize, page_indices};
use crate::rotation::RotationTracker;

/// What a watermark draws.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkContent {
    Text { text: String, color: RgbColor },
    /// JPEG or PNG bytes.
    Image { bytes: Vec<u8> },
}

/// A watermark applied identically to every page.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    pub content: WatermarkContent,
    /// 0.0 (invisible) to 1.0 (opaque).
    pub opacity: f32,
    /// Degrees, counter-clockwise.
    pub rotation: f32,
    /// Percentage of each page's shorter side.
    pub size_percent: f32,
    pub position: WatermarkPosition,
}

impl WatermarkSpec {
    /// Text watermark with the configured defaults for everything else.
    pub fn text(text: impl Into<String>, defaults: &WatermarkDefaults) -> Self {
        Self {
            content: WatermarkContent::Text {
                text: text.into(),
                color: defaults.color,
            },
            ..Self::from_defaults(defaults)
        }
    }

    /// Image watermark with the configured defaults for everything else.
    pub fn image(bytes: Vec<u8>, defaults: &WatermarkDefaults) -> Self {
        Self {
            content: WatermarkContent::Image { bytes },
            ..Self::from_defaults(defaults)
        }
    }

    pub fn from_defaults(defaults: &WatermarkDefaults) -> Self {
        Self {
            content: WatermarkContent::Text {
                text: defaults.text.clone(),
                color: defaults.color,
            },
            opacity: defaults.opacity,
            rotation: defaults.rotation,
            size_percent: defaults.size_percent,
            position: defaults.position,
        }
    }

    /// Copy with opacity clamped into `[0, 1]` and size into `[1, 100]`.
    pub fn clamped(&self) -> Self {
        let mut spec = self.clone();
        spec.opacity = if spec.opacity.is_finite() {
            spec.opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        spec.size_percent = if spec.size_percent.is_finite() {
            spec.size_percent.clamp(1.0, 100.0)
        } else {
            50.0
        };
        spec
    }

    /// Whether there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        match &self.content {
            WatermarkContent::Text { text, .. } => text.trim().is_empty(),
            WatermarkContent::Image { bytes } => bytes.is_empty(),
        }
    }
}

/// One document produced by a split.
#[derive(Debug, Clone)]
pub struct SplitOutput {
    pub name: String,
    /// The normalized range the output was cut from.
    pub range: PageRange,
    pub bytes: Vec<u8>,
}

impl SplitOutput {
    pub fn file_name(&self) -> String {
        format!("{}.pdf", self.name)
    }
}

/// Before/after sizes of a compression pass.
#[derive(Debug, Clone)]
pub struct CompressionReport {
    pub original_size: usize,
    pub compressed_size: usize,
    pub bytes: Vec<u8>,
}

impl CompressionReport {
    /// Bytes saved; negative when the output grew.
    pub fn reduction(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }

    /// Reduction as a percentage of the original size.
    pub fn percentage(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.reduction() as f64 / self.original_size as f64 * 100.0
    }
}

/// Sequences document-library calls for each user-facing operation.
pub struct Composer<'a, L: DocumentLibrary> {
    library: &'a L,
    save_options: SaveOptions,
}

impl<'a, L: DocumentLibrary> Composer<'a, L> {
    pub fn new(library: &'a L) -> Self {
        Self {
            library,
            save_options: SaveOptions::default(),
        }
    }

    pub fn with_save_options(mut self, save_options: SaveOptions) -> Self {
        self.save_options = save_options;
        self
    }

    fn load(&self, bytes: &[u8]) -> Result<L::Document> {
        self.library.load(bytes, LoadOptions::strict())
    }

    /// Number of pages in `source`.
    pub fn page_count(&self, source: &[u8]) -> Result<usize> {
        Ok(self.load(source)?.page_count())
    }

    /// A rotation tracker seeded with `source`'s stored rotations.
    pub fn rotation_tracker(&self, source: &[u8]) -> Result<RotationTracker> {
        RotationTracker::from_document(&self.load(source)?)
    }

    // -- Merge ----------------------------------------------------------------

    /// Concatenate every page of each input, inputs in the given order.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub fn merge(&self, inputs: &[&[u8]]) -> Result<Vec<u8>> {
        if inputs.is_empty() {
            return Err(PagewerkError::InvalidInput("no documents to merge".into()));
        }

        let mut merged = self.library.create();

        for (position, bytes) in inputs.iter().enumerate() {
            let source = self.load(bytes).map_err(|err| match err {
                PagewerkError::Parse(detail) => {
                    PagewerkError::Parse(format!("input #{}: {}", position + 1, detail))
                }
                other => other,
            })?;

            let indices: Vec<usize> = (0..source.page_count()).collect();
            for page in merged.copy_pages(&source, &indices)? {
                merged.add_page(page)?;
            }
            debug!(input = position + 1, pages = indices.len(), "input appended");
        }

        let output = merged.save(&self.save_options)?;
        info!(
            pages = merged.page_count(),
            output_bytes = output.len(),
            "merge complete"
        );
        Ok(output)
    }

    // -- Split ----------------------------------------------------------------

    /// One output per range, in list order. Ranges are normalized against the
    /// source first; overlapping ranges repeat pages.
    #[instrument(skip_all, fields(ranges = ranges.len()))]
    pub fn split(&self, source: &[u8], ranges: &[PageRange]) -> Result<Vec<SplitOutput>> {
        let source = self.load(source)?;
        let page_count = source.page_count() as u32;
        let mut outputs = Vec::with_capacity(ranges.len());

        for range in ranges {
            let range = normalize(range, page_count);
            let mut part = self.library.create();

            for index in page_indices(&range) {
                for page in part.copy_pages(&source, &[index])? {
                    part.add_page(page)?;
                }
            }

            let bytes = part.save(&self.save_options)?;
            debug!(name = %range.name, start = range.start, end = range.end, "range extracted");
            outputs.push(SplitOutput {
                name: range.name.clone(),
                range,
                bytes,
            });
        }

        info!(outputs = outputs.len(), "split complete");
        Ok(outputs)
    }

    // -- Watermark ------------------------------------------------------------

    /// Stamp `spec` on every page, positioned from each page's own size.
    #[instrument(skip_all, fields(position = ?spec.position))]
    pub fn watermark(&self, source: &[u8], spec: &WatermarkSpec) -> Result<Vec<u8>> {
        let spec = spec.clamped();
        let mut document = self.load(source)?;
        let page_count = document.page_count();

        if spec.is_empty() {
            warn!("watermark has no content, saving document unchanged");
            return document.save(&self.save_options);
        }

        match &spec.content {
            WatermarkContent::Text { text, color } => {
                for index in 0..page_count {
                    let page = document.page_size(index)?;
                    let font_size = overlay_font_size(spec.size_percent, page);
                    let width = document.text_width(text, font_size);
                    let (x, y) = overlay_origin(spec.position, (width, font_size), page);

                    document.draw_text(index, &TextDraw {
                        text: text.clone(),
                        x,
                        y,
                        font_size,
                        color: *color,
                        opacity: spec.opacity,
                        rotation: spec.rotation,
                    })?;
                }
            }
            WatermarkContent::Image { bytes } => {
                let image = document.embed_image(bytes)?;
                for index in 0..page_count {
                    let page = document.page_size(index)?;
                    let (width, height) =
                        image_overlay_size(spec.size_percent, page, (image.width, image.height));
                    let (x, y) = overlay_origin(spec.position, (width, height), page);

                    document.draw_image(index, &image.handle, &ImageDraw {
                        x,
                        y,
                        width,
                        height,
                        opacity: spec.opacity,
                        rotation: spec.rotation,
                    })?;
                }
            }
        }

        let output = document.save(&self.save_options)?;
        info!(pages = page_count, output_bytes = output.len(), "watermark applied");
        Ok(output)
    }

    // -- Rotate ---------------------------------------------------------------

    /// Apply `tracker` to `source` and save.
    #[instrument(skip_all)]
    pub fn rotate(&self, source: &[u8], tracker: &RotationTracker) -> Result<Vec<u8>> {
        let mut document = self.load(source)?;
        let applied = tracker.apply(&mut document)?;
        let output = document.save(&self.save_options)?;
        info!(applied, output_bytes = output.len(), "rotations saved");
        Ok(output)
    }

    // -- Compress -------------------------------------------------------------

    /// Re-save `source` at `level`.
    #[instrument(skip_all, fields(level = ?level, bytes_len = source.len()))]
    pub fn compress(&self, source: &[u8], level: CompressionLevel) -> Result<CompressionReport> {
        let mut document = self.load(source)?;
        let options = SaveOptions {
            compression: Some(level),
        };
        let bytes = document.save(&options)?;

        let report = CompressionReport {
            original_size: source.len(),
            compressed_size: bytes.len(),
            bytes,
        };
        info!(
            original = report.original_size,
            compressed = report.compressed_size,
            percentage = %format!("{:.1}", report.percentage()),
            "compression complete"
        );
        Ok(report)
    }
}
