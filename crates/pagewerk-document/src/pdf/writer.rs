// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image composer — lay raster images out onto new pages using `printpdf` 0.8.
//
// Placement comes from the layout module (grid or one image per page); this
// file only converts those rectangles into printpdf operations.

use pagewerk_core::config::AppConfig;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::{ImageLayoutMode, PaperSize};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectId, XObjectTransform,
};
use tracing::{debug, info, instrument};

use crate::layout::{self, ImagePlacement};
use crate::library::PageSize;

/// At 72 DPI one image pixel maps to one point before scaling.
const PLACEMENT_DPI: f32 = 72.0;

const DOCUMENT_TITLE: &str = "Pagewerk Images";

/// Builds new PDF documents from raster images.
pub struct ImageComposer {
    paper_size: PaperSize,
    /// Margin around the grid, in millimetres.
    margin_mm: f32,
}

impl ImageComposer {
    pub fn new(paper_size: PaperSize) -> Self {
        Self {
            paper_size,
            margin_mm: 10.0,
        }
    }

    /// Paper size and grid margin from the user's configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.paper_size).with_margin_mm(config.grid_margin_mm)
    }

    pub fn with_margin_mm(mut self, margin_mm: f32) -> Self {
        self.margin_mm = margin_mm.max(0.0);
        self
    }

    /// Paper dimensions in printpdf's Mm units.
    fn page_dimensions(&self) -> (Mm, Mm) {
        let (w_mm, h_mm) = self.paper_size.dimensions_mm();
        (Mm(w_mm as f32), Mm(h_mm as f32))
    }

    /// Compose `images` into one document.
    ///
    /// Grid mode packs images into cells sized by how many there are, moving
    /// to a new page when the grid is full. Single mode gives each image its
    /// own page, scaled to the full page.
    #[instrument(skip_all, fields(images = images.len(), mode = ?mode))]
    pub fn compose(&self, images: &[&[u8]], mode: ImageLayoutMode) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(PagewerkError::InvalidInput(
                "at least one image is required".into(),
            ));
        }

        let (page_w, page_h) = self.page_dimensions();
        let page = PageSize::new(page_w.into_pt().0, page_h.into_pt().0);
        let margin = Mm(self.margin_mm).into_pt().0;
        if mode == ImageLayoutMode::Grid && 2.0 * margin >= page.min_side() {
            return Err(PagewerkError::InvalidInput(format!(
                "a {} mm margin leaves no printable area on {:?} paper",
                self.margin_mm, self.paper_size
            )));
        }

        info!(paper = ?self.paper_size, "Composing images");

        let raws = images
            .iter()
            .enumerate()
            .map(|(index, bytes)| decode(index, bytes))
            .collect::<Result<Vec<_>>>()?;
        let sizes: Vec<(f32, f32)> = raws
            .iter()
            .map(|raw| (raw.width as f32, raw.height as f32))
            .collect();

        let placements = match mode {
            ImageLayoutMode::Grid => layout::plan_grid(&sizes, page, margin),
            ImageLayoutMode::SinglePage => layout::plan_single(&sizes, page),
        };

        let mut doc = PdfDocument::new(DOCUMENT_TITLE);
        let ids: Vec<XObjectId> = raws.iter().map(|raw| doc.add_image(raw)).collect();

        let mut ops_per_page: Vec<Vec<Op>> = (0..layout::pages_needed(&placements))
            .map(|_| Vec::new())
            .collect();
        for placement in &placements {
            let (w, h) = sizes[placement.image];
            ops_per_page[placement.page].push(Op::UseXobject {
                id: ids[placement.image].clone(),
                transform: transform_for(placement, (w, h), page),
            });
        }

        let pages: Vec<PdfPage> = ops_per_page
            .into_iter()
            .map(|ops| PdfPage::new(page_w, page_h, ops))
            .collect();
        debug!(pages = pages.len(), "Image layout complete");
        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(warnings = warnings.len(), "printpdf reported warnings");
        }

        Ok(output)
    }
}

fn decode(index: usize, bytes: &[u8]) -> Result<RawImage> {
    let dynamic_image = ::image::load_from_memory(bytes).map_err(|err| {
        PagewerkError::Image(format!("failed to decode image #{}: {err}", index + 1))
    })?;

    let width = dynamic_image.width() as usize;
    let height = dynamic_image.height() as usize;
    let rgb_image = dynamic_image.to_rgb8();

    Ok(RawImage {
        pixels: RawImageData::U8(rgb_image.into_raw()),
        width,
        height,
        data_format: RawImageFormat::RGB8,
        tag: Vec::new(),
    })
}

/// Layout rectangles have a top-left origin; PDF user space is bottom-left.
fn transform_for(placement: &ImagePlacement, image: (f32, f32), page: PageSize) -> XObjectTransform {
    let rect = placement.rect;
    XObjectTransform {
        translate_x: Some(Pt(rect.x)),
        translate_y: Some(Pt(page.height - rect.y - rect.height)),
        scale_x: Some(rect.width / image.0),
        scale_y: Some(rect.height / image.1),
        dpi: Some(PLACEMENT_DPI),
        rotate: None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use ::image::{DynamicImage, ImageFormat, RgbImage};
    use lopdf::Document;

    use super::*;
    use crate::layout::Rect;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn page_count(pdf: &[u8]) -> usize {
        Document::load_mem(pdf).unwrap().get_pages().len()
    }

    #[test]
    fn grid_packs_onto_one_page() {
        let images = [png(40, 20), png(20, 40), png(30, 30)];
        let refs: Vec<&[u8]> = images.iter().map(Vec::as_slice).collect();

        let pdf = ImageComposer::new(PaperSize::A4)
            .compose(&refs, ImageLayoutMode::Grid)
            .unwrap();
        assert_eq!(page_count(&pdf), 1);
    }

    #[test]
    fn single_mode_gives_each_image_a_page() {
        let images = [png(40, 20), png(20, 40), png(30, 30)];
        let refs: Vec<&[u8]> = images.iter().map(Vec::as_slice).collect();

        let pdf = ImageComposer::new(PaperSize::Letter)
            .compose(&refs, ImageLayoutMode::SinglePage)
            .unwrap();
        assert_eq!(page_count(&pdf), 3);
    }

    #[test]
    fn no_images_is_invalid() {
        let result = ImageComposer::new(PaperSize::A4).compose(&[], ImageLayoutMode::Grid);
        assert!(matches!(result, Err(PagewerkError::InvalidInput(_))));
    }

    #[test]
    fn margin_wider_than_page_is_invalid() {
        let image = png(10, 10);
        let result = ImageComposer::new(PaperSize::A4)
            .with_margin_mm(105.0)
            .compose(&[&image], ImageLayoutMode::Grid);
        assert!(matches!(result, Err(PagewerkError::InvalidInput(_))));
    }

    #[test]
    fn wide_margin_below_half_the_page_still_composes() {
        let image = png(10, 10);
        let pdf = ImageComposer::new(PaperSize::A4)
            .with_margin_mm(100.0)
            .compose(&[&image], ImageLayoutMode::Grid)
            .unwrap();
        assert_eq!(page_count(&pdf), 1);
    }

    #[test]
    fn undecodable_image_names_its_position() {
        let good = png(10, 10);
        let result = ImageComposer::new(PaperSize::A4)
            .compose(&[&good, b"not an image"], ImageLayoutMode::Grid);
        match result {
            Err(PagewerkError::Image(message)) => assert!(message.contains("#2")),
            other => panic!("expected image error, got {other:?}"),
        }
    }

    #[test]
    fn transform_flips_to_bottom_left_origin() {
        let placement = ImagePlacement {
            image: 0,
            page: 0,
            rect: Rect {
                x: 10.0,
                y: 20.0,
                width: 100.0,
                height: 50.0,
            },
            cell: Rect {
                x: 0.0,
                y: 0.0,
                width: 200.0,
                height: 400.0,
            },
        };
        let transform = transform_for(&placement, (200.0, 100.0), PageSize::new(200.0, 400.0));
        assert_eq!(transform.translate_x, Some(Pt(10.0)));
        assert_eq!(transform.translate_y, Some(Pt(330.0)));
        assert_eq!(transform.scale_x, Some(0.5));
        assert_eq!(transform.scale_y, Some(0.5));
    }
}
