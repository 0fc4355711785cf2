// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Placement geometry for image composition and page overlays.
//
// Pure arithmetic, unit-agnostic: callers pass page and image sizes in the
// same unit and get rectangles back in that unit.

use pagewerk_core::types::WatermarkPosition;

use crate::library::PageSize;

/// Inset of corner-anchored overlays from the page edges.
pub const OVERLAY_INSET: f32 = 20.0;

/// Fraction of a grid cell an image may occupy along its limiting axis.
pub const CELL_FILL: f32 = 0.9;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Whether `self` lies within `outer`, allowing for float rounding.
    pub fn fits_within(&self, outer: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        self.x >= outer.x - EPS
            && self.y >= outer.y - EPS
            && self.x + self.width <= outer.x + outer.width + EPS
            && self.y + self.height <= outer.y + outer.height + EPS
    }
}

/// Number of grid columns and rows on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub cols: u32,
    pub rows: u32,
}

impl GridShape {
    /// Grid for `count` images: 1×1 up to one image, two columns up to four,
    /// three columns beyond that. Rows grow to hold every image.
    pub fn for_count(count: usize) -> Self {
        let count = count as u32;
        match count {
            0 | 1 => Self { cols: 1, rows: 1 },
            2..=4 => Self {
                cols: 2,
                rows: count.div_ceil(2),
            },
            _ => Self {
                cols: 3,
                rows: count.div_ceil(3),
            },
        }
    }

    pub fn cells(&self) -> u32 {
        self.cols * self.rows
    }
}

/// Where one image lands in a composed document.
///
/// `rect` uses a top-left origin with y growing downward, the natural reading
/// order of a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    /// Index into the input image list.
    pub image: usize,
    /// 0-based output page.
    pub page: usize,
    pub rect: Rect,
    /// The cell the image was fitted into (equal to the page for single mode).
    pub cell: Rect,
}

/// Lay `images` (width, height) out in a grid sized by [`GridShape::for_count`].
pub fn plan_grid(images: &[(f32, f32)], page: PageSize, margin: f32) -> Vec<ImagePlacement> {
    plan_grid_with_shape(images, page, margin, GridShape::for_count(images.len()))
}

/// Lay `images` out row by row in `shape`, starting a new page whenever the
/// grid is full.
pub fn plan_grid_with_shape(
    images: &[(f32, f32)],
    page: PageSize,
    margin: f32,
    shape: GridShape,
) -> Vec<ImagePlacement> {
    let cell_w = (page.width - 2.0 * margin) / shape.cols as f32;
    let cell_h = (page.height - 2.0 * margin) / shape.rows as f32;

    let mut placements = Vec::with_capacity(images.len());
    let (mut page_index, mut row, mut col) = (0usize, 0u32, 0u32);

    for (image, &(img_w, img_h)) in images.iter().enumerate() {
        if row >= shape.rows {
            page_index += 1;
            row = 0;
            col = 0;
        }

        let cell = Rect {
            x: margin + col as f32 * cell_w,
            y: margin + row as f32 * cell_h,
            width: cell_w,
            height: cell_h,
        };

        let scale = (cell_w * CELL_FILL / img_w).min(cell_h * CELL_FILL / img_h);
        let (w, h) = (img_w * scale, img_h * scale);

        placements.push(ImagePlacement {
            image,
            page: page_index,
            rect: Rect {
                x: cell.x + (cell_w - w) / 2.0,
                y: cell.y + (cell_h - h) / 2.0,
                width: w,
                height: h,
            },
            cell,
        });

        col += 1;
        if col >= shape.cols {
            col = 0;
            row += 1;
        }
    }

    placements
}

/// One image per page, scaled to fit the whole page and centred.
pub fn plan_single(images: &[(f32, f32)], page: PageSize) -> Vec<ImagePlacement> {
    let page_rect = Rect {
        x: 0.0,
        y: 0.0,
        width: page.width,
        height: page.height,
    };

    images
        .iter()
        .enumerate()
        .map(|(image, &(img_w, img_h))| {
            let scale = (page.width / img_w).min(page.height / img_h);
            let (w, h) = (img_w * scale, img_h * scale);
            ImagePlacement {
                image,
                page: image,
                rect: Rect {
                    x: (page.width - w) / 2.0,
                    y: (page.height - h) / 2.0,
                    width: w,
                    height: h,
                },
                cell: page_rect,
            }
        })
        .collect()
}

/// Number of output pages a plan needs.
pub fn pages_needed(placements: &[ImagePlacement]) -> usize {
    placements.iter().map(|p| p.page + 1).max().unwrap_or(0)
}

/// Lower-left corner of an `overlay` box anchored at `position` on `page`,
/// in page coordinates (origin bottom-left).
pub fn overlay_origin(position: WatermarkPosition, overlay: (f32, f32), page: PageSize) -> (f32, f32) {
    let (ow, oh) = overlay;
    let (w, h) = (page.width, page.height);

    match position {
        WatermarkPosition::Center => ((w - ow) / 2.0, (h - oh) / 2.0),
        WatermarkPosition::TopLeft => (OVERLAY_INSET, h - OVERLAY_INSET - oh),
        WatermarkPosition::TopRight => (w - OVERLAY_INSET - ow, h - OVERLAY_INSET - oh),
        WatermarkPosition::BottomLeft => (OVERLAY_INSET, OVERLAY_INSET),
        WatermarkPosition::BottomRight => (w - OVERLAY_INSET - ow, OVERLAY_INSET),
    }
}

/// Font size of a text overlay: `size_percent` of the page's shorter side.
pub fn overlay_font_size(size_percent: f32, page: PageSize) -> f32 {
    size_percent / 100.0 * page.min_side()
}

/// Box of an image overlay: width is `size_percent` of the page's shorter
/// side, height follows the image's aspect ratio.
pub fn image_overlay_size(size_percent: f32, page: PageSize, image: (u32, u32)) -> (f32, f32) {
    let width = size_percent / 100.0 * page.min_side();
    let height = width / image.0.max(1) as f32 * image.1 as f32;
    (width, height)
}
