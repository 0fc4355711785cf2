// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-page rotation deltas, kept separate from the rotation stored in the
// document so that applying them is always absolute.

use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::RotationDirection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::library::PageDocument;

/// Fold any multiple of 90 into `{0, 90, 180, 270}`.
pub fn normalize_degrees(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

/// Rotation bookkeeping for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    /// 1-based page number.
    pub page_number: u32,
    /// User-applied rotation on top of `original_rotation`.
    pub rotation_delta: i32,
    /// Rotation stored in the document when it was opened.
    pub original_rotation: i32,
}

impl RotationState {
    /// Rotation the page will have once applied.
    pub fn effective_rotation(&self) -> i32 {
        normalize_degrees(self.original_rotation + self.rotation_delta)
    }
}

/// Tracks rotation deltas for every page of one document.
#[derive(Debug, Clone)]
pub struct RotationTracker {
    pages: Vec<RotationState>,
}

impl RotationTracker {
    /// Tracker for pages with the given original rotations, all deltas zero.
    pub fn new(original_rotations: impl IntoIterator<Item = i32>) -> Self {
        let pages = original_rotations
            .into_iter()
            .enumerate()
            .map(|(i, original)| RotationState {
                page_number: i as u32 + 1,
                rotation_delta: 0,
                original_rotation: normalize_degrees(original),
            })
            .collect();
        Self { pages }
    }

    /// Seed original rotations from `document`.
    pub fn from_document<D: PageDocument>(document: &D) -> Result<Self> {
        let rotations = (0..document.page_count())
            .map(|i| document.page_rotation(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rotations))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[RotationState] {
        &self.pages
    }

    /// State of the page at 0-based `index`.
    pub fn page(&self, index: usize) -> Option<&RotationState> {
        self.pages.get(index)
    }

    /// Rotate one page a quarter turn.
    pub fn rotate(&mut self, index: usize, direction: RotationDirection) -> Result<()> {
        let count = self.pages.len();
        let page = self
            .pages
            .get_mut(index)
            .ok_or(PagewerkError::PageOutOfRange { page: index + 1, count })?;
        page.rotation_delta = normalize_degrees(page.rotation_delta + direction.degrees());
        Ok(())
    }

    /// Rotate every page a quarter turn.
    pub fn rotate_all(&mut self, direction: RotationDirection) {
        for page in &mut self.pages {
            page.rotation_delta = normalize_degrees(page.rotation_delta + direction.degrees());
        }
    }

    /// Zero every delta.
    pub fn reset(&mut self) {
        for page in &mut self.pages {
            page.rotation_delta = 0;
        }
    }

    /// Whether any page has a pending rotation.
    pub fn is_dirty(&self) -> bool {
        self.pages.iter().any(|p| p.rotation_delta != 0)
    }

    /// Write rotations into `document`. Only pages with a non-zero delta are
    /// touched, and each gets the absolute `original + delta`, so applying
    /// the same tracker twice gives the same result.
    #[instrument(skip_all, fields(pages = self.pages.len()))]
    pub fn apply<D: PageDocument>(&self, document: &mut D) -> Result<usize> {
        let count = document.page_count();
        let mut applied = 0;

        for (index, state) in self.pages.iter().enumerate() {
            if state.rotation_delta == 0 {
                continue;
            }
            if index >= count {
                return Err(PagewerkError::PageOutOfRange {
                    page: index + 1,
                    count,
                });
            }
            document.set_rotation(index, state.effective_rotation())?;
            applied += 1;
        }

        debug!(applied, "rotations applied");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewerk_core::types::RotationDirection::{Clockwise, CounterClockwise};

    use crate::library::{DocumentLibrary, LoadOptions};
    use crate::memory::{MemoryDocument, MemoryLibrary, MemoryPage};

    #[test]
    fn four_clockwise_turns_return_to_zero() {
        let mut tracker = RotationTracker::new([0, 90, 180]);
        for index in 0..3 {
            for _ in 0..4 {
                tracker.rotate(index, Clockwise).unwrap();
            }
        }
        assert!(tracker.pages().iter().all(|p| p.rotation_delta == 0));
    }

    #[test]
    fn counter_clockwise_wraps() {
        let mut tracker = RotationTracker::new([0]);
        tracker.rotate(0, CounterClockwise).unwrap();
        assert_eq!(tracker.page(0).unwrap().rotation_delta, 270);
        tracker.rotate(0, Clockwise).unwrap();
        assert_eq!(tracker.page(0).unwrap().rotation_delta, 0);
    }

    #[test]
    fn delta_stays_normalized() {
        let mut tracker = RotationTracker::new([270]);
        for step in 0..25 {
            let direction = if step % 3 == 0 { CounterClockwise } else { Clockwise };
            tracker.rotate(0, direction).unwrap();
            let delta = tracker.page(0).unwrap().rotation_delta;
            assert!([0, 90, 180, 270].contains(&delta));
        }
    }

    #[test]
    fn rotate_all_and_reset() {
        let mut tracker = RotationTracker::new([0, 0]);
        tracker.rotate_all(Clockwise);
        tracker.rotate(1, Clockwise).unwrap();
        assert_eq!(tracker.page(0).unwrap().rotation_delta, 90);
        assert_eq!(tracker.page(1).unwrap().rotation_delta, 180);

        tracker.reset();
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn out_of_range_page_rejected() {
        let mut tracker = RotationTracker::new([0]);
        assert!(matches!(
            tracker.rotate(3, Clockwise),
            Err(PagewerkError::PageOutOfRange { page: 4, count: 1 })
        ));
    }

    #[test]
    fn apply_is_absolute_and_skips_untouched_pages() {
        let library = MemoryLibrary;
        let bytes = MemoryDocument::with_pages(vec![
            MemoryPage::new("a").with_rotation(90),
            MemoryPage::new("b").with_rotation(180),
        ])
        .to_bytes()
        .unwrap();
        let mut doc = library.load(&bytes, LoadOptions::strict()).unwrap();

        let mut tracker = RotationTracker::from_document(&doc).unwrap();
        tracker.rotate(0, Clockwise).unwrap();

        assert_eq!(tracker.apply(&mut doc).unwrap(), 1);
        assert_eq!(tracker.apply(&mut doc).unwrap(), 1);
        assert_eq!(doc.page_rotation(0).unwrap(), 180);
        assert_eq!(doc.page_rotation(1).unwrap(), 180);
        assert_eq!(doc.rotation_calls(), 2);
    }
}
