// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-range selections for splitting.
//
// Out-of-bounds input is never an error here: it is clamped into
// `[1, page_count]` so that every range always names at least one real page.

use pagewerk_core::types::PageRange;
use tracing::debug;

/// Clamp `range` into the document: `start` into `[1, page_count]`, then
/// `end` into `[start, page_count]`.
///
/// Idempotent. A zero `page_count` is treated as a single page.
pub fn normalize(range: &PageRange, page_count: u32) -> PageRange {
    let last = page_count.max(1);
    let start = range.start.clamp(1, last);
    let end = range.end.clamp(start, last);

    if start != range.start || end != range.end {
        debug!(
            name = %range.name,
            from_start = range.start,
            from_end = range.end,
            start,
            end,
            "range clamped"
        );
    }

    PageRange {
        start,
        end,
        name: range.name.clone(),
    }
}

/// 0-based page indices covered by a normalized range, in order.
pub fn page_indices(range: &PageRange) -> impl Iterator<Item = usize> {
    (range.start..=range.end).map(|page| page as usize - 1)
}

/// Default range appended after `existing`: the whole document, labelled
/// "Split N" where N is one more than the current count.
pub fn add_range(existing: &[PageRange], page_count: u32) -> PageRange {
    PageRange::new(
        1,
        page_count.max(1),
        format!("Split {}", existing.len() + 1),
    )
}

/// Which field of a range to edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeField {
    Start(u32),
    End(u32),
    Name(String),
}

/// The user's list of split ranges for one document.
///
/// Always holds at least one range. Ranges may overlap or leave pages out.
#[derive(Debug, Clone)]
pub struct RangeSet {
    page_count: u32,
    ranges: Vec<PageRange>,
}

impl RangeSet {
    /// One range spanning the whole document, named "Split 1".
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            ranges: vec![add_range(&[], page_count)],
        }
    }

    /// Build from user-supplied ranges, normalizing each. Falls back to
    /// [`RangeSet::new`] when `ranges` is empty.
    pub fn from_ranges(page_count: u32, ranges: Vec<PageRange>) -> Self {
        if ranges.is_empty() {
            return Self::new(page_count);
        }
        Self {
            page_count,
            ranges: ranges.iter().map(|r| normalize(r, page_count)).collect(),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn ranges(&self) -> &[PageRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Append a default range and return it.
    pub fn add(&mut self) -> &PageRange {
        let range = add_range(&self.ranges, self.page_count);
        self.ranges.push(range);
        &self.ranges[self.ranges.len() - 1]
    }

    /// Remove the range at `index`. Returns `false` (and removes nothing) when
    /// it is the last remaining range or `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.ranges.len() <= 1 || index >= self.ranges.len() {
            return false;
        }
        self.ranges.remove(index);
        true
    }

    /// Edit one field of the range at `index`; start/end edits are
    /// re-normalized immediately. Returns `false` if `index` is out of bounds.
    pub fn update(&mut self, index: usize, field: RangeField) -> bool {
        let page_count = self.page_count;
        let Some(range) = self.ranges.get_mut(index) else {
            return false;
        };

        match field {
            RangeField::Start(start) => range.start = start,
            RangeField::End(end) => range.end = end,
            RangeField::Name(name) => range.name = name,
        }
        *range = normalize(range, page_count);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_start_and_end() {
        let r = normalize(&PageRange::new(0, 99, "a"), 5);
        assert_eq!((r.start, r.end), (1, 5));

        let r = normalize(&PageRange::new(9, 2, "b"), 5);
        assert_eq!((r.start, r.end), (5, 5));

        let r = normalize(&PageRange::new(4, 2, "c"), 5);
        assert_eq!((r.start, r.end), (4, 4));
    }

    #[test]
    fn normalize_is_idempotent() {
        for page_count in 1..=6 {
            for start in 0..=8 {
                for end in 0..=8 {
                    let once = normalize(&PageRange::new(start, end, "r"), page_count);
                    let twice = normalize(&once, page_count);
                    assert_eq!(once, twice);
                    assert!(1 <= once.start && once.start <= once.end && once.end <= page_count);
                }
            }
        }
    }

    #[test]
    fn indices_are_zero_based() {
        let r = PageRange::new(2, 4, "x");
        assert_eq!(page_indices(&r).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn new_set_has_one_full_range() {
        let set = RangeSet::new(7);
        assert_eq!(set.ranges(), &[PageRange::new(1, 7, "Split 1")]);
    }

    #[test]
    fn add_names_by_count() {
        let mut set = RangeSet::new(3);
        set.add();
        set.add();
        let names: Vec<_> = set.ranges().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Split 1", "Split 2", "Split 3"]);
    }

    #[test]
    fn add_after_remove_may_repeat_a_name() {
        let mut set = RangeSet::new(3);
        set.add();
        set.add();
        assert!(set.remove(0));
        let added = set.add().clone();
        assert_eq!(added.name, "Split 3");
        assert_eq!(set.ranges().iter().filter(|r| r.name == "Split 3").count(), 2);
    }

    #[test]
    fn cannot_remove_last_range() {
        let mut set = RangeSet::new(3);
        assert!(!set.remove(0));
        assert_eq!(set.len(), 1);

        set.add();
        assert!(set.remove(1));
        assert!(!set.remove(0));
    }

    #[test]
    fn update_renormalizes() {
        let mut set = RangeSet::new(4);
        assert!(set.update(0, RangeField::Start(3)));
        assert!(set.update(0, RangeField::End(1)));
        assert_eq!((set.ranges()[0].start, set.ranges()[0].end), (3, 3));

        assert!(set.update(0, RangeField::Name("tail".into())));
        assert_eq!(set.ranges()[0].name, "tail");
        assert!(!set.update(5, RangeField::Start(1)));
    }

    #[test]
    fn from_ranges_normalizes_and_defaults() {
        let set = RangeSet::from_ranges(3, vec![PageRange::new(0, 10, "all")]);
        assert_eq!(set.ranges(), &[PageRange::new(1, 3, "all")]);

        let set = RangeSet::from_ranges(3, Vec::new());
        assert_eq!(set.len(), 1);
    }
}
