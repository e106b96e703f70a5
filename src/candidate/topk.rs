//! Top-K tracking for scored candidates.

use std::cmp::Ordering;

/// Candidate with a total descending order and deterministic tie-breaking.
pub trait Ranked {
    /// `Less` means `self` ranks ahead of `other`.
    fn rank_cmp(&self, other: &Self) -> Ordering;
}

/// Correlation peak at a template placement (top-left coordinates).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    /// X coordinate (column) of the placement.
    pub x: usize,
    /// Y coordinate (row) of the placement.
    pub y: usize,
    /// Normalized cross-correlation score at the placement.
    pub score: f32,
}

impl Ranked for Peak {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.y.cmp(&other.y))
            .then_with(|| self.x.cmp(&other.x))
    }
}

/// Sorts candidates best-first.
pub(crate) fn sort_desc<T: Ranked>(items: &mut [T]) {
    items.sort_by(T::rank_cmp);
}

/// Top-K container with O(k) insertion cost.
pub struct TopK<T> {
    k: usize,
    items: Vec<T>,
}

impl<T: Ranked> TopK<T> {
    /// Creates a new Top-K collector.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k.min(4096)),
        }
    }

    /// Pushes a candidate, evicting the worst one if at capacity.
    pub fn push(&mut self, item: T) {
        if self.k == 0 {
            return;
        }
        if self.items.len() < self.k {
            self.items.push(item);
            return;
        }

        let mut worst_idx = 0usize;
        for (idx, existing) in self.items.iter().enumerate().skip(1) {
            if existing.rank_cmp(&self.items[worst_idx]) == Ordering::Greater {
                worst_idx = idx;
            }
        }

        if item.rank_cmp(&self.items[worst_idx]) == Ordering::Less {
            self.items[worst_idx] = item;
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns candidates sorted best-first.
    pub fn into_sorted_desc(mut self) -> Vec<T> {
        sort_desc(&mut self.items);
        self.items
    }
}

impl<T: Ranked> Extend<T> for TopK<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(x: usize, score: f32) -> Peak {
        Peak { x, y: 0, score }
    }

    #[test]
    fn keeps_best_k_in_order() {
        let mut topk = TopK::new(2);
        topk.extend([peak(0, 0.1), peak(1, 0.9), peak(2, 0.5), peak(3, 0.7)]);
        let kept = topk.into_sorted_desc();
        assert_eq!(kept.iter().map(|p| p.x).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn ties_break_on_position() {
        let mut topk = TopK::new(1);
        topk.extend([peak(4, 0.5), peak(2, 0.5)]);
        assert_eq!(topk.into_sorted_desc()[0].x, 2);
    }
}
