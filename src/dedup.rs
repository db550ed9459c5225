//! Removal of overlapping hits from a ranked result list
//!
//! Neighbouring chunks share lines, so one region of code often comes back
//! several times. Only the best-scoring hit of each overlapping cluster is
//! kept.

use crate::store::SearchHit;

/// Fraction of a range that must be shared before two hits count as one
const OVERLAP_THRESHOLD: f64 = 0.5;

/// Inclusive line range of one hit in one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineSpan<'a> {
    file: &'a str,
    start: usize,
    end: usize,
}

impl<'a> LineSpan<'a> {
    fn of(hit: &'a SearchHit) -> Self {
        Self {
            file: &hit.file_path,
            start: hit.start_line,
            end: hit.end_line,
        }
    }

    fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    /// Same file and the shared lines exceed half of either range
    fn overlaps(&self, other: &LineSpan<'_>) -> bool {
        if self.file != other.file {
            return false;
        }

        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start > end {
            return false;
        }

        let shared = (end - start + 1) as f64;
        shared > self.len() as f64 * OVERLAP_THRESHOLD
            || shared > other.len() as f64 * OVERLAP_THRESHOLD
    }
}

/// Keep each hit that does not overlap an already kept one
///
/// Input must be sorted by descending score; output keeps the input order.
pub fn deduplicate(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut kept: Vec<SearchHit> = Vec::with_capacity(hits.len());

    for hit in hits {
        let span = LineSpan::of(&hit);
        if !kept.iter().any(|k| LineSpan::of(k).overlaps(&span)) {
            kept.push(hit);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(file: &str, start: usize, end: usize, score: f32) -> SearchHit {
        SearchHit {
            id: crate::store::point_id(file, start, end),
            score,
            file_path: file.to_string(),
            content: String::new(),
            start_line: start,
            end_line: end,
            language: "go".to_string(),
        }
    }

    fn ranges(hits: &[SearchHit]) -> Vec<(usize, usize)> {
        hits.iter().map(|h| (h.start_line, h.end_line)).collect()
    }

    #[test]
    fn test_small_overlap_is_kept() {
        // 11 shared lines of 50 and 51
        let out = deduplicate(vec![hit("a.go", 1, 50, 0.9), hit("a.go", 40, 90, 0.8)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_exactly_half_is_kept() {
        // 25 shared lines of 50 and 50
        let out = deduplicate(vec![hit("a.go", 1, 50, 0.9), hit("a.go", 26, 75, 0.8)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_majority_overlap_drops_lower_score() {
        // 31 shared lines of 50
        let out = deduplicate(vec![hit("a.go", 1, 50, 0.9), hit("a.go", 20, 70, 0.8)]);
        assert_eq!(ranges(&out), vec![(1, 50)]);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn test_small_range_inside_large_one() {
        // 5 lines fully inside: >50% of the short range
        let out = deduplicate(vec![hit("a.go", 1, 50, 0.9), hit("a.go", 10, 14, 0.8)]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_different_files_never_overlap() {
        let out = deduplicate(vec![hit("a.go", 1, 50, 0.9), hit("b.go", 1, 50, 0.8)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_order_is_preserved() {
        let input = vec![
            hit("b.go", 1, 50, 0.95),
            hit("a.go", 1, 50, 0.9),
            hit("b.go", 5, 50, 0.85),
            hit("a.go", 200, 250, 0.8),
        ];
        let out = deduplicate(input);
        let files: Vec<_> = out.iter().map(|h| (h.file_path.as_str(), h.start_line)).collect();
        assert_eq!(files, vec![("b.go", 1), ("a.go", 1), ("a.go", 200)]);
    }

    #[test]
    fn test_idempotent() {
        let input = vec![
            hit("a.go", 1, 50, 0.9),
            hit("a.go", 20, 70, 0.85),
            hit("a.go", 41, 90, 0.8),
            hit("c.go", 1, 10, 0.7),
        ];
        let once = deduplicate(input);
        let twice = deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(vec![]).is_empty());
    }
}
