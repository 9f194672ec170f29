//! Per-class non-maximum suppression.
//!
//! The region proposals of a two-stage detector produce duplicate detections for individual
//! objects. Non-Maximum Suppression (NMS) filters these duplicates out, leaving only a single
//! high-confidence detection per cluster. The variant here is the classic greedy one: keep the
//! most confident remaining box, discard everything that overlaps it too much, repeat.

use std::cmp::Reverse;

use crate::num::TotalF32;

use super::Detection;

/// A greedy non-maximum suppression pass over one class's candidates.
pub struct NonMaxSuppression {
    score_thresh: f32,
    iou_thresh: f32,
    out_buf: Vec<Detection>,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a new non-maximum suppressor.
    ///
    /// # Parameters
    ///
    /// - `score_thresh`: candidates must score strictly above this to take part at all.
    ///   Evaluation runs use 0.0, which only drops zero-probability rows.
    pub fn new(score_thresh: f32) -> Self {
        Self {
            score_thresh,
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            out_buf: Vec::new(),
        }
    }

    /// Sets the score threshold below which candidates are discarded up front.
    pub fn set_score_thresh(&mut self, score_thresh: f32) {
        self.score_thresh = score_thresh;
    }

    /// Sets the intersection-over-union threshold to consider two detections as overlapping.
    ///
    /// By default, [`Self::DEFAULT_IOU_THRESH`] is used.
    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    /// Performs non-maximum suppression on `candidates`.
    ///
    /// `candidates` is drained in the process. The surviving detections are returned as an
    /// iterator ordered by descending confidence; among equal scores the original candidate
    /// order is preserved, which keeps the whole pass deterministic.
    pub fn process(
        &mut self,
        candidates: &mut Vec<Detection>,
    ) -> impl Iterator<Item = Detection> + '_ {
        self.out_buf.clear();

        candidates.retain(|det| det.score() > self.score_thresh);
        // A stable sort keeps the proposal order among equal scores.
        candidates.sort_by_key(|det| Reverse(TotalF32(det.score())));

        while !candidates.is_empty() {
            let seed = candidates.remove(0);
            candidates.retain(|other| seed.bbox().iou(&other.bbox()) <= self.iou_thresh);
            self.out_buf.push(seed);
        }

        self.out_buf.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn det(score: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(score, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn nms_suppresses_non_maximum() {
        let mut nms = NonMaxSuppression::new(0.0);

        let a = det(0.6, 0.0, 0.0, 1.0, 1.0);
        let b = det(0.55, 0.0, 0.0, 1.1, 1.1);
        let survivors: Vec<_> = nms.process(&mut vec![a, b]).collect();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].score(), 0.6);
        assert_eq!(survivors[0].bbox(), a.bbox());
    }

    #[test]
    fn nms_ignores_nonoverlapping() {
        let mut nms = NonMaxSuppression::new(0.0);

        let a = det(1.0, 0.0, 0.0, 1.0, 1.0);
        let b = det(0.9, 5.0, 0.0, 6.0, 1.0);
        let survivors: Vec<_> = nms.process(&mut vec![a, b]).collect();
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].score(), 1.0);
        assert_eq!(survivors[1].score(), 0.9);
    }

    #[test]
    fn nms_filters_by_score_first() {
        let mut nms = NonMaxSuppression::new(0.5);

        let mut candidates = vec![
            det(0.4, 0.0, 0.0, 1.0, 1.0),
            det(0.6, 5.0, 0.0, 6.0, 1.0),
            det(0.5, 10.0, 0.0, 11.0, 1.0), // not strictly above the threshold
        ];
        let survivors: Vec<_> = nms.process(&mut candidates).collect();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].score(), 0.6);
    }

    #[test]
    fn nms_preserves_candidate_order_among_ties() {
        let mut nms = NonMaxSuppression::new(0.0);

        let first = det(0.7, 0.0, 0.0, 1.0, 1.0);
        let second = det(0.7, 5.0, 0.0, 6.0, 1.0);
        let survivors: Vec<_> = nms.process(&mut vec![first, second]).collect();
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].bbox(), first.bbox());
        assert_eq!(survivors[1].bbox(), second.bbox());
    }

    #[test]
    fn nms_is_idempotent() {
        let mut nms = NonMaxSuppression::new(0.0);
        nms.set_iou_thresh(0.5);

        let mut candidates = vec![
            det(0.9, 0.0, 0.0, 10.0, 10.0),
            det(0.8, 1.0, 1.0, 11.0, 11.0),
            det(0.7, 50.0, 50.0, 60.0, 60.0),
            det(0.6, 51.0, 50.0, 61.0, 60.0),
        ];
        let mut once: Vec<_> = nms.process(&mut candidates).collect();
        let first_pass = once.clone();
        let twice: Vec<_> = nms.process(&mut once).collect();

        assert_eq!(first_pass.len(), twice.len());
        for (a, b) in first_pass.iter().zip(&twice) {
            assert_eq!(a.score(), b.score());
            assert_eq!(a.bbox(), b.bbox());
        }
    }
}
