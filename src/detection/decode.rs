//! Decoding raw network outputs into absolute, image-scale bounding boxes.
//!
//! The region proposal stage emits boxes in the network input frame; the classification head
//! predicts per-class regression deltas relative to those proposals. Decoding inverts the
//! delta encoding used during training (center offsets as fractions of the proposal size,
//! log-scale width/height ratios), clips the result to the input frame and rescales it into the
//! original image's pixel coordinates.

use itertools::izip;
use ndarray::{Array2, Axis};

use crate::nn::ImInfo;

use super::BoundingBox;

/// Normalization constants regression targets were standardized with during training.
///
/// When active, raw deltas are multiplied by `stds` and offset by `means` (per coordinate)
/// before inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaNormalization {
    pub means: [f32; 4],
    pub stds: [f32; 4],
}

/// Converts per-proposal regression deltas and proposal boxes into decoded candidate boxes.
pub struct BoxDecoder {
    bbox_reg: bool,
    class_agnostic: bool,
    normalization: Option<DeltaNormalization>,
}

impl BoxDecoder {
    /// Creates a decoder.
    ///
    /// # Parameters
    ///
    /// - `bbox_reg`: whether box regression is applied at all. When disabled, proposals are
    ///   reused as predictions and only clipping and rescaling happen.
    /// - `class_agnostic`: whether one shared 4-tuple of deltas is predicted for all classes
    ///   instead of one per class.
    /// - `normalization`: the training-time target normalization to undo, if any.
    pub fn new(
        bbox_reg: bool,
        class_agnostic: bool,
        normalization: Option<DeltaNormalization>,
    ) -> Self {
        Self {
            bbox_reg,
            class_agnostic,
            normalization,
        }
    }

    /// Decodes one image's worth of network outputs.
    ///
    /// `rois` must be `N×4`. With class-agnostic regression (or regression disabled) `deltas`
    /// must be `N×4`, otherwise `N×4C` with one coordinate group per class.
    pub fn decode(&self, rois: &Array2<f32>, deltas: &Array2<f32>, im_info: &ImInfo) -> DecodedBoxes {
        assert_eq!(rois.ncols(), 4, "proposal boxes must be N×4");

        if !self.bbox_reg {
            // Simply reuse the proposals as predictions for every class.
            let mut boxes = rois.clone();
            clip_and_rescale(&mut boxes, im_info);
            return DecodedBoxes {
                boxes,
                class_specific: false,
            };
        }

        assert_eq!(
            rois.nrows(),
            deltas.nrows(),
            "proposals and deltas disagree on the proposal count"
        );
        if self.class_agnostic {
            assert_eq!(deltas.ncols(), 4, "class-agnostic deltas must be N×4");
        } else {
            assert!(
                deltas.ncols() >= 4 && deltas.ncols() % 4 == 0,
                "class-specific deltas must be N×4C"
            );
        }

        let mut boxes = Array2::zeros(deltas.raw_dim());
        let groups = deltas.ncols() / 4;
        for (roi, delta_row, mut out_row) in izip!(
            rois.outer_iter(),
            deltas.outer_iter(),
            boxes.axis_iter_mut(Axis(0))
        ) {
            let w = roi[2] - roi[0];
            let h = roi[3] - roi[1];
            let ctr_x = roi[0] + 0.5 * w;
            let ctr_y = roi[1] + 0.5 * h;

            for group in 0..groups {
                let [dx, dy, dw, dh] = self.normalized_delta(&delta_row, group);

                let pred_ctr_x = ctr_x + dx * w;
                let pred_ctr_y = ctr_y + dy * h;
                let pred_w = dw.exp() * w;
                let pred_h = dh.exp() * h;

                out_row[group * 4] = pred_ctr_x - 0.5 * pred_w;
                out_row[group * 4 + 1] = pred_ctr_y - 0.5 * pred_h;
                out_row[group * 4 + 2] = pred_ctr_x + 0.5 * pred_w;
                out_row[group * 4 + 3] = pred_ctr_y + 0.5 * pred_h;
            }
        }

        clip_and_rescale(&mut boxes, im_info);
        DecodedBoxes {
            boxes,
            class_specific: groups > 1,
        }
    }

    fn normalized_delta(&self, row: &ndarray::ArrayView1<'_, f32>, group: usize) -> [f32; 4] {
        let mut delta = [0.0; 4];
        for (out, coord) in delta.iter_mut().zip(0..4) {
            let raw = row[group * 4 + coord];
            *out = match &self.normalization {
                Some(norm) => raw * norm.stds[coord] + norm.means[coord],
                None => raw,
            };
        }
        delta
    }
}

/// Clamps every box into the network input frame, then maps it back to original image pixels.
fn clip_and_rescale(boxes: &mut Array2<f32>, im_info: &ImInfo) {
    let inv_scale = 1.0 / im_info.scale;
    for (col, mut column) in boxes.axis_iter_mut(Axis(1)).enumerate() {
        let bound = if col % 2 == 0 {
            im_info.width
        } else {
            im_info.height
        };
        for value in column.iter_mut() {
            *value = value.clamp(0.0, bound) * inv_scale;
        }
    }
}

/// Decoded candidate boxes for one image, either shared across classes or one set per class.
pub struct DecodedBoxes {
    // N×4 (shared) or N×4C (one coordinate group per class)
    boxes: Array2<f32>,
    class_specific: bool,
}

impl DecodedBoxes {
    pub fn num_proposals(&self) -> usize {
        self.boxes.nrows()
    }

    /// Returns the decoded box of proposal `proposal` for class `class`.
    pub fn class_box(&self, class: usize, proposal: usize) -> BoundingBox {
        let offset = if self.class_specific { class * 4 } else { 0 };
        BoundingBox::new(
            self.boxes[[proposal, offset]],
            self.boxes[[proposal, offset + 1]],
            self.boxes[[proposal, offset + 2]],
            self.boxes[[proposal, offset + 3]],
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    fn im_info(width: f32, height: f32, scale: f32) -> ImInfo {
        ImInfo {
            width,
            height,
            scale,
        }
    }

    #[test]
    fn zero_deltas_decode_to_the_proposals() {
        let rois = array![[10.0, 20.0, 30.0, 60.0], [0.0, 0.0, 5.0, 5.0]];
        let deltas = Array2::zeros((2, 4));
        let decoder = BoxDecoder::new(true, true, None);

        let decoded = decoder.decode(&rois, &deltas, &im_info(100.0, 100.0, 1.0));
        for proposal in 0..2 {
            let b = decoded.class_box(1, proposal);
            assert_abs_diff_eq!(b.x1, rois[[proposal, 0]]);
            assert_abs_diff_eq!(b.y1, rois[[proposal, 1]]);
            assert_abs_diff_eq!(b.x2, rois[[proposal, 2]]);
            assert_abs_diff_eq!(b.y2, rois[[proposal, 3]]);
        }
    }

    #[test]
    fn zero_deltas_are_identity_under_normalization() {
        // Standardized zero deltas stay zero when the target means are zero.
        let rois = array![[10.0, 20.0, 30.0, 60.0]];
        let deltas = Array2::zeros((1, 4));
        let norm = DeltaNormalization {
            means: [0.0; 4],
            stds: [0.1, 0.1, 0.2, 0.2],
        };
        let decoder = BoxDecoder::new(true, true, Some(norm));

        let b = decoder
            .decode(&rois, &deltas, &im_info(100.0, 100.0, 1.0))
            .class_box(1, 0);
        assert_abs_diff_eq!(b.x1, 10.0);
        assert_abs_diff_eq!(b.y2, 60.0);
    }

    #[test]
    fn deltas_shift_and_scale_the_proposal() {
        // A 10x10 proposal centered at (15, 15).
        let rois = array![[10.0, 10.0, 20.0, 20.0]];
        // Shift the center by half a width in x, double the height.
        let deltas = array![[0.5, 0.0, 0.0, std::f32::consts::LN_2]];
        let decoder = BoxDecoder::new(true, true, None);

        let b = decoder
            .decode(&rois, &deltas, &im_info(100.0, 100.0, 1.0))
            .class_box(1, 0);
        assert_abs_diff_eq!(b.x1, 15.0);
        assert_abs_diff_eq!(b.x2, 25.0);
        assert_abs_diff_eq!(b.y1, 5.0);
        assert_abs_diff_eq!(b.y2, 25.0);
    }

    #[test]
    fn class_specific_deltas_use_their_own_group() {
        let rois = array![[10.0, 10.0, 20.0, 20.0]];
        // Class 0 (background) unchanged, class 1 shifted right by one width.
        let deltas = array![[0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]];
        let decoder = BoxDecoder::new(true, false, None);

        let decoded = decoder.decode(&rois, &deltas, &im_info(100.0, 100.0, 1.0));
        let background = decoded.class_box(0, 0);
        let class1 = decoded.class_box(1, 0);
        assert_abs_diff_eq!(background.x1, 10.0);
        assert_abs_diff_eq!(class1.x1, 20.0);
        assert_abs_diff_eq!(class1.x2, 30.0);
    }

    #[test]
    fn decoded_boxes_are_clipped_to_the_input_frame() {
        let rois = array![[-10.0, -10.0, 500.0, 300.0]];
        let deltas = Array2::zeros((1, 4));
        let decoder = BoxDecoder::new(true, true, None);

        let b = decoder
            .decode(&rois, &deltas, &im_info(400.0, 200.0, 1.0))
            .class_box(1, 0);
        assert_eq!(b.x1, 0.0);
        assert_eq!(b.y1, 0.0);
        assert_eq!(b.x2, 400.0);
        assert_eq!(b.y2, 200.0);
    }

    #[test]
    fn rescale_maps_back_to_original_pixels() {
        // The image was upscaled 2x before entering the network.
        let rois = array![[10.0, 20.0, 30.0, 40.0]];
        let deltas = Array2::zeros((1, 4));
        let decoder = BoxDecoder::new(true, true, None);

        let b = decoder
            .decode(&rois, &deltas, &im_info(100.0, 100.0, 2.0))
            .class_box(1, 0);
        assert_abs_diff_eq!(b.x1, 5.0);
        assert_abs_diff_eq!(b.y1, 10.0);
        assert_abs_diff_eq!(b.x2, 15.0);
        assert_abs_diff_eq!(b.y2, 20.0);
    }

    #[test]
    fn disabled_regression_reuses_proposals() {
        let rois = array![[10.0, 20.0, 30.0, 40.0]];
        let deltas = array![[9.0, 9.0, 9.0, 9.0]]; // must be ignored
        let decoder = BoxDecoder::new(false, false, None);

        let decoded = decoder.decode(&rois, &deltas, &im_info(100.0, 100.0, 1.0));
        // Every class shares the proposal box.
        for class in 0..3 {
            let b = decoded.class_box(class, 0);
            assert_eq!(b, BoundingBox::new(10.0, 20.0, 30.0, 40.0));
        }
    }
}
