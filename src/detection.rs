//! Detection data model shared by the post-processing pipeline.
//!
//! Boxes produced by the [`decode`] step are immutable; [`nms`] and the cross-class cap only
//! select subsets of them.

pub mod decode;
pub mod nms;

use serde::{Deserialize, Serialize};

use crate::num::kth_largest;

/// Axis-aligned bounding box in corner form, `(x1, y1)` top-left and `(x2, y2)` bottom-right.
///
/// Coordinates live in the network input frame right after decoding and in original image pixels
/// after rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Returns the amount of area covered by `self`.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    fn intersection_area(&self, other: &Self) -> f32 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        w.max(0.0) * h.max(0.0)
    }

    fn union_area(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    /// Computes the Intersection over Union (IOU) of `self` and `other`.
    ///
    /// Two degenerate boxes have an IOU of 0.
    pub fn iou(&self, other: &Self) -> f32 {
        let union = self.union_area(other);
        if union > 0.0 {
            self.intersection_area(other) / union
        } else {
            0.0
        }
    }

    /// Clamps all coordinates into `[0, width] × [0, height]`.
    pub fn clip(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }

    /// Multiplies all coordinates by `factor`, mapping between coordinate frames.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x1: self.x1 * factor,
            y1: self.y1 * factor,
            x2: self.x2 * factor,
            y2: self.y2 * factor,
        }
    }
}

/// A detected object: a bounding box plus a confidence score in `[0, 1]`.
///
/// The object class is not stored here; it is given by the detection's position in the
/// [`DetectionTable`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Detection {
    score: f32,
    bbox: BoundingBox,
}

impl Detection {
    pub fn new(score: f32, bbox: BoundingBox) -> Self {
        Self { score, bbox }
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

/// Accumulates the detections of a whole evaluation run, indexed by `(class, image)`.
///
/// Every `(class, image)` cell holds a well-formed (possibly empty) list; class index 0 is
/// reserved for the background class and never populated. The table is filled image by image and
/// serialized once after the run.
#[derive(Debug, Serialize, Deserialize)]
pub struct DetectionTable {
    num_classes: usize,
    num_images: usize,
    // indexed as entries[class][image]
    entries: Vec<Vec<Vec<Detection>>>,
}

impl DetectionTable {
    /// Creates a table with an empty placeholder for every `(class, image)` pair.
    pub fn new(num_classes: usize, num_images: usize) -> Self {
        Self {
            num_classes,
            num_images,
            entries: vec![vec![Vec::new(); num_images]; num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_images(&self) -> usize {
        self.num_images
    }

    pub fn get(&self, class: usize, image: usize) -> &[Detection] {
        &self.entries[class][image]
    }

    /// Stores the finished per-class list for one image.
    ///
    /// The background class (index 0) must stay empty.
    pub fn set(&mut self, class: usize, image: usize, detections: Vec<Detection>) {
        assert_ne!(class, 0, "background class must not hold detections");
        self.entries[class][image] = detections;
    }

    /// Returns the total number of detections recorded for `image` across all classes.
    pub fn image_len(&self, image: usize) -> usize {
        (1..self.num_classes)
            .map(|class| self.entries[class][image].len())
            .sum()
    }

    /// Enforces the image-wide detection budget `max_per_image` across all non-background
    /// classes.
    ///
    /// If the image holds more detections than the budget, the `max_per_image`-th largest score
    /// becomes a threshold and every class drops its detections below it. Ties at the threshold
    /// survive, so the result may slightly exceed the budget; this matches the published
    /// evaluation protocol and is deliberately not corrected. A budget of 0 disables capping.
    pub fn cap_image(&mut self, image: usize, max_per_image: usize) {
        if max_per_image == 0 {
            return;
        }

        let mut pool: Vec<f32> = (1..self.num_classes)
            .flat_map(|class| self.entries[class][image].iter().map(|det| det.score()))
            .collect();
        if pool.len() <= max_per_image {
            return;
        }

        let image_thresh = kth_largest(&mut pool, max_per_image);
        for class in 1..self.num_classes {
            self.entries[class][image].retain(|det| det.score() >= image_thresh);
        }
    }
}
