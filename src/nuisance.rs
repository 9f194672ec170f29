//! Nuisance-weight bookkeeping.
//!
//! Models are trained with three adversarial loss weights (altitude, viewing angle, weather).
//! The sign pattern of those weights yields a categorical label that partitions checkpoints and
//! evaluation output on disk; it never affects the detection algorithm itself.

use std::path::{Path, PathBuf};

/// Weights below this are treated as "off". The comparison is strict (`> 1e-10`), so values like
/// `1e-11` count as zero.
const GAMMA_EPSILON: f64 = 1e-10;

/// The three adversarial loss weights a model variant was trained with.
#[derive(Debug, Clone, Copy)]
pub struct NuisanceConfig {
    pub altitude: f64,
    pub angle: f64,
    pub weather: f64,
}

impl NuisanceConfig {
    pub fn new(altitude: f64, angle: f64, weather: f64) -> Self {
        Self {
            altitude,
            angle,
            weather,
        }
    }

    /// The categorical nuisance label, e.g. `A+V+W` or `Baseline`.
    ///
    /// The cascade mirrors the training toolkit, including its quirk that there is no `V+W` arm:
    /// angle and weather without altitude resolve to `V`. Kept for compatibility with the
    /// published directory layout.
    pub fn nuisance_type(&self) -> &'static str {
        let altitude = self.altitude > GAMMA_EPSILON;
        let angle = self.angle > GAMMA_EPSILON;
        let weather = self.weather > GAMMA_EPSILON;

        match (altitude, angle, weather) {
            (true, true, true) => "A+V+W",
            (true, true, false) => "A+V",
            (true, false, true) => "A+W",
            (true, false, false) => "A",
            (false, true, _) => "V",
            (false, false, true) => "W",
            (false, false, false) => "Baseline",
        }
    }

    /// The directory a model variant's checkpoints live in, under `root`.
    pub fn model_dir(&self, root: &Path) -> PathBuf {
        root.join(self.nuisance_type()).join(format!(
            "altitude={}_angle={}_weather={}",
            self.altitude, self.angle, self.weather
        ))
    }
}

/// Checkpoint file name for a `(session, epoch, step)` triple.
pub fn checkpoint_file(session: u32, epoch: u32, step: u32) -> String {
    format!("fpn_{}_{}_{}_adv.ckpt.json", session, epoch, step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_the_training_cascade() {
        assert_eq!(NuisanceConfig::new(0.1, 0.1, 0.1).nuisance_type(), "A+V+W");
        assert_eq!(NuisanceConfig::new(0.1, 0.1, 0.0).nuisance_type(), "A+V");
        assert_eq!(NuisanceConfig::new(0.1, 0.0, 0.1).nuisance_type(), "A+W");
        assert_eq!(NuisanceConfig::new(0.1, 0.0, 0.0).nuisance_type(), "A");
        assert_eq!(NuisanceConfig::new(0.0, 0.1, 0.0).nuisance_type(), "V");
        assert_eq!(NuisanceConfig::new(0.0, 0.0, 0.1).nuisance_type(), "W");
        assert_eq!(
            NuisanceConfig::new(0.0, 0.0, 0.0).nuisance_type(),
            "Baseline"
        );
    }

    #[test]
    fn there_is_no_v_plus_w_arm() {
        // Angle + weather without altitude resolves to "V", exactly like upstream.
        assert_eq!(NuisanceConfig::new(0.0, 0.1, 0.1).nuisance_type(), "V");
    }

    #[test]
    fn sub_epsilon_weights_count_as_off() {
        assert_eq!(
            NuisanceConfig::new(1e-11, 1e-11, 1e-11).nuisance_type(),
            "Baseline"
        );
        // The comparison is strict, so exactly-epsilon is still off.
        assert_eq!(
            NuisanceConfig::new(1e-10, 0.0, 0.0).nuisance_type(),
            "Baseline"
        );
    }

    #[test]
    fn model_dir_encodes_the_weights() {
        let dir = NuisanceConfig::new(0.1, 0.0, 0.0).model_dir(Path::new("models"));
        assert_eq!(
            dir,
            Path::new("models/A/altitude=0.1_angle=0_weather=0")
        );
    }

    #[test]
    fn checkpoint_file_name() {
        assert_eq!(checkpoint_file(1, 4, 3960), "fpn_1_4_3960_adv.ckpt.json");
    }
}
