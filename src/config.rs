//! Runtime configuration.
//!
//! Every field has a default, so an empty YAML document (or none at all) is
//! a valid configuration.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::geometry::{DEFAULT_BASE_FRAME, DEFAULT_GLOBAL_FRAME};
use crate::refine::RefinerConfig;
use crate::tracking::{Phase, TrackingConfig};
use crate::transform::TransformBufferConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepthtectionConfig {
    /// Fixed frame all candidates live in.
    pub global_frame: String,

    /// Vehicle body frame.
    pub base_frame: String,

    /// Only detections of this class are used. `None` accepts every class.
    pub target_object: Option<String>,

    /// Observations strictly closer than this to a same-class candidate are
    /// merged into it (metres).
    pub match_distance_threshold: f64,

    /// Kept alongside `match_distance_threshold` for configurations that set
    /// only this name; a warning is logged when the two disagree.
    pub same_object_distance_threshold: f64,

    pub tracking: TrackingConfig,
    pub refinement: RefinerConfig,
    pub transforms: TransformBufferConfig,

    /// Process color, depth and detections only as exact-time triplets.
    pub synchronize_inputs: bool,

    /// Messages buffered per stream while waiting for a matching triplet.
    pub sync_queue_size: usize,

    /// Emit the back-projected depth crop of every target detection.
    pub publish_depth_crop_cloud: bool,

    pub initial_phase: Phase,

    /// Log filter for the binary (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
}

impl Default for DepthtectionConfig {
    fn default() -> Self {
        Self {
            global_frame: DEFAULT_GLOBAL_FRAME.to_string(),
            base_frame: DEFAULT_BASE_FRAME.to_string(),
            target_object: None,
            match_distance_threshold: 1.0,
            same_object_distance_threshold: 1.0,
            tracking: TrackingConfig::default(),
            refinement: RefinerConfig::default(),
            transforms: TransformBufferConfig::default(),
            synchronize_inputs: false,
            sync_queue_size: 10,
            publish_depth_crop_cloud: false,
            initial_phase: Phase::NoDetection,
            log_level: "info".to_string(),
        }
    }
}

impl DepthtectionConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = serde_yaml::from_reader(
            File::open(path).with_context(|| format!("Failed to open {:?}", path))?,
        )
        .with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("match_distance_threshold", self.match_distance_threshold),
            ("same_object_distance_threshold", self.same_object_distance_threshold),
            ("refinement.inclusion_radius", self.refinement.inclusion_radius),
            ("refinement.near_termination_radius", self.refinement.near_termination_radius),
            ("transforms.buffer_duration_s", self.transforms.buffer_duration_s),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                bail!("{} must be positive, got {}", name, value);
            }
        }
        if self.transforms.extrapolation_tolerance_s < 0.0 {
            bail!(
                "transforms.extrapolation_tolerance_s must not be negative, got {}",
                self.transforms.extrapolation_tolerance_s
            );
        }
        if self.refinement.min_support_points == 0 {
            bail!("refinement.min_support_points must be at least 1");
        }
        if self.sync_queue_size == 0 {
            bail!("sync_queue_size must be at least 1");
        }
        if self.global_frame.is_empty() || self.base_frame.is_empty() {
            bail!("global_frame and base_frame must be non-empty");
        }

        if self.match_distance_threshold != self.same_object_distance_threshold {
            warn!(
                "match_distance_threshold ({}) differs from same_object_distance_threshold ({}); matching uses {}",
                self.match_distance_threshold,
                self.same_object_distance_threshold,
                self.match_distance_threshold
            );
        }
        Ok(())
    }
}
