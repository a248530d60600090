//! Message handlers of the detection core.
//!
//! Every handler runs to completion on the caller's thread and takes the
//! detection state explicitly, together with the transform source to use.
//! Handlers either succeed or return an error without having mutated the
//! context.

use tracing::{debug, error, info, warn};

use crate::config::DepthtectionConfig;
use crate::depth::{cloud_from_depth_region, detection_pixel, is_no_measurement, point_from_depth, PixelRect};
use crate::error::{DepthtectionError, Result};
use crate::refine::{PointCloudRefiner, Refinement};
use crate::sensors::{
    CameraInfo, CameraModel, ColorImage, DepthImage, DetectionArray, Header, PointCloud, StampedPoint,
};
use crate::tracking::Phase;
use crate::transform::{TransformBuffer, TransformLookup};

use super::context::DetectionContext;
use super::messages::InboundMsg;
use super::sink::ResultSink;

/// One target observation extracted from a detection message.
struct Observation {
    class_label: String,
    score: f64,
    /// Global-frame point, `None` when the depth sample had no measurement.
    point: Option<StampedPoint>,
}

/// Detection core: turns inbound messages into candidate updates, phase
/// transitions and publications on `S`.
pub struct Depthtection<S: ResultSink> {
    config: DepthtectionConfig,
    refiner: PointCloudRefiner,
    sink: S,
}

impl<S: ResultSink> Depthtection<S> {
    pub fn new(config: DepthtectionConfig, sink: S) -> Self {
        let refiner = PointCloudRefiner::new(config.refinement.clone());
        Self {
            config,
            refiner,
            sink,
        }
    }

    pub fn config(&self) -> &DepthtectionConfig {
        &self.config
    }

    /// Fresh detection state for this configuration.
    pub fn context(&self) -> DetectionContext {
        DetectionContext::new(&self.config)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Apply a transform message to `transforms`, or handle any other
    /// message against it. Messages see exactly the transforms dispatched
    /// before them.
    pub fn dispatch(&mut self, ctx: &mut DetectionContext, transforms: &mut TransformBuffer, msg: InboundMsg) {
        match msg {
            InboundMsg::Transform(tf) => transforms.set_transform(tf),
            msg => self.handle(ctx, &*transforms, msg),
        }
    }

    /// Dispatch one message to its handler. Errors are logged, never
    /// propagated.
    pub fn handle(&mut self, ctx: &mut DetectionContext, tf: &dyn TransformLookup, msg: InboundMsg) {
        let kind = msg.kind();
        let result = match msg {
            InboundMsg::ColorImage(img) if self.config.synchronize_inputs => {
                let synced = ctx.synchronizer.push_color(img);
                self.process_synced(ctx, tf, synced)
            }
            InboundMsg::DepthImage(img) if self.config.synchronize_inputs => {
                let synced = ctx.synchronizer.push_depth(img);
                self.process_synced(ctx, tf, synced)
            }
            InboundMsg::Detections(dets) if self.config.synchronize_inputs => {
                let synced = ctx.synchronizer.push_detections(dets);
                self.process_synced(ctx, tf, synced)
            }
            InboundMsg::ColorImage(img) => {
                self.on_color_image(ctx, img);
                Ok(())
            }
            InboundMsg::DepthImage(img) => {
                self.on_depth_image(ctx, img);
                Ok(())
            }
            InboundMsg::Detections(dets) => self.on_detections(ctx, tf, &dets).map(|_| ()),
            InboundMsg::CameraInfo(info) => {
                self.on_camera_info(ctx, &info);
                Ok(())
            }
            InboundMsg::PointCloud(cloud) => self.on_point_cloud(ctx, tf, &cloud).map(|_| ()),
            InboundMsg::GroundTruth(p) => {
                self.on_ground_truth(ctx, p);
                Ok(())
            }
            InboundMsg::PhaseCommand(cmd) => self.on_phase_command(ctx, &cmd).map(|_| ()),
            InboundMsg::Transform(tf) => {
                debug!("Read-only transform source, dropped {} -> {}", tf.parent, tf.child);
                Ok(())
            }
        };

        if let Err(e) = result {
            self.report(ctx, kind, &e);
        }
    }

    fn process_synced(
        &mut self,
        ctx: &mut DetectionContext,
        tf: &dyn TransformLookup,
        synced: Option<super::sync::SyncedInputs>,
    ) -> Result<()> {
        match synced {
            Some(s) => self
                .on_images_and_detections(ctx, tf, s.color, s.depth, &s.detections)
                .map(|_| ()),
            None => Ok(()),
        }
    }

    fn report(&self, ctx: &mut DetectionContext, kind: &str, e: &DepthtectionError) {
        match e {
            DepthtectionError::FrameUnavailable { .. } if kind == "point cloud" => {
                if ctx.cloud_frame_error_logged {
                    debug!("Dropped {}: {}", kind, e);
                } else {
                    error!("Dropped {}: {}", kind, e);
                    ctx.cloud_frame_error_logged = true;
                }
            }
            DepthtectionError::InsufficientSupport { .. } => {
                debug!("Dropped {}: {}", kind, e);
            }
            _ => warn!("Dropped {}: {}", kind, e),
        }
    }

    pub fn on_color_image(&mut self, ctx: &mut DetectionContext, img: ColorImage) {
        ctx.color = Some(img);
    }

    pub fn on_depth_image(&mut self, ctx: &mut DetectionContext, img: DepthImage) {
        ctx.depth = Some(img);
    }

    /// Store the first calibration. Returns false if one was already set.
    pub fn on_camera_info(&mut self, ctx: &mut DetectionContext, info: &CameraInfo) -> bool {
        if ctx.camera.is_some() {
            return false;
        }
        let camera = CameraModel::from_camera_info(info);
        info!(
            "Camera calibration: fx {:.1} fy {:.1} cx {:.1} cy {:.1} ({}x{})",
            camera.fx, camera.fy, camera.cx, camera.cy, camera.width, camera.height
        );
        ctx.camera = Some(camera);
        true
    }

    pub fn on_ground_truth(&mut self, ctx: &mut DetectionContext, point: StampedPoint) {
        ctx.ground_truth = Some(point);
    }

    /// Apply a named phase request.
    ///
    /// Returns whether the phase changed.
    pub fn on_phase_command(&mut self, ctx: &mut DetectionContext, command: &str) -> Result<bool> {
        let target: Phase = command.parse()?;
        let changed = ctx.phase.request(target)?;
        if changed {
            info!("PHASE: {}", target);
            self.sink.publish_phase(target);
        }
        Ok(changed)
    }

    /// Process an exact-time triplet: the images become the latest frames,
    /// then the detections are handled against them.
    pub fn on_images_and_detections(
        &mut self,
        ctx: &mut DetectionContext,
        tf: &dyn TransformLookup,
        color: ColorImage,
        depth: DepthImage,
        detections: &DetectionArray,
    ) -> Result<usize> {
        ctx.color = Some(color);
        ctx.depth = Some(depth);
        self.on_detections(ctx, tf, detections)
    }

    /// Turn target detections into candidate observations.
    ///
    /// Returns the number of detections merged into the store. A transform
    /// failure drops the whole message.
    pub fn on_detections(
        &mut self,
        ctx: &mut DetectionContext,
        tf: &dyn TransformLookup,
        detections: &DetectionArray,
    ) -> Result<usize> {
        let phase = ctx.current_phase();
        if !phase.accepts_detections() {
            debug!("Ignoring detections in phase {}", phase);
            return Ok(0);
        }
        let camera = ctx.camera.ok_or(DepthtectionError::NoCalibration)?;
        let depth = ctx.depth.as_ref().ok_or(DepthtectionError::NoImage("depth"))?;

        let observations = self.observe(detections, depth, &camera, tf)?;

        ctx.candidates.begin_cycle();
        let mut merged = 0;
        for obs in observations {
            let Some(point) = obs.point else {
                self.advance_phase(ctx, false);
                continue;
            };
            self.advance_phase(ctx, true);
            ctx.candidates.match_or_create(
                &obs.class_label,
                obs.score,
                point,
                self.config.match_distance_threshold,
            );
            merged += 1;
        }

        ctx.reselect_best();
        self.publish_best(ctx);
        Ok(merged)
    }

    /// First pass over a detection message: project and transform every
    /// target detection without touching any state.
    fn observe(
        &mut self,
        detections: &DetectionArray,
        depth: &DepthImage,
        camera: &CameraModel,
        tf: &dyn TransformLookup,
    ) -> Result<Vec<Observation>> {
        let mut observations = Vec::new();
        for det in &detections.detections {
            let Some(hypothesis) = det.top_hypothesis() else {
                debug!("Detection {} has no hypothesis", det.id);
                continue;
            };
            if let Some(target) = &self.config.target_object {
                if hypothesis.class_id != *target {
                    continue;
                }
            }
            info!("Detection {} ({} {:.2})", det.id, hypothesis.class_id, hypothesis.score);

            if self.config.publish_depth_crop_cloud {
                let roi = PixelRect::from_bbox(&det.bbox, depth.width, depth.height);
                self.sink
                    .publish_depth_crop_cloud(&cloud_from_depth_region(depth, camera, roi));
            }

            let sampled = detection_pixel(&det.bbox, depth)
                .and_then(|(u, v)| point_from_depth(depth, u, v, camera).map(|p| (u, v, p)));
            let (u, v, p) = match sampled {
                Ok(s) => s,
                Err(e) => {
                    warn!("Skipping detection {}: {}", det.id, e);
                    continue;
                }
            };

            let point = if is_no_measurement(&p) {
                debug!("{}", DepthtectionError::NoDepth { u, v });
                None
            } else {
                let sensor = StampedPoint::new(
                    Header::new(detections.header.stamp_ns, depth.header.frame_id.clone()),
                    p,
                );
                Some(tf.transform_point(&sensor, &self.config.global_frame)?)
            };
            observations.push(Observation {
                class_label: hypothesis.class_id.clone(),
                score: hypothesis.score,
                point,
            });
        }
        Ok(observations)
    }

    fn advance_phase(&mut self, ctx: &mut DetectionContext, has_depth: bool) {
        if let Some(phase) = ctx.phase.on_visual_detection(has_depth) {
            info!("PHASE: {}", phase);
            self.sink.publish_phase(phase);
        }
    }

    /// Refine the best candidate with a point cloud.
    ///
    /// Returns `None` when the phase does not accept clouds.
    pub fn on_point_cloud(
        &mut self,
        ctx: &mut DetectionContext,
        tf: &dyn TransformLookup,
        cloud: &PointCloud,
    ) -> Result<Option<Refinement>> {
        if !ctx.current_phase().accepts_point_clouds() {
            return Ok(None);
        }
        let id = ctx.best.ok_or(DepthtectionError::NoBestCandidate)?;
        let candidate = ctx
            .candidates
            .get_mut(id)
            .ok_or(DepthtectionError::NoBestCandidate)?;

        let refinement = self.refiner.refine(
            cloud,
            candidate,
            tf,
            &self.config.global_frame,
            &self.config.base_frame,
        )?;
        debug!(
            "Refined {} to [{:.3}, {:.3}, {:.3}] from {} points, vehicle {:.2} m away",
            id,
            refinement.point.point.x,
            refinement.point.point.y,
            refinement.point.point.z,
            refinement.support(),
            refinement.vehicle_distance
        );

        if refinement.too_near {
            if ctx.phase.mark_too_near() {
                warn!(
                    "PHASE: {} ({:.2} m from candidate {})",
                    Phase::TooNearToDetect,
                    refinement.vehicle_distance,
                    id
                );
                self.sink.publish_phase(Phase::TooNearToDetect);
            }
        } else {
            self.sink.publish_filtered_cloud(&refinement.filtered);
        }

        ctx.reselect_best();
        self.publish_best(ctx);
        Ok(Some(refinement))
    }

    fn publish_best(&mut self, ctx: &DetectionContext) {
        let Some(best) = ctx.best_candidate() else {
            return;
        };
        self.sink.publish_candidate(best);

        if let Some(gt) = &ctx.ground_truth {
            let err = best.position() - gt.point;
            info!(
                "Ground truth error {}: [{:.3}, {:.3}, {:.3}] norm {:.3}",
                best.id,
                err.x,
                err.y,
                err.z,
                err.norm()
            );
        }
    }
}
