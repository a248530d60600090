//! Messages delivered to the detection worker.

use crate::sensors::{
    CameraInfo, ColorImage, DepthImage, DetectionArray, PointCloud, StampedPoint, StampedTransform,
};

/// One inbound message from an external source.
///
/// Transforms travel through the same queue as everything else, so a
/// message only ever sees the transforms submitted before it.
#[derive(Debug, Clone)]
pub enum InboundMsg {
    ColorImage(ColorImage),
    DepthImage(DepthImage),
    CameraInfo(CameraInfo),
    Detections(DetectionArray),
    PointCloud(PointCloud),
    /// Ground-truth target position in the global frame. Diagnostic only.
    GroundTruth(StampedPoint),
    /// Requested phase by name, e.g. `ONLY_DEPTH_DETECTION`.
    PhaseCommand(String),
    /// Static or dynamic link for the worker's transform buffer.
    Transform(StampedTransform),
}

impl InboundMsg {
    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMsg::ColorImage(_) => "color image",
            InboundMsg::DepthImage(_) => "depth image",
            InboundMsg::CameraInfo(_) => "camera info",
            InboundMsg::Detections(_) => "detections",
            InboundMsg::PointCloud(_) => "point cloud",
            InboundMsg::GroundTruth(_) => "ground truth",
            InboundMsg::PhaseCommand(_) => "phase command",
            InboundMsg::Transform(_) => "transform",
        }
    }
}
