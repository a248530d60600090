//! Recorded session loader for offline replay.
//!
//! Layout of a session directory:
//! ```text
//! session.yaml            camera intrinsics, distortion, resolution, frame ids
//! transforms.csv          ts, parent, child, tx, ty, tz, qw, qx, qy, qz[, static]
//! detections.csv          ts, id, class, score, center_x, center_y, size_x, size_y
//! depth/data.csv          ts, filename   -> depth/data/<filename> (raw little-endian f32)
//! color/data.csv          ts, filename   -> color/data/<filename> (PNG)      [optional]
//! cloud/data.csv          ts, filename   -> cloud/data/<filename> (x, y, z)  [optional]
//! groundtruth.csv         ts, x, y, z    (global frame)                      [optional]
//! phase.csv               ts, PHASE_NAME                                     [optional]
//! ```
//! Timestamps are nanoseconds. Lines starting with `#` are ignored.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::warn;

use crate::geometry::SE3;
use crate::sensors::{
    BoundingBox2D, CameraInfo, ColorImage, DepthImage, Detection2D, DetectionArray, Header,
    ObjectHypothesis, PointCloud, StampedPoint, StampedTransform,
};
use crate::system::InboundMsg;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

/// One recorded event, with file-backed payloads not yet loaded.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Transform(StampedTransform),
    GroundTruth(StampedPoint),
    PhaseCommand { timestamp_ns: u64, phase: String },
    Color(FileEntry),
    Depth(FileEntry),
    Detections(DetectionArray),
    Cloud(FileEntry),
}

impl SessionEvent {
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            SessionEvent::Transform(t) => t.stamp_ns,
            SessionEvent::GroundTruth(p) => p.header.stamp_ns,
            SessionEvent::PhaseCommand { timestamp_ns, .. } => *timestamp_ns,
            SessionEvent::Color(e) | SessionEvent::Depth(e) | SessionEvent::Cloud(e) => e.timestamp_ns,
            SessionEvent::Detections(d) => d.header.stamp_ns,
        }
    }

    /// Delivery order among events sharing a timestamp: transforms first,
    /// images before the detections computed on them, clouds last.
    fn rank(&self) -> u8 {
        match self {
            SessionEvent::Transform(_) => 0,
            SessionEvent::GroundTruth(_) => 1,
            SessionEvent::PhaseCommand { .. } => 2,
            SessionEvent::Color(_) => 3,
            SessionEvent::Depth(_) => 4,
            SessionEvent::Detections(_) => 5,
            SessionEvent::Cloud(_) => 6,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CameraYaml {
    /// [fx, fy, cx, cy]
    intrinsics: Vec<f64>,
    /// Plumb-bob [k1, k2, p1, p2, k3]
    #[serde(default)]
    distortion: Vec<f64>,
    /// [width, height]
    resolution: [u32; 2],
}

#[derive(Debug, Deserialize)]
struct SessionYaml {
    camera: CameraYaml,
    /// Frame of the depth-aligned camera.
    camera_frame: String,
    /// Frame of the range sensor.
    cloud_frame: String,
}

#[derive(Debug)]
pub struct ReplaySession {
    root: PathBuf,
    pub camera_info: CameraInfo,
    pub cloud_frame: String,
    pub transforms: Vec<StampedTransform>,
    pub detections: Vec<DetectionArray>,
    pub depth_entries: Vec<FileEntry>,
    pub color_entries: Vec<FileEntry>,
    pub cloud_entries: Vec<FileEntry>,
    pub groundtruth: Vec<StampedPoint>,
    pub phase_commands: Vec<(u64, String)>,
}

impl ReplaySession {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let yaml_path = root.join("session.yaml");
        let meta: SessionYaml = serde_yaml::from_reader(
            File::open(&yaml_path).with_context(|| format!("Failed to open {:?}", yaml_path))?,
        )
        .with_context(|| format!("Failed to parse {:?}", yaml_path))?;

        let camera_info = camera_info_from(&meta)?;
        let transforms = load_transforms(root.join("transforms.csv"))?;
        let detections = load_detections(root.join("detections.csv"), &meta.camera_frame)?;
        let depth_entries = load_file_list(root.join("depth/data.csv"))?;

        let color_entries = optional(root.join("color/data.csv"), load_file_list)?;
        let cloud_entries = optional(root.join("cloud/data.csv"), load_file_list)?;
        let phase_commands = optional(root.join("phase.csv"), load_phase_commands)?;
        // Ground truth is diagnostic only; a broken file is not fatal.
        let groundtruth = optional(root.join("groundtruth.csv"), load_groundtruth).unwrap_or_else(|e| {
            warn!("Could not load ground truth: {}. Continuing without it.", e);
            Vec::new()
        });

        Ok(Self {
            root,
            camera_info,
            cloud_frame: meta.cloud_frame,
            transforms,
            detections,
            depth_entries,
            color_entries,
            cloud_entries,
            groundtruth,
            phase_commands,
        })
    }

    pub fn camera_frame(&self) -> &str {
        &self.camera_info.header.frame_id
    }

    /// Every event of the session in delivery order.
    pub fn events(&self) -> Vec<SessionEvent> {
        let mut events: Vec<SessionEvent> = Vec::new();
        events.extend(self.transforms.iter().cloned().map(SessionEvent::Transform));
        events.extend(self.groundtruth.iter().cloned().map(SessionEvent::GroundTruth));
        events.extend(
            self.phase_commands
                .iter()
                .map(|(ts, phase)| SessionEvent::PhaseCommand {
                    timestamp_ns: *ts,
                    phase: phase.clone(),
                }),
        );
        events.extend(self.color_entries.iter().cloned().map(SessionEvent::Color));
        events.extend(self.depth_entries.iter().cloned().map(SessionEvent::Depth));
        events.extend(self.detections.iter().cloned().map(SessionEvent::Detections));
        events.extend(self.cloud_entries.iter().cloned().map(SessionEvent::Cloud));
        events.sort_by_key(|e| (e.timestamp_ns(), e.rank()));
        events
    }

    /// Load the payload behind `event`.
    pub fn load(&self, event: &SessionEvent) -> Result<InboundMsg> {
        let msg = match event {
            SessionEvent::Transform(t) => InboundMsg::Transform(t.clone()),
            SessionEvent::GroundTruth(p) => InboundMsg::GroundTruth(p.clone()),
            SessionEvent::PhaseCommand { phase, .. } => InboundMsg::PhaseCommand(phase.clone()),
            SessionEvent::Detections(d) => InboundMsg::Detections(d.clone()),
            SessionEvent::Depth(e) => InboundMsg::DepthImage(self.depth_image(e)?),
            SessionEvent::Color(e) => InboundMsg::ColorImage(self.color_image(e)?),
            SessionEvent::Cloud(e) => InboundMsg::PointCloud(self.point_cloud(e)?),
        };
        Ok(msg)
    }

    pub fn depth_image(&self, entry: &FileEntry) -> Result<DepthImage> {
        let path = self.root.join("depth/data").join(&entry.filename);
        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read depth image {:?}", path))?;
        let width = self.camera_info.width as usize;
        let height = self.camera_info.height as usize;
        if bytes.len() != width * height * 4 {
            bail!(
                "Depth image {:?} has {} bytes, expected {}x{}x4",
                path,
                bytes.len(),
                width,
                height
            );
        }
        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let header = Header::new(entry.timestamp_ns, self.camera_frame());
        Ok(DepthImage::new(header, width, height, data)?)
    }

    pub fn color_image(&self, entry: &FileEntry) -> Result<ColorImage> {
        let path = self.root.join("color/data").join(&entry.filename);
        let img = image::open(&path)
            .with_context(|| format!("Failed to read color image {:?}", path))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        let header = Header::new(entry.timestamp_ns, self.camera_frame());
        Ok(ColorImage::new(header, width as usize, height as usize, img.into_raw())?)
    }

    pub fn point_cloud(&self, entry: &FileEntry) -> Result<PointCloud> {
        let path = self.root.join("cloud/data").join(&entry.filename);
        let mut rdr = reader(&path)?;
        let mut points = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            if rec.len() < 3 {
                continue;
            }
            points.push(vector(&rec, 0)?);
        }
        Ok(PointCloud::new(
            Header::new(entry.timestamp_ns, self.cloud_frame.as_str()),
            points,
        ))
    }
}

fn camera_info_from(meta: &SessionYaml) -> Result<CameraInfo> {
    let intr = &meta.camera.intrinsics;
    if intr.len() != 4 {
        bail!("Expected 4 intrinsics [fx, fy, cx, cy], got {}", intr.len());
    }
    let [width, height] = meta.camera.resolution;
    Ok(CameraInfo {
        header: Header::new(0, meta.camera_frame.as_str()),
        width,
        height,
        k: [intr[0], 0.0, intr[2], 0.0, intr[1], intr[3], 0.0, 0.0, 1.0],
        d: meta.camera.distortion.clone(),
    })
}

/// Load `path` with `load` if it exists, otherwise return nothing.
fn optional<T>(path: PathBuf, load: fn(PathBuf) -> Result<Vec<T>>) -> Result<Vec<T>> {
    if path.exists() {
        load(path)
    } else {
        Ok(Vec::new())
    }
}

fn reader(path: &Path) -> Result<csv::Reader<File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn vector(rec: &StringRecord, start: usize) -> Result<Vector3<f64>> {
    Ok(Vector3::new(
        rec[start].trim().parse()?,
        rec[start + 1].trim().parse()?,
        rec[start + 2].trim().parse()?,
    ))
}

fn load_file_list(csv_path: PathBuf) -> Result<Vec<FileEntry>> {
    let mut rdr = reader(&csv_path)?;
    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        entries.push(FileEntry {
            timestamp_ns: rec[0].trim().parse()?,
            filename: rec[1].trim().to_string(),
        });
    }
    Ok(entries)
}

fn load_transforms(csv_path: PathBuf) -> Result<Vec<StampedTransform>> {
    let mut rdr = reader(&csv_path)?;
    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 10 {
            continue;
        }
        let translation = vector(&rec, 3)?;
        // Quaternion is w-first.
        let qw: f64 = rec[6].trim().parse()?;
        let qx: f64 = rec[7].trim().parse()?;
        let qy: f64 = rec[8].trim().parse()?;
        let qz: f64 = rec[9].trim().parse()?;
        let is_static = rec.get(10).is_some_and(|s| matches!(s.trim(), "1" | "true"));

        entries.push(StampedTransform {
            stamp_ns: rec[0].trim().parse()?,
            parent: rec[1].trim().to_string(),
            child: rec[2].trim().to_string(),
            transform: SE3::from_quaternion(qw, qx, qy, qz, translation),
            is_static,
        });
    }
    Ok(entries)
}

/// Rows sharing a timestamp form one detection message.
fn load_detections(csv_path: PathBuf, frame_id: &str) -> Result<Vec<DetectionArray>> {
    let mut rdr = reader(&csv_path)?;
    let mut by_stamp: BTreeMap<u64, Vec<Detection2D>> = BTreeMap::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 8 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        let detection = Detection2D {
            id: rec[1].trim().to_string(),
            bbox: BoundingBox2D {
                center_x: rec[4].trim().parse()?,
                center_y: rec[5].trim().parse()?,
                size_x: rec[6].trim().parse()?,
                size_y: rec[7].trim().parse()?,
            },
            results: vec![ObjectHypothesis {
                class_id: rec[2].trim().to_string(),
                score: rec[3].trim().parse()?,
            }],
        };

        by_stamp.entry(ts).or_default().push(detection);
    }
    Ok(by_stamp
        .into_iter()
        .map(|(ts, detections)| DetectionArray {
            header: Header::new(ts, frame_id),
            detections,
        })
        .collect())
}

fn load_groundtruth(csv_path: PathBuf) -> Result<Vec<StampedPoint>> {
    let mut rdr = reader(&csv_path)?;
    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 4 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        // Ground truth is always expressed in the global frame.
        entries.push(StampedPoint::new(
            Header::new(ts, crate::geometry::DEFAULT_GLOBAL_FRAME),
            vector(&rec, 1)?,
        ));
    }
    Ok(entries)
}

fn load_phase_commands(csv_path: PathBuf) -> Result<Vec<(u64, String)>> {
    let mut rdr = reader(&csv_path)?;
    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        entries.push((rec[0].trim().parse()?, rec[1].trim().to_string()));
    }
    Ok(entries)
}
