//! Threaded runtime around the detection core.
//!
//! A single worker thread owns the handlers, their context and the
//! transform buffer. Every mutation, transforms included, is serialized
//! through one queue, so replaying the same messages gives the same result
//! regardless of thread timing.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info};

use crate::config::DepthtectionConfig;
use crate::error::{DepthtectionError, Result};
use crate::transform::TransformBuffer;

use super::context::DetectionContext;
use super::messages::InboundMsg;
use super::node::Depthtection;
use super::shared_state::{SharedState, Snapshot};
use super::sink::ResultSink;

/// Capacity of the inbound queue. Submitting blocks while it is full.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Timeout for receiving messages. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Detection core running on its own thread.
pub struct DepthtectionSystem {
    shared: Arc<SharedState>,
    sender: Option<Sender<InboundMsg>>,
    worker: Option<JoinHandle<()>>,
}

impl DepthtectionSystem {
    pub fn new<S: ResultSink + 'static>(config: DepthtectionConfig, sink: S) -> Self {
        let shared = SharedState::new();
        let (sender, receiver) = bounded::<InboundMsg>(INBOUND_CHANNEL_CAPACITY);

        let transforms = TransformBuffer::new(config.transforms.clone());
        let node = Depthtection::new(config, sink);
        let worker = Self::spawn_worker(node, transforms, receiver, shared.clone());

        Self {
            shared,
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    fn spawn_worker<S: ResultSink + 'static>(
        mut node: Depthtection<S>,
        mut transforms: TransformBuffer,
        receiver: Receiver<InboundMsg>,
        shared: Arc<SharedState>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            info!("Detection worker started");
            let mut ctx = node.context();
            loop {
                if shared.is_shutdown_requested() {
                    break;
                }
                match receiver.recv_timeout(RECV_TIMEOUT) {
                    Ok(msg) => {
                        node.dispatch(&mut ctx, &mut transforms, msg);
                        *shared.snapshot.write() = snapshot(&ctx);
                        shared.mark_processed();
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("Inbound queue closed");
                        break;
                    }
                }
            }
            info!("Detection worker stopped after {} messages", shared.processed());
        })
    }

    /// Queue a message for the worker. Blocks while the queue is full.
    pub fn submit(&self, msg: InboundMsg) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(DepthtectionError::QueueClosed)?;
        sender.send(msg).map_err(|_| DepthtectionError::QueueClosed)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot.read().clone()
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Close the queue and wait until every queued message is handled.
    ///
    /// Fails with `WorkerPanicked` if the worker died; the snapshot then
    /// reflects only the messages handled before the panic.
    pub fn finish(&mut self) -> Result<()> {
        self.sender = None;
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        handle.join().map_err(|payload| {
            let reason = panic_reason(payload.as_ref());
            error!(
                "Detection worker panicked after {} messages: {}",
                self.shared.processed(),
                reason
            );
            DepthtectionError::WorkerPanicked(reason)
        })
    }

    /// Stop the worker as soon as the current message is done. Queued
    /// messages are discarded.
    pub fn shutdown(&mut self) -> Result<()> {
        self.shared.request_shutdown();
        self.finish()
    }
}

impl Drop for DepthtectionSystem {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("Runtime dropped after failure: {}", e);
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn snapshot(ctx: &DetectionContext) -> Snapshot {
    Snapshot {
        phase: ctx.current_phase(),
        best: ctx.best_candidate().cloned(),
        candidate_count: ctx.candidates.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::sensors::{
        BoundingBox2D, CameraInfo, DepthImage, Detection2D, DetectionArray, Header, ObjectHypothesis,
        PointCloud, StampedTransform,
    };
    use crate::system::{RecordingSink, ResultSink};
    use crate::tracking::Candidate;
    use crate::tracking::Phase;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const MS: u64 = 1_000_000;

    fn static_tf(parent: &str, child: &str, t: Vector3<f64>) -> InboundMsg {
        InboundMsg::Transform(StampedTransform {
            stamp_ns: 0,
            parent: parent.to_string(),
            child: child.to_string(),
            transform: SE3::from_translation(t),
            is_static: true,
        })
    }

    fn odometry(stamp_ns: u64, x: f64) -> InboundMsg {
        InboundMsg::Transform(StampedTransform {
            stamp_ns,
            parent: "earth".to_string(),
            child: "base_link".to_string(),
            transform: SE3::from_translation(Vector3::new(x, 0.0, 0.0)),
            is_static: false,
        })
    }

    fn camera_info() -> InboundMsg {
        InboundMsg::CameraInfo(CameraInfo {
            header: Header::new(0, "camera"),
            width: 640,
            height: 480,
            k: [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0],
            d: Vec::new(),
        })
    }

    fn depth(stamp_ns: u64) -> InboundMsg {
        let image = DepthImage::new(Header::new(stamp_ns, "camera"), 640, 480, vec![2.0; 640 * 480]).unwrap();
        InboundMsg::DepthImage(image)
    }

    fn person_at(stamp_ns: u64, u: f64) -> InboundMsg {
        InboundMsg::Detections(DetectionArray {
            header: Header::new(stamp_ns, "camera"),
            detections: vec![Detection2D {
                id: "0".to_string(),
                bbox: BoundingBox2D {
                    center_x: u,
                    center_y: 240.0,
                    size_x: 10.0,
                    size_y: 10.0,
                },
                results: vec![ObjectHypothesis {
                    class_id: "person".to_string(),
                    score: 0.8,
                }],
            }],
        })
    }

    #[test]
    fn test_queue_is_drained_in_order() {
        let sink = RecordingSink::new();
        let mut system = DepthtectionSystem::new(DepthtectionConfig::default(), sink.clone());
        system.submit(static_tf("earth", "camera", Vector3::new(1.0, 0.0, 0.0))).unwrap();
        system.submit(camera_info()).unwrap();
        system.submit(depth(1)).unwrap();
        system.submit(person_at(1, 320.0)).unwrap();
        system.submit(person_at(2, 345.0)).unwrap();
        system
            .submit(InboundMsg::PhaseCommand("ONLY_DEPTH_DETECTION".to_string()))
            .unwrap();
        system.finish().unwrap();

        let snap = system.snapshot();
        assert_eq!(snap.phase, Phase::OnlyDepthDetection);
        assert_eq!(snap.candidate_count, 1);
        assert_relative_eq!(
            *snap.best.unwrap().position(),
            Vector3::new(1.1, 0.0, 2.0),
            epsilon = 1e-9
        );
        assert_eq!(system.shared_state().processed(), 6);
        assert_eq!(sink.snapshot().candidates.len(), 2);
    }

    /// Replays `events`, sleeping `delay` before every transform.
    fn replay(events: &[InboundMsg], delay: Duration) -> (Phase, usize, Option<Candidate>) {
        let mut system = DepthtectionSystem::new(DepthtectionConfig::default(), RecordingSink::new());
        for msg in events {
            if matches!(msg, InboundMsg::Transform(_)) {
                thread::sleep(delay);
            }
            system.submit(msg.clone()).unwrap();
        }
        system.finish().unwrap();
        let snap = system.snapshot();
        (snap.phase, snap.candidate_count, snap.best)
    }

    #[test]
    fn test_transforms_follow_queue_order() {
        // 10 Hz odometry; the first detection at 1.099 s is submitted before
        // the 1.1 s sample and must not see it.
        let events = vec![
            static_tf("base_link", "camera", Vector3::zeros()),
            camera_info(),
            odometry(1000 * MS, 0.0),
            depth(1000 * MS),
            person_at(1099 * MS, 320.0),
            odometry(1100 * MS, 1.0),
            person_at(1099 * MS, 320.0),
        ];

        let immediate = replay(&events, Duration::ZERO);
        let delayed = replay(&events, Duration::from_millis(150));
        assert_eq!(immediate, delayed);

        let (phase, count, best) = immediate;
        assert_eq!(phase, Phase::VisualDetectionWithDepth);
        assert_eq!(count, 1);
        let best = best.unwrap();
        assert_relative_eq!(best.confidence, 0.8, epsilon = 1e-12);
        assert_relative_eq!(*best.position(), Vector3::new(0.99, 0.0, 2.0), epsilon = 1e-9);
    }

    struct PanickingSink;

    impl ResultSink for PanickingSink {
        fn publish_candidate(&mut self, _candidate: &Candidate) {
            panic!("sink failure");
        }

        fn publish_filtered_cloud(&mut self, _cloud: &PointCloud) {}
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let mut system = DepthtectionSystem::new(DepthtectionConfig::default(), PanickingSink);
        system.submit(static_tf("earth", "camera", Vector3::zeros())).unwrap();
        system.submit(camera_info()).unwrap();
        system.submit(depth(1)).unwrap();
        system.submit(person_at(1, 320.0)).unwrap();

        assert_eq!(
            system.finish(),
            Err(DepthtectionError::WorkerPanicked("sink failure".to_string()))
        );
        assert_eq!(system.snapshot().candidate_count, 0);
        assert_eq!(system.finish(), Ok(()));
    }

    #[test]
    fn test_submit_after_finish_fails() {
        let mut system = DepthtectionSystem::new(DepthtectionConfig::default(), RecordingSink::new());
        system.finish().unwrap();
        assert_eq!(
            system.submit(InboundMsg::PhaseCommand("NO_DETECTION".to_string())),
            Err(DepthtectionError::QueueClosed)
        );
    }
}
