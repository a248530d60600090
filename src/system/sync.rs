//! Exact-time grouping of color, depth and detection messages.

use std::collections::VecDeque;

use tracing::debug;

use crate::sensors::{ColorImage, DepthImage, DetectionArray};

/// One color frame, one depth frame and the detections computed on them,
/// all carrying the same timestamp.
#[derive(Debug, Clone)]
pub struct SyncedInputs {
    pub color: ColorImage,
    pub depth: DepthImage,
    pub detections: DetectionArray,
}

/// Buffers each stream until all three share a timestamp.
///
/// Each queue holds at most `capacity` messages; the oldest is dropped when
/// full. Once a triplet is emitted, everything older than it is discarded.
#[derive(Debug)]
pub struct ExactTimeSynchronizer {
    capacity: usize,
    color: VecDeque<ColorImage>,
    depth: VecDeque<DepthImage>,
    detections: VecDeque<DetectionArray>,
}

impl ExactTimeSynchronizer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            color: VecDeque::new(),
            depth: VecDeque::new(),
            detections: VecDeque::new(),
        }
    }

    pub fn push_color(&mut self, img: ColorImage) -> Option<SyncedInputs> {
        push_bounded(&mut self.color, img, self.capacity, "color");
        self.try_match()
    }

    pub fn push_depth(&mut self, img: DepthImage) -> Option<SyncedInputs> {
        push_bounded(&mut self.depth, img, self.capacity, "depth");
        self.try_match()
    }

    pub fn push_detections(&mut self, dets: DetectionArray) -> Option<SyncedInputs> {
        push_bounded(&mut self.detections, dets, self.capacity, "detections");
        self.try_match()
    }

    /// Messages waiting for their partners.
    pub fn pending(&self) -> usize {
        self.color.len() + self.depth.len() + self.detections.len()
    }

    fn try_match(&mut self) -> Option<SyncedInputs> {
        let stamp = self
            .detections
            .iter()
            .map(|d| d.header.stamp_ns)
            .filter(|s| self.color.iter().any(|c| c.header.stamp_ns == *s))
            .filter(|s| self.depth.iter().any(|d| d.header.stamp_ns == *s))
            .min()?;

        let color = take_at(&mut self.color, stamp, |c| c.header.stamp_ns)?;
        let depth = take_at(&mut self.depth, stamp, |d| d.header.stamp_ns)?;
        let detections = take_at(&mut self.detections, stamp, |d| d.header.stamp_ns)?;
        Some(SyncedInputs {
            color,
            depth,
            detections,
        })
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize, stream: &str) {
    if queue.len() >= capacity {
        queue.pop_front();
        debug!("Sync queue for {} full, dropped oldest message", stream);
    }
    queue.push_back(item);
}

/// Remove the message stamped `stamp_ns` and everything older.
fn take_at<T>(queue: &mut VecDeque<T>, stamp_ns: u64, stamp: impl Fn(&T) -> u64) -> Option<T> {
    let idx = queue.iter().position(|m| stamp(m) == stamp_ns)?;
    let item = queue.remove(idx);
    queue.retain(|m| stamp(m) > stamp_ns);
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Header;

    fn color(stamp_ns: u64) -> ColorImage {
        ColorImage::new(Header::new(stamp_ns, "camera"), 1, 1, vec![0, 0, 0]).unwrap()
    }

    fn depth(stamp_ns: u64) -> DepthImage {
        DepthImage::new(Header::new(stamp_ns, "camera"), 1, 1, vec![1.0]).unwrap()
    }

    fn dets(stamp_ns: u64) -> DetectionArray {
        DetectionArray {
            header: Header::new(stamp_ns, "camera"),
            detections: Vec::new(),
        }
    }

    #[test]
    fn test_emits_only_complete_triplets() {
        let mut s = ExactTimeSynchronizer::new(10);
        assert!(s.push_color(color(1)).is_none());
        assert!(s.push_depth(depth(1)).is_none());
        assert!(s.push_detections(dets(2)).is_none());

        let synced = s.push_detections(dets(1)).unwrap();
        assert_eq!(synced.color.header.stamp_ns, 1);
        assert_eq!(synced.depth.header.stamp_ns, 1);
        assert_eq!(synced.detections.header.stamp_ns, 1);
        // Detections at t=2 still wait for their images.
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn test_older_unmatched_messages_are_discarded() {
        let mut s = ExactTimeSynchronizer::new(10);
        s.push_color(color(1));
        s.push_color(color(2));
        s.push_depth(depth(2));
        assert!(s.push_detections(dets(2)).is_some());
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut s = ExactTimeSynchronizer::new(2);
        s.push_color(color(1));
        s.push_color(color(2));
        s.push_color(color(3));
        s.push_depth(depth(1));
        assert!(s.push_detections(dets(1)).is_none());
    }
}
