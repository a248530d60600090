//! Time-buffered frame tree.
//!
//! Each child frame has exactly one parent link. Static links hold a single
//! transform valid at every time; dynamic links keep a history that is
//! interpolated between bracketing samples and pruned to `buffer_duration_s`.

use std::collections::{HashMap, VecDeque};

use serde::Deserialize;
use tracing::debug;

use crate::error::{DepthtectionError, Result};
use crate::geometry::SE3;
use crate::sensors::StampedTransform;

use super::{TransformLookup, LATEST};

/// Guard against malformed trees that contain a loop.
const MAX_TREE_DEPTH: usize = 64;

/// Configuration for the transform buffer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformBufferConfig {
    /// History kept per dynamic link, in seconds.
    pub buffer_duration_s: f64,

    /// Requests this far outside the buffered interval are clamped to the
    /// nearest sample instead of failing, in seconds.
    pub extrapolation_tolerance_s: f64,
}

impl Default for TransformBufferConfig {
    fn default() -> Self {
        Self {
            buffer_duration_s: 10.0,
            extrapolation_tolerance_s: 0.05,
        }
    }
}

struct Link {
    parent: String,
    is_static: bool,
    /// Sorted by timestamp, oldest first.
    samples: VecDeque<(u64, SE3)>,
}

impl Link {
    fn at(&self, stamp_ns: u64, tolerance_ns: u64) -> std::result::Result<SE3, String> {
        let (oldest, first) = self.samples.front().ok_or("empty link history")?;
        let (newest, last) = self.samples.back().ok_or("empty link history")?;

        if self.is_static || stamp_ns == LATEST {
            return Ok(*last);
        }
        if stamp_ns > *newest {
            if stamp_ns - newest <= tolerance_ns {
                return Ok(*last);
            }
            return Err(format!(
                "extrapolation into the future: requested {} ns, newest {} ns",
                stamp_ns, newest
            ));
        }
        if stamp_ns < *oldest {
            if oldest - stamp_ns <= tolerance_ns {
                return Ok(*first);
            }
            return Err(format!(
                "extrapolation into the past: requested {} ns, oldest {} ns",
                stamp_ns, oldest
            ));
        }

        let idx = self.samples.partition_point(|(s, _)| *s < stamp_ns);
        let (t1, after) = self.samples[idx];
        if t1 == stamp_ns || idx == 0 {
            return Ok(after);
        }
        let (t0, before) = self.samples[idx - 1];
        let alpha = (stamp_ns - t0) as f64 / (t1 - t0) as f64;
        Ok(before.interpolate(&after, alpha))
    }
}

/// In-memory frame tree implementing [`TransformLookup`].
pub struct TransformBuffer {
    config: TransformBufferConfig,
    links: HashMap<String, Link>,
}

impl TransformBuffer {
    pub fn new(config: TransformBufferConfig) -> Self {
        Self {
            config,
            links: HashMap::new(),
        }
    }

    /// Insert `T_parent_child`. A child that changes parent is re-linked.
    pub fn set_transform(&mut self, tf: StampedTransform) {
        let duration_ns = (self.config.buffer_duration_s * 1e9) as u64;

        let link = self.links.entry(tf.child.clone()).or_insert_with(|| Link {
            parent: tf.parent.clone(),
            is_static: tf.is_static,
            samples: VecDeque::new(),
        });

        if link.parent != tf.parent || link.is_static != tf.is_static {
            debug!(
                "Re-linking frame {} from {} to {} (static: {})",
                tf.child, link.parent, tf.parent, tf.is_static
            );
            link.parent = tf.parent.clone();
            link.is_static = tf.is_static;
            link.samples.clear();
        }

        if link.is_static {
            link.samples.clear();
            link.samples.push_back((tf.stamp_ns, tf.transform));
            return;
        }

        let idx = link.samples.partition_point(|(s, _)| *s < tf.stamp_ns);
        if link.samples.get(idx).is_some_and(|(s, _)| *s == tf.stamp_ns) {
            link.samples[idx] = (tf.stamp_ns, tf.transform);
        } else {
            link.samples.insert(idx, (tf.stamp_ns, tf.transform));
        }

        if let Some(&(newest, _)) = link.samples.back() {
            let cutoff = newest.saturating_sub(duration_ns);
            while link.samples.len() > 1 && link.samples.front().is_some_and(|(s, _)| *s < cutoff) {
                link.samples.pop_front();
            }
        }
    }

    pub fn set_static(&mut self, parent: &str, child: &str, transform: SE3) {
        self.set_transform(StampedTransform {
            stamp_ns: 0,
            parent: parent.to_string(),
            child: child.to_string(),
            transform,
            is_static: true,
        });
    }

    /// True if `frame` appears anywhere in the tree.
    pub fn knows(&self, frame: &str) -> bool {
        self.links.contains_key(frame) || self.links.values().any(|l| l.parent == frame)
    }

    /// Number of buffered samples for the link above `child`.
    pub fn history_len(&self, child: &str) -> usize {
        self.links.get(child).map_or(0, |l| l.samples.len())
    }

    /// Walk from `frame` towards the root, accumulating `T_ancestor_frame`.
    ///
    /// Stops early if a link cannot be evaluated at `stamp_ns`; the reason is
    /// returned alongside the partial chain.
    fn chain(&self, frame: &str, stamp_ns: u64) -> (Vec<(String, SE3)>, Option<String>) {
        let tolerance_ns = (self.config.extrapolation_tolerance_s * 1e9) as u64;
        let mut chain = vec![(frame.to_string(), SE3::identity())];
        let mut current = frame.to_string();
        let mut acc = SE3::identity();

        while let Some(link) = self.links.get(&current) {
            if chain.len() > MAX_TREE_DEPTH {
                return (chain, Some(format!("frame tree loop at `{}`", current)));
            }
            match link.at(stamp_ns, tolerance_ns) {
                Ok(t_parent_current) => {
                    acc = t_parent_current.compose(&acc);
                    current = link.parent.clone();
                    chain.push((current.clone(), acc));
                }
                Err(reason) => {
                    let reason = format!("{} -> {}: {}", link.parent, current, reason);
                    return (chain, Some(reason));
                }
            }
        }
        (chain, None)
    }
}

impl Default for TransformBuffer {
    fn default() -> Self {
        Self::new(TransformBufferConfig::default())
    }
}

impl TransformLookup for TransformBuffer {
    fn lookup(&self, target: &str, source: &str, stamp_ns: u64) -> Result<SE3> {
        let unavailable = |reason: String| DepthtectionError::FrameUnavailable {
            from: source.to_string(),
            to: target.to_string(),
            stamp_ns,
            reason,
        };

        if target == source {
            return Ok(SE3::identity());
        }
        for frame in [source, target] {
            if !self.knows(frame) {
                return Err(unavailable(format!("frame `{}` does not exist", frame)));
            }
        }

        let (source_chain, source_err) = self.chain(source, stamp_ns);
        let (target_chain, target_err) = self.chain(target, stamp_ns);

        // First common ancestor, walking up from the source.
        for (ancestor, t_ancestor_source) in &source_chain {
            if let Some((_, t_ancestor_target)) = target_chain.iter().find(|(f, _)| f == ancestor) {
                return Ok(t_ancestor_target.inverse().compose(t_ancestor_source));
            }
        }

        let reason = source_err
            .or(target_err)
            .unwrap_or_else(|| "frames are not part of the same tree".to_string());
        Err(unavailable(reason))
    }
}
