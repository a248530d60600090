//! State shared between the detection worker and its callers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::tracking::{Candidate, Phase};

/// What callers can observe about the worker without touching its context.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub phase: Phase,
    pub best: Option<Candidate>,
    pub candidate_count: usize,
}

pub struct SharedState {
    /// Refreshed by the worker after every message.
    pub snapshot: RwLock<Snapshot>,

    /// Messages fully handled by the worker.
    pub processed: AtomicU64,

    /// Stop the worker without draining its queue.
    pub shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot: RwLock::new(Snapshot::default()),
            processed: AtomicU64::new(0),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn mark_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }
}
