//! Rate state shared between the sampler, the ramp controller and the load
//! threads. All fields are f64 values bit-cast into atomics so concurrent
//! readers can never observe a torn write.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct LoadState {
    target_percent: AtomicU64,
    other_load_factor: AtomicU64,
    system_percent: AtomicU64,
    self_percent: AtomicU64,
}

/// One coherent-enough read of the shared state, taken by each load thread
/// at the top of its 1000-step cycle.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub target: f64,
    pub other_load_factor: f64,
    pub system_percent: f64,
    pub self_percent: f64,
}

fn pack(value: f64) -> u64 {
    value.to_bits()
}

fn unpack(bits: u64) -> f64 {
    f64::from_bits(bits)
}

impl LoadState {
    pub fn new() -> Self {
        LoadState {
            target_percent: AtomicU64::new(pack(0.0)),
            other_load_factor: AtomicU64::new(pack(1.0)),
            system_percent: AtomicU64::new(pack(0.0)),
            self_percent: AtomicU64::new(pack(0.0)),
        }
    }

    pub fn target(&self) -> f64 {
        unpack(self.target_percent.load(Ordering::Relaxed))
    }

    pub fn set_target(&self, percent: f64) {
        self.target_percent.store(pack(percent), Ordering::Relaxed);
    }

    /// Publish one sampler measurement.
    pub fn record_sample(&self, system: f64, own: f64, factor: f64) {
        self.system_percent.store(pack(system), Ordering::Relaxed);
        self.self_percent.store(pack(own), Ordering::Relaxed);
        self.other_load_factor.store(pack(factor), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            target: self.target(),
            other_load_factor: unpack(self.other_load_factor.load(Ordering::Relaxed)),
            system_percent: unpack(self.system_percent.load(Ordering::Relaxed)),
            self_percent: unpack(self.self_percent.load(Ordering::Relaxed)),
        }
    }
}
