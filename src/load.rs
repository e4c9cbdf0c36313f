//! The busy/idle duty cycle that does the actual burning, one thread per
//! assigned core.

use std::thread;
use std::time::{Duration, Instant};

use crate::state::{LoadState, Snapshot};

/// Nanoseconds in one full busy+idle cycle.
pub const CYCLE_BUDGET: i64 = 10_000_000;
/// Steps between recomputations of the busy/idle split.
pub const CYCLE_STEPS: u32 = 1000;
/// Correction gain applied to the percent error per recomputation.
const GAIN: f64 = 100_000.0;

/// Compute the next busy/idle split from the previous busy time and the
/// current shared-state snapshot. Both halves clamp at zero.
fn next_split(busy: i64, snap: &Snapshot, absolute: bool, core_count: usize) -> (i64, i64) {
    let error = if absolute {
        snap.target - snap.self_percent / core_count as f64
    } else {
        snap.target - snap.system_percent
    };
    let delta = error / snap.other_load_factor;

    let busy = (busy + (delta * GAIN) as i64).max(0);
    let idle = (CYCLE_BUDGET - busy).max(0);
    (busy, idle)
}

/// Load thread body. Runs until the worker process is killed; there is no
/// internal termination condition.
pub fn run(state: &LoadState, absolute: bool, core_count: usize) {
    let mut busy: i64 = 0;
    let mut spin = Duration::ZERO;
    let mut idle = Duration::ZERO;

    let mut step: u32 = 0;
    loop {
        let start = Instant::now();
        if step == 0 {
            let snap = state.snapshot();
            let (busy_ns, idle_ns) = next_split(busy, &snap, absolute, core_count);
            busy = busy_ns;
            spin = Duration::from_nanos(busy_ns as u64);
            idle = Duration::from_nanos(idle_ns as u64);
        }
        while start.elapsed() < spin {}
        thread::sleep(idle);
        thread::yield_now();
        step = (step + 1) % CYCLE_STEPS;
    }
}
