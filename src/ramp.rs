//! Linear climb of the burn target from ambient load to the requested
//! percentage. Only runs when a climb time was configured.

use std::thread;
use std::time::Duration;

use crate::state::LoadState;

pub const RAMP_INTERVAL: Duration = Duration::from_secs(1);

/// One ramp step. Clamps at the final value so the target lands exactly on
/// it and can never cross it, whatever the step sign.
fn advance(current: f64, target: f64, step: f64) -> f64 {
    if step >= 0.0 {
        (current + step).min(target)
    } else {
        (current + step).max(target)
    }
}

/// Ramp thread body: move the shared target by `(final - initial) /
/// climb_secs` once a second until it reaches `final_percent`, then exit.
/// The target holds at the final value from then on.
pub fn run(state: &LoadState, final_percent: f64, climb_secs: u64) {
    let initial = state.target();
    let step = (final_percent - initial) / climb_secs as f64;
    log::debug!("climbing from {initial:.1}% to {final_percent:.1}% over {climb_secs}s");

    let mut current = initial;
    while current != final_percent {
        thread::sleep(RAMP_INTERVAL);
        current = advance(current, final_percent, step);
        state.set_target(current);
    }
}
