//! The detached worker process: seeds the shared state from an initial
//! measurement, then runs the sampler, the ramp (when climbing) and one
//! load thread per assigned core until killed from outside.

use std::process;
use std::sync::Arc;
use std::thread;

use log::{debug, error};

use crate::config::BurnConfig;
use crate::error::BurnError;
use crate::load;
use crate::ramp;
use crate::sampler::{self, Sampler};
use crate::state::LoadState;

pub fn run(config: BurnConfig) -> Result<(), BurnError> {
    let mut sampler = Sampler::new()?;
    let first = sampler.sample()?;

    let state = Arc::new(LoadState::new());
    state.record_sample(
        first.system_percent,
        first.self_percent,
        first.other_load_factor(),
    );

    // With a climb the target starts at the ambient baseline and the ramp
    // walks it up; otherwise it is the final percentage from the start.
    let initial_target = if config.climb_secs == 0 {
        config.percent
    } else if config.absolute {
        first.self_percent / config.core_count as f64
    } else {
        first.system_percent
    };
    state.set_target(initial_target);

    debug!(
        "worker up: cores={} percent={} climb={}s absolute={} tag={:?}",
        config.core_count,
        config.percent,
        config.climb_secs,
        config.absolute,
        config.processor_tag
    );

    {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            // The duty cycle cannot be trusted without a utilization
            // baseline, so a sampling failure takes the worker down.
            if let Err(err) = sampler::run(sampler, &state) {
                error!("cpu sampling failed: {err}");
                process::exit(1);
            }
        });
    }

    if config.climb_secs > 0 {
        let state = Arc::clone(&state);
        let (final_percent, climb_secs) = (config.percent, config.climb_secs);
        thread::spawn(move || ramp::run(&state, final_percent, climb_secs));
    }

    let mut handles = Vec::new();
    for _ in 0..config.core_count {
        let state = Arc::clone(&state);
        let (absolute, core_count) = (config.absolute, config.core_count);
        handles.push(thread::spawn(move || load::run(&state, absolute, core_count)));
    }

    // Load threads only stop when the process is killed.
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}
