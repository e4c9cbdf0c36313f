//! Periodic CPU utilization sampling for the worker process.
//!
//! Every pass measures system-wide utilization over a one second window
//! together with this process's own share, and derives the factor used to
//! normalize the duty cycle against load we did not create ourselves.

use std::thread;
use std::time::Duration;

use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};

use crate::error::BurnError;
use crate::state::LoadState;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(3);
const MEASURE_WINDOW: Duration = Duration::from_secs(1);

/// Lower bound for the other-load factor. A machine saturated by foreign
/// load would otherwise drive the duty-cycle division toward infinity.
const MIN_LOAD_FACTOR: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    /// System-wide utilization across all cores, 0-100.
    pub system_percent: f64,
    /// This process's utilization; may exceed 100 on multi-core hosts.
    pub self_percent: f64,
}

impl Sample {
    /// Fraction of a core left over after everything except our own burn.
    pub fn other_load_factor(&self) -> f64 {
        let factor = (100.0 - (self.system_percent - self.self_percent)) / 100.0;
        factor.max(MIN_LOAD_FACTOR)
    }
}

pub struct Sampler {
    sys: System,
    self_pid: Pid,
}

impl Sampler {
    pub fn new() -> Result<Self, BurnError> {
        let self_pid = get_current_pid()
            .map_err(|err| BurnError::Discovery(format!("cannot resolve own pid: {err}")))?;
        Ok(Sampler {
            sys: System::new(),
            self_pid,
        })
    }

    /// Take one measurement over [`MEASURE_WINDOW`]. Blocks for the window.
    pub fn sample(&mut self) -> Result<Sample, BurnError> {
        self.refresh();
        thread::sleep(MEASURE_WINDOW);
        self.refresh();

        let process = self.sys.process(self.self_pid).ok_or_else(|| {
            BurnError::Discovery(format!(
                "own pid {} missing from the process table",
                self.self_pid
            ))
        })?;

        Ok(Sample {
            system_percent: f64::from(self.sys.global_cpu_usage()),
            self_percent: f64::from(process.cpu_usage()),
        })
    }

    fn refresh(&mut self) {
        self.sys.refresh_cpu_usage();
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[self.self_pid]), true);
    }
}

/// Sampler thread body: publish a fresh measurement every
/// [`SAMPLE_INTERVAL`] for the lifetime of the worker. Only returns on a
/// sampling failure, which the caller treats as fatal.
pub fn run(mut sampler: Sampler, state: &LoadState) -> Result<(), BurnError> {
    loop {
        thread::sleep(SAMPLE_INTERVAL);
        let sample = sampler.sample()?;
        state.record_sample(
            sample.system_percent,
            sample.self_percent,
            sample.other_load_factor(),
        );
        log::trace!(
            "sampled system={:.1}% self={:.1}% factor={:.2}",
            sample.system_percent,
            sample.self_percent,
            sample.other_load_factor()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_load_factor() {
        let sample = Sample {
            system_percent: 40.0,
            self_percent: 15.0,
        };
        assert!((sample.other_load_factor() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_factor_counts_own_burn_as_available() {
        // A host where we are the only load: the whole core is available.
        let sample = Sample {
            system_percent: 80.0,
            self_percent: 80.0,
        };
        assert!((sample.other_load_factor() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_factor_is_floored_under_foreign_saturation() {
        let sample = Sample {
            system_percent: 100.0,
            self_percent: 0.0,
        };
        assert_eq!(sample.other_load_factor(), MIN_LOAD_FACTOR);
    }
}
