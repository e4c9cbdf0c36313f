use clap::Parser;

use crate::error::BurnError;

/// cpuburn: a controllable CPU load generator for fault injection.
///
/// Consumes a configurable, optionally ramped percentage of one or more
/// cores. Started with --start, which backgrounds the actual burn as
/// detached worker process(es); stopped with --stop, which finds and kills
/// them again by their command-line signature.
#[derive(Debug, Parser)]
#[clap(name = "cpuburn", version)]
pub struct Opts {
    /// Start burning cpu
    #[clap(long)]
    pub start: bool,

    /// Stop all running burn workers
    #[clap(long)]
    pub stop: bool,

    /// Internal: run as the detached worker process
    #[clap(long)]
    pub nohup: bool,

    /// Number of cpus to burn (defaults to all available)
    #[clap(long, value_name = "N")]
    pub cpu_count: Option<usize>,

    /// Percent of cpu capacity to burn, 0-100
    #[clap(long, value_name = "P", default_value_t = 100.0, allow_negative_numbers = true)]
    pub cpu_percent: f64,

    /// Cpus in which to allow burning, one pinned worker each ("1,3")
    #[clap(long, value_name = "LIST")]
    pub cpu_list: Option<String>,

    /// Duration in seconds to climb from ambient load to the target
    #[clap(long, value_name = "S", default_value_t = 0)]
    pub climb_time: u64,

    /// Internal: tag identifying a per-core worker process
    #[clap(long, value_name = "TAG")]
    pub cpu_processor: Option<String>,

    /// Drive the duty cycle from this process's own per-core share
    #[clap(long)]
    pub absolute: bool,

    /// Increase log verbosity (-v, -vv)
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Start,
    Stop,
    Worker,
}

/// Immutable burn parameters, resolved once from the parsed flags.
#[derive(Debug, Clone)]
pub struct BurnConfig {
    pub core_count: usize,
    pub percent: f64,
    pub climb_secs: u64,
    pub absolute: bool,
    pub core_list: Option<Vec<u32>>,
    pub processor_tag: Option<String>,
}

impl BurnConfig {
    pub fn from_opts(opts: &Opts) -> Result<(Mode, BurnConfig), BurnError> {
        let mode = select_mode(opts)?;

        if !(0.0..=100.0).contains(&opts.cpu_percent) {
            return Err(BurnError::Config(format!(
                "--cpu-percent must be within [0, 100], got {}",
                opts.cpu_percent
            )));
        }

        let core_list = match opts.cpu_list.as_deref() {
            Some(list) => Some(parse_core_list(list)?),
            None => None,
        };

        let config = BurnConfig {
            core_count: clamp_core_count(opts.cpu_count, num_cpus::get()),
            percent: opts.cpu_percent,
            climb_secs: opts.climb_time,
            absolute: opts.absolute,
            core_list,
            processor_tag: opts.cpu_processor.clone(),
        };
        Ok((mode, config))
    }
}

fn select_mode(opts: &Opts) -> Result<Mode, BurnError> {
    match (opts.start, opts.stop, opts.nohup) {
        (true, false, false) => Ok(Mode::Start),
        (false, true, false) => Ok(Mode::Stop),
        (false, false, true) => Ok(Mode::Worker),
        _ => Err(BurnError::Config(
            "pass exactly one of --start, --stop or --nohup".to_string(),
        )),
    }
}

/// Out-of-range requests fall back to everything the host has.
fn clamp_core_count(requested: Option<usize>, available: usize) -> usize {
    match requested {
        Some(n) if n >= 1 && n <= available => n,
        _ => available,
    }
}

fn parse_core_list(list: &str) -> Result<Vec<u32>, BurnError> {
    list.split(',')
        .map(|entry| {
            entry.trim().parse::<u32>().map_err(|_| {
                BurnError::Config(format!("--cpu-list entry {entry:?} is not a core index"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(args: &[&str]) -> Opts {
        let mut argv = vec!["cpuburn"];
        argv.extend_from_slice(args);
        Opts::parse_from(argv)
    }

    #[test]
    fn test_mode_requires_exactly_one_flag() {
        assert!(matches!(
            BurnConfig::from_opts(&opts(&[])),
            Err(BurnError::Config(_))
        ));
        assert!(matches!(
            BurnConfig::from_opts(&opts(&["--start", "--stop"])),
            Err(BurnError::Config(_))
        ));
        assert!(matches!(
            BurnConfig::from_opts(&opts(&["--start", "--nohup"])),
            Err(BurnError::Config(_))
        ));

        let (mode, _) = BurnConfig::from_opts(&opts(&["--stop"])).unwrap();
        assert_eq!(mode, Mode::Stop);
    }

    #[test]
    fn test_core_count_clamping() {
        assert_eq!(clamp_core_count(Some(2), 8), 2);
        assert_eq!(clamp_core_count(Some(8), 8), 8);
        assert_eq!(clamp_core_count(Some(0), 8), 8);
        assert_eq!(clamp_core_count(Some(9), 8), 8);
        assert_eq!(clamp_core_count(None, 8), 8);
    }

    #[test]
    fn test_percent_range() {
        assert!(BurnConfig::from_opts(&opts(&["--start", "--cpu-percent", "100"])).is_ok());
        assert!(BurnConfig::from_opts(&opts(&["--start", "--cpu-percent", "0"])).is_ok());
        assert!(matches!(
            BurnConfig::from_opts(&opts(&["--start", "--cpu-percent", "101"])),
            Err(BurnError::Config(_))
        ));
        assert!(matches!(
            BurnConfig::from_opts(&opts(&["--start", "--cpu-percent", "-1"])),
            Err(BurnError::Config(_))
        ));
    }

    #[test]
    fn test_core_list_parsing() {
        assert_eq!(parse_core_list("0,2").unwrap(), vec![0, 2]);
        assert_eq!(parse_core_list(" 1, 3 ").unwrap(), vec![1, 3]);
        assert!(parse_core_list("").is_err());
        assert!(parse_core_list("0,two").is_err());
    }

    #[test]
    fn test_worker_flags_carried_through() {
        let (mode, config) = BurnConfig::from_opts(&opts(&[
            "--nohup",
            "--cpu-count",
            "1",
            "--cpu-percent",
            "60",
            "--climb-time",
            "30",
            "--cpu-processor",
            "2",
            "--absolute",
        ]))
        .unwrap();

        assert_eq!(mode, Mode::Worker);
        assert_eq!(config.core_count, 1);
        assert_eq!(config.percent, 60.0);
        assert_eq!(config.climb_secs, 30);
        assert!(config.absolute);
        assert_eq!(config.processor_tag.as_deref(), Some("2"));
        assert!(config.core_list.is_none());
    }
}
