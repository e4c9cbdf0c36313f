use std::env;
use std::process;

use clap::Parser;
use log::{error, info};

mod commands;
mod config;
mod error;
mod load;
mod process_table;
mod ramp;
mod sampler;
mod state;
mod supervisor;
mod worker;

use commands::ShellCommands;
use config::{BurnConfig, Mode, Opts};
use error::BurnError;
use process_table::SysinfoTable;
use supervisor::Supervisor;

fn main() {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    if let Err(err) = run(&opts) {
        error!("{err}");
        process::exit(1);
    }
}

fn run(opts: &Opts) -> Result<(), BurnError> {
    let (mode, config) = BurnConfig::from_opts(opts)?;

    match mode {
        Mode::Start => {
            let mut supervisor = build_supervisor()?;
            let records = supervisor.start(&config)?;
            for record in &records {
                if let (Some(pid), Some(core)) = (record.pid, record.core) {
                    info!("worker {pid} bound to core {core}");
                }
            }
            info!(
                "started {} worker process(es) burning {}% over {} core(s)",
                records.len(),
                config.percent,
                config.core_list.as_ref().map_or(config.core_count, Vec::len)
            );
            Ok(())
        }
        Mode::Stop => {
            let mut supervisor = build_supervisor()?;
            let pids = supervisor.stop()?;
            if pids.is_empty() {
                info!("no burn workers running");
            } else {
                info!("stopped {} worker process(es)", pids.len());
            }
            Ok(())
        }
        Mode::Worker => worker::run(config),
    }
}

fn build_supervisor() -> Result<Supervisor<SysinfoTable, ShellCommands>, BurnError> {
    let exe = env::current_exe()
        .map_err(|err| BurnError::Launch(format!("cannot resolve current executable: {err}")))?;
    Supervisor::new(SysinfoTable::new(), ShellCommands, exe)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut config = simplelog::ConfigBuilder::new();
    config
        .set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    let _ = simplelog::TermLogger::init(
        level,
        config.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
}
