#![forbid(unsafe_code)]
#![deny(future_incompatible)]
#![warn(missing_debug_implementations, rust_2018_idioms, trivial_casts, unused_qualifications)]

use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use owo_colors::OwoColorize;
use prettytable::{row, Table};
use scheduler_core::{Color, Host, JobId, Scheduler, SchedulerOptions, Status};

mod manifest;
mod shell_runner;

use shell_runner::ShellRunner;

#[derive(Parser, Debug)]
#[clap(name = "jobsched", version)]
/// Runs a TOML-described batch of inter-dependent subprocess jobs.
struct Args {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Run every job in a manifest, respecting its dependency graph.
    Run {
        /// Path to the TOML manifest (a list of `[[job]]` tables).
        manifest: PathBuf,
    },
}

/// Colors a Status label the way its `color` field says to, following the same
/// "label carries its own presentation" idea the status table itself is built on.
fn paint(status: Status) -> String {
    match status.color {
        Color::Green => status.label.green().to_string(),
        Color::Red => status.label.red().to_string(),
        Color::Yellow => status.label.yellow().to_string(),
        Color::Cyan => status.label.cyan().to_string(),
        Color::Grey => status.label.dimmed().to_string(),
    }
}

/// Prints each job's status as it arrives and accumulates a final summary table.
///
/// `reports` is an `Arc` (rather than owned by the host alone) so `run()` can keep a handle to it
/// after the host itself has been moved into the `Scheduler`.
#[derive(Default, Clone, Debug)]
struct CliHost {
    reports: Arc<Mutex<Vec<(String, Status, Vec<String>)>>>,
}

impl Host for CliHost {
    fn handle_job_status(&self, _job_id: JobId, name: &str, status: Status, caveats: &[String]) {
        let caveat_suffix = if caveats.is_empty() { String::new() } else { format!(" ({})", caveats.join(", ")) };
        println!("{:>8}  {name}{caveat_suffix}", paint(status));
        self.reports.lock().unwrap().push((name.to_string(), status, caveats.to_vec()));
    }

    fn keyboard_interrupt(&self) {
        eprintln!("interrupted; killing remaining jobs");
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn options_from_env() -> SchedulerOptions {
    let defaults = SchedulerOptions::default();
    SchedulerOptions {
        average_load: env_or("SCHEDULER_AVERAGE_LOAD", defaults.average_load),
        max_processes: std::env::var("SCHEDULER_MAX_PROCESSES").ok().and_then(|v| v.parse().ok()),
        min_report_time: Duration::from_secs(env_or("SCHEDULER_MIN_REPORT_SECS", defaults.min_report_time.as_secs())),
        load_control: env_or("SCHEDULER_LOAD_CONTROL", defaults.load_control),
        max_fails: env_or("SCHEDULER_MAX_FAILS", defaults.max_fails),
        valgrind_mode: env_or("SCHEDULER_VALGRIND_MODE", defaults.valgrind_mode),
        valgrind_max_fails: env_or("SCHEDULER_VALGRIND_MAX_FAILS", defaults.valgrind_max_fails),
    }
}

async fn run(manifest_path: PathBuf) -> Result<i32> {
    let specs = manifest::load(&manifest_path)?;
    let options = options_from_env();
    let host = CliHost::default();
    let reports = host.reports.clone();
    let scheduler = Scheduler::new(options, ShellRunner, host);

    scheduler.schedule(specs).await?;
    let wait_result = scheduler.wait_finish().await;

    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_CLEAN);
    table.add_row(row!["JOB", "STATUS", "CAVEATS"]);
    let mut exit_code: i32 = 0;
    for (name, status, caveats) in reports.lock().unwrap().iter() {
        exit_code |= status.exit_code as i32;
        table.add_row(row![name, paint(*status), caveats.join(", ")]);
    }
    println!();
    println!("{table}");

    wait_result?;
    Ok(exit_code)
}

#[tokio::main]
async fn main() -> Result<()> {
    let did_find_dotenv = dotenv().ok().is_some();
    if cfg!(debug_assertions) && !did_find_dotenv {
        println!("Debug-only warning: no .env file found; set RUST_LOG=info to see scheduler logging.");
    }
    env_logger::init();

    let args = Args::parse();
    let exit_code = match args.cmd {
        Command::Run { manifest } => run(manifest).await?,
    };

    process::exit(exit_code);
}
