//! dff-benchmark: sub-process benchmark driver.
//!
//! Launches `dff-task` once per run, repeats each task until both a minimum
//! iteration count and a minimum of wall time have elapsed, kills any single
//! run that exceeds the timeout, and reports the mean of the collected
//! samples. Running tasks out of process keeps allocator and cache state
//! independent between repetitions.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitCode, Stdio};
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dff::VERSION;

/// A task is repeated until it has run at least this many times...
const MIN_ITERATIONS: usize = 10;
/// ...and at least this much wall time has elapsed.
const MIN_WALL_TIME: Duration = Duration::from_secs(10);
/// A single run is killed after this long.
const RUN_TIMEOUT: Duration = Duration::from_secs(900);

const DEFAULT_TASKS: &[&str] = &[
    "insert_throughput",
    "positive_query",
    "negative_query",
    "remove_throughput",
];

/// Workload sizes as multiples of the nominal initial capacity.
const DEFAULT_MULTIPLIERS: &[usize] = &[10, 20, 30, 40, 50, 60, 70, 80];

struct Config {
    tasks: Vec<String>,
    initial_capacity_log2: usize,
    counts: Vec<usize>,
    dataset: Option<PathBuf>,
    task_bin: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let initial_capacity_log2 = 16;
        Self {
            tasks: DEFAULT_TASKS.iter().map(ToString::to_string).collect(),
            initial_capacity_log2,
            counts: DEFAULT_MULTIPLIERS
                .iter()
                .map(|m| m << initial_capacity_log2)
                .collect(),
            dataset: None,
            task_bin: default_task_bin(),
        }
    }
}

/// The task binary sits beside this one in the cargo target directory.
fn default_task_bin() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("dff-task")))
        .unwrap_or_else(|| PathBuf::from("dff-task"))
}

struct TaskReport {
    task: String,
    workload: String,
    runs: usize,
    mean: f64,
}

/// Run the task binary once and parse the float it prints.
fn run_once(config: &Config, task: &str, workload: &str) -> anyhow::Result<f64> {
    let mut child = Command::new(&config.task_bin)
        .arg(task)
        .arg(config.initial_capacity_log2.to_string())
        .arg(workload)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("spawning {}", config.task_bin.display()))?;

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() > RUN_TIMEOUT {
            child.kill().context("killing timed-out task")?;
            child.wait()?;
            bail!("task {task} timed out after {}s", RUN_TIMEOUT.as_secs());
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    ensure!(status.success(), "task {task} exited with {status}");

    let mut stdout = String::new();
    child
        .stdout
        .take()
        .context("task stdout was not captured")?
        .read_to_string(&mut stdout)?;
    stdout
        .trim()
        .parse()
        .with_context(|| format!("task {task} printed {stdout:?}, expected a float"))
}

/// Repeat one (task, workload) pair until the iteration and wall-time
/// minimums are both met, then average.
fn run_task(config: &Config, task: &str, workload: &str) -> anyhow::Result<TaskReport> {
    let mut samples = Vec::new();
    let start = Instant::now();

    while samples.len() < MIN_ITERATIONS || start.elapsed() < MIN_WALL_TIME {
        let value = run_once(config, task, workload)?;
        samples.push(value);
        info!(
            task,
            workload,
            run = samples.len(),
            value,
            "sample collected"
        );
    }

    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    Ok(TaskReport {
        task: task.to_string(),
        workload: workload.to_string(),
        runs: samples.len(),
        mean,
    })
}

fn run(config: &Config) -> anyhow::Result<Vec<TaskReport>> {
    let mut reports = Vec::new();
    for task in &config.tasks {
        let dataset_driven = task.starts_with("query_caida") || task.starts_with("query_ycsb");
        if dataset_driven {
            let Some(dataset) = &config.dataset else {
                warn!(task, "skipped: no --dataset given");
                continue;
            };
            reports.push(run_task(config, task, &dataset.display().to_string())?);
        } else {
            for &count in &config.counts {
                reports.push(run_task(config, task, &count.to_string())?);
            }
        }
    }
    Ok(reports)
}

fn print_summary(reports: &[TaskReport]) {
    println!("{:<28} {:>12} {:>6} {:>16}", "task", "workload", "runs", "mean");
    for report in reports {
        println!(
            "{:<28} {:>12} {:>6} {:>16.6}",
            report.task, report.workload, report.runs, report.mean
        );
    }
}

fn print_help(program: &str) {
    println!(
        "dff-benchmark {VERSION}\n\
         \n\
         Usage: {program} [OPTIONS]\n\
         \n\
         Options:\n\
           --tasks <a,b,c>          tasks to run (default: {})\n\
           --capacity-log2 <n>      nominal initial capacity exponent (default: 16)\n\
           --counts <n,n,...>       element counts (default: capacity multiples)\n\
           --dataset <path>         trace file for query_caida / query_ycsb tasks\n\
           --task-bin <path>        dff-task binary (default: next to this one)\n\
           --help                   print this message\n\
           --version                print the version",
        DEFAULT_TASKS.join(",")
    );
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Config>> {
    let mut config = Config::default();
    let mut counts_overridden = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help(&args[0]);
                return Ok(None);
            }
            "--version" => {
                println!("dff-benchmark {VERSION}");
                return Ok(None);
            }
            "--tasks" => {
                let value = iter.next().context("--tasks needs a value")?;
                config.tasks = value.split(',').map(ToString::to_string).collect();
            }
            "--capacity-log2" => {
                let value = iter.next().context("--capacity-log2 needs a value")?;
                config.initial_capacity_log2 =
                    value.parse().context("--capacity-log2 must be a number")?;
                ensure!(
                    config.initial_capacity_log2 < 64,
                    "--capacity-log2 out of range"
                );
                if !counts_overridden {
                    config.counts = DEFAULT_MULTIPLIERS
                        .iter()
                        .map(|m| m << config.initial_capacity_log2)
                        .collect();
                }
            }
            "--counts" => {
                let value = iter.next().context("--counts needs a value")?;
                config.counts = value
                    .split(',')
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .context("--counts must be numbers")?;
                counts_overridden = true;
            }
            "--dataset" => {
                let value = iter.next().context("--dataset needs a value")?;
                config.dataset = Some(PathBuf::from(value));
            }
            "--task-bin" => {
                let value = iter.next().context("--task-bin needs a value")?;
                config.task_bin = PathBuf::from(value);
            }
            other => bail!("unknown option {other:?}; try --help"),
        }
    }

    Ok(Some(config))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => return ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(reports) => {
            print_summary(&reports);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
