use anyhow::Context;
use clap::Parser;
use rfidcore::processing::PresenceStatus;
use rfidcore::tag_interface::TagId;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::{SessionMode, WorkflowConfig};
use workflow::runner::{parse_assignment, AssignSummary, CheckSummary, ParametersSummary, Runner};

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Drives the RFID reconciliation core against a simulated reader")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = SessionMode::Assign)]
    mode: SessionMode,
    /// Poll ticks to run before the session stops
    #[arg(long, default_value_t = 6)]
    ticks: u32,
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
    /// Persist names under this directory instead of in memory
    #[arg(long)]
    store_dir: Option<PathBuf>,
    /// Name a detected tag after the scan, as TAG=NAME
    #[arg(long = "assign", value_parser = parse_assignment)]
    assignments: Vec<(TagId, String)>,
    /// Remove the assignment with this object name after a check scan
    #[arg(long)]
    unassign: Vec<String>,
    /// Print reader parameters and exit
    #[arg(long, default_value_t = false)]
    params: bool,
    #[arg(long, requires = "params")]
    set_power: Option<u8>,
    #[arg(long, requires = "params")]
    set_region: Option<String>,
    /// Keep the HTTP bridge alive until Ctrl+C
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value_t = gui_bridge::bridge::gui_bind_address())]
    bind: SocketAddr,
    /// Append a one-line session summary to this file
    #[arg(long)]
    report: Option<PathBuf>,
    /// Print the session summary as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.mode, args.ticks, args.interval_ms, args.store_dir.clone())
    };

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime")?;
    runtime.block_on(run(args, workflow_config))
}

async fn run(args: Args, config: WorkflowConfig) -> anyhow::Result<()> {
    let runner = Runner::new(config)?;

    if args.params {
        let summary = runner
            .read_parameters(args.set_power, args.set_region.as_deref())
            .await?;
        return emit(&args, &summary, print_parameters);
    }

    if args.serve {
        return runner.serve(args.bind).await;
    }

    match runner.mode() {
        SessionMode::Assign => {
            let summary = runner.run_assign(&args.assignments).await?;
            emit(&args, &summary, print_assign)?;
            if let Some(path) = &args.report {
                append_report(
                    path,
                    &format!(
                        "mode=assign detected={} unassigned={} assigned={} rejected={} reads={}\n",
                        summary.detected.len(),
                        summary.unassigned.len(),
                        summary.assigned.len(),
                        summary.rejected.len(),
                        summary.tag_count
                    ),
                )?;
            }
        }
        SessionMode::Check => {
            let summary = runner.run_check(&args.unassign).await?;
            emit(&args, &summary, print_check)?;
            if let Some(path) = &args.report {
                append_report(
                    path,
                    &format!(
                        "mode=check present={} missing={} arrivals={:?} reads={}\n",
                        summary.report.present_count(),
                        summary.report.missing_count(),
                        summary.arrivals,
                        summary.tag_count
                    ),
                )?;
            }
        }
    }
    Ok(())
}

fn emit<T: serde::Serialize>(args: &Args, summary: &T, print: fn(&T)) -> anyhow::Result<()> {
    if args.json {
        let text = serde_json::to_string_pretty(summary).context("encoding summary")?;
        println!("{}", text);
    } else {
        print(summary);
    }
    Ok(())
}

fn print_assign(summary: &AssignSummary) {
    println!(
        "Assign session -> detected {}, unassigned {}, reads {}, ticks {}",
        summary.detected.len(),
        summary.unassigned.len(),
        summary.tag_count,
        summary.metrics.ticks
    );
    for tag in &summary.unassigned {
        println!("  unassigned  {}", tag);
    }
    for assignment in &summary.assigned {
        println!("  assigned    {} -> {}", assignment.tag_id, assignment.object_name);
    }
    for rejected in &summary.rejected {
        println!("  rejected    {}", rejected);
    }
}

fn print_check(summary: &CheckSummary) {
    println!(
        "Check session -> present {}, missing {}, reads {}, ticks {}",
        summary.report.present_count(),
        summary.report.missing_count(),
        summary.tag_count,
        summary.metrics.ticks
    );
    for entry in &summary.report.entries {
        let marker = match entry.status {
            PresenceStatus::Present => "present",
            PresenceStatus::Missing => "missing",
        };
        println!("  {:<8} {} ({})", marker, entry.object_name, entry.tag_id);
    }
    for name in &summary.arrivals {
        println!("  [notify] {} detected", name);
    }
    for name in &summary.removed {
        println!("  removed  {}", name);
    }
}

fn print_parameters(summary: &ParametersSummary) {
    for message in &summary.messages {
        println!("{}", message);
    }
    let params = &summary.parameters;
    let show = |value: Option<String>| value.unwrap_or_else(|| "unavailable".into());
    println!("Firmware:    {}", show(params.firmware_version.clone()));
    println!("Temperature: {}", show(params.temperature_c.map(|t| format!("{} C", t))));
    println!("Power:       {}", show(params.power_dbm.map(|p| format!("{} dBm", p))));
    println!("Region:      {}", show(params.region.clone()));
    println!(
        "Single read: {}",
        show(summary.single_read.as_ref().map(TagId::to_string))
    );
}

fn append_report(path: &Path, line: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening report {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
