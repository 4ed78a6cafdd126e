//! `maestro` CLI: scaffold a project, run the orchestration loop, inspect
//! state, and dry-run the directive parser.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use maestro::core::parser::parse_directive;
use maestro::cycle::CycleReport;
use maestro::exit_codes;
use maestro::io::config::{MaestroConfig, load_config};
use maestro::io::inference::CommandInference;
use maestro::io::init::{InitOptions, MaestroPaths, ensure_layout, init_maestro};
use maestro::io::operator::ConsoleOperator;
use maestro::io::shell::SystemShell;
use maestro::io::snapshot_store::load_snapshot;
use maestro::logging;
use maestro::looping::{LoopOptions, LoopStop, run_loop};
use maestro::session::Session;
use maestro::status::render_status;

#[derive(Parser)]
#[command(
    name = "maestro",
    version,
    about = "Autonomous orchestrator/specialist agent loop"
)]
struct Cli {
    /// Project root containing `.maestro/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.maestro/` (config, snapshot, event log) and the workspace.
    Init {
        /// Overwrite existing maestro files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the orchestration loop until the operator exits.
    Run {
        /// Start a new project with this goal instead of prompting.
        #[arg(long)]
        goal: Option<String>,
        /// Stop after this many cycles (0 = unlimited; overrides config).
        #[arg(long)]
        max_cycles: Option<u32>,
    },
    /// Print the persisted project state.
    Status,
    /// Parse a directive file and print the extracted actions as JSON.
    Parse {
        file: PathBuf,
        /// Assigned task text used to evaluate TASK_COMPLETE / TASK_BLOCKED.
        #[arg(long)]
        task: Option<String>,
    },
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Run { goal, max_cycles } => cmd_run(&cli.root, goal, max_cycles),
        Command::Status => cmd_status(&cli.root),
        Command::Parse { file, task } => cmd_parse(&file, task.as_deref()),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_maestro(root, &InitOptions { force })?;
    println!("initialized {}", paths.maestro_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, goal: Option<String>, max_cycles: Option<u32>) -> Result<i32> {
    let paths = ensure_layout(root)?;
    let config = load_config(&paths.config_path)
        .with_context(|| format!("load {}", paths.config_path.display()))?;
    let workspace = config.workspace_root(root);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(run_session(
        root,
        &workspace,
        &config,
        LoopOptions {
            initial_goal: goal,
            max_cycles,
        },
    ))
}

async fn run_session(
    root: &Path,
    workspace: &Path,
    config: &MaestroConfig,
    options: LoopOptions,
) -> Result<i32> {
    let mut session = Session::open(
        root,
        CommandInference::new(&config.inference, workspace),
        SystemShell::new(&config.shell, workspace),
        ConsoleOperator::stdio(),
    )?;
    let outcome = run_loop(&mut session, options, print_cycle).await?;
    match outcome.stop {
        LoopStop::OperatorExit => {
            println!("exiting after {} cycle(s)", outcome.cycles_executed);
            Ok(exit_codes::OK)
        }
        LoopStop::CycleLimit { max_cycles } => {
            println!("stopped at cycle limit ({max_cycles})");
            Ok(exit_codes::CYCLE_LIMIT)
        }
    }
}

fn print_cycle(report: &CycleReport) {
    let mut line = format!("cycle {}:", report.cycle);
    if report.directive_failed {
        line.push_str(" inference failed");
    }
    if let Some(system) = &report.system {
        line.push_str(&format!(" {}", system.describe()));
    }
    if let Some(outcome) = report.specialist {
        line.push_str(&format!(" specialist {}", outcome.as_str()));
    }
    if report.escalated {
        line.push_str(" (escalated)");
    }
    println!("{line}");
}

fn cmd_status(root: &Path) -> Result<i32> {
    let paths = MaestroPaths::new(root);
    if !paths.maestro_dir.is_dir() {
        bail!(
            "{} is not initialized (run `maestro init`)",
            root.display()
        );
    }
    let config = load_config(&paths.config_path)
        .with_context(|| format!("load {}", paths.config_path.display()))?;
    let recovered = load_snapshot(&paths)?;
    for note in &recovered.notes {
        eprintln!("recovered: {note}");
    }
    println!("{}", render_status(&recovered.snapshot, &config));
    Ok(exit_codes::OK)
}

fn cmd_parse(file: &Path, task: Option<&str>) -> Result<i32> {
    let text =
        fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let bundle = parse_directive(&text, task);
    println!(
        "{}",
        serde_json::to_string_pretty(&bundle).context("serialize actions")?
    );
    Ok(exit_codes::OK)
}
