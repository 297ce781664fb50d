use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use bl_app::{
    AppError, AppResult, BenchOptions, CAPTURE_KINDS, Decision, EXPERIMENT_KINDS, InterruptFlag,
    OperatorPrompt, POST_PROCESSOR_KINDS, ProgressEvent, RunStage, assemble, list_runs,
    load_config, open_record_store, open_state_store, persisted_status, post_processor_from_name,
    reset_state,
};
use bl_config::BenchConfig;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "benchloop")]
#[command(about = "Benchloop - temperature-controlled acquisition runner", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment, resuming any interrupted run
    Run {
        /// Path to the bench configuration (YAML or JSON)
        config_path: PathBuf,
        /// Never energize the heater supply
        #[arg(long)]
        dry_run: bool,
        /// Override the configured loop budget
        #[arg(long)]
        loops: Option<u64>,
        /// Append a post-processor by name (repeatable)
        #[arg(long = "post", value_name = "NAME")]
        post: Vec<String>,
    },
    /// Check a configuration file without touching hardware
    Validate {
        config_path: PathBuf,
    },
    /// Show the persisted state a run would resume from
    Status {
        config_path: PathBuf,
    },
    /// Forget persisted state so the next run starts fresh
    Reset {
        config_path: PathBuf,
    },
    /// List the experiment, capture and post-processor kinds
    List,
    /// List recorded runs
    Runs {
        config_path: PathBuf,
    },
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config_path,
            dry_run,
            loops,
            post,
        } => cmd_run(&config_path, dry_run, loops, &post),
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Status { config_path } => cmd_status(&config_path),
        Commands::Reset { config_path } => cmd_reset(&config_path),
        Commands::List => cmd_list(),
        Commands::Runs { config_path } => cmd_runs(&config_path),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_run(config_path: &Path, dry_run: bool, loops: Option<u64>, post: &[String]) -> AppResult<()> {
    let config = load_config(config_path)?;
    let extra_post_processors = post
        .iter()
        .map(|name| post_processor_from_name(name))
        .collect::<AppResult<Vec<_>>>()?;

    let state = open_state_store(&config)?;
    let records = open_record_store(&config)?;
    let bench = assemble(
        &config,
        BenchOptions {
            dry_run,
            max_loops: loops,
            extra_post_processors,
            clock: None,
        },
        Box::new(state),
        Some(records),
    )?;

    let interrupt = InterruptFlag::new();
    spawn_interrupt_listener(interrupt.clone())?;

    let mut last_emit = Instant::now();
    let mut last_stage = None;
    let mut orchestrator = bench
        .orchestrator
        .with_interrupt(interrupt)
        .with_prompt(Box::new(StdinPrompt))
        .with_progress(Box::new(move |event| {
            let emit_now =
                last_stage != Some(event.stage) || last_emit.elapsed().as_millis() >= 250;
            if emit_now {
                render_progress(&event);
                last_stage = Some(event.stage);
                last_emit = Instant::now();
            }
        }));

    println!("Running {} ({})", config.name, orchestrator.run_id());
    let result = orchestrator.run();
    clear_progress_line();

    match result {
        Ok(summary) => {
            println!("✓ Run complete: {}", summary.run_id);
            println!("  Iterations: {}", summary.iterations);
            if summary.resumed {
                println!("  Resumed from persisted state");
            }
            Ok(())
        }
        Err(AppError::Interrupted) => {
            println!("Run interrupted; state is kept for the next invocation");
            Err(AppError::Interrupted)
        }
        Err(err) => Err(err),
    }
}

/// Ctrl-C raises the flag; the run decides at its next check point.
fn spawn_interrupt_listener(flag: InterruptFlag) -> AppResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("interrupt-listener".to_string())
        .spawn(move || {
            runtime.block_on(async {
                loop {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => {
                            warn!("interrupt received");
                            flag.raise();
                        }
                        Err(err) => {
                            error!(error = %err, "cannot listen for ctrl-c");
                            break;
                        }
                    }
                }
            });
        })?;
    Ok(())
}

struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Decision {
        clear_progress_line();
        print!("{question} [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return Decision::Abort;
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Decision::Continue,
            _ => Decision::Abort,
        }
    }
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(120));
    let _ = io::stdout().flush();
}

fn render_progress(event: &ProgressEvent) {
    let spinner = ['|', '/', '-', '\\'];
    let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
    let mut line = format!(
        "\r{} {}  loop={}",
        spinner[spin_idx],
        event.stage.label(),
        event.loop_index
    );
    if let Some(remaining) = event.remaining {
        line.push_str(&format!("  remaining={remaining}"));
    }
    if let Some(target) = event.target {
        line.push_str(&format!("  target={target:.2}"));
    }
    if let Some(eta) = event.eta {
        line.push_str(&format!("  eta={}", eta.format("%H:%M:%S")));
    }
    line.push_str(&format!("  elapsed={:.1}s", event.elapsed_wall_s));
    if let Some(msg) = &event.message {
        line.push_str(&format!("  {msg}"));
    }
    print!("{line}");
    if event.stage == RunStage::Completed {
        println!();
    }
    let _ = io::stdout().flush();
}

fn cmd_validate(config_path: &Path) -> AppResult<()> {
    println!("Validating configuration: {}", config_path.display());
    let config = load_config(config_path)?;
    print_overview(&config);
    println!("✓ Configuration is valid");
    Ok(())
}

fn print_overview(config: &BenchConfig) {
    println!("  Name: {}", config.name);
    println!("  Experiment: {}", config.experiment.schedule.kind());
    println!("  Capture: {}", config.capture.kind());
    let post: Vec<&str> = config.post_processors.iter().map(|p| p.kind()).collect();
    if !post.is_empty() {
        println!("  Post-processors: {}", post.join(", "));
    }
    match config.run.max_loops {
        Some(n) => println!("  Loops: {n}"),
        None => println!("  Loops: unbounded"),
    }
    if config.regulator.dry_run {
        println!("  Dry run: heater writes disabled");
    }
}

fn cmd_status(config_path: &Path) -> AppResult<()> {
    let config = load_config(config_path)?;
    let store = open_state_store(&config)?;
    let status = persisted_status(&store)?;

    if status.is_empty() {
        println!("No persisted state; the next run starts fresh");
        return Ok(());
    }
    println!("Persisted state in {}:", store.dir().display());
    if let Some(loop_state) = &status.loop_state {
        match loop_state.remaining_loops {
            Some(n) => println!("  Remaining loops: {n}"),
            None => println!("  Remaining loops: unbounded"),
        }
    }
    if let Some(sweep) = &status.sweep {
        println!("  Sweep target: {:.2} (step {:+.2})", sweep.target, sweep.step);
    }
    Ok(())
}

fn cmd_reset(config_path: &Path) -> AppResult<()> {
    let config = load_config(config_path)?;
    let store = open_state_store(&config)?;
    reset_state(&store)?;
    info!(dir = %store.dir().display(), "persisted state cleared");
    println!("✓ Persisted state cleared");
    Ok(())
}

fn cmd_list() -> AppResult<()> {
    println!("Experiments:     {}", EXPERIMENT_KINDS.join(", "));
    println!("Capture modes:   {}", CAPTURE_KINDS.join(", "));
    println!("Post-processors: {}", POST_PROCESSOR_KINDS.join(", "));
    Ok(())
}

fn cmd_runs(config_path: &Path) -> AppResult<()> {
    let config = load_config(config_path)?;
    let runs = list_runs(&config)?;

    if runs.is_empty() {
        println!("No recorded runs in {}", config.run.result_dir.display());
    } else {
        println!("Recorded runs:");
        for manifest in runs {
            println!(
                "  {} ({})  {} / {}",
                manifest.run_id, manifest.started, manifest.experiment, manifest.capture
            );
        }
    }
    Ok(())
}
