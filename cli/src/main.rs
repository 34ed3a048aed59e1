//! Gameshelf - Command-line interface for the game library transfer engine.
//!
//! Runs one task at a time on a worker thread. Progress goes to stderr and
//! rollback questions are answered from stdin.

use clap::{Parser, ValueEnum};
use crossbeam_channel::{select, unbounded, Receiver};
use engine::{
    create_task, delete_game, plan_task, run_task, ChannelConfirm, Confirm, ConfirmRequest,
    DeleteContext, DeleteProgress, EngineConfig, GameLayout, StatusSink, TaskContext,
    TaskOptions, TracingEventLog, TransferMode,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Operation {
    Copy,
    Move,
    Compress,
    Decompress,
    Delete,
}

impl Operation {
    fn transfer_mode(self) -> Option<TransferMode> {
        match self {
            Operation::Copy => Some(TransferMode::Copy),
            Operation::Move => Some(TransferMode::Move),
            Operation::Compress => Some(TransferMode::CompressInto),
            Operation::Decompress => Some(TransferMode::DecompressFrom),
            Operation::Delete => None,
        }
    }
}

/// Gameshelf - Move games between library folders
#[derive(Parser, Debug)]
#[command(name = "gameshelf")]
#[command(version)]
#[command(about = "Copy, move, compress, decompress or delete an installed game")]
struct Args {
    /// What to do with the game
    #[arg(value_enum)]
    operation: Operation,

    /// Library folder (steamapps) the game is in
    #[arg(long, value_name = "PATH")]
    library: PathBuf,

    /// Numeric app id of the game
    #[arg(long, value_name = "ID")]
    app_id: u32,

    /// Folder name of the game under common/
    #[arg(long, value_name = "NAME")]
    install_dir: String,

    /// Display name; defaults to the install folder name
    #[arg(long, value_name = "TITLE")]
    name: Option<String>,

    /// Target library folder (steamapps); required except for delete
    #[arg(long, value_name = "PATH")]
    target: Option<PathBuf>,

    /// Leave the download staging folder behind
    #[arg(long)]
    no_downloads: bool,

    /// Leave workshop content behind
    #[arg(long)]
    no_workshop: bool,

    /// JSON file with engine settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log every file handled
    #[arg(long)]
    report_files: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// Why the CLI did not succeed; decides the exit code.
#[derive(Debug)]
enum CliError {
    /// Bad arguments, configuration or planning (exit 2)
    Usage(String),
    /// The task ran and failed (exit 1)
    Failed(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            CliError::Failed(_) => 1,
        }
    }

    fn message(&self) -> &str {
        match self {
            CliError::Usage(msg) | CliError::Failed(msg) => msg,
        }
    }
}

/// Renders engine progress to stderr
struct CliProgress {
    last_update: Mutex<Option<Instant>>,
}

impl CliProgress {
    fn new() -> Self {
        CliProgress {
            last_update: Mutex::new(None),
        }
    }

    fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl StatusSink for CliProgress {
    fn report(&self, status: &str, moved_bytes: u64, total_bytes: u64) {
        // Throttle progress updates to avoid spam (max once per 200ms)
        if let Ok(mut last) = self.last_update.lock() {
            if last.is_some_and(|at| at.elapsed() < Duration::from_millis(200)) {
                return;
            }
            *last = Some(Instant::now());
        }

        if total_bytes == 0 {
            eprint!("\r{:<80}", status);
        } else {
            let percent = (moved_bytes as f64 / total_bytes as f64 * 100.0) as u32;
            eprint!(
                "\r{} {}/{} {:<40}",
                Self::progress_bar(percent),
                engine::progress::format_bytes(moved_bytes),
                engine::progress::format_bytes(total_bytes),
                status
            );
        }
        let _ = std::io::stderr().flush();
    }

    fn task_log(&self, line: &str) {
        eprintln!("\r{:<100}", line);
    }
}

/// Parse arguments, run the operation and exit with its code
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let (confirm, requests) = ChannelConfirm::channel();
    let (done_tx, done_rx) = unbounded();

    let worker = thread::Builder::new()
        .name("gameshelf-task".to_string())
        .spawn(move || {
            let result = run_cli(&args, &confirm);
            let _ = done_tx.send(result);
        });
    if let Err(e) = worker {
        eprintln!("Error: failed to start worker thread: {}", e);
        std::process::exit(2);
    }

    let result = serve_confirmations(&requests, &done_rx);
    let exit_code = match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err.message());
            err.exit_code()
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Answer rollback questions from stdin until the worker reports back
fn serve_confirmations(
    requests: &Receiver<ConfirmRequest>,
    done: &Receiver<Result<(), CliError>>,
) -> Result<(), CliError> {
    loop {
        select! {
            recv(requests) -> request => {
                if let Ok(request) = request {
                    let yes = ask_stdin(&request.prompt);
                    request.answer(yes);
                }
            }
            recv(done) -> result => {
                return result.unwrap_or_else(|_| {
                    Err(CliError::Failed("worker thread exited without a result".to_string()))
                });
            }
        }
    }
}

fn ask_stdin(prompt: &str) -> bool {
    eprintln!();
    eprintln!("{}", prompt);
    eprint!("[y/N] ");
    let _ = std::io::stderr().flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, confirm: &dyn Confirm) -> Result<(), CliError> {
    if !args.library.is_dir() {
        return Err(CliError::Usage(format!(
            "Library folder does not exist: {}",
            args.library.display()
        )));
    }

    let config = match &args.config {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
    .and_then(|config| config.validate().map(|()| config))
    .map_err(|e| CliError::Usage(format!("Invalid configuration: {}", e)))?;

    let name = args.name.clone().unwrap_or_else(|| args.install_dir.clone());
    let game = GameLayout::detect(&args.library, args.app_id, &args.install_dir, name);

    let progress = CliProgress::new();
    let control = config.task_control();

    let Some(mode) = args.operation.transfer_mode() else {
        let deleted = delete_game(
            &game,
            &DeleteContext {
                config: &config,
                events: &TracingEventLog,
                progress: Some(DeleteProgress {
                    control: &control,
                    sink: &progress,
                }),
            },
        );
        eprintln!();
        return if deleted {
            eprintln!("Deleted {} from {}", game.name, game.library.display());
            Ok(())
        } else {
            Err(CliError::Failed(format!("Failed to delete {}", game.name)))
        };
    };

    let target = args
        .target
        .as_ref()
        .ok_or_else(|| CliError::Usage(format!("--target is required for {:?}", args.operation)))?;

    let options = TaskOptions {
        include_downloads: !args.no_downloads,
        include_workshop: !args.no_workshop,
        report_file_movement: args.report_files,
    };

    let mut task = create_task(game, target, mode, options)
        .map_err(|e| CliError::Usage(format!("Task creation failed: {}", e)))?;
    plan_task(&mut task, &config).map_err(|e| CliError::Usage(format!("Task planning failed: {}", e)))?;

    eprintln!("Preparing {}...", task.mode);
    eprintln!("  Game: {} ({})", task.game.name, task.game.app_id);
    eprintln!("  Source: {}", task.source_root.display());
    eprintln!("  Target: {}", task.target_root.display());
    eprintln!("  Strategy: {}", task.strategy);
    eprintln!(
        "  Total: {} across {} files",
        engine::progress::format_bytes(task.total_bytes),
        task.total_file_count
    );
    eprintln!();

    let ctx = TaskContext {
        config: &config,
        control: &control,
        sink: &progress,
        events: &TracingEventLog,
        confirm,
    };
    let summary = run_task(&task, &ctx).map_err(|e| CliError::Failed(format!("Task failed: {}", e)))?;

    eprintln!();
    eprintln!("Transfer complete!");
    eprintln!(
        "Summary: {} transferred, {} already up to date",
        summary.files_transferred, summary.files_skipped
    );
    eprintln!("Bytes moved: {}", engine::progress::format_bytes(summary.bytes_moved));
    eprintln!("Elapsed: {}", CliProgress::format_duration(summary.elapsed));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::FixedAnswer;
    use tempfile::TempDir;

    fn library_with_game() -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let library = dir.path().join("libA");
        let game = library.join("common/Portal");
        std::fs::create_dir_all(&game).expect("Failed to create game dir");
        std::fs::write(game.join("portal.exe"), "hello").expect("Failed to write file");
        std::fs::write(library.join("appmanifest_400.acf"), "manifest").expect("Failed to write manifest");
        dir
    }

    fn args(operation: Operation, library: PathBuf, target: Option<PathBuf>) -> Args {
        Args {
            operation,
            library,
            app_id: 400,
            install_dir: "Portal".to_string(),
            name: None,
            target,
            no_downloads: false,
            no_workshop: false,
            config: None,
            report_files: false,
            verbose: false,
        }
    }

    #[test]
    fn test_cli_copy_with_valid_libraries() {
        let dir = library_with_game();
        let target = dir.path().join("libB");

        let result = run_cli(
            &args(Operation::Copy, dir.path().join("libA"), Some(target.clone())),
            &FixedAnswer(false),
        );

        assert!(result.is_ok(), "CLI should succeed with valid libraries");
        assert!(target.join("common/Portal/portal.exe").is_file());
        assert!(target.join("appmanifest_400.acf").is_file());
    }

    #[test]
    fn test_cli_compress_then_delete() {
        let dir = library_with_game();
        let target = dir.path().join("libB");

        run_cli(
            &args(Operation::Compress, dir.path().join("libA"), Some(target.clone())),
            &FixedAnswer(false),
        )
        .expect("compress should succeed");
        assert!(target.join("400.zip").is_file());

        run_cli(&args(Operation::Delete, target.clone(), None), &FixedAnswer(false))
            .expect("delete should succeed");
        assert!(!target.join("400.zip").exists());
    }

    #[test]
    fn test_cli_rejects_missing_library() {
        let dir = TempDir::new().expect("Failed to create temp dir");

        let result = run_cli(
            &args(Operation::Copy, PathBuf::from("/nonexistent/path"), Some(dir.path().to_path_buf())),
            &FixedAnswer(false),
        );

        assert!(matches!(result, Err(CliError::Usage(_))), "CLI should reject missing library");
    }

    #[test]
    fn test_cli_requires_target_for_transfers() {
        let dir = library_with_game();

        let result = run_cli(&args(Operation::Move, dir.path().join("libA"), None), &FixedAnswer(false));

        let err = result.expect_err("CLI should require --target");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_cli_rejects_invalid_config() {
        let dir = library_with_game();
        let config = dir.path().join("engine.json");
        std::fs::write(&config, r#"{ "block_size": 0 }"#).expect("Failed to write config");

        let mut cli_args = args(Operation::Copy, dir.path().join("libA"), Some(dir.path().join("libB")));
        cli_args.config = Some(config);

        let result = run_cli(&cli_args, &FixedAnswer(false));
        assert!(matches!(result, Err(CliError::Usage(_))), "CLI should reject invalid config");
    }

    #[test]
    fn test_progress_bar_clamps() {
        assert_eq!(CliProgress::progress_bar(50), "[==========          ] 50%");
        assert_eq!(CliProgress::progress_bar(100), "[====================] 100%");
    }
}
