use clap::Parser;
use std::path::PathBuf;
use warmreboot_checker::app::App;
use warmreboot_checker::services::device::AccessMode;
use warmreboot_checker::services::logger::{LogFormat, LogLevel, Logger};
use warmreboot_checker::services::settings::CheckerSettings;

/// Checks whether a SONiC switch is safe to warm-reboot.
#[derive(Debug, Parser)]
#[command(name = "warmreboot-checker", version)]
struct Cli {
    /// Device name as listed in the inventory file.
    device: String,

    /// Connect without write privileges.
    #[arg(long)]
    read_only: bool,

    /// Request id recorded with every result entry.
    #[arg(long)]
    request_id: Option<String>,

    /// Folder containing exit_check_<version> scripts.
    #[arg(long)]
    script_dir: Option<PathBuf>,

    /// error | warn | info | debug. Overrides WARMREBOOT_LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit process logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Print the last N result entries recorded for the device and exit.
    #[arg(long, value_name = "N")]
    history: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut logger = Logger::new("warmreboot");
    if let Some(level) = cli.log_level.as_deref() {
        logger.set_level(LogLevel::parse(level));
    }
    if cli.log_json {
        logger.set_format(LogFormat::Json);
    }
    let mut settings = CheckerSettings::from_env();
    if let Some(dir) = cli.script_dir {
        settings = settings.with_script_dir(dir);
    }

    let app = match App::with_settings(logger, settings) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("warmreboot-checker: {}", err);
            std::process::exit(2);
        }
    };

    if let Some(limit) = cli.history {
        match app.results.read_entries_for(&cli.device, limit) {
            Ok(entries) => {
                for entry in entries {
                    println!("{}", entry);
                }
                std::process::exit(0);
            }
            Err(err) => {
                eprintln!("warmreboot-checker: {}", err);
                std::process::exit(2);
            }
        }
    }

    let request_id = cli
        .request_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mode = AccessMode::from_read_write(!cli.read_only);
    let passed = app.checker.run(&cli.device, mode, Some(&request_id)).await;
    let stats = app.results.stats();
    app.logger.debug(
        "Run complete",
        Some(&serde_json::json!({
            "log": app.logger.stats(),
            "results_logged": stats.logged,
            "results_failed": stats.errors,
        })),
    );
    std::process::exit(if passed { 0 } else { 1 });
}
