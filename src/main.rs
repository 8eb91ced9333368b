use clap::{Parser, Subcommand};
use ofroute::config::{self, ForwardingSettings};
use ofroute::telemetry::{init_logging, LogConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "ofroute")]
#[command(about = "Forwarding core of an OpenFlow controller")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the forwarding settings a lock file resolves to
    Settings {
        /// Path to config.lock file
        #[arg(short, long, default_value = "config.lock")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate config.lock from config.toml
    Generate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Output path for config.lock
        #[arg(short, long, default_value = "config.lock")]
        output: PathBuf,
    },
    /// Validate config.toml without generating lock file
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => {
            // RUST_LOG env var takes priority
            init_logging(None);
            match action {
                ConfigAction::Generate {
                    config: config_path,
                    output,
                } => cmd_config_generate(&config_path, &output),
                ConfigAction::Validate {
                    config: config_path,
                } => cmd_config_validate(&config_path),
            }
        }
        Commands::Settings { config: lock_path } => cmd_settings(&lock_path),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_config_generate(config_path: &PathBuf, output_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let lock = config::generate_lock(&cfg);

    let lock_toml =
        toml::to_string_pretty(&lock).map_err(|e| format!("Failed to serialize lock: {}", e))?;

    let output = format!(
        "# Generated by ofroute - DO NOT EDIT\n# Source: {}\n\n{}",
        config_path.display(),
        lock_toml
    );

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_settings(lock_path: &PathBuf) -> Result<(), String> {
    let lock = config::load_lock(lock_path)
        .map_err(|e| format!("Failed to load lock file: {}", e))?;
    init_logging(Some(&LogConfig::from(&lock.logging)));

    info!("Loaded {} (generated {})", lock_path.display(), lock.generated_at);
    let settings = ForwardingSettings::from(&lock);
    println!("idle_timeout = {}", settings.idle_timeout);
    println!("hard_timeout = {}", settings.hard_timeout);
    println!("access_priority = {}", settings.access_priority);
    println!("broadcast_cache = {}", settings.broadcast_cache);
    println!(
        "broadcast_cache_window_ms = {}",
        settings.broadcast_cache_window.as_millis()
    );
    Ok(())
}
