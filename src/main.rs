// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info};
use std::io::Write;
use std::path::{Path, PathBuf};

use ksl_review::app_config::{self, Config, TranslationProvider};
use ksl_review::app_controller::{self, Controller};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    OpenAI,
    Anthropic,
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server with the streaming translation endpoint
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:3000
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Translate a CSV file in-process and write the result CSV
    Translate {
        /// Input CSV with sentence_id and korean_text columns
        #[arg(value_name = "CSV")]
        csv: PathBuf,

        /// Output CSV path (default: <input>_translated.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Store the finished run in the review database
        #[arg(long)]
        save: bool,
    },

    /// Send a CSV file to a running server and follow its progress stream
    Submit {
        /// Input CSV with sentence_id and korean_text columns
        #[arg(value_name = "CSV")]
        csv: PathBuf,

        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,

        /// Output CSV path (default: <input>_translated.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions for ksl-review
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// KSL review - Korean to sign-language gloss translation with quality-gated retries
#[derive(Parser, Debug)]
#[command(name = "ksl-review")]
#[command(version)]
#[command(about = "Korean to KSL gloss translation with quality-gated retries")]
#[command(long_about = "Translates Korean sentences from a CSV file into sign-language gloss.
Every sentence gets up to three attempts; output failing the quality checks is retried
with progressively more conservative sampling.

EXAMPLES:
    ksl-review serve                              # Start the HTTP server
    ksl-review translate sentences.csv            # Translate in-process
    ksl-review translate sentences.csv --save     # Also store the run for review
    ksl-review submit sentences.csv --url http://host:3000
    ksl-review completions bash > ksl-review.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one will be created automatically. The fine-tuned model id and the
    API key can also come from OPENAI_FINE_TUNED_MODEL_ID and OPENAI_API_KEY.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Translation provider to use
    #[arg(short, long, value_enum, global = true)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long, env = "OPENAI_FINE_TUNED_MODEL_ID", global = true)]
    model: Option<String>,

    /// API key for the selected provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Marker and ANSI color for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("✗", "\x1B[1;31m"),
            Level::Warn => ("!", "\x1B[1;33m"),
            Level::Info => (" ", "\x1B[1;32m"),
            Level::Debug => ("·", "\x1B[1;36m"),
            Level::Trace => ("»", "\x1B[1;35m"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (marker, color) = Self::style_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", color, now, marker, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize with the most verbose level; the effective level is
    // applied through set_max_level once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Some(level) = &cli.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "ksl-review", &mut std::io::stdout());
        return Ok(());
    }

    // Submitting only talks to a server; no provider configuration needed
    if let Commands::Submit { csv, url, output } = &cli.command {
        let written = app_controller::submit(csv, url, output.clone()).await?;
        info!("Done: {:?}", written);
        return Ok(());
    }

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            config.validate().context("Configuration validation failed")?;
            let controller = Controller::with_config(config)?;
            controller.serve().await
        }
        Commands::Translate { csv, output, save } => {
            if save {
                config.database.enabled = true;
            }
            config.validate().context("Configuration validation failed")?;
            let controller = Controller::with_config(config)?;
            let written = controller.translate_file(&csv, output).await?;
            info!("Done: {:?}", written);
            Ok(())
        }
        Commands::Submit { .. } | Commands::Completions { .. } => Ok(()),
    }
}

/// Load the config file and apply command line overrides
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(Path::new(&cli.config_path))?;

    if let Some(provider) = &cli.provider {
        config.translation.provider = provider.clone().into();
    }

    if let Some(model) = &cli.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }

    if let Some(api_key) = &cli.api_key {
        config.translation.active_provider_config_mut().api_key = api_key.clone();
    }

    match &cli.log_level {
        Some(log_level) => config.log_level = log_level.clone().into(),
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    Ok(config)
}
