mod sink;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use onair_core::{CaptureSource, Config, OnairError, WindowTitleSource};
use onair_runtime::{logging, Runtime, RuntimeError};
use serde_json::{Map, Value as JsonValue};
use tracing::{error, info};

use crate::sink::FileSink;

#[derive(Parser, Debug)]
#[command(name = "onair", version, about = "Show what is playing, for OBS text sources")]
struct Cli {
    /// TOML config file (defaults to the user config, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Flat host settings as a JSON object; replaces the TOML config
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Write the display text here instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Write the album art path here
    #[arg(long, global = true)]
    image_output: Option<PathBuf>,

    /// Also log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the display updated until Ctrl-C
    Run,
    /// Capture and render once, then print the result
    Once,
    /// Run one player's title parser
    Parse {
        /// Player id, e.g. `spotify` or `vlc`
        player: String,
        title: String,
    },
    /// List visible windows
    Windows,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] OnairError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings file must hold a JSON object")]
    SettingsShape,

    #[error("unknown player `{0}`")]
    UnknownPlayer(String),

    #[error("capture did not finish in time")]
    NoAnswer,
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    if let Some(path) = &cli.settings {
        let settings = read_settings(path)?;
        return Ok(Config::from_host_settings(&settings));
    }
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn read_settings(path: &Path) -> Result<Map<String, JsonValue>, CliError> {
    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str(&raw)? {
        JsonValue::Object(settings) => Ok(settings),
        _ => Err(CliError::SettingsShape),
    }
}

fn spawn_runtime(cli: &Cli, config: Config, echo: bool) -> Result<Runtime, CliError> {
    let log = logging::init(config.general.log_level, cli.log_file.as_deref())?;
    let sink = FileSink::new(cli.output.clone(), cli.image_output.clone()).echo(echo);
    let runtime = Runtime::builder(sink)
        .with_config(config)
        .with_log_handle(log)
        .spawn()?;
    Ok(runtime)
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let mut runtime = spawn_runtime(cli, config, true)?;
    info!("Capturing, press Ctrl-C to stop");

    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    signals.block_on(tokio::signal::ctrl_c())?;

    info!("Stopping");
    runtime.shutdown();
    Ok(())
}

fn once(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let mut runtime = spawn_runtime(cli, config, false)?;
    let text = runtime.refresh();
    runtime.shutdown();

    let text = text.ok_or(CliError::NoAnswer)?;
    if cli.output.is_none() {
        println!("{text}");
    }
    Ok(())
}

fn parse(cli: &Cli, player: &str, title: &str) -> Result<bool, CliError> {
    let config = load_config(cli)?;
    let base =
        onair_detect::find_player(player).ok_or_else(|| CliError::UnknownPlayer(player.into()))?;
    let mut source = WindowTitleSource::new(base);
    source.configure(&config);

    match source.player().parse_title(title) {
        Some(parsed) => {
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            Ok(true)
        }
        None => {
            eprintln!("no match for {}", source.display_name());
            Ok(false)
        }
    }
}

fn windows() -> Result<(), CliError> {
    for window in onair_detect::enumerate_windows() {
        println!("{}", serde_json::to_string(&window)?);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run => run(&cli),
        Command::Once => once(&cli),
        Command::Parse { player, title } => match parse(&cli, player, title) {
            Ok(true) => Ok(()),
            Ok(false) => return ExitCode::FAILURE,
            Err(e) => Err(e),
        },
        Command::Windows => windows(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be installed yet.
            error!("{e}");
            eprintln!("onair: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "onair",
            "once",
            "--output",
            "np.txt",
            "--log-file",
            "onair.log",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Once));
        assert_eq!(cli.output, Some(PathBuf::from("np.txt")));
        assert_eq!(cli.log_file, Some(PathBuf::from("onair.log")));
    }

    #[test]
    fn test_settings_replace_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"display_text": "%title", "check_frequency": 50}"#).unwrap();

        let cli = Cli::try_parse_from(["onair", "--settings", path.to_str().unwrap(), "once"])
            .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.display.text, "%title");
        assert_eq!(config.display.mode, onair_core::DisplayMode::Template);
        assert_eq!(config.general.check_frequency, 150);
    }

    #[test]
    fn test_settings_must_be_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            read_settings(&path),
            Err(CliError::SettingsShape)
        ));
    }

    #[test]
    fn test_config_file_merged_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nenabled = false\n").unwrap();

        let cli = Cli::try_parse_from(["onair", "--config", path.to_str().unwrap(), "run"])
            .unwrap();
        let config = load_config(&cli).unwrap();
        assert!(!config.general.enabled);
        assert_eq!(config.general.check_frequency, 1000);
    }
}
