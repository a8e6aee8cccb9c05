mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use commands::{Command, ShellLine};
use disklist_common::ListConfig;
use disklist_store::DiskList;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "disklist")]
#[command(about = "A linked list that lives in a single file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// List file
    #[arg(long, short, default_value = "data.dm")]
    file: PathBuf,

    /// JSON file with `initial_size`, `scale_factor` and `strict_recovery`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum file size in bytes
    #[arg(long)]
    initial_size: Option<u64>,

    /// Extra headroom on each grow, as a fraction of the initial size
    #[arg(long)]
    scale_factor: Option<f32>,

    /// Refuse to open a file whose links cannot be fully rebuilt
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive shell (Default)
    Shell,
    #[command(flatten)]
    Op(Command),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut list = DiskList::open(&cli.file, &config)
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;
    info!(path = %cli.file.display(), nodes = list.len(), "opened list");

    match cli.command {
        Some(Commands::Op(command)) => {
            println!("{}", run(&mut list, &command)?);
        }
        Some(Commands::Shell) | None => {
            start_repl(&mut list)?;
        }
    }

    Ok(())
}

/// Config file first, then flags on top.
fn load_config(cli: &Cli) -> anyhow::Result<ListConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&raw).context("Invalid config file")?
        }
        None => ListConfig::default(),
    };

    if let Some(initial_size) = cli.initial_size {
        config.initial_size = initial_size;
    }
    if let Some(scale_factor) = cli.scale_factor {
        config.scale_factor = scale_factor;
    }
    if cli.strict {
        config.strict_recovery = true;
    }

    config.validate()?;
    Ok(config)
}

/// Executes one command, flushing if it changed the list.
fn run(list: &mut DiskList, command: &Command) -> anyhow::Result<String> {
    let output = command.execute(list)?;
    if command.mutates() {
        list.flush()?;
    }
    Ok(output)
}

fn start_repl(list: &mut DiskList) -> anyhow::Result<()> {
    println!(
        "{}",
        format!(
            "Opened {} ({} nodes). Type 'help' for commands, 'exit' to quit.",
            list.path().display(),
            list.len()
        )
        .green()
    );

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline(&format!("{} > ", "disklist".blue().bold()));
        match readline {
            Ok(line) => {
                let input = line.trim();
                if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                    break;
                }
                if input.is_empty() {
                    continue;
                }

                rl.add_history_entry(input)?;

                match ShellLine::parse_line(input) {
                    Ok(command) => match run(list, &command) {
                        Ok(output) => println!("{}", output),
                        Err(e) => println!("{} {}", "Error:".red(), e),
                    },
                    // Clap renders usage and help text itself
                    Err(e) => println!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    list.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["disklist", "--file", "x.dl", "push", "Hello,", "World!"])
            .unwrap();
        assert_eq!(cli.file, PathBuf::from("x.dl"));
        match cli.command {
            Some(Commands::Op(Command::Push { value })) => {
                assert_eq!(value.join(" "), "Hello, World!")
            }
            _ => panic!("expected push"),
        }

        let cli = Cli::try_parse_from(["disklist"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.file, PathBuf::from("data.dm"));

        let cli = Cli::try_parse_from(["disklist", "shell"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Shell)));

        assert!(Cli::try_parse_from(["disklist", "push"]).is_err());
    }

    #[test]
    fn test_config_layering() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("list.json");
        fs::write(&config_path, r#"{"initial_size": 4096, "scale_factor": 0.5}"#).unwrap();

        let config_arg = config_path.to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "disklist",
            "--config",
            config_arg.as_str(),
            "--scale-factor",
            "1.5",
            "--strict",
            "show",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.initial_size, 4096);
        assert_eq!(config.scale_factor, 1.5);
        assert!(config.strict_recovery);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        let cli = Cli::try_parse_from(["disklist", "--initial-size", "0", "show"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_run_flushes_mutations() {
        colored::control::set_override(false);
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.dl");
        {
            let mut list = DiskList::open(&path, &ListConfig::default()).unwrap();
            for value in ["A", "B", "C"] {
                let push = ShellLine::parse_line(&format!("push {}", value)).unwrap();
                run(&mut list, &push).unwrap();
            }
            run(&mut list, &ShellLine::parse_line("touch A").unwrap()).unwrap();

            // Nothing left to write
            assert_eq!(list.flush().unwrap(), 0);
        }

        let mut list = DiskList::open(&path, &ListConfig::default()).unwrap();
        assert_eq!(
            Command::Show.execute(&mut list).unwrap(),
            "0=A > 28=C > 14=B"
        );
    }
}
