use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use crucible_core::{languages, DockerSandbox, RunOutcome, SandboxConfig, SandboxError};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "crucible",
    author,
    version = "0.1.0",
    about = "Container-backed multi-language code execution sandbox"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, help = "Path to a YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a source file (or inline code) in a language environment
    Run {
        /// Language name or alias (e.g. python, py, c++, node)
        language: String,

        /// Source file to execute
        file: Option<PathBuf>,

        #[clap(long, short = 'e', help = "Inline source code instead of a file")]
        code: Option<String>,

        #[clap(long, help = "Print the result as JSON")]
        json: bool,
    },
    /// List supported languages, their aliases resolved away
    Languages,
    /// Stop and remove every container this sandbox prefix owns
    Teardown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let config = match &cli.config {
        Some(path) => SandboxConfig::from_yaml_file(path)?,
        None => SandboxConfig::default(),
    };

    match cli.command {
        Commands::Run {
            language,
            file,
            code,
            json,
        } => run(config, &language, file, code, json).await,
        Commands::Languages => {
            list_languages();
            Ok(())
        }
        Commands::Teardown => teardown(config).await,
    }
}

async fn run(
    config: SandboxConfig,
    language: &str,
    file: Option<PathBuf>,
    code: Option<String>,
    json: bool,
) -> Result<()> {
    let source = match (file, code) {
        (Some(path), None) => std::fs::read_to_string(&path)?,
        (None, Some(code)) => code,
        (Some(_), Some(_)) => bail!("pass either a source file or --code, not both"),
        (None, None) => bail!("pass a source file or --code"),
    };

    let sandbox = DockerSandbox::new(config)?;
    let outcome = RunOutcome::from(sandbox.run_code(language, &source).await);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        RunOutcome::Completed(record) => {
            print!("{}", record.stdout);
            eprint!("{}", record.stderr);
            if !record.success {
                log::warn!("program exited with code {}", record.exit_code);
            }
            std::process::exit(record.exit_code.clamp(0, 255) as i32);
        }
        RunOutcome::Failed { error } => {
            eprintln!("error: {}", error);
            std::process::exit(1);
        }
    }
}

fn list_languages() {
    println!("{:<12} {:<10} {}", "LANGUAGE", "EXTENSION", "IMAGE");
    for spec in languages::all() {
        println!(
            "{:<12} .{:<9} {}",
            spec.name, spec.extension, spec.image
        );
    }
}

async fn teardown(config: SandboxConfig) -> Result<()> {
    let sandbox = DockerSandbox::new(config)?;
    let mut removed = 0usize;

    for spec in languages::all() {
        let environment = sandbox.registry().get_or_create(spec).await;
        let mut environment = environment.lock().await;
        match environment.connect().await {
            Ok(()) => {
                environment.destroy().await?;
                removed += 1;
            }
            Err(SandboxError::ContainerNotFound(_)) => {}
            Err(e) => log::warn!("skipping {}: {}", spec.name, e),
        }
    }

    println!("removed {} container(s)", removed);
    Ok(())
}
