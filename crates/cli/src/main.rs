mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use runtime::{
    AnthropicFactory, DiagnosticsProbe, QueryReply, RebuildHook, SessionSupervisor, StdioLauncher,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "tiller.toml";

type Supervisor = SessionSupervisor<AnthropicFactory, StdioLauncher>;

#[derive(Parser)]
#[command(name = "tiller")]
#[command(about = "Drive an MCP tool server with Claude", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print structured output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Answer a single query
    Ask {
        /// The query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Establish the session and report the discovered tools
    Init,
    /// Establish the session and print its status
    Status,
    /// Check credential, artifact and session health
    Diagnose,
    /// Run the configured rebuild command for the tool server
    Rebuild,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config).await,
        Some(Commands::Ask { query }) => cmd_ask(&config, &query.join(" "), cli.json).await,
        Some(Commands::Init) => cmd_init(&config, cli.json).await,
        Some(Commands::Status) => cmd_status(&config, cli.json).await,
        Some(Commands::Diagnose) => cmd_diagnose(&config).await,
        Some(Commands::Rebuild) => cmd_rebuild(&config, &cli.config, cli.json).await,
    }
}

fn supervisor(config: &Config) -> Supervisor {
    let supervisor = SessionSupervisor::new(
        config.supervisor(),
        config.gateway_factory(),
        config.launcher(),
    );
    match config.rebuild() {
        Some(hook) if config.server.rebuild_on_missing => {
            info!("rebuild on missing artifact enabled");
            supervisor.with_rebuild_hook(hook)
        }
        _ => supervisor,
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    println!("tiller v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", config.backend.model);
    println!("Tool server: {}", config.server.artifact.display());

    let supervisor = supervisor(config);
    let report = supervisor.init_report().await;
    match (&report.tools, &report.error) {
        (Some(tools), _) => {
            let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
            println!("Tools: {}", names.join(", "));
        }
        (None, Some(error)) => println!("Tool server unavailable: {error}"),
        (None, None) => {}
    }
    println!("Type 'quit' or Ctrl+D to exit, '/status' or '/reset' for the session.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        match input {
            "" => continue,
            "quit" | "exit" => break,
            "/status" => {
                print_json(&supervisor.status())?;
                continue;
            }
            "/reset" => {
                supervisor.reset().await;
                println!("Session reset.\n");
                continue;
            }
            _ => {}
        }

        match supervisor.query(input).await {
            QueryReply::Result { result } => println!("\n{result}\n"),
            QueryReply::Error { error } => {
                eprintln!("Sorry, I couldn't process that request: {error}\n");
            }
        }
    }

    supervisor.reset().await;
    println!("\nSession ended.");
    Ok(())
}

async fn cmd_ask(config: &Config, query: &str, json: bool) -> Result<()> {
    let supervisor = supervisor(config);
    let outcome = if json {
        print_json(&supervisor.query(query).await)
    } else {
        match supervisor.run(query).await {
            Ok(answer) => {
                println!("{answer}");
                Ok(())
            }
            Err(e) => Err(Error::Query(e)),
        }
    };
    supervisor.reset().await;
    outcome
}

async fn cmd_init(config: &Config, json: bool) -> Result<()> {
    let supervisor = supervisor(config);
    let report = supervisor.init_report().await;
    supervisor.reset().await;

    if json {
        return print_json(&report);
    }
    match (report.tools, report.error) {
        (Some(tools), _) => {
            println!("Initialized with {} tools:", tools.len());
            for tool in tools {
                println!("  {:<24}  {}", tool.name, tool.description);
            }
            Ok(())
        }
        (None, error) => Err(Error::NotInitialized(error.unwrap_or_default())),
    }
}

async fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let supervisor = supervisor(config);
    let ready = supervisor.ensure_ready().await;
    let status = supervisor.status();
    supervisor.reset().await;

    if json {
        return print_json(&status);
    }
    println!("Initialized:     {}", status.initialized);
    println!("Tools available: {}", status.tools_available);
    if let Some(id) = status.session_id {
        println!("Session:         {id}");
    }
    for tool in &status.tools {
        println!("  {}", tool.name);
    }
    ready.map_err(Error::Init)
}

async fn cmd_diagnose(config: &Config) -> Result<()> {
    let supervisor = supervisor(config);
    let report = DiagnosticsProbe::new(&supervisor).run().await;
    print_json(&report)
}

async fn cmd_rebuild(config: &Config, config_path: &std::path::Path, json: bool) -> Result<()> {
    let hook = config.rebuild().ok_or_else(|| Error::NoRebuildCommand {
        config: config_path.display().to_string(),
    })?;
    let outcome = hook.rebuild(&config.server.artifact).await?;
    if !outcome.artifact_exists {
        warn!(path = %config.server.artifact.display(), "rebuild produced no artifact");
    }

    if json {
        return print_json(&outcome);
    }
    if !outcome.build_output.is_empty() {
        println!("{}", outcome.build_output.trim_end());
    }
    if let Some(stderr) = &outcome.build_error {
        eprintln!("{}", stderr.trim_end());
    }
    if outcome.artifact_exists {
        println!("Rebuilt {}", config.server.artifact.display());
    } else {
        println!(
            "Build completed but {} was not found",
            config.server.artifact.display()
        );
    }
    Ok(())
}
