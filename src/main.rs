//! SheetQuery - natural-language questions over a spreadsheet catalog
//!
//! A CLI tool that picks the right spreadsheet or report for a question,
//! answers it with a local Ollama model, and keeps short per-session
//! conversations so follow-up questions resolve against earlier answers.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid arguments, config, catalog, etc.)

mod analysis;
mod catalog;
mod cli;
mod config;
mod document;
mod error;
mod llm;
mod models;
mod report;
mod routing;
mod service;
mod session;
mod workbook;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::Response;
use service::QueryService;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration; the config file can turn on verbose logging
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("SheetQuery v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(args, config).await {
        error!("Failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .sheetquery.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to point at your catalog folder and pick models.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `SHEETQUERY_LOG`
/// overrides the level when set.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    let filter = EnvFilter::try_from_env("SHEETQUERY_LOG")
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args, config: Config) -> Result<()> {
    if args.dry_run {
        return handle_dry_run(&config);
    }

    let service = QueryService::build(&config)?;
    let format = config.output_format();
    let show_spinner = !args.quiet && format == OutputFormat::Text;

    if let Some(ref query) = args.query {
        let response = answer(&service, query, &config.general.session, show_spinner).await;
        println!("{}", report::render_response(&response, format)?);
        return Ok(());
    }

    interactive(&service, &config, format, show_spinner).await
}

/// Handle --dry-run: print the catalog listing the selector would see.
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("\n🔍 Dry run: listing catalog (no LLM call)...\n");
    println!(
        "   Catalog root: {}",
        catalog::display_root(&config.catalog.base_path).display()
    );
    println!("   Details file: {}\n", config.catalog.details_file.display());

    let selector = service::offline_selector(config)?;
    let description = selector.describe();
    if description.is_empty() {
        println!("   No folders described in the catalog.");
    } else {
        for line in description.lines() {
            println!("   {}", line);
        }
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(())
}

/// Runs one query with an optional spinner.
async fn answer(service: &QueryService, query: &str, session: &str, spinner: bool) -> Response {
    let progress = spinner.then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
            pb.set_style(style);
        }
        pb.set_message("Thinking...");
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    });

    let response = service.submit_query(query, session).await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    response
}

/// Interactive prompt loop.
async fn interactive(
    service: &QueryService,
    config: &Config,
    format: OutputFormat,
    spinner: bool,
) -> Result<()> {
    let sweeper = service.start_sweeper(config);
    let mut session = config.general.session.clone();

    println!("💬 SheetQuery interactive mode (session: {})", session);
    println!("   Type 'help' for commands, 'quit' to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match Command::parse(input) {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::History => {
                let history = service.read_history(&session);
                println!("{}", report::render_history(&history, format)?);
            }
            Command::Clear => {
                service.clear_history(&session);
                println!("{}", report::render_cleared(format)?);
            }
            Command::Session(Some(id)) => {
                session = id.to_string();
                println!("Switched to session: {}", session);
            }
            Command::Session(None) => println!(
                "Current session: {} ({} active)",
                session,
                service.active_sessions()
            ),
            Command::Query(query) => {
                let response = answer(service, query, &session, spinner).await;
                println!("{}\n", report::render_response(&response, format)?);
            }
        }
    }

    sweeper.abort();
    println!("👋 Goodbye!");
    Ok(())
}

/// A line typed at the interactive prompt.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Help,
    History,
    Clear,
    Session(Option<&'a str>),
    Query(&'a str),
}

impl<'a> Command<'a> {
    fn parse(input: &'a str) -> Self {
        let lower = input.to_lowercase();
        match lower.as_str() {
            "quit" | "exit" | "q" => return Command::Quit,
            "help" => return Command::Help,
            "history" => return Command::History,
            "clear" => return Command::Clear,
            "session" => return Command::Session(None),
            _ => {}
        }

        match input.split_once(char::is_whitespace) {
            Some((word, id)) if word.eq_ignore_ascii_case("session") && !id.trim().is_empty() => {
                Command::Session(Some(id.trim()))
            }
            _ => Command::Query(input),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  help           Show this help");
    println!("  history        Show this session's conversation");
    println!("  clear          Forget this session's conversation");
    println!("  session <id>   Switch to another session");
    println!("  quit           Exit (also 'exit' or 'q')");
    println!("Anything else is answered as a question.");
}

/// Load configuration from file or use defaults. Runs before logging is
/// set up, so problems with the default file go to stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load config, using defaults: {:#}", e);
            Ok(Config::default())
        }
    }
}
