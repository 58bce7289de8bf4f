//! kite - autonomous coding agent for the terminal

mod commands;
mod config;
mod context;
mod handlers;
mod render;
mod utils;

use clap::Parser;
use kite_agent::{Agent, ProviderTransport, RequestContext, StopReason, Transport};
use kite_ai::providers::openai::OpenAIProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::CommandResult;
use crate::config::Config;
use crate::handlers::HandlerOptions;

/// kite - autonomous coding agent
#[derive(Parser, Debug)]
#[command(name = "kite")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: gpt-4o)
    #[arg(short, long)]
    model: Option<String>,

    /// OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Working directory
    #[arg(short, long)]
    working_dir: Option<String>,

    /// Verbose output (debug logs and model reasoning on stderr)
    #[arg(short, long)]
    verbose: bool,

    /// Wait for whole responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Attach an image to the first prompt (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Apply connector iteration and time limits
    #[arg(long)]
    connector: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("kite_cli=debug,kite_agent=debug,kite_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match Config::init() {
            Ok(path) => {
                println!("Config file at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = Config::load();

    if let Some(ref dir) = args.working_dir {
        std::env::set_current_dir(dir)?;
    }
    let root = std::env::current_dir()?;

    let api_key = match cfg.api_key() {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: No API key found");
            eprintln!();
            eprintln!("Set one with: export KITE_API_KEY=your-key (or OPENAI_API_KEY)");
            eprintln!("Or add it to the config file: kite --init-config");
            std::process::exit(1);
        }
    };

    // CLI flags take precedence over the config file
    let mut agent_config = cfg.agent_config();
    if let Some(model) = args.model {
        agent_config.model = model;
    }
    if args.no_stream {
        agent_config.stream = false;
    }
    if args.connector {
        agent_config.connector = Some(cfg.connector_limits());
    }
    let base_url = args.base_url.unwrap_or_else(|| cfg.base_url());

    let mut provider = OpenAIProvider::new(base_url, api_key);
    if let Some(timeout) = cfg.request_timeout() {
        provider = provider.with_timeout(timeout);
    }
    let transport: Arc<dyn Transport> = Arc::new(ProviderTransport::new(Arc::new(provider)));

    let project_context = context::load_context();
    let registry = handlers::build_registry(
        &root,
        transport.clone(),
        HandlerOptions {
            format_command: cfg.format_command.clone(),
            typecheck_command: cfg.typecheck_command.clone(),
            agent: agent_config.clone(),
            sub_agent_limits: cfg.connector_limits(),
            project_context: project_context.clone(),
        },
    );

    let mut agent = Agent::new(agent_config, transport, Arc::new(registry));
    if let Some(ref personality) = cfg.personality {
        agent.set_personality(personality.clone());
    }
    agent.set_project_context(project_context);

    let mut request = RequestContext::new();
    for path in &args.images {
        let (data, mime) = utils::load_image(path)?;
        request.add_image(data, mime);
    }

    if let Some(command) = args.command {
        return run_command(&mut agent, &command, &mut request, args.verbose).await;
    }

    run_interactive(&mut agent, &mut request, args.verbose).await
}

/// Print the loop's own summary when it stopped before a final answer
fn print_outcome_summary(reason: StopReason, text: &str) {
    if reason != StopReason::Done && !text.is_empty() {
        println!("{}", text);
    }
}

/// Let the printer drain the request's events. A request rejected before it
/// started emits nothing, so the printer is stopped instead.
async fn finish_printer(printer: tokio::task::JoinHandle<()>, failed: bool) {
    if failed {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        printer.abort();
    }
    printer.await.ok();
}

async fn run_command(
    agent: &mut Agent,
    command: &str,
    request: &mut RequestContext,
    verbose: bool,
) -> anyhow::Result<()> {
    let printer = render::spawn_printer(agent.subscribe(), verbose);
    let result = agent.prompt_with_context(command, request).await;
    finish_printer(printer, result.is_err()).await;

    match result {
        Ok(outcome) => {
            print_outcome_summary(outcome.reason, &outcome.text);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_interactive(
    agent: &mut Agent,
    request: &mut RequestContext,
    verbose: bool,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("kite ({}) - /help for commands", agent.config().model);
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, agent) {
            match result {
                CommandResult::Clear => {
                    agent.clear_history();
                    println!("Cleared conversation.");
                }
                CommandResult::ResetUsage => {
                    agent.reset_usage();
                    println!("Usage counters reset.");
                }
                CommandResult::Message(msg) => println!("{}", msg),
                CommandResult::Exit => break,
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            println!();
            continue;
        }

        println!();

        // Ctrl-C aborts the running request instead of the whole program
        let handle = agent.handle();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.abort();
            }
        });
        let printer = render::spawn_printer(agent.subscribe(), verbose);

        let result = agent.prompt_with_context(input, request).await;
        interrupt.abort();
        finish_printer(printer, result.is_err()).await;

        match result {
            Ok(outcome) => print_outcome_summary(outcome.reason, &outcome.text),
            Err(e) => eprintln!("Error: {}", e),
        }
        println!();
    }

    Ok(())
}
