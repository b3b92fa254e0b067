use hikitsugi::cli::commands::{CliArgs, Commands};
use hikitsugi::cli::handlers::{
    handle_config, handle_document, handle_questions, handle_run, handle_status,
};
use hikitsugi::util::logging::{init_logging, parse_level, LoggingConfig};
use hikitsugi::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("hikitsugi v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Run(run_args) => handle_run(run_args, args.quiet).await,
        Commands::Status(status_args) => handle_status(status_args).await,
        Commands::Document(document_args) => handle_document(document_args).await,
        Commands::Questions(questions_args) => handle_questions(questions_args).await,
        Commands::Config(config_args) => handle_config(config_args).await,
    };

    std::process::exit(exit_code);
}

/// `--log-level` wins over `-v`/`-q`, which win over `HIKITSUGI_LOG_LEVEL`
fn init_logging_from_args(args: &CliArgs) {
    let requested = if let Some(level_str) = &args.log_level {
        level_str.clone()
    } else if args.verbose {
        "debug".to_string()
    } else if args.quiet {
        "error".to_string()
    } else {
        env::var("HIKITSUGI_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string())
    };

    let level = parse_level(&requested).unwrap_or_else(|| {
        eprintln!(
            "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
            requested
        );
        Level::INFO
    });

    let use_json = env::var("HIKITSUGI_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..LoggingConfig::default()
    });
}
