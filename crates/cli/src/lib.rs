pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use haggl_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use haggl_core::preferences::{Direction, Parameter, PreferenceWeights};

use crate::commands::watch::WatchOptions;
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "haggl",
    about = "Haggl order tracker CLI",
    long_about = "Follow procurement orders live, approve purchases, and tune vendor preferences.",
    after_help = "Examples:\n  haggl watch --synthetic --auto-approve\n  haggl approve ORD-1042\n  \
                  haggl rank --file vendors.json --weights 0.4,0.3,0.1,0.2\n  haggl config"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Default, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file to load instead of haggl.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Backend base URL (overrides feed.base_url)")]
    base_url: Option<String>,
    #[arg(long, global = true, help = "Log level: trace|debug|info|warn|error")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Log format: compact|pretty|json")]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Backfill recent events, follow the live feed, and print the order view")]
    Watch {
        #[arg(long, help = "Only react to this order id (also names the synthetic order)")]
        order: Option<String>,
        #[arg(long, help = "Use the built-in scripted feed instead of the backend")]
        synthetic: bool,
        #[arg(long, help = "Print each snapshot as a JSON line")]
        json: bool,
        #[arg(long, help = "Approve pending purchases as soon as they appear")]
        auto_approve: bool,
    },
    #[command(about = "Approve a purchase that is waiting for the operator")]
    Approve {
        #[arg(help = "Order id to approve")]
        order_id: String,
    },
    #[command(about = "Score and rank vendors from a JSON listing file")]
    Rank {
        #[arg(long, help = "JSON file with a vendor array or an object with a `vendors` array")]
        file: PathBuf,
        #[arg(
            long,
            value_parser = commands::parse_weights,
            help = "Weights as quality,affordability,shipping,reliability"
        )]
        weights: Option<PreferenceWeights>,
    },
    #[command(about = "Nudge one preference weight up or down and print the result")]
    Adjust {
        #[arg(help = "quality|affordability|shipping|reliability")]
        parameter: Parameter,
        #[arg(help = "up|down")]
        direction: Direction,
        #[arg(
            long,
            value_parser = commands::parse_weights,
            help = "Starting weights (defaults apply when omitted)"
        )]
        weights: Option<PreferenceWeights>,
        #[arg(long, help = "Vendor that prompted the feedback")]
        vendor: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Ask the backend to emit a diagnostic test event")]
    Ping,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Watch { .. } => "watch",
            Self::Approve { .. } => "approve",
            Self::Rank { .. } => "rank",
            Self::Adjust { .. } => "adjust",
            Self::Config => "config",
            Self::Ping => "ping",
        }
    }
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            // an explicit path that does not exist is an error, not a silent default
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                feed_base_url: self.base_url.clone(),
                log_level: self.log_level.clone(),
                log_format: self.log_format,
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = execute(cli);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn execute(cli: Cli) -> CommandResult {
    let options = cli.global.load_options();
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                cli.command.name(),
                "config_validation",
                format!("configuration issue: {error}"),
                commands::EXIT_CONFIG,
            );
        }
    };
    logging::init_logging(&config.logging);

    match cli.command {
        Command::Watch { order, synthetic, json, auto_approve } => commands::watch::run(
            &config,
            WatchOptions { order_id: order, synthetic, json, auto_approve },
        ),
        Command::Approve { order_id } => commands::approve::run(&config, &order_id),
        Command::Rank { file, weights } => commands::rank::run(&file, weights),
        Command::Adjust { parameter, direction, weights, vendor } => {
            commands::adjust::run(parameter, direction, weights, vendor)
        }
        Command::Config => {
            CommandResult { exit_code: 0, output: commands::config::run(&config, &options) }
        }
        Command::Ping => commands::ping::run(&config),
    }
}
