mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{
    check::CheckSubcommand, config::ConfigSubcommand, instance::InstanceSubcommand,
    service::ServiceSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "heimdall",
    about = "Deployment and rebinarization tasks for the transit-routing fleet",
    version,
    propagate_version = true
)]
struct Cli {
    /// Fleet config file
    #[arg(long, global = true, env = "HEIMDALL_CONFIG", default_value = "fleet.yaml")]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Print mutating remote commands instead of executing them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebinarize the whole fleet (or one instance) while the scheduler is quiesced
    Rebinarize {
        /// Instance name (omit to run the fleet-wide upgrade)
        instance: Option<String>,

        /// Override the configured parallelism degree (1 = sequential)
        #[arg(long)]
        pool_size: Option<usize>,
    },

    /// Control the fleet scheduler service (tyr_beat)
    Scheduler {
        #[command(subcommand)]
        subcommand: ServiceSubcommand,
    },

    /// Control the worker service (tyr_worker)
    Worker {
        #[command(subcommand)]
        subcommand: ServiceSubcommand,
    },

    /// List and administer instances
    Instance {
        #[command(subcommand)]
        subcommand: InstanceSubcommand,
    },

    /// Back up an instance's serving data file
    Backup { instance: String },

    /// Restore an instance's serving data file from its backup
    Rollback { instance: String },

    /// Fleet consistency checks
    Check {
        #[command(subcommand)]
        subcommand: CheckSubcommand,
    },

    /// Validate or show the fleet configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Instance { .. } | Commands::Config { .. } => tracing::Level::WARN,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Rebinarize {
            instance,
            pool_size,
        } => cmd::rebinarize::run(
            &cli.config,
            instance.as_deref(),
            pool_size,
            cli.dry_run,
            cli.json,
        ),
        Commands::Scheduler { subcommand } => {
            cmd::service::run_scheduler(&cli.config, subcommand, cli.dry_run, cli.json)
        }
        Commands::Worker { subcommand } => {
            cmd::service::run_worker(&cli.config, subcommand, cli.dry_run, cli.json)
        }
        Commands::Instance { subcommand } => {
            cmd::instance::run(&cli.config, subcommand, cli.dry_run, cli.json)
        }
        Commands::Backup { instance } => cmd::backup::backup(&cli.config, &instance, cli.dry_run),
        Commands::Rollback { instance } => {
            cmd::backup::rollback(&cli.config, &instance, cli.dry_run)
        }
        Commands::Check { subcommand } => {
            cmd::check::run(&cli.config, subcommand, cli.dry_run, cli.json)
        }
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
