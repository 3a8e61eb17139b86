// SPDX-License-Identifier: PMPL-1.0-or-later

//! gpu-attack: inject and recover GPU stress attacks
//!
//! Thin command layer over the `gpu_attack` library. Bad arguments exit with
//! code 2, execution failures with code 1.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use gpu_attack::attack;
use gpu_attack::config::AgentConfig;
use gpu_attack::error::{ServerError, EXIT_BAD_ARGS, EXIT_ERROR};
use gpu_attack::report;
use gpu_attack::server::AttackServer;
use gpu_attack::storage::FileStore;
use gpu_attack::types::{AttackSpecification, StressAction};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gpu-attack")]
#[command(version)]
#[command(about = "Single-host GPU fault injection with gpu_burn")]
#[command(long_about = None)]
struct Cli {
    /// Agent configuration file (JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding experiment records (overrides the config file)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject an attack
    Attack {
        #[command(subcommand)]
        target: AttackTarget,
    },

    /// Recover a previously injected attack
    Recover {
        /// Attack uid printed at injection time
        #[arg(value_name = "UID")]
        uid: String,
    },

    /// List recorded attacks
    List {
        /// Only show one action (perc or mem)
        #[arg(short, long)]
        action: Option<String>,
    },
}

#[derive(Subcommand)]
enum AttackTarget {
    /// Nvidia GPU stress attack related commands
    NvGpuStress {
        /// Use this uid instead of generating one
        #[arg(long, global = true)]
        uid: Option<String>,

        #[command(subcommand)]
        action: GpuAction,
    },
}

#[derive(Subcommand)]
enum GpuAction {
    /// Continuously stress GPU compute
    Perc(PercArgs),
    /// Continuously stress GPU memory
    Mem(MemArgs),
}

#[derive(Args)]
struct CommonGpuArgs {
    /// GPU index to burn; -1 lets the tool decide
    #[arg(short = 'g', long = "gpuid", default_value_t = 0, allow_negative_numbers = true)]
    gpu_id: i64,

    /// Stress workers to request
    #[arg(short, long, default_value_t = 1)]
    workers: u32,

    /// Extra gpu_burn options, passed through verbatim
    #[arg(short, long, value_delimiter = ',')]
    options: Vec<String>,
}

#[derive(Args)]
struct PercArgs {
    /// Seconds to burn the GPU
    #[arg(short, long, default_value_t = 300)]
    time: u32,

    #[command(flatten)]
    common: CommonGpuArgs,
}

#[derive(Args)]
struct MemArgs {
    /// Memory to consume per GPU: bytes with an optional unit, or a percentage of
    /// total memory (e.g. 80%)
    #[arg(short, long, default_value = "10")]
    size: String,

    #[command(flatten)]
    common: CommonGpuArgs,
}

impl CommonGpuArgs {
    fn apply(self, spec: &mut AttackSpecification) -> Result<()> {
        spec.workers = self.workers;
        spec.gpu_id = match self.gpu_id {
            id if id < 0 => None,
            id => Some(u32::try_from(id).context("gpu id out of range")?),
        };
        spec.options = self.options;
        Ok(())
    }
}

enum Failure {
    BadArgs(anyhow::Error),
    Exec(anyhow::Error),
}

impl From<ServerError> for Failure {
    fn from(err: ServerError) -> Self {
        if err.exit_code() == EXIT_BAD_ARGS {
            Failure::BadArgs(err.into())
        } else {
            Failure::Exec(err.into())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => return exit_with(Failure::BadArgs(err)),
    };
    init_tracing(&config.log_filter);

    match run(cli.command, &config) {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(failure) => exit_with(failure),
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = AgentConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    Ok(config)
}

fn init_tracing(fallback: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands, config: &AgentConfig) -> Result<String, Failure> {
    let engine = attack::system_engine(config).map_err(Failure::BadArgs)?;
    let store = FileStore::open(&config.state_dir)
        .with_context(|| format!("opening state directory {}", config.state_dir.display()))
        .map_err(Failure::Exec)?;
    let server = AttackServer::new(engine, store);

    match command {
        Commands::Attack {
            target: AttackTarget::NvGpuStress { uid, action },
        } => {
            let spec = build_spec(uid, action).map_err(Failure::BadArgs)?;
            let action = spec.action.map(|a| a.as_str()).unwrap_or("-");
            let message = format!("Attack Nvidia GPU {action} successfully");
            let uid = server.execute_attack(spec)?;
            Ok(format!("{message}, uid: {uid}"))
        }

        Commands::Recover { uid } => {
            let outcome = server.recover_attack(&uid)?;
            Ok(report::describe_outcome(&uid, &outcome))
        }

        Commands::List { action } => {
            let filter = match action.as_deref() {
                Some(raw) => Some(StressAction::parse(raw).ok_or_else(|| {
                    Failure::BadArgs(anyhow::anyhow!("unknown action {raw:?}"))
                })?),
                None => None,
            };
            let records: Vec<_> = server
                .list_attacks()?
                .into_iter()
                .filter(|record| filter.is_none() || record.action == filter)
                .collect();
            report::print_records(&records);
            Ok(format!("{} attack(s)", records.len()))
        }
    }
}

fn build_spec(uid: Option<String>, action: GpuAction) -> Result<AttackSpecification> {
    let mut spec = match action {
        GpuAction::Perc(args) => {
            let mut spec = AttackSpecification::new(StressAction::Percentage);
            spec.time = Some(args.time);
            args.common.apply(&mut spec)?;
            spec
        }
        GpuAction::Mem(args) => {
            let mut spec = AttackSpecification::new(StressAction::Memory);
            spec.size = Some(args.size);
            args.common.apply(&mut spec)?;
            spec
        }
    };
    if let Some(uid) = uid {
        spec.common.uid = uid;
    }
    spec.complete_defaults();
    spec.validate()?;
    Ok(spec)
}

fn exit_with(failure: Failure) -> ExitCode {
    let (code, err) = match failure {
        Failure::BadArgs(err) => (EXIT_BAD_ARGS, err),
        Failure::Exec(err) => (EXIT_ERROR, err),
    };
    eprintln!("{} {:#}", "error:".red().bold(), err);
    ExitCode::from(code)
}
