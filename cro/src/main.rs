//! `cro`: run the sales-research orchestrator for one company pair.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use cro::agents::catalog::{AgentServices, cro_registry};
use cro::agents::decider::LlmDecider;
use cro::core::types::{LoopStop, StepStatus};
use cro::exit_codes;
use cro::io::config::{CroConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use cro::io::executor::{CodexExecutor, Executor};
use cro::io::retrieval::{CommandRetriever, NoRetriever, Retriever};
use cro::orchestrate::{RunRequest, run_orchestration};

#[derive(Parser)]
#[command(
    name = "cro",
    version,
    about = "Decider-driven agent orchestrator for sales research"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestration loop for a target/origin company pair.
    Run {
        /// Company being prospected.
        #[arg(long)]
        target: String,
        /// Company doing the selling.
        #[arg(long)]
        origin: String,
        /// Override `output_dir` from the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Override `max_steps` from the config.
        #[arg(long)]
        max_steps: Option<u32>,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// List registered agents and their inputs.
    Agents,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() {
    cro::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            target,
            origin,
            output_dir,
            max_steps,
            config,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(dir) = output_dir {
                cfg.output_dir = dir;
            }
            if let Some(max_steps) = max_steps {
                cfg.max_steps = max_steps;
            }
            cfg.validate()?;
            cmd_run(&cfg, target, origin)
        }
        Command::Agents => cmd_agents(),
        Command::Init { force, config } => cmd_init(&config, force),
    }
}

fn cmd_run(cfg: &CroConfig, target: String, origin: String) -> Result<i32> {
    let executor: Rc<dyn Executor> =
        Rc::new(CodexExecutor::new(&cfg.llm.program, cfg.llm.log_dir.clone()));
    let retriever: Rc<dyn Retriever> = if cfg.retrieval.command.is_empty() {
        Rc::new(NoRetriever)
    } else {
        Rc::new(CommandRetriever::new(
            cfg.retrieval.command.clone(),
            Duration::from_secs(cfg.retrieval.timeout_secs),
            cfg.llm.output_limit_bytes,
        ))
    };
    let registry = cro_registry(AgentServices::from_config(
        cfg,
        Rc::clone(&executor),
        retriever,
    ))?;
    let decider = LlmDecider::new(
        executor,
        cfg.decider_model(),
        Duration::from_secs(cfg.llm.timeout_secs),
        cfg.llm.output_limit_bytes,
    );
    let request = RunRequest {
        target_company: target,
        origin_company: origin,
        output_dir: cfg.output_dir.clone(),
        max_steps: cfg.max_steps,
    };

    let outcome = run_orchestration(&registry, &decider, &request, |record| {
        let status = match record.status {
            StepStatus::Success => "ok",
            StepStatus::Failure => "failed",
        };
        println!("{:02} {} {}", record.step, record.agent, status);
    })?;

    match &outcome.stop {
        LoopStop::StoppedByDecision { reason } => {
            println!("{}: {}", outcome.stop.label(), reason);
        }
        LoopStop::StoppedInvalidAgent { agent, reason } => {
            println!("{}: '{}' ({})", outcome.stop.label(), agent, reason);
        }
        LoopStop::StoppedStepLimit { max_steps } => {
            println!("{}: {} steps", outcome.stop.label(), max_steps);
        }
    }
    println!("{}", outcome.summary_path.display());
    Ok(exit_codes::for_stop(&outcome.stop))
}

fn cmd_agents() -> Result<i32> {
    // Listing never calls the services.
    let cfg = CroConfig::default();
    let registry = cro_registry(AgentServices::from_config(
        &cfg,
        Rc::new(CodexExecutor::new(&cfg.llm.program, None)),
        Rc::new(NoRetriever),
    ))?;
    for descriptor in registry.iter() {
        println!("{}", descriptor.name);
        for slot in &descriptor.inputs {
            println!("  {} <- {}", slot.name, slot.source);
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_init(path: &std::path::Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &CroConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}
