//! Resumable plan execution CLI.
//!
//! Produces a plan for a task, asks for confirmation, executes it and keeps
//! one JSON record per run so a failed run can be resumed by id.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use autoplan::core::types::{ExecutionPlan, TaskUnderstanding};
use autoplan::engine::Engine;
use autoplan::exit_codes;
use autoplan::io::config::{Settings, load_settings};
use autoplan::io::run_state::RunStore;
use autoplan::logging;
use autoplan::planner::{FilePlanner, OfflinePlanner, PlanProducer};
use autoplan::tools::default_registry;

#[derive(Parser)]
#[command(name = "autoplan", version, about = "Resumable plan execution engine")]
struct Cli {
    /// Settings file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "autoplan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the understanding and plan for a task without executing it.
    Plan {
        #[arg(long)]
        task: String,
        #[arg(long)]
        feedback: Option<String>,
        /// Read the plan from a JSON file instead of the offline planner.
        #[arg(long)]
        plan_file: Option<PathBuf>,
    },
    /// Plan, confirm and execute a task.
    Run {
        #[arg(long)]
        task: String,
        #[arg(long)]
        feedback: Option<String>,
        #[arg(long)]
        plan_file: Option<PathBuf>,
        /// Run under this id; an existing run is resumed.
        #[arg(long)]
        run_id: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Re-execute the persisted plan of a run, skipping steps that succeeded.
    Resume {
        #[arg(long)]
        run_id: String,
    },
    /// Print the persisted record of a run.
    Status {
        #[arg(long)]
        run_id: String,
    },
    /// List known run ids.
    Runs,
    /// List registered tool names.
    Tools,
}

/// Answer to the confirmation prompt.
#[derive(Debug, PartialEq, Eq)]
enum Confirmation {
    Accepted,
    Revise(String),
    Declined,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;
    logging::init(settings.log_file.as_deref())?;

    match cli.command {
        Command::Plan {
            task,
            feedback,
            plan_file,
        } => cmd_plan(&settings, &task, feedback.as_deref(), plan_file.as_deref()),
        Command::Run {
            task,
            feedback,
            plan_file,
            run_id,
            yes,
        } => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            cmd_run(
                &settings,
                &RunArgs {
                    task: &task,
                    feedback: feedback.as_deref(),
                    plan_file: plan_file.as_deref(),
                    run_id: run_id.as_deref(),
                    yes,
                },
                &mut input,
            )
        }
        Command::Resume { run_id } => cmd_resume(settings, &run_id),
        Command::Status { run_id } => cmd_status(&settings, &run_id),
        Command::Runs => cmd_runs(settings),
        Command::Tools => cmd_tools(),
    }
}

struct RunArgs<'a> {
    task: &'a str,
    feedback: Option<&'a str>,
    plan_file: Option<&'a Path>,
    run_id: Option<&'a str>,
    yes: bool,
}

fn producer(settings: &Settings, plan_file: Option<&Path>) -> Box<dyn PlanProducer> {
    match plan_file {
        Some(path) => Box::new(FilePlanner::new(path)),
        None => Box::new(OfflinePlanner::new(&settings.planner.default_dataset)),
    }
}

fn cmd_plan(
    settings: &Settings,
    task: &str,
    feedback: Option<&str>,
    plan_file: Option<&Path>,
) -> Result<i32> {
    let (understanding, plan) = producer(settings, plan_file).produce(task, feedback)?;
    print_json(&json!({ "understanding": understanding, "plan": plan }))?;
    Ok(exit_codes::OK)
}

fn cmd_run(settings: &Settings, args: &RunArgs<'_>, input: &mut impl BufRead) -> Result<i32> {
    let producer = producer(settings, args.plan_file);
    let (mut understanding, mut plan) = producer.produce(args.task, args.feedback)?;

    if !args.yes {
        print_plan(&understanding, &plan)?;
        match confirm(input, &mut io::stderr())? {
            Confirmation::Accepted => {}
            Confirmation::Declined => return Ok(exit_codes::ABORTED),
            Confirmation::Revise(feedback) => {
                (understanding, plan) = producer.produce(args.task, Some(feedback.as_str()))?;
                print_plan(&understanding, &plan)?;
                if confirm_once(input, &mut io::stderr())? != Confirmation::Accepted {
                    return Ok(exit_codes::ABORTED);
                }
            }
        }
    }

    let engine = Engine::from_settings(settings.clone(), default_registry());
    let outcome = engine.run(&plan, &understanding, args.run_id)?;
    print_json(&outcome)?;
    Ok(exit_codes::OK)
}

fn cmd_resume(settings: Settings, run_id: &str) -> Result<i32> {
    let engine = Engine::from_settings(settings, default_registry());
    let outcome = engine.resume(run_id)?;
    print_json(&outcome)?;
    Ok(exit_codes::OK)
}

fn cmd_status(settings: &Settings, run_id: &str) -> Result<i32> {
    let store = RunStore::new(settings.state_dir.clone());
    let state = store.load(run_id)?;
    if store.is_locked(run_id) {
        eprintln!(
            "run {run_id} is in progress (lock held on {})",
            store.lock_path(run_id).display()
        );
    }
    print_json(&state)?;
    Ok(exit_codes::OK)
}

fn cmd_runs(settings: Settings) -> Result<i32> {
    let engine = Engine::from_settings(settings, default_registry());
    for run_id in engine.store().list()? {
        println!("{run_id}");
    }
    Ok(exit_codes::OK)
}

fn cmd_tools() -> Result<i32> {
    let registry = default_registry();
    for (name, tool) in registry.all() {
        println!("{name}\t{}", tool.description());
    }
    Ok(exit_codes::OK)
}

/// Ask to proceed; on refusal, ask for feedback to replan with.
fn confirm(input: &mut impl BufRead, output: &mut impl Write) -> Result<Confirmation> {
    if confirm_once(input, output)? == Confirmation::Accepted {
        return Ok(Confirmation::Accepted);
    }
    write!(output, "Feedback to revise the plan (empty to abort): ").context("write prompt")?;
    output.flush().context("flush prompt")?;
    let feedback = read_line(input)?;
    if feedback.is_empty() {
        Ok(Confirmation::Declined)
    } else {
        Ok(Confirmation::Revise(feedback))
    }
}

fn confirm_once(input: &mut impl BufRead, output: &mut impl Write) -> Result<Confirmation> {
    write!(output, "Execute this plan? [y/N] ").context("write prompt")?;
    output.flush().context("flush prompt")?;
    let answer = read_line(input)?;
    if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
        Ok(Confirmation::Accepted)
    } else {
        Ok(Confirmation::Declined)
    }
}

fn read_line(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).context("read stdin")?;
    Ok(line.trim().to_string())
}

fn print_plan(understanding: &TaskUnderstanding, plan: &ExecutionPlan) -> Result<()> {
    let mut err = io::stderr();
    writeln!(err, "Objective: {}", understanding.objective).context("write plan")?;
    writeln!(err, "Plan: {}", plan.summary).context("write plan")?;
    for (index, step) in plan.steps.iter().enumerate() {
        writeln!(err, "  {}. {} [{}] {}", index + 1, step.name, step.tool, step.description)
            .context("write plan")?;
    }
    Ok(())
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_run_with_defaults() {
        let cli = Cli::parse_from(["autoplan", "run", "--task", "revenue trend"]);
        assert_eq!(cli.config, PathBuf::from("autoplan.toml"));
        assert!(matches!(
            cli.command,
            Command::Run { yes: false, run_id: None, .. }
        ));
    }

    #[test]
    fn parse_resume_with_config() {
        let cli = Cli::parse_from([
            "autoplan",
            "--config",
            "other.toml",
            "resume",
            "--run-id",
            "run-1",
        ]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(
            cli.command,
            Command::Resume { ref run_id } if run_id == "run-1"
        ));
    }

    #[test]
    fn confirm_accepts_yes() {
        let mut input = Cursor::new("y\n");
        let answer = confirm(&mut input, &mut Vec::new()).expect("confirm");
        assert_eq!(answer, Confirmation::Accepted);
    }

    #[test]
    fn confirm_collects_feedback_on_refusal() {
        let mut input = Cursor::new("n\nonly 2024\n");
        let answer = confirm(&mut input, &mut Vec::new()).expect("confirm");
        assert_eq!(answer, Confirmation::Revise("only 2024".to_string()));
    }

    #[test]
    fn confirm_declines_without_feedback() {
        let mut input = Cursor::new("\n\n");
        let answer = confirm(&mut input, &mut Vec::new()).expect("confirm");
        assert_eq!(answer, Confirmation::Declined);
    }
}
