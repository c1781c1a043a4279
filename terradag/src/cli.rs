// src/cli.rs

//! Command-line surface.
//!
//! Besides the static flags, `plan` and `apply` grow one flag per project
//! variable (the variable name, or its remapping via the `flags:` section
//! of the config). That means the project configuration has to be loaded
//! *before* arguments can be fully parsed, so parsing happens in two
//! phases: a tolerant scan for `--config`/`--verbose`/`--trace`, then the
//! real parse with the dynamic flags in place.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::loader::{load_and_validate, search_config_file};
use crate::config::model::ProjectConfig;
use crate::errors::TerradagError;
use crate::logging;
use crate::project::{OperationParams, Project};
use crate::result::ExecutionResult;
use crate::execution::UserVariables;

/// A CLI flag derived from a project variable.
#[derive(Debug, Clone)]
struct ProjectFlag {
    /// Flag name on the command line.
    name: String,
    /// Help text from the config's `flags:` section.
    description: String,
    /// The project variable this flag sets.
    variable: String,
    /// Valid values; empty for free variables.
    allowed_values: Vec<String>,
}

/// Entry point used by `main.rs`. Returns the process exit code: 0 on
/// success, 1 on any failure.
pub async fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();

    // `version` must work without a project config.
    let first_subcommand = args.iter().skip(1).find(|a| !a.starts_with('-'));
    if first_subcommand.map(String::as_str) == Some("version") {
        println!("terradag {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }

    let verbose = peek_bool_flag(&args, "--verbose") || peek_bool_flag(&args, "-v");
    let trace = peek_bool_flag(&args, "--trace");
    if let Err(err) = logging::init_logging(verbose, trace) {
        eprintln!("ERROR: failed to initialise logging: {err}");
        return 1;
    }

    let config_path = match find_config_path(&args) {
        Some(path) => path,
        None => {
            eprintln!("ERROR: unable to find a terradag.yaml config file; use --config");
            return 1;
        }
    };

    let config = match load_and_validate(&config_path).await {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    let project_flags = flags_from_config(&config);
    let command = build_command(&project_flags);

    let matches = match command.try_get_matches_from(&args) {
        Ok(matches) => matches,
        Err(err) => {
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            return code;
        }
    };

    match matches.subcommand() {
        Some(("plan", sub)) => run_operation(config, &project_flags, sub, Operation::Plan, verbose).await,
        Some(("apply", sub)) => {
            run_operation(config, &project_flags, sub, Operation::Apply, verbose).await
        }
        Some(("version", _)) => {
            println!("terradag {}", env!("CARGO_PKG_VERSION"));
            0
        }
        _ => {
            eprintln!("ERROR: no command given; see --help");
            1
        }
    }
}

enum Operation {
    Plan,
    Apply,
}

async fn run_operation(
    config: ProjectConfig,
    project_flags: &[ProjectFlag],
    sub: &ArgMatches,
    operation: Operation,
    verbose: bool,
) -> i32 {
    let params = OperationParams {
        module_names: sub
            .get_many::<String>("modules")
            .map(|names| names.cloned().collect()),
        user_vars: user_variables(project_flags, sub),
        tool_args: sub
            .get_many::<String>("tool-args")
            .map(|a| a.cloned().collect())
            .unwrap_or_default(),
    };

    let flags_by_variable: BTreeMap<String, String> = project_flags
        .iter()
        .map(|f| (f.variable.clone(), f.name.clone()))
        .collect();

    let project = match Project::new(config).await {
        Ok(project) => project,
        Err(err) => {
            eprintln!("ERROR: {}", render_error(&err, &flags_by_variable));
            return 1;
        }
    };

    project.interrupt().listen();

    let channels = match operation {
        Operation::Plan => {
            let detach = sub.get_flag("detach");
            project.plan(params, detach).await
        }
        Operation::Apply => project.apply(params).await,
    };

    let (status_rx, results_rx) = match channels {
        Ok(channels) => channels,
        Err(err) => {
            eprintln!("ERROR: {}", render_error(&err, &flags_by_variable));
            return 1;
        }
    };

    let had_errors = print_exec_status(status_rx, results_rx, verbose).await;
    if had_errors {
        eprintln!("Done; there were errors");
        1
    } else {
        println!("Done");
        0
    }
}

/// Print status updates and per-execution results as they arrive. Status
/// lines only show with `--verbose`; result lines always show, OK on
/// stdout and ERROR on stderr. Returns whether any execution failed.
async fn print_exec_status(
    mut status: mpsc::Receiver<String>,
    mut results: mpsc::Receiver<ExecutionResult>,
    verbose: bool,
) -> bool {
    let status_task = tokio::spawn(async move {
        while let Some(line) = status.recv().await {
            if verbose {
                println!("{line}");
            }
        }
    });

    let mut had_errors = false;

    while let Some(result) = results.recv().await {
        let mut line = format!(
            "{}: {}",
            result.id,
            if result.is_err() { "ERROR" } else { "OK" }
        );

        let plan = result.tool.as_ref().and_then(|t| t.plan.as_ref());
        if let Some(plan) = plan {
            line.push_str(if plan.has_changes {
                " Changes"
            } else {
                " No changes"
            });
        }
        if let Some(tool) = result.tool.as_ref() {
            line.push_str(&format!(" ({})", tool.runtime_display()));
        }

        match result.error.as_ref() {
            None => {
                println!("{line}");
                if let Some(plan) = plan {
                    if plan.has_changes {
                        println!("\n{}", plan.changes());
                    }
                }
                // Terraform sometimes warns on stderr even on success.
                if let Some(tool) = result.tool.as_ref() {
                    if !tool.stderr.is_empty() {
                        print!("{}", tool.stderr);
                    }
                }
            }
            Some(error) => {
                had_errors = true;
                eprintln!("{line}");
                // The error message already leads with the child's stderr;
                // printing anything else here would duplicate it.
                eprintln!("{error}");
            }
        }
    }

    let _ = status_task.await;
    had_errors
}

/// Render a startup error, translating missing variable names back into
/// the flags the user can actually pass.
fn render_error(err: &TerradagError, flags_by_variable: &BTreeMap<String, String>) -> String {
    match err {
        TerradagError::MissingRequiredVariables(variables) => {
            let flags: Vec<String> = variables
                .iter()
                .map(|v| format!("--{}", flags_by_variable.get(v).unwrap_or(v)))
                .collect();
            format!(
                "missing required flag{}: {}",
                if flags.len() == 1 { "" } else { "s" },
                flags.join(", ")
            )
        }
        other => other.to_string(),
    }
}

/// Derive the dynamic CLI flags from the project variables. Variables with
/// the same flag name (declared across several modules) aggregate their
/// allowed values.
fn flags_from_config(config: &ProjectConfig) -> Vec<ProjectFlag> {
    let mut flags: BTreeMap<String, ProjectFlag> = BTreeMap::new();

    for module in &config.modules {
        for variable in &module.variables {
            let (name, description) = match config.flags.get(&variable.name) {
                Some(remap) if !remap.name.is_empty() => {
                    (remap.name.clone(), remap.description.clone())
                }
                Some(remap) => (variable.name.clone(), remap.description.clone()),
                None => (variable.name.clone(), String::new()),
            };

            let entry = flags.entry(variable.name.clone()).or_insert_with(|| ProjectFlag {
                name,
                description,
                variable: variable.name.clone(),
                allowed_values: Vec::new(),
            });

            for value in variable.allowed_values() {
                if !entry.allowed_values.iter().any(|v| v == value) {
                    entry.allowed_values.push(value.clone());
                }
            }
        }
    }

    flags.into_values().collect()
}

/// Collect the user variables from parsed matches. A supplied enumerated
/// variable also becomes a module filter.
fn user_variables(project_flags: &[ProjectFlag], matches: &ArgMatches) -> UserVariables {
    let mut user_vars = UserVariables::none();

    for flag in project_flags {
        let Some(value) = matches.get_one::<String>(&flag.name) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        user_vars
            .values
            .insert(flag.variable.clone(), value.clone());
        if !flag.allowed_values.is_empty() {
            user_vars.filters.insert(flag.variable.clone());
        }
    }

    user_vars
}

fn build_command(project_flags: &[ProjectFlag]) -> Command {
    let mut plan = Command::new("plan")
        .about("Generate execution plans for modules")
        .arg(
            Arg::new("detach")
                .long("detach")
                .action(ArgAction::SetTrue)
                .help("Disconnect remote state before planning"),
        )
        .arg(
            Arg::new("modules")
                .long("modules")
                .value_name("NAMES")
                .value_delimiter(',')
                .help("Comma-separated list of modules to plan"),
        )
        .arg(
            Arg::new("tool-args")
                .value_name("TERRAFORM ARG")
                .num_args(0..)
                .last(true)
                .help("Extra arguments passed through to terraform"),
        );

    let mut apply = Command::new("apply")
        .about("Run Terraform apply on all modules")
        .long_about(
            "Run Terraform apply on all modules, in dependency order.\n\n\
             NOTE: with --modules, the selected modules run WITHOUT dependency \
             ordering: dependencies outside the selection would otherwise have \
             to run too.",
        )
        .arg(
            Arg::new("modules")
                .long("modules")
                .value_name("NAMES")
                .value_delimiter(',')
                .help("Comma-separated list of modules to apply (disables dependency ordering)"),
        )
        .arg(
            Arg::new("tool-args")
                .value_name("TERRAFORM ARG")
                .num_args(0..)
                .last(true)
                .help("Extra arguments passed through to terraform"),
        );

    for flag in project_flags {
        plan = plan.arg(project_flag_arg(flag));
        apply = apply.arg(project_flag_arg(flag));
    }

    Command::new("terradag")
        .about("A tool for managing multiple Terraform modules.")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Path to the project config file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Verbose output (status updates, debug logging)"),
        )
        .arg(
            Arg::new("trace")
                .long("trace")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Trace output"),
        )
        .subcommand(plan)
        .subcommand(apply)
        .subcommand(Command::new("version").about("Print version information"))
}

fn project_flag_arg(flag: &ProjectFlag) -> Arg {
    let mut arg = Arg::new(flag.name.clone())
        .long(flag.name.clone())
        .value_name("VALUE");

    if !flag.description.is_empty() {
        arg = arg.help(flag.description.clone());
    }
    if !flag.allowed_values.is_empty() {
        arg = arg.value_parser(PossibleValuesParser::new(flag.allowed_values.clone()));
    }

    arg
}

/// Resolve the config file: an explicit `--config` wins, otherwise the
/// well-known locations are searched.
fn find_config_path(args: &[String]) -> Option<PathBuf> {
    if let Some(explicit) = peek_string_flag(args, "--config") {
        return Some(PathBuf::from(explicit));
    }

    let cwd = std::env::current_dir().ok()?;
    let found = search_config_file(&cwd);
    if let Some(path) = found.as_ref() {
        debug!(config = ?path, "found config file");
    }
    found
}

/// Tolerant scan for `--flag value` / `--flag=value`, used before the real
/// parse because the full flag set depends on the config file's content.
fn peek_string_flag(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (index, arg) in args.iter().enumerate() {
        if arg == name {
            return args.get(index + 1).cloned();
        }
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
    }
    None
}

fn peek_bool_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}
