mod file_provider;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use tierwall_core::config::ConfigFile;
use tierwall_core::effect::Effect;
use tierwall_core::environment::{Environment, EnvironmentName};
use tierwall_core::interpreter::{EffectOutcome, Interpreter, InterpreterConfig};
use tierwall_core::plan::Plan;
use tierwall_core::policy::{PolicyModel, PolicyOptions};
use tierwall_core::rule::{Direction, RuleAction};
use tierwall_core::stack::{self, StackPlan};
use tierwall_core::topology::GroupRole;
use tierwall_core::validation::ValidationReport;

use crate::file_provider::FileProvider;

#[derive(Parser)]
#[command(name = "tierwall")]
#[command(about = "Compile per-environment network admission policies into resource plans", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to a JSON config file (defaults to ./tierwall.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the policy model for the selected environment(s)
    #[arg(long, global = true)]
    policy: Option<PolicyModel>,

    /// Accept the deprecated open model (all ports from anywhere)
    #[arg(long, global = true)]
    allow_legacy_open: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the known environments and their policy model
    Environments,
    /// Show the compiled rules for an environment
    Rules {
        environment: EnvironmentName,
    },
    /// Compile and validate one environment, or all of them
    Validate {
        environment: Option<EnvironmentName>,
    },
    /// Show the ordered resource plan without applying it
    Plan {
        environment: EnvironmentName,

        /// Print the plan as JSON for the provisioning collaborator
        #[arg(long)]
        json: bool,
    },
    /// Apply the plan through the local file-backed provisioner
    Apply {
        environment: EnvironmentName,

        /// Walk the plan without side effects
        #[arg(long)]
        dry_run: bool,

        /// Keep going after a resource fails
        #[arg(long)]
        continue_on_error: bool,

        /// Directory holding per-environment state files
        #[arg(long, default_value = ".tierwall")]
        state_dir: PathBuf,
    },
    /// Tear down every resource the plan created
    Destroy {
        environment: EnvironmentName,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,

        /// Directory holding per-environment state files
        #[arg(long, default_value = ".tierwall")]
        state_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let global = &cli.global;

    let result = match cli.command {
        Commands::Environments => run_environments(global),
        Commands::Rules { environment } => run_rules(global, environment),
        Commands::Validate { environment } => run_validate(global, environment),
        Commands::Plan { environment, json } => run_plan(global, environment, json),
        Commands::Apply {
            environment,
            dry_run,
            continue_on_error,
            state_dir,
        } => run_apply(global, environment, dry_run, continue_on_error, &state_dir).await,
        Commands::Destroy {
            environment,
            auto_approve,
            state_dir,
        } => run_destroy(global, environment, auto_approve, &state_dir).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(global: &GlobalArgs) -> Result<ConfigFile, String> {
    ConfigFile::discover(global.config.as_deref()).map_err(|e| e.to_string())
}

/// Config file first, then command-line policy overrides
fn resolve_environment(
    global: &GlobalArgs,
    config: &ConfigFile,
    name: EnvironmentName,
) -> Result<Environment, String> {
    let mut env = config.environment(name).map_err(|e| e.to_string())?;
    if let Some(model) = global.policy {
        env.policy = PolicyOptions::from_model(model).with_legacy_open(env.policy.allow_legacy_open);
    }
    if global.allow_legacy_open {
        env.policy.allow_legacy_open = true;
    }
    Ok(env)
}

fn build_stack(global: &GlobalArgs, name: EnvironmentName) -> Result<StackPlan, String> {
    let config = load_config(global)?;
    let env = resolve_environment(global, &config, name)?;
    stack::build(&env).map_err(|e| format!("{}: {}", name, e))
}

fn run_environments(global: &GlobalArgs) -> Result<(), String> {
    let config = load_config(global)?;

    println!("{}", "Environments:".cyan().bold());
    for name in EnvironmentName::ALL {
        match resolve_environment(global, &config, name) {
            Ok(env) => {
                let policy = env.policy.to_string();
                let policy = if env.policy.model() == Some(PolicyModel::Open) {
                    policy.yellow()
                } else {
                    policy.green()
                };
                println!(
                    "  {} network={} cidr={} listener={} policy={}",
                    name.to_string().bold(),
                    env.network_id,
                    env.network_cidr,
                    env.listener_port,
                    policy
                );
            }
            Err(e) => println!("  {} {}", name.to_string().bold(), e.red()),
        }
    }
    Ok(())
}

fn run_rules(global: &GlobalArgs, name: EnvironmentName) -> Result<(), String> {
    let config = load_config(global)?;
    let env = resolve_environment(global, &config, name)?;
    let policy = tierwall_core::compiler::compile(&env).map_err(|e| e.to_string())?;

    println!(
        "{} {} ({})",
        "Rules for".cyan().bold(),
        name.to_string().cyan().bold(),
        env.policy
    );
    for role in GroupRole::ALL {
        let Some(group) = policy.group(role) else {
            continue;
        };
        println!();
        println!("{} {}", role.to_string().bold(), group.id.to_string().dimmed());
        for direction in [Direction::Inbound, Direction::Outbound] {
            let rules = policy.rules_for(role, direction);
            if rules.is_empty() {
                println!("  {} {}", direction, "(none)".yellow());
            }
            for (index, rule) in rules {
                let action = match rule.action {
                    RuleAction::Allow => "allow".green(),
                    RuleAction::Deny => "deny".red(),
                };
                println!(
                    "  [{}] {} {} {} port {}  {}",
                    index,
                    action,
                    direction,
                    rule.peer,
                    rule.port,
                    rule.description.dimmed()
                );
            }
        }
    }
    Ok(())
}

fn run_validate(global: &GlobalArgs, environment: Option<EnvironmentName>) -> Result<(), String> {
    let config = load_config(global)?;
    let names: Vec<EnvironmentName> = match environment {
        Some(name) => vec![name],
        None => EnvironmentName::ALL.to_vec(),
    };

    println!("{}", "Validating...".cyan());

    let mut failed = Vec::new();
    for name in names {
        let result = resolve_environment(global, &config, name)
            .and_then(|env| stack::build(&env).map_err(|e| e.to_string()));
        match result {
            Ok(stack) => {
                println!(
                    "  {} {} ({} rules, {} resources)",
                    "✓".green(),
                    name,
                    stack.policy.rules.len(),
                    stack.plan.effects().len()
                );
                print_warnings(&stack.report);
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), name, e);
                failed.push(name.to_string());
            }
        }
    }

    if failed.is_empty() {
        println!("{}", "All environments validated successfully.".green().bold());
        Ok(())
    } else {
        Err(format!("validation failed for: {}", failed.join(", ")))
    }
}

fn run_plan(global: &GlobalArgs, name: EnvironmentName, json: bool) -> Result<(), String> {
    let stack = build_stack(global, name)?;

    if json {
        let output = stack.plan.to_json().map_err(|e| e.to_string())?;
        println!("{}", output);
        return Ok(());
    }

    print_warnings(&stack.report);
    print_plan(&stack.plan);
    Ok(())
}

async fn run_apply(
    global: &GlobalArgs,
    name: EnvironmentName,
    dry_run: bool,
    continue_on_error: bool,
    state_dir: &Path,
) -> Result<(), String> {
    let stack = build_stack(global, name)?;
    print_warnings(&stack.report);
    print_plan(&stack.plan);
    println!();

    let provider = FileProvider::new(state_dir, name);
    let config = InterpreterConfig {
        dry_run,
        continue_on_error,
    };
    let interpreter = Interpreter::new(provider).with_config(config);

    println!("{}", "Applying changes...".cyan().bold());
    let result = interpreter.apply(&stack.plan).await;

    for (effect, outcome) in stack.plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Skipped { reason }) => {
                println!("  {} {} ({})", "-".yellow(), format_effect(effect), reason)
            }
            Ok(_) => println!("  {} {}", "✓".green(), format_effect(effect)),
            Err(e) => println!("  {} {} - {}", "✗".red(), format_effect(effect), e),
        }
    }

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} effects succeeded.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_destroy(
    global: &GlobalArgs,
    name: EnvironmentName,
    auto_approve: bool,
    state_dir: &Path,
) -> Result<(), String> {
    let stack = build_stack(global, name)?;
    let provider = FileProvider::new(state_dir, name);
    let identifiers = provider.identifiers().map_err(|e| e.to_string())?;

    let mut teardown = Plan::new();
    for effect in stack.plan.teardown().effects() {
        if identifiers.contains_key(effect.resource_id()) {
            teardown.add(effect.clone());
        }
    }

    if teardown.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in teardown.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        teardown.effects().len().to_string().red()
    );
    println!();

    if !auto_approve {
        println!(
            "{}",
            "Do you really want to destroy all resources?".yellow().bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        io::stdout().flush().map_err(|e| e.to_string())?;

        let mut input = String::new();
        io::stdin()
            .lock()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;
        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
    }

    println!();
    println!("{}", "Destroying resources...".red().bold());

    let interpreter = Interpreter::new(provider).with_identifiers(identifiers);
    let result = interpreter.apply(&teardown).await;
    for (effect, outcome) in teardown.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(_) => println!("  {} {}", "✓".green(), format_effect(effect)),
            Err(e) => println!("  {} {} - {}", "✗".red(), format_effect(effect), e),
        }
    }

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

fn print_warnings(report: &ValidationReport) {
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow().bold(), warning);
    }
}

fn print_plan(plan: &Plan) {
    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let symbol = match effect {
            Effect::Create(_) => "+".green().bold(),
            Effect::Read(_) => "<=".cyan().bold(),
            Effect::Delete(_) => "-".red().bold(),
        };
        let Some(resource) = effect.resource() else {
            println!("{} {}", symbol, effect.resource_id());
            continue;
        };

        println!(
            "{} {} {}",
            symbol,
            resource.id.to_string().bold(),
            format!("({})", resource.binding).dimmed()
        );
        for (key, value) in &resource.attributes {
            if key == "tags" {
                continue;
            }
            println!("      {}: {}", key, value);
        }
        let deps: Vec<_> = resource.dependencies().into_iter().collect();
        if !deps.is_empty() {
            println!("      {} {}", "depends on".dimmed(), deps.join(", ").dimmed());
        }
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to read, {} to create.",
        summary.read.to_string().cyan(),
        summary.create.to_string().green()
    );
}

fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Read(r) => format!("Read {}", r.id),
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Delete(id) => format!("Delete {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> GlobalArgs {
        GlobalArgs {
            config: None,
            policy: None,
            allow_legacy_open: false,
        }
    }

    #[test]
    fn cli_parses_plan_command() {
        let cli = Cli::try_parse_from(["tierwall", "plan", "qa", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Plan {
                environment: EnvironmentName::Qa,
                json: true
            }
        ));
    }

    #[test]
    fn cli_rejects_unknown_environment() {
        assert!(Cli::try_parse_from(["tierwall", "plan", "staging"]).is_err());
    }

    #[test]
    fn cli_parses_global_policy_flags() {
        let cli = Cli::try_parse_from([
            "tierwall",
            "validate",
            "prod",
            "--policy",
            "open",
            "--allow-legacy-open",
        ])
        .unwrap();
        assert_eq!(cli.global.policy, Some(PolicyModel::Open));
        assert!(cli.global.allow_legacy_open);
    }

    #[test]
    fn policy_flag_overrides_config() {
        let mut args = global();
        args.policy = Some(PolicyModel::Open);
        let env =
            resolve_environment(&args, &ConfigFile::default(), EnvironmentName::Prod).unwrap();
        assert_eq!(env.policy, PolicyOptions::open());

        args.allow_legacy_open = true;
        let env =
            resolve_environment(&args, &ConfigFile::default(), EnvironmentName::Prod).unwrap();
        assert!(env.policy.allow_legacy_open);
        assert!(stack::build(&env).is_ok());
    }

    #[tokio::test]
    async fn apply_then_destroy_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::builtin(EnvironmentName::Dev);
        let stack = stack::build(&env).unwrap();

        let provider = FileProvider::new(dir.path(), EnvironmentName::Dev);
        let result = Interpreter::new(provider).apply(&stack.plan).await;
        assert!(result.is_success());

        let provider = FileProvider::new(dir.path(), EnvironmentName::Dev);
        let identifiers = provider.identifiers().unwrap();
        assert_eq!(identifiers.len(), stack.plan.summary().create);

        let teardown = stack.plan.teardown();
        let result = Interpreter::new(provider)
            .with_identifiers(identifiers)
            .apply(&teardown)
            .await;
        assert!(result.is_success());

        let provider = FileProvider::new(dir.path(), EnvironmentName::Dev);
        assert!(provider.identifiers().unwrap().is_empty());
    }
}
