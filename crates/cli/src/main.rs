mod serve;

use std::path::{Path, PathBuf};
use std::process;

use bobbin_access::{PermissionResolver, Requirement, SessionContext};
use bobbin_workflow::{
    validate, Engine, EntityState, Operator, TransitionRequest, WorkflowDefinition,
};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Order workflow and access decision engines.
#[derive(Parser)]
#[command(
    name = "bobbin",
    version,
    about = "Order workflow and access decision engines"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a workflow definition (.json or .toml)
    Check {
        /// Path to the definition file
        definition: PathBuf,
    },

    /// Replay events against a definition from its start state
    Simulate {
        /// Path to the definition file
        definition: PathBuf,
        /// Event to apply; repeat for a sequence
        #[arg(long = "event", required = true)]
        events: Vec<String>,
        /// Operator roles, comma separated
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,
        /// Operator id recorded in history
        #[arg(long, default_value = "cli")]
        operator: String,
        /// JSON object used as the entity the workflow acts on
        #[arg(long)]
        entity: Option<PathBuf>,
        /// Entity type of the simulated instance
        #[arg(long, default_value = "order")]
        entity_type: String,
        /// Entity id of the simulated instance
        #[arg(long, default_value = "simulated")]
        entity_id: String,
    },

    /// Evaluate the permission resolver against a login payload
    #[command(group(
        ArgGroup::new("check")
            .required(true)
            .args(["resource", "menu", "role"])
    ))]
    Access {
        /// Path to the session JSON (login response)
        #[arg(long)]
        session: PathBuf,
        /// Resource token, `menu:action`
        #[arg(long)]
        resource: Option<String>,
        /// Menu name (requires --action)
        #[arg(long, requires = "action")]
        menu: Option<String>,
        /// Action within the menu
        #[arg(long, requires = "menu")]
        action: Option<String>,
        /// Required role; repeat to accept any of several
        #[arg(long)]
        role: Vec<String>,
    },

    /// Start the bobbin HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Definition files to install and activate at startup
        #[arg()]
        definitions: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Check { definition } => {
            cmd_check(&definition, cli.output, cli.quiet);
        }
        Commands::Simulate {
            definition,
            events,
            roles,
            operator,
            entity,
            entity_type,
            entity_id,
        } => {
            let options = SimulateOptions {
                events: &events,
                operator: Operator::new(operator, roles),
                entity: entity.as_deref(),
                entity_type: &entity_type,
                entity_id: &entity_id,
            };
            cmd_simulate(&definition, options, cli.output, cli.quiet);
        }
        Commands::Access {
            session,
            resource,
            menu,
            action,
            role,
        } => {
            let query = match (resource, menu.zip(action)) {
                (Some(resource), _) => AccessQuery::Resource(resource),
                (None, Some((menu, action))) => AccessQuery::Action { menu, action },
                (None, None) => AccessQuery::Role(Requirement::any_of(role)),
            };
            cmd_access(&session, &query, cli.output, cli.quiet);
        }
        Commands::Serve { port, definitions } => {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(port, definitions)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
    }
}

/// Logs go to stderr; the filter comes from `BOBBIN_LOG`.
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_env("BOBBIN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ──────────────────────────────────────────────
// check
// ──────────────────────────────────────────────

fn cmd_check(path: &Path, output: OutputFormat, quiet: bool) {
    let definition = load_definition(path, output, quiet);
    let report = match validate(&definition) {
        Ok(report) => report,
        Err(e) => {
            match output {
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "valid": false,
                        "code": definition.code,
                        "error": e.to_string(),
                    });
                    eprintln!(
                        "{}",
                        serde_json::to_string_pretty(&json).unwrap_or_default()
                    );
                }
                OutputFormat::Text => {
                    if !quiet {
                        eprintln!("invalid: {}", e);
                    }
                }
            }
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "valid": true,
                "code": definition.code,
                "states": definition.states.len(),
                "transitions": definition.transitions.len(),
                "warnings": report.warnings,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "valid: {} ({} states, {} transitions)",
                    definition.code,
                    definition.states.len(),
                    definition.transitions.len()
                );
                for warning in &report.warnings {
                    println!("  warning: {}", warning);
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// simulate
// ──────────────────────────────────────────────

struct SimulateOptions<'a> {
    events: &'a [String],
    operator: Operator,
    entity: Option<&'a Path>,
    entity_type: &'a str,
    entity_id: &'a str,
}

fn cmd_simulate(path: &Path, options: SimulateOptions<'_>, output: OutputFormat, quiet: bool) {
    let definition = load_definition(path, output, quiet);
    if let Err(e) = validate(&definition) {
        report_error(&format!("invalid definition: {}", e), output, quiet);
        process::exit(1);
    }

    let mut entity = match options.entity {
        Some(entity_path) => read_json::<EntityState>(entity_path, output, quiet),
        None => EntityState::new(),
    };

    let engine = Engine::new(&definition);
    let mut instance = match engine.start(options.entity_type, options.entity_id) {
        Ok(instance) => instance,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    if output == OutputFormat::Text && !quiet {
        println!("start: {}", definition.state_label(&instance.current_state));
    }

    for (index, event) in options.events.iter().enumerate() {
        let request = TransitionRequest::new(event.as_str(), options.operator.clone());
        match engine.execute(&mut instance, &request, &mut entity) {
            Ok(receipt) => {
                if output == OutputFormat::Text && !quiet {
                    println!(
                        "{}. {}: {} -> {}",
                        index + 1,
                        event,
                        definition.state_label(&receipt.entry.from_state),
                        definition.state_label(&receipt.entry.to_state)
                    );
                    for field in &receipt.updated_fields {
                        println!("     set {}", field);
                    }
                }
            }
            Err(e) => {
                match output {
                    OutputFormat::Json => {
                        let json = serde_json::json!({
                            "error": e.to_string(),
                            "kind": e.kind(),
                            "step": index + 1,
                            "event": event,
                            "state": instance.current_state,
                            "history": instance.history,
                        });
                        eprintln!(
                            "{}",
                            serde_json::to_string_pretty(&json).unwrap_or_default()
                        );
                    }
                    OutputFormat::Text => {
                        if !quiet {
                            eprintln!("step {} ({}) failed: {}", index + 1, event, e);
                        }
                    }
                }
                process::exit(1);
            }
        }
    }

    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "final_state": instance.current_state,
                "final_state_name": definition.state_label(&instance.current_state),
                "terminal": definition.is_terminal(&instance.current_state),
                "history": instance.history,
                "entity": entity,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            if !quiet {
                let suffix = if definition.is_terminal(&instance.current_state) {
                    " (terminal)"
                } else {
                    ""
                };
                println!(
                    "final: {}{}",
                    definition.state_label(&instance.current_state),
                    suffix
                );
            }
        }
    }
}

// ──────────────────────────────────────────────
// access
// ──────────────────────────────────────────────

enum AccessQuery {
    Resource(String),
    Action { menu: String, action: String },
    Role(Requirement),
}

fn cmd_access(session_path: &Path, query: &AccessQuery, output: OutputFormat, quiet: bool) {
    let session = read_json::<SessionContext>(session_path, output, quiet);
    let resolver = PermissionResolver::new(&session);
    let allowed = match query {
        AccessQuery::Resource(resource) => resolver.has_resource(resource),
        AccessQuery::Action { menu, action } => resolver.has_action(menu, action),
        AccessQuery::Role(requirement) => resolver.has_permission(requirement.clone()),
    };

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "allowed": allowed }));
        }
        OutputFormat::Text => {
            if !quiet {
                println!("{}", if allowed { "allowed" } else { "denied" });
            }
        }
    }
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn load_definition(path: &Path, output: OutputFormat, quiet: bool) -> WorkflowDefinition {
    match WorkflowDefinition::load(path) {
        Ok(definition) => definition,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, output: OutputFormat, quiet: bool) -> T {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
