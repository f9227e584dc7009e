mod error;
mod services;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use services::{
    ActionExecutor, Discover, DiscoveryClient, RegistryEvent, RouterRegistry, ScriptInvoker,
};
use types::{Action, ParamValue, RouterPatch, RouterStatus, TestStatus};

#[derive(Parser, Debug)]
#[command(name = "fleetctl")]
#[command(about = "SD-WAN router fleet controller", long_about = None)]
struct Args {
    /// Path to the control-plane program
    #[arg(long, env = "FLEETCTL_SCRIPT")]
    script: PathBuf,

    /// Registry document path
    #[arg(long, env = "FLEETCTL_REGISTRY", default_value = "routers.json")]
    registry: PathBuf,

    /// Action execution timeout in seconds (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    action_timeout: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Reconcile the fleet on a fixed interval
    Run {
        /// Seconds between reconciliation sweeps
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Run a single reconciliation sweep and exit
    Sweep,
    /// Discover a router and add it to the fleet
    Register {
        /// Human name; the registry id is derived from it
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        /// Control-plane API key
        #[arg(long)]
        key: String,
        #[arg(long)]
        location: Option<String>,
    },
    /// List registered routers
    List,
    /// Show one router
    Show { id: String },
    /// Remove a router from the fleet
    Delete { id: String },
    /// Include a router in reconciliation sweeps
    Enable { id: String },
    /// Exclude a router from reconciliation sweeps
    Disable { id: String },
    /// Translate and run an action against a router
    Exec {
        #[arg(long)]
        router: String,
        /// Abstract action name (e.g. deny-traffic, interface-down)
        #[arg(long)]
        command: String,
        /// Action parameter, key=value; repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        /// Emit a test-result record of this type instead of the raw outcome
        #[arg(long)]
        record: Option<String>,
    },
    /// ICMP reachability check, independent of discovery
    Probe { id: String },
}

/// Parse one `key=value` action parameter. Values that look like booleans or
/// numbers are typed as such; everything else stays text.
fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let value = match value {
        "true" => ParamValue::Bool(true),
        "false" => ParamValue::Bool(false),
        other => match other.parse::<serde_json::Number>() {
            Ok(number) => ParamValue::Number(number),
            Err(_) => ParamValue::Text(other.to_string()),
        },
    };
    Ok((key.to_string(), value))
}

/// Record status for a successful action of the given name.
fn success_status(command: &str) -> TestStatus {
    match command {
        "deny-traffic" | "simple-block" | "fw-block" => TestStatus::Blocked,
        _ => TestStatus::Allowed,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let registry = RouterRegistry::load(args.registry.clone())
        .context("Failed to load router registry")?;
    let discovery = DiscoveryClient::new(ScriptInvoker::new(args.script.clone()));
    let action_timeout = match args.action_timeout {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    match args.command {
        Cmd::Run { interval } => {
            let mut events = registry.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        RegistryEvent::Updated(router) => debug!("registry updated: {}", router.id),
                        RegistryEvent::Deleted(id) => debug!("registry deleted: {}", id),
                    }
                }
            });

            services::reconciler::reconcile_loop(
                &registry,
                &discovery,
                Duration::from_secs(interval),
            )
            .await;
        }
        Cmd::Sweep => {
            let summary = services::reconciler::run_sweep(&registry, &discovery).await;
            println!(
                "{}",
                serde_json::json!({
                    "checked": summary.checked,
                    "changed": summary.changed,
                    "offline": summary.offline,
                })
            );
        }
        Cmd::Register {
            name,
            host,
            key,
            location,
        } => {
            let facts = discovery
                .discover(&host, &key)
                .await
                .with_context(|| format!("Discovery against {} failed", host))?;

            let patch = RouterPatch {
                id: Some(services::registry::slug(&name)),
                name: Some(facts.hostname),
                host: Some(host),
                api_key: Some(key),
                version: Some(facts.version),
                location,
                interfaces: Some(facts.interfaces),
                enabled: Some(true),
                status: Some(RouterStatus::Online),
                last_seen: Some(types::now_unix()),
            };
            let router = registry.save(patch).await?;
            println!("{}", serde_json::to_string_pretty(&router)?);
        }
        Cmd::List => {
            let routers = registry.list().await;
            println!("{}", serde_json::to_string_pretty(&routers)?);
        }
        Cmd::Show { id } => {
            let router = registry
                .get(&id)
                .await
                .ok_or(error::ControllerError::RouterNotFound(id))?;
            println!("{}", serde_json::to_string_pretty(&router)?);
        }
        Cmd::Delete { id } => {
            registry.delete(&id).await?;
        }
        Cmd::Enable { id } => {
            set_enabled(&registry, &id, true).await?;
        }
        Cmd::Disable { id } => {
            set_enabled(&registry, &id, false).await?;
        }
        Cmd::Exec {
            router,
            command,
            params,
            record,
        } => {
            let action = Action {
                id: uuid::Uuid::new_v4().to_string(),
                offset_minutes: 0,
                router_id: router,
                command: command.clone(),
                params: params.into_iter().collect(),
            };

            let executor = ActionExecutor::new(ScriptInvoker::new(args.script), action_timeout);
            let outcome = executor.execute(&registry, &action).await?;

            match record {
                Some(kind) => {
                    let record = outcome.into_record(&kind, &command, success_status(&command));
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                None => println!("{}", serde_json::to_string_pretty(&outcome)?),
            }
        }
        Cmd::Probe { id } => {
            let router = registry
                .get(&id)
                .await
                .ok_or(error::ControllerError::RouterNotFound(id))?;
            let reachable = services::probe::probe_host(&router.host, Duration::from_secs(2)).await;
            println!(
                "{}",
                serde_json::json!({ "id": router.id, "host": router.host, "reachable": reachable })
            );
        }
    }

    Ok(())
}

/// Flip the reconciliation flag on one router; everything else merges
/// through untouched.
async fn set_enabled(registry: &RouterRegistry, id: &str, enabled: bool) -> Result<()> {
    if registry.get(id).await.is_none() {
        return Err(error::ControllerError::RouterNotFound(id.to_string()).into());
    }
    let mut patch = RouterPatch::for_router(id);
    patch.enabled = Some(enabled);
    let router = registry.save(patch).await?;
    println!("{}", serde_json::to_string_pretty(&router)?);
    Ok(())
}
