//! Command-line front end for the bot configuration store. Every command loads
//! the file, applies one change and saves it back; secrets are never printed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use botconf_rs::config::{BotConfig, ConfigError};
use botconf_rs::dispatch::OperationManifest;
use botconf_rs::services::{ServiceDescriptor, ServiceType};

#[derive(Parser)]
#[command(name = "botconf")]
#[command(about = "Manage connected services in an encrypted bot configuration")]
struct Cli {
    /// Bot configuration file
    #[arg(long, env = "BOTCONF_FILE", default_value = "bot.json")]
    file: PathBuf,
    /// Secret used to seal sensitive fields
    #[arg(long, env = "BOTCONF_SECRET", default_value = "", hide_env_values = true)]
    secret: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new, empty configuration file
    Init {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List connected services with credentials redacted
    List,
    /// Connect a service described as JSON (must include "type", "id", "name")
    Connect {
        #[arg(long)]
        json: String,
    },
    /// Disconnect a service by name or id, or by --type and --id
    Disconnect {
        name_or_id: Option<String>,
        #[arg(long = "type", requires = "id")]
        service_type: Option<ServiceType>,
        #[arg(long)]
        id: Option<String>,
    },
    /// Manage the configuration secret
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Render a manifest operation into the request it would send
    Prepare {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        operation: String,
        /// Template parameter as key=value; repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Knowledge-base service whose key and kbId authorize the request
        #[arg(long)]
        service: Option<String>,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    /// Remove the secret; the file is rewritten in plaintext
    Clear,
    /// Re-seal the file under a new secret
    Rotate { new_secret: String },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Init { name, description, force } => {
            if cli.file.exists() && !force {
                return Err(format!(
                    "{} already exists; pass --force to overwrite",
                    cli.file.display()
                ));
            }
            let mut config = BotConfig::new(&cli.secret);
            config.name = name;
            config.description = description;
            config.save_to(&cli.file).map_err(describe)?;
            println!("created {}", cli.file.display());
        }
        Command::List => {
            let config = load(&cli.file, &cli.secret)?;
            let services: Vec<ServiceDescriptor> =
                config.services().iter().map(|s| s.redacted()).collect();
            let printable = json!({
                "name": config.name,
                "description": config.description,
                "encrypted": !config.secret_key().is_empty(),
                "services": services,
            });
            print_json(&printable)?;
        }
        Command::Connect { json } => {
            let service: ServiceDescriptor =
                serde_json::from_str(&json).map_err(|e| format!("invalid service json: {e}"))?;
            let mut config = load(&cli.file, &cli.secret)?;
            let name = config.connect_service(service).map_err(describe)?;
            config.save().map_err(describe)?;
            println!("connected {name}");
        }
        Command::Disconnect { name_or_id, service_type, id } => {
            let mut config = load(&cli.file, &cli.secret)?;
            let removed = match (service_type, id, name_or_id) {
                (Some(service_type), Some(id), _) => config.disconnect_service(service_type, &id),
                (_, _, Some(token)) => Some(
                    config
                        .disconnect_service_by_name_or_id(&token)
                        .map_err(describe)?,
                ),
                _ => return Err("pass a name or id, or --type with --id".to_string()),
            };
            config.save().map_err(describe)?;
            match removed {
                Some(service) => println!("disconnected {}", service.name()),
                None => println!("nothing to disconnect"),
            }
        }
        Command::Secret { action } => {
            let mut config = load(&cli.file, &cli.secret)?;
            match action {
                SecretAction::Clear => config.clear_secret().map_err(describe)?,
                SecretAction::Rotate { new_secret } => {
                    config.rotate_secret(&new_secret).map_err(describe)?
                }
            }
            config.save().map_err(describe)?;
            println!("secret updated for {}", cli.file.display());
        }
        Command::Prepare { manifest, operation, params, body, service } => {
            let manifest = OperationManifest::load(&manifest).map_err(|e| e.to_string())?;
            let mut params: HashMap<String, String> = params.into_iter().collect();
            let body: Option<Value> = body
                .map(|raw| {
                    serde_json::from_str(&raw).map_err(|e| format!("invalid body json: {e}"))
                })
                .transpose()?;

            let mut subscription_key = None;
            if let Some(token) = service {
                let config = load(&cli.file, &cli.secret)?;
                match config.find_service_by_name_or_id(&token) {
                    Some(ServiceDescriptor::KnowledgeBase(kb)) => {
                        params.entry("kbId".to_string()).or_insert_with(|| kb.kb_id.clone());
                        subscription_key = Some(kb.subscription_key.clone());
                    }
                    Some(other) => {
                        return Err(format!(
                            "{} is a {} service, not knowledge-base",
                            token,
                            other.service_type()
                        ))
                    }
                    None => return Err(describe(ConfigError::ServiceNotFound(token))),
                }
            }

            let mut request = manifest
                .prepare(&operation, &params, body)
                .map_err(|e| e.to_string())?;
            if let Some(key) = subscription_key {
                request = request.with_subscription_key(&key);
            }
            let printable = json!({
                "method": request.method.to_string(),
                "url": request.url,
                "headers": request.headers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
                "body": request.body,
            });
            print_json(&printable)?;
        }
    }
    Ok(())
}

fn load(path: &Path, secret: &str) -> Result<BotConfig, String> {
    BotConfig::load(path, secret).map_err(describe)
}

fn describe(err: ConfigError) -> String {
    match err {
        ConfigError::SecretRequired => format!("{err}; pass --secret or set BOTCONF_SECRET"),
        other => other.to_string(),
    }
}

fn print_json(value: &Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}
