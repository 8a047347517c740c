//! fwpolicy - firewall policy management CLI
//!
//! Manages firewalls, their filtering policies and prioritised rules, and
//! inspects packets against a policy.
//!
//! # Usage
//!
//! ```bash
//! export FWPOLICY_JWT_SECRET=change-me
//! export FWPOLICY_TOKEN=$(fwpolicy token alice)
//!
//! fwpolicy firewall create edge
//! fwpolicy policy --firewall 1 create web --default-action deny
//! fwpolicy rule --firewall 1 --policy 1 create --action allow --priority 10 \
//!     --source 10.0.0.0/8:80 --destination 2.2.2.2:443 --port 443
//! fwpolicy inspect --firewall 1 --policy 1 \
//!     --source 10.1.2.3:80 --destination 2.2.2.2:443
//! fwpolicy rule --firewall 1 --policy 1 list --order-by priority__desc
//! fwpolicy health
//! ```
//!
//! Every command except `token` and `health` requires a token, passed with
//! `--token` or `FWPOLICY_TOKEN`. Output is JSON on stdout.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use fwpolicy::audit::AuditLog;
use fwpolicy::auth::{self, AuthError, User};
use fwpolicy::config::Settings;
use fwpolicy::core::address::AddressPattern;
use fwpolicy::core::lifecycle::Visibility;
use fwpolicy::core::query::{
    FirewallOrder, FirewallQuery, OrderBy, PageRequest, PolicyOrder, PolicyQuery, RuleOrder,
    RuleQuery,
};
use fwpolicy::core::use_cases::{
    self, CreateFilteringPolicy, CreateFirewall, CreateFirewallRule, DeleteFilteringPolicy,
    DeleteFirewall, DeleteFirewallRule, InspectPacket, NetworkAddressInput, PacketInput,
    PortInput,
};
use fwpolicy::{Action, Database, Error, Result};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "fwpolicy")]
#[command(about = "Firewall policy manager with packet inspection", long_about = None)]
#[command(version = build::PKG_VERSION)]
struct Cli {
    /// Access token (see `fwpolicy token`)
    #[arg(long, env = "FWPOLICY_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage firewalls
    Firewall {
        #[command(subcommand)]
        command: FirewallCommand,
    },
    /// Manage the filtering policies of a firewall
    Policy {
        #[arg(long)]
        firewall: u64,
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Manage the rules of a filtering policy
    Rule {
        #[arg(long)]
        firewall: u64,
        #[arg(long)]
        policy: u64,
        #[command(subcommand)]
        command: RuleCommand,
    },
    /// Decide the action for a packet under a policy
    Inspect {
        #[arg(long)]
        firewall: u64,
        #[arg(long)]
        policy: u64,
        /// Packet source as ADDRESS:PORT
        #[arg(long, value_parser = parse_entry)]
        source: NetworkAddressInput,
        /// Packet destination as ADDRESS:PORT
        #[arg(long, value_parser = parse_entry)]
        destination: NetworkAddressInput,
    },
    /// Issue an access token
    Token {
        username: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
    /// Report liveness and build version
    Health,
}

#[derive(Args)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = 10)]
    per_page: u64,
    /// Include soft-deleted entries
    #[arg(long)]
    include_deleted: bool,
}

impl PageArgs {
    fn request(&self, settings: &Settings) -> PageRequest {
        PageRequest::new(self.page, self.per_page).clamped(settings.max_per_page)
    }

    fn visibility(&self) -> Visibility {
        visibility(self.include_deleted)
    }
}

fn visibility(include_deleted: bool) -> Visibility {
    if include_deleted {
        Visibility::IncludeDeleted
    } else {
        Visibility::ActiveOnly
    }
}

#[derive(Subcommand)]
enum FirewallCommand {
    Create {
        name: String,
    },
    List {
        #[arg(long)]
        name: Option<String>,
        /// `id` or `name`, with optional `__desc` suffix
        #[arg(long, default_value = "id")]
        order_by: OrderBy<FirewallOrder>,
        #[command(flatten)]
        page: PageArgs,
    },
    Show {
        id: u64,
        #[arg(long)]
        include_deleted: bool,
    },
    Delete {
        id: u64,
    },
}

#[derive(Subcommand)]
enum PolicyCommand {
    Create {
        name: String,
        #[arg(long)]
        default_action: Action,
    },
    List {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        default_action: Option<Action>,
        /// `id`, `name` or `default_action`, with optional `__desc` suffix
        #[arg(long, default_value = "id")]
        order_by: OrderBy<PolicyOrder>,
        #[command(flatten)]
        page: PageArgs,
    },
    Show {
        id: u64,
        #[arg(long)]
        include_deleted: bool,
    },
    Delete {
        id: u64,
    },
}

#[derive(Subcommand)]
enum RuleCommand {
    Create {
        #[arg(long)]
        action: Option<Action>,
        #[arg(long, allow_hyphen_values = true)]
        priority: i64,
        #[arg(long, default_value = "")]
        description: String,
        /// ADDRESS:PORT, repeatable; every entry must match
        #[arg(long = "source", value_parser = parse_entry)]
        sources: Vec<NetworkAddressInput>,
        /// ADDRESS:PORT, repeatable; every entry must match
        #[arg(long = "destination", value_parser = parse_entry)]
        destinations: Vec<NetworkAddressInput>,
        /// Repeatable
        #[arg(long = "port", allow_hyphen_values = true)]
        ports: Vec<i64>,
    },
    List {
        #[arg(long)]
        action: Option<Action>,
        #[arg(long)]
        source_address: Option<AddressPattern>,
        #[arg(long)]
        source_port: Option<u16>,
        #[arg(long)]
        destination_address: Option<AddressPattern>,
        #[arg(long)]
        destination_port: Option<u16>,
        #[arg(long)]
        port: Option<u16>,
        /// `id`, `action` or `priority`, with optional `__desc` suffix
        #[arg(long, default_value = "id")]
        order_by: OrderBy<RuleOrder>,
        #[command(flatten)]
        page: PageArgs,
    },
    Show {
        id: u64,
        #[arg(long)]
        include_deleted: bool,
    },
    Delete {
        id: u64,
    },
}

/// Parses `ADDRESS:PORT`; the port is validated later with the rest of the input.
fn parse_entry(s: &str) -> std::result::Result<NetworkAddressInput, String> {
    let (address, port) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("{s} is not in ADDRESS:PORT form"))?;
    let port = port
        .parse()
        .map_err(|_| format!("{port} is not a valid port number"))?;
    Ok(NetworkAddressInput::new(address, port))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = fwpolicy::utils::get_state_dir().and_then(|dir| {
        fwpolicy::utils::ensure_dir(&dir).ok()?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("fwpolicy.log"))
            .ok()
    });

    if let Some(file) = file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            let translation = e.translate();
            eprintln!("Error: {}", translation.user_message);
            for suggestion in translation.suggestions {
                eprintln!("  - {suggestion}");
            }
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn authenticate(settings: &Settings, token: Option<&str>) -> Result<User> {
    let token = token.ok_or(AuthError::TokenMissing)?;
    let user = auth::decode_jwt(settings, token)?;
    tracing::info!("Authenticated as {}", user.username);
    Ok(user)
}

async fn handle_cli(cli: Cli) -> Result<()> {
    if let Commands::Health = cli.command {
        return print_json(&fwpolicy::health::health(build::PKG_VERSION));
    }

    let settings = Settings::load()?;

    if let Commands::Token { username, ttl } = &cli.command {
        let token = auth::encode_jwt(&settings, &User::new(username), Duration::from_secs(*ttl))?;
        println!("{token}");
        return Ok(());
    }

    let user = authenticate(&settings, cli.token.as_deref())?;
    let username = Some(user.username.as_str());

    fwpolicy::utils::ensure_dir(&settings.data_dir)?;
    let mut db = Database::open(&settings.data_dir).await?;
    let audit = match AuditLog::new() {
        Ok(audit) => Some(audit),
        Err(e) => {
            tracing::warn!("Audit log unavailable: {e}");
            None
        }
    };
    let audit = audit.as_ref();

    match cli.command {
        Commands::Firewall { command } => match command {
            FirewallCommand::Create { name } => {
                let firewall =
                    use_cases::run(&mut db, audit, username, &CreateFirewall { name }).await?;
                print_json(&firewall)
            }
            FirewallCommand::List {
                name,
                order_by,
                page,
            } => {
                let query = FirewallQuery {
                    name,
                    order_by,
                    visibility: page.visibility(),
                };
                print_json(&db.store().list_firewalls(&query, page.request(&settings)))
            }
            FirewallCommand::Show {
                id,
                include_deleted,
            } => print_json(db.store().firewall(id, visibility(include_deleted))?),
            FirewallCommand::Delete { id } => {
                use_cases::run(&mut db, audit, username, &DeleteFirewall { id }).await
            }
        },

        Commands::Policy {
            firewall,
            command,
        } => match command {
            PolicyCommand::Create {
                name,
                default_action,
            } => {
                let command = CreateFilteringPolicy {
                    firewall_id: firewall,
                    name,
                    default_action,
                };
                print_json(&use_cases::run(&mut db, audit, username, &command).await?)
            }
            PolicyCommand::List {
                name,
                default_action,
                order_by,
                page,
            } => {
                let query = PolicyQuery {
                    name,
                    default_action,
                    order_by,
                    visibility: page.visibility(),
                };
                print_json(&db.store().list_policies(
                    firewall,
                    &query,
                    page.request(&settings),
                )?)
            }
            PolicyCommand::Show {
                id,
                include_deleted,
            } => print_json(db.store().policy(firewall, id, visibility(include_deleted))?),
            PolicyCommand::Delete { id } => {
                let command = DeleteFilteringPolicy {
                    firewall_id: firewall,
                    id,
                };
                use_cases::run(&mut db, audit, username, &command).await
            }
        },

        Commands::Rule {
            firewall,
            policy,
            command,
        } => match command {
            RuleCommand::Create {
                action,
                priority,
                description,
                sources,
                destinations,
                ports,
            } => {
                let command = CreateFirewallRule {
                    firewall_id: firewall,
                    filtering_policy_id: policy,
                    action,
                    priority,
                    description,
                    sources,
                    destinations,
                    ports: ports.into_iter().map(|number| PortInput { number }).collect(),
                };
                print_json(&use_cases::run(&mut db, audit, username, &command).await?)
            }
            RuleCommand::List {
                action,
                source_address,
                source_port,
                destination_address,
                destination_port,
                port,
                order_by,
                page,
            } => {
                let query = RuleQuery {
                    action,
                    source_address,
                    source_port,
                    destination_address,
                    destination_port,
                    port,
                    order_by,
                    visibility: page.visibility(),
                };
                print_json(&db.store().list_rules(
                    firewall,
                    policy,
                    &query,
                    page.request(&settings),
                )?)
            }
            RuleCommand::Show {
                id,
                include_deleted,
            } => print_json(
                db.store()
                    .rule(firewall, policy, id, visibility(include_deleted))?,
            ),
            RuleCommand::Delete { id } => {
                let command = DeleteFirewallRule {
                    firewall_id: firewall,
                    filtering_policy_id: policy,
                    id,
                };
                use_cases::run(&mut db, audit, username, &command).await
            }
        },

        Commands::Inspect {
            firewall,
            policy,
            source,
            destination,
        } => {
            let command = InspectPacket {
                firewall_id: firewall,
                filtering_policy_id: policy,
                packet: PacketInput {
                    source_address: source.address,
                    source_port: source.port,
                    destination_address: destination.address,
                    destination_port: destination.port,
                },
            };
            print_json(&command.run(db.store(), audit, username).await?)
        }

        Commands::Token { .. } | Commands::Health => Err(Error::Internal(
            "command handled before authentication".to_string(),
        )),
    }
}
