#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dnmenu_manager::auth::hash_password;
use dnmenu_manager::client::ApiClient;
use dnmenu_manager::gateway;
use dnmenu_manager::roster::{EntryDuration, ListKind};
use dnmenu_manager::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Admin gateway for the dnmenu username whitelists.
#[derive(Parser, Debug)]
#[command(name = "dnmenu-manager", version, about, long_about = None)]
struct Cli {
    /// Path to config.toml (default: <config_dir>/dnmenu-manager/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Print the hex SHA-256 hash for ADMIN_PASSWORD_HASH
    HashPassword {
        password: String,
        /// Defaults to the configured salt
        #[arg(long)]
        salt: Option<String>,
    },
    /// Exchange admin credentials for a bearer token
    Login {
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long, env = "DNMENU_EMAIL")]
        email: String,
        #[arg(long, env = "DNMENU_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke a token
    Logout {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Check whether a token is still accepted
    Validate {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// List unexpired entries of a list (users | usersfarm)
    List {
        #[command(flatten)]
        remote: RemoteArgs,
        list: ListKind,
    },
    /// Add an entry (duration: daily | weekly | monthly | lifetime)
    Add {
        #[command(flatten)]
        remote: RemoteArgs,
        list: ListKind,
        username: String,
        duration: EntryDuration,
    },
    /// Remove an entry
    Remove {
        #[command(flatten)]
        remote: RemoteArgs,
        list: ListKind,
        username: String,
    },
    /// Query a running gateway's health endpoint
    Health {
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// Gateway base URL
    #[arg(long, env = "DNMENU_URL", default_value = "http://127.0.0.1:5000")]
    url: String,
    /// Bearer token from `login`
    #[arg(long, env = "DNMENU_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

impl RemoteArgs {
    fn client(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(&self.url)?.with_token(self.token.clone()))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            gateway::run_gateway(config).await
        }
        Commands::HashPassword { password, salt } => {
            let salt = match salt {
                Some(salt) => salt,
                None => Config::load(cli.config.as_deref())?.admin.salt,
            };
            println!("{}", hash_password(&password, &salt));
            Ok(())
        }
        Commands::Login {
            remote,
            email,
            password,
        } => {
            let resp = remote
                .client()?
                .login(&email, &password)
                .await
                .context("Login failed")?;
            eprintln!("Token valid for {}h", resp.expires_in / 3600);
            println!("{}", resp.token);
            Ok(())
        }
        Commands::Logout { remote } => {
            remote.client()?.logout().await?;
            println!("Logged out");
            Ok(())
        }
        Commands::Validate { remote } => {
            if remote.client()?.validate().await? {
                println!("valid");
                Ok(())
            } else {
                anyhow::bail!("Token is invalid or expired")
            }
        }
        Commands::List { remote, list } => {
            let entries = remote.client()?.list(list).await?;
            if entries.is_empty() {
                println!("{list}: no entries");
            }
            for entry in entries {
                let expires = entry
                    .expiration
                    .map_or_else(|| "never".to_string(), |e| e.to_rfc3339());
                println!(
                    "{:<24} {:<10} expires {expires}",
                    entry.username,
                    entry.duration.as_str()
                );
            }
            Ok(())
        }
        Commands::Add {
            remote,
            list,
            username,
            duration,
        } => {
            let entry = remote.client()?.add(list, &username, &duration).await?;
            let expires = entry
                .expiration
                .map_or_else(|| "never".to_string(), |e| e.to_rfc3339());
            println!("Added {} to {list} (expires {expires})", entry.username);
            Ok(())
        }
        Commands::Remove {
            remote,
            list,
            username,
        } => {
            remote.client()?.remove(list, &username).await?;
            println!("Removed {username} from {list}");
            Ok(())
        }
        Commands::Health { remote } => {
            let body = remote.client()?.health().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
    }
}
