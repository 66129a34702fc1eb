use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use ringside_client::{HttpNetwork, NetworkConfig};
use ringside_core::cache::{ANALYTICS_QUEUE, NewOutboxEntry, USER_ACTIONS_QUEUE};
use ringside_core::{AppConfig, CacheStorage, Request, Response};
use ringside_worker::{Event, EventOutcome, Host, NotificationCenter, Registration, ShownNotification, WindowClients};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "ringside",
    version,
    about = "Offline cache router for the boxing site",
    long_about = "Installs versions of the site into the local cache and replays \
                  router events (fetch, sync, push) against it.\n\n\
                  Configuration is read from RINGSIDE_CONFIG_FILE and RINGSIDE_* variables."
)]
pub struct Cli {
    /// Cache database to use instead of the configured one
    #[arg(long, global = true, env = "RINGSIDE_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install and activate the configured version
    Update,

    /// Route one request and print the response
    Fetch {
        /// Absolute URL, or a path on the configured origin
        url: String,

        /// Treat the request as a document navigation
        #[arg(long)]
        navigate: bool,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Print the raw body instead of a JSON summary
        #[arg(long)]
        raw: bool,
    },

    /// Redeem a background sync tag
    Sync {
        /// content-sync, analytics-sync or user-actions-sync
        tag: String,
    },

    /// Deliver a push message and print the notification it shows
    Push {
        /// JSON payload; omitted means an empty push
        payload: Option<String>,
    },

    /// List cache partitions
    Partitions,

    /// Queue a request for the next sync of its queue
    Enqueue {
        /// analytics or user-actions
        queue: String,

        url: String,

        #[arg(short = 'X', long)]
        method: Option<String>,

        /// JSON body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Show the requests waiting in a queue
    Queue {
        /// analytics or user-actions
        queue: String,
    },
}

#[derive(Debug, Serialize)]
struct UpdateOutput {
    version: String,
    state: String,
}

#[derive(Debug, Serialize)]
struct FetchOutput<'a> {
    url: &'a str,
    status: u16,
    headers: &'a [(String, String)],
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct EnqueueOutput<'a> {
    id: i64,
    queue: &'a str,
}

pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve a command line target against the origin.
fn target_url(origin: &str, input: &str) -> Result<Url> {
    match Url::parse(input) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(origin).with_context(|| format!("invalid origin {origin:?}"))?;
            base.join(input).with_context(|| format!("invalid path {input:?}"))
        }
        Err(e) => Err(e).with_context(|| format!("invalid url {input:?}")),
    }
}

fn check_queue(queue: &str) -> Result<()> {
    if queue != ANALYTICS_QUEUE && queue != USER_ACTIONS_QUEUE {
        bail!("unknown queue {queue:?}, expected {ANALYTICS_QUEUE:?} or {USER_ACTIONS_QUEUE:?}");
    }
    Ok(())
}

/// User actions are replayed against the origin only.
fn check_action_target(origin: &str, url: &Url) -> Result<()> {
    let origin = Url::parse(origin).with_context(|| format!("invalid origin {origin:?}"))?;
    if url.origin() != origin.origin() {
        bail!("{url} is not on {origin}, user actions can only target the origin");
    }
    Ok(())
}

fn print_response(response: &Response, raw: bool) -> Result<()> {
    if raw {
        use std::io::Write;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&response.body)?;
        stdout.flush()?;
        return Ok(());
    }
    print_json(&FetchOutput {
        url: &response.url,
        status: response.status,
        headers: &response.headers,
        bytes: response.body.len(),
    })
}

async fn registration(config: &AppConfig) -> Result<Registration> {
    let storage = CacheStorage::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let network = Arc::new(HttpNetwork::new(NetworkConfig::from(config))?);
    let host = Host::new(network, Arc::new(WindowClients::new()), Arc::new(NotificationCenter::new()));
    Ok(Registration::new(storage, host))
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load()?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    let registration = registration(&config).await?;

    match cli.command {
        Commands::Update => {
            let worker = registration.update(&config).await?;
            print_json(&UpdateOutput { version: worker.version().to_string(), state: worker.state().to_string() })
        }
        Commands::Fetch { url, navigate, method, raw } => {
            let url = target_url(&config.origin, &url)?;
            let request = (if navigate { Request::navigate(url) } else { Request::get(url) }).with_method(method);

            if registration.restore(&config).await?.is_none() {
                tracing::warn!("No active version, passing the request straight through");
            }
            match registration.dispatch_and_settle(Event::Fetch(request)).await? {
                EventOutcome::Response(response) => print_response(&response, raw),
                other => bail!("unexpected fetch outcome {other:?}"),
            }
        }
        Commands::Sync { tag } => {
            restore(&registration, &config).await?;
            match registration.dispatch_and_settle(Event::Sync { tag }).await? {
                EventOutcome::Synced(outcome) => print_json(&outcome),
                other => bail!("unexpected sync outcome {other:?}"),
            }
        }
        Commands::Push { payload } => {
            restore(&registration, &config).await?;
            let data = payload.map(Bytes::from);
            match registration.dispatch_and_settle(Event::Push { data }).await? {
                EventOutcome::NotificationShown { id, notification } => {
                    print_json(&ShownNotification { id, notification })
                }
                other => bail!("unexpected push outcome {other:?}"),
            }
        }
        Commands::Partitions => print_json(&registration.storage().partitions().await?),
        Commands::Enqueue { queue, url, method, body } => {
            check_queue(&queue)?;
            let body = match body {
                Some(body) => {
                    let value: serde_json::Value = serde_json::from_str(&body).context("body is not JSON")?;
                    Some(Bytes::from(serde_json::to_vec(&value)?))
                }
                None => None,
            };
            let content_type = body.as_ref().map(|_| "application/json".to_string());
            let url = target_url(&config.origin, &url)?;
            if queue == USER_ACTIONS_QUEUE {
                check_action_target(&config.origin, &url)?;
            }
            let url = url.to_string();
            let entry = NewOutboxEntry { method: method.unwrap_or_default(), url, body, content_type };
            let id = registration.storage().enqueue(&queue, entry).await?;
            print_json(&EnqueueOutput { id, queue: &queue })
        }
        Commands::Queue { queue } => {
            check_queue(&queue)?;
            print_json(&registration.storage().pending(&queue).await?)
        }
    }
}

async fn restore(registration: &Registration, config: &AppConfig) -> Result<()> {
    if registration.restore(config).await?.is_none() {
        bail!("no version has been activated yet, run `ringside update` first");
    }
    Ok(())
}
