//! Command-line and environment configuration.
//!
//! Every flag falls back to an environment variable; an explicit flag wins.
//! Each subcommand's `resolve` validates the combination and produces the
//! explicit settings values handed to each crate. Nothing is read from the
//! environment after that.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use bridge::envelope::DEFAULT_SOURCE;
use bridge::{CanonicalEvent, Provider, PublishCredentials, PublishDefaults, SetupSettings};
use clap::{Args, Parser, Subcommand};
use listener::ListenerSettings;

#[derive(Debug, Parser)]
#[command(
    name = "hookbridge",
    version,
    about = "Relays GitHub or GitLab webhooks to a CDEvents endpoint."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available hookbridge commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the webhook relay server.
    Serve(ServeArgs),

    /// Build one event, publish it, and print the resolved type.
    ///
    /// Meant for CI steps that report their own deployments.
    Publish(PublishArgs),
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Webhook provider served by this process: `github` or `gitlab`.
    #[arg(long, env = "HOOKBRIDGE_PROVIDER", value_parser = parse_provider)]
    pub provider: Provider,

    /// Listen address.
    #[arg(long, env = "HOOKBRIDGE_ADDR", default_value = "0.0.0.0:8081")]
    pub addr: SocketAddr,

    /// Defaults to `/webhooks/<provider>`.
    #[arg(long, env = "HOOKBRIDGE_WEBHOOK_PATH")]
    pub webhook_path: Option<String>,

    /// Required when the provider is `github`.
    #[arg(long, env = "GITHUB_WEBHOOK_SECRET", hide_env_values = true)]
    pub github_webhook_secret: Option<String>,

    /// Required when the provider is `gitlab`.
    #[arg(long, env = "GITLAB_WEBHOOK_TOKEN", hide_env_values = true)]
    pub gitlab_webhook_token: Option<String>,

    /// SQLite file holding intents and mappings; created when missing.
    #[arg(long, env = "HOOKBRIDGE_DB_PATH", default_value = "data/hookbridge.sqlite")]
    pub db_path: PathBuf,

    /// Required on setup and mapping routes when set.
    #[arg(long, env = "HOOKBRIDGE_SETUP_TOKEN", hide_env_values = true)]
    pub setup_token: Option<String>,

    /// Provider install page that setup redirects to.
    #[arg(long, env = "HOOKBRIDGE_INSTALL_URL")]
    pub install_url: Option<String>,

    /// Environment for events whose payload names none.
    #[arg(long, env = "HOOKBRIDGE_DEFAULT_ENV", default_value = "")]
    pub default_env: String,

    /// Event `source`; defaults per provider.
    #[arg(long, env = "HOOKBRIDGE_SOURCE", default_value = "")]
    pub source: String,

    /// Dashboard used when no mapping applies.
    #[arg(long, env = "DDASH_ENDPOINT", default_value = "")]
    pub ddash_endpoint: String,

    #[arg(long, env = "DDASH_AUTH_TOKEN", default_value = "", hide_env_values = true)]
    pub ddash_auth_token: String,

    #[arg(long, env = "DDASH_WEBHOOK_SECRET", default_value = "", hide_env_values = true)]
    pub ddash_webhook_secret: String,

    #[arg(
        long,
        env = "HOOKBRIDGE_PUBLISH_TIMEOUT_SECS",
        default_value_t = publisher::DEFAULT_TIMEOUT.as_secs()
    )]
    pub publish_timeout_secs: u64,
}

/// Validated server configuration.
#[derive(Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub publish_timeout: Duration,
    pub listener: ListenerSettings,
    pub setup: SetupSettings,
}

impl ServeArgs {
    /// Checks provider-specific requirements and builds [`Config`].
    pub fn resolve(self) -> Result<Config> {
        let (secret, variable) = match self.provider {
            Provider::GitHub => (self.github_webhook_secret, "GITHUB_WEBHOOK_SECRET"),
            Provider::GitLab => (self.gitlab_webhook_token, "GITLAB_WEBHOOK_TOKEN"),
        };
        let secret = non_blank(secret)
            .ok_or_else(|| anyhow::anyhow!("{variable} is required for provider {}", self.provider))?;

        if self.publish_timeout_secs == 0 {
            bail!("HOOKBRIDGE_PUBLISH_TIMEOUT_SECS must be positive");
        }

        let default_environment = self.default_env.trim().to_string();
        let setup = SetupSettings {
            install_url: non_blank(self.install_url),
            default_environment: default_environment.clone(),
            ..SetupSettings::default()
        };

        let mut listener = ListenerSettings::new(self.provider, secret);
        if let Some(path) = non_blank(self.webhook_path) {
            listener.webhook_path = path;
        }
        validate_webhook_path(&listener.webhook_path, &setup.callback_path)?;
        listener.setup_token = non_blank(self.setup_token);
        listener.source = self.source.trim().to_string();
        listener.defaults = PublishDefaults {
            credentials: credentials(
                &self.ddash_endpoint,
                &self.ddash_auth_token,
                &self.ddash_webhook_secret,
            ),
            default_environment,
        };

        Ok(Config {
            addr: self.addr,
            db_path: self.db_path,
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
            listener,
            setup,
        })
    }
}

// ---------------------------------------------------------------------------
// publish
// ---------------------------------------------------------------------------

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Dashboard base URL.
    #[arg(long, env = "DDASH_ENDPOINT", default_value = "")]
    pub endpoint: String,

    /// Organization bearer token.
    #[arg(long, env = "DDASH_AUTH_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Organization signing secret.
    #[arg(long, env = "DDASH_WEBHOOK_SECRET", default_value = "", hide_env_values = true)]
    pub secret: String,

    /// Short (`service.deployed`) or long CDEvents type.
    #[arg(long = "type", default_value = "service.deployed")]
    pub event_type: String,

    #[arg(long, default_value = "")]
    pub service: String,

    #[arg(long, default_value = "")]
    pub environment: String,

    /// Artifact id; synthesized for service events when blank.
    #[arg(long, default_value = "")]
    pub artifact: String,

    /// Overrides the inferred subject id.
    #[arg(long, default_value = "")]
    pub subject_id: String,

    /// Overrides the inferred subject type.
    #[arg(long, default_value = "")]
    pub subject_type: String,

    #[arg(long, default_value = "")]
    pub chain_id: String,

    #[arg(long, default_value = "")]
    pub actor: String,

    #[arg(long, default_value = "")]
    pub pipeline_run: String,

    #[arg(long, default_value = "")]
    pub pipeline_url: String,

    /// Event source; blank means `ci/pipeline`.
    #[arg(long, env = "DDASH_EVENT_SOURCE", default_value = "")]
    pub source: String,

    /// Request timeout: `500ms`, `10s`, `2m`, or bare seconds.
    #[arg(long, default_value = "10s", value_parser = parse_timeout)]
    pub timeout: Duration,
}

/// A validated one-shot publish.
#[derive(Debug)]
pub struct PublishRequest {
    pub credentials: PublishCredentials,
    pub event: CanonicalEvent,
    pub timeout: Duration,
}

impl PublishArgs {
    /// Requires complete credentials and maps the flags onto one event.
    pub fn resolve(self) -> Result<PublishRequest> {
        let credentials = credentials(&self.endpoint, &self.token, &self.secret);
        if !credentials.is_complete() {
            bail!(
                "endpoint/token/secret are required (or set DDASH_ENDPOINT, DDASH_AUTH_TOKEN, DDASH_WEBHOOK_SECRET)"
            );
        }
        let source = match self.source.trim() {
            "" => DEFAULT_SOURCE,
            s => s,
        };
        let event = CanonicalEvent {
            event_type: self.event_type.trim().to_string(),
            source: source.to_string(),
            service: self.service.trim().to_string(),
            environment: self.environment.trim().to_string(),
            artifact: self.artifact.trim().to_string(),
            subject_id: self.subject_id.trim().to_string(),
            subject_type: self.subject_type.trim().to_string(),
            chain_id: self.chain_id.trim().to_string(),
            actor_name: self.actor.trim().to_string(),
            pipeline_run: self.pipeline_run.trim().to_string(),
            pipeline_url: self.pipeline_url.trim().to_string(),
        };
        Ok(PublishRequest {
            credentials,
            event,
            timeout: self.timeout,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_provider(raw: &str) -> Result<Provider, String> {
    Provider::parse(raw).ok_or_else(|| format!("unknown provider {raw:?}; expected github or gitlab"))
}

/// Accepts `<n>ms`, `<n>s`, `<n>m`, or a bare number of seconds. Zero is
/// rejected.
fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit): (&str, fn(u64) -> Duration) = if let Some(n) = raw.strip_suffix("ms") {
        (n, Duration::from_millis)
    } else if let Some(n) = raw.strip_suffix('s') {
        (n, Duration::from_secs)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, |m| Duration::from_secs(m.saturating_mul(60)))
    } else {
        (raw, Duration::from_secs)
    };
    match digits.trim().parse::<u64>() {
        Ok(0) => Err("timeout must be positive".to_string()),
        Ok(n) => Ok(unit(n)),
        Err(_) => Err(format!("invalid timeout {raw:?}; use e.g. 500ms, 10s or 2m")),
    }
}

fn credentials(endpoint: &str, auth_token: &str, webhook_secret: &str) -> PublishCredentials {
    PublishCredentials {
        endpoint: endpoint.trim().to_string(),
        auth_token: auth_token.trim().to_string(),
        webhook_secret: webhook_secret.trim().to_string(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_webhook_path(path: &str, callback_path: &str) -> Result<()> {
    if !path.starts_with('/') {
        bail!("webhook path {path:?} must start with '/'");
    }
    let reserved = [
        listener::SETUP_START_API_PATH,
        listener::SETUP_START_PATH,
        listener::MAPPINGS_PATH,
        listener::MAPPINGS_DELETE_PATH,
        listener::HEALTH_PATH,
        callback_path,
    ];
    if reserved.contains(&path) {
        bail!("webhook path {path:?} collides with a built-in route");
    }
    Ok(())
}
