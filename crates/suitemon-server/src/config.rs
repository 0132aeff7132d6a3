use anyhow::Context;
use serde::Deserialize;
use suitemon_clients::auth::ClientAuth;
use suitemon_notify::NotifyConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_run_history_retention_days")]
    pub run_history_retention_days: u32,

    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_management_base_url")]
    pub management_base_url: String,

    #[serde(default)]
    pub alerts: NotifyConfig,
}

fn default_http_port() -> u16 {
    8787
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_rules_dir() -> String {
    "rules".to_string()
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_run_history_retention_days() -> u32 {
    30
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_management_base_url() -> String {
    "https://manage.office.com".to_string()
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file '{path}'"))?;
        Ok(config)
    }
}

/// Secrets and identifiers taken from the environment. Missing required
/// values fail startup before anything is scheduled.
#[derive(Debug)]
pub struct EnvSettings {
    /// Home tenant of the managing application.
    pub tenant_id: String,
    pub client_id: String,
    pub client_auth: ClientAuth,
    pub sink_endpoint: String,
    pub sink_rule_id: String,
    pub sink_stream: String,
}

impl EnvSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let client_auth = match std::env::var("SUITEMON_CLIENT_SECRET") {
            Ok(secret) if !secret.is_empty() => ClientAuth::Secret(secret),
            _ => {
                // No secret configured: fall back to workload-identity
                // federation, which still needs an assertion file.
                let token_file = required("SUITEMON_FEDERATED_TOKEN_FILE").context(
                    "set SUITEMON_CLIENT_SECRET or SUITEMON_FEDERATED_TOKEN_FILE",
                )?;
                ClientAuth::FederatedAssertion {
                    token_file: token_file.into(),
                }
            }
        };

        Ok(Self {
            tenant_id: required("SUITEMON_TENANT_ID")?,
            client_id: required("SUITEMON_CLIENT_ID")?,
            client_auth,
            sink_endpoint: required("SUITEMON_SINK_ENDPOINT")?,
            sink_rule_id: required("SUITEMON_SINK_RULE_ID")?,
            sink_stream: required("SUITEMON_SINK_STREAM")?,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name).with_context(|| format!("missing required env var {name}"))?;
    if value.is_empty() {
        anyhow::bail!("required env var {name} is empty");
    }
    Ok(value)
}
