// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Decision Engine Configuration Types
//
// Defines the configuration schema for an AEGIS decision engine replica:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Token verification settings (issuer, audience, key material)
// - Audit pipeline tuning and sink selection
// - SLO objectives and burn-rate evaluation cadence
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::slo::{SloDefinition, SloKind};

pub const CONFIG_KIND: &str = "DecisionEngineConfig";
pub const CONFIG_ENV_VAR: &str = "AEGIS_DECISION_CONFIG_PATH";

/// Upper bound on `audit.max_attempts`.
pub const MAX_AUDIT_ATTEMPTS: u32 = 10;

/// Longest single retry delay between audit delivery attempts.
pub const MAX_AUDIT_BACKOFF: Duration = Duration::from_secs(60);

/// Top-level Kubernetes-style engine configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DecisionEngineConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: EngineConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Replica name, used in logs
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigSpec {
    /// Path to the AuthorizationPolicy document loaded at start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_path: Option<String>,

    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub slo: SloConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Expected `iss` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Expected `aud` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Clock skew tolerance for exp/nbf in seconds
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,

    /// HS256 shared secret (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hs256_secret: Option<String>,

    /// RS256 public key in PEM format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsa_public_key_path: Option<String>,

    #[serde(default)]
    pub claims: ClaimNames,
}

/// Claim names read from verified tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimNames {
    #[serde(default = "default_tenant_claim")]
    pub tenant: String,
    #[serde(default = "default_workspaces_claim")]
    pub workspaces: String,
    #[serde(default = "default_roles_claim")]
    pub roles: String,
    #[serde(default = "default_session_claim")]
    pub session: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Records buffered before the oldest is dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Records flushed per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Delivery attempts per sink per batch
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay, doubled on each further attempt
    #[serde(default = "default_base_backoff", with = "humantime_serde")]
    pub base_backoff: Duration,

    #[serde(default = "default_sink_timeout", with = "humantime_serde")]
    pub sink_timeout: Duration,

    #[serde(default = "default_sinks")]
    pub sinks: Vec<AuditSinkConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditSinkConfig {
    /// Structured log line per record
    Log,
    /// Prometheus-style decision counters
    Metrics,
    /// JSON push to a log aggregation endpoint
    Http {
        endpoint: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloConfig {
    #[serde(default = "default_tick_interval", with = "humantime_serde")]
    pub tick_interval: Duration,

    /// No decisions for this long marks metrics stale
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,

    /// Resolution of the sliding windows
    #[serde(default = "default_bucket_width", with = "humantime_serde")]
    pub bucket_width: Duration,

    #[serde(default = "default_objectives")]
    pub objectives: Vec<SloDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus scrape port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_leeway() -> u64 {
    30
}

fn default_tenant_claim() -> String {
    "tenant".to_string()
}

fn default_workspaces_claim() -> String {
    "workspaces".to_string()
}

fn default_roles_claim() -> String {
    "roles".to_string()
}

fn default_session_claim() -> String {
    "sid".to_string()
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_sink_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_sinks() -> Vec<AuditSinkConfig> {
    vec![AuditSinkConfig::Log, AuditSinkConfig::Metrics]
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(300)
}

fn default_bucket_width() -> Duration {
    Duration::from_secs(10)
}

fn default_objectives() -> Vec<SloDefinition> {
    vec![
        SloDefinition {
            name: "decision-denials".to_string(),
            kind: SloKind::DenialRate,
            objective: 0.99,
            warning: super::slo::BurnRateWindow::warning_default(),
            critical: super::slo::BurnRateWindow::critical_default(),
        },
        SloDefinition {
            name: "decision-latency".to_string(),
            kind: SloKind::Latency { threshold_ms: 5.0 },
            objective: 0.999,
            warning: super::slo::BurnRateWindow::warning_default(),
            critical: super::slo::BurnRateWindow::critical_default(),
        },
    ]
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8181
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            leeway_seconds: default_leeway(),
            hs256_secret: None,
            rsa_public_key_path: None,
            claims: ClaimNames::default(),
        }
    }
}

impl Default for ClaimNames {
    fn default() -> Self {
        Self {
            tenant: default_tenant_claim(),
            workspaces: default_workspaces_claim(),
            roles: default_roles_claim(),
            session: default_session_claim(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            flush_interval: default_flush_interval(),
            max_attempts: default_max_attempts(),
            base_backoff: default_base_backoff(),
            sink_timeout: default_sink_timeout(),
            sinks: default_sinks(),
        }
    }
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            stale_after: default_stale_after(),
            bucket_width: default_bucket_width(),
            objectives: default_objectives(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for EngineConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "aegis-decision".to_string());

        Self {
            api_version: super::policy_config::API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: EngineConfigSpec::default(),
        }
    }
}

impl TokenConfig {
    /// Resolve the HS256 secret, following "env:VAR_NAME" indirection
    pub fn resolve_secret(&self) -> anyhow::Result<Option<String>> {
        match &self.hs256_secret {
            None => Ok(None),
            Some(value) => match value.strip_prefix("env:") {
                Some(var) => std::env::var(var)
                    .map(Some)
                    .map_err(|_| anyhow::anyhow!("Environment variable '{}' for hs256_secret is not set", var)),
                None => Ok(Some(value.clone())),
            },
        }
    }
}

impl EngineConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_DECISION_CONFIG_PATH environment variable
    /// 2. ./aegis-decision.yaml (working directory)
    /// 3. ~/.aegis/decision.yaml (user home)
    /// 4. /etc/aegis/decision.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-decision.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("decision.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/aegis/decision.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home -> System)
        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_DECISION_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: AEGIS_DECISION_PORT={}", port);
                    self.spec.network.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for AEGIS_DECISION_PORT: '{}'. Ignoring.", val);
                }
            }
        }

        if let Ok(val) = std::env::var("AEGIS_DECISION_LOG_LEVEL") {
            tracing::info!("Environment override: AEGIS_DECISION_LOG_LEVEL={}", val);
            self.spec.observability.logging.level = val;
        }

        if let Ok(val) = std::env::var("AEGIS_DECISION_POLICY_PATH") {
            tracing::info!("Environment override: AEGIS_DECISION_POLICY_PATH={}", val);
            self.spec.policy_path = Some(val);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != super::policy_config::API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                super::policy_config::API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let token = &self.spec.token;
        if token.hs256_secret.is_some() && token.rsa_public_key_path.is_some() {
            anyhow::bail!("token: configure either hs256_secret or rsa_public_key_path, not both");
        }

        let audit = &self.spec.audit;
        if audit.batch_size == 0 {
            anyhow::bail!("audit.batch_size must be at least 1");
        }
        if audit.queue_capacity < audit.batch_size {
            anyhow::bail!(
                "audit.queue_capacity ({}) must be >= audit.batch_size ({})",
                audit.queue_capacity,
                audit.batch_size
            );
        }
        if audit.max_attempts == 0 || audit.max_attempts > MAX_AUDIT_ATTEMPTS {
            anyhow::bail!(
                "audit.max_attempts must be between 1 and {}, got {}",
                MAX_AUDIT_ATTEMPTS,
                audit.max_attempts
            );
        }
        if audit.base_backoff > MAX_AUDIT_BACKOFF {
            anyhow::bail!(
                "audit.base_backoff must not exceed {:?}, got {:?}",
                MAX_AUDIT_BACKOFF,
                audit.base_backoff
            );
        }
        if audit.sinks.is_empty() {
            anyhow::bail!("audit.sinks must configure at least one sink");
        }
        for sink in &audit.sinks {
            if let AuditSinkConfig::Http { endpoint, .. } = sink {
                if endpoint.is_empty() {
                    anyhow::bail!("audit http sink endpoint cannot be empty");
                }
            }
        }

        let slo = &self.spec.slo;
        if slo.tick_interval.is_zero() || slo.bucket_width.is_zero() {
            anyhow::bail!("slo.tick_interval and slo.bucket_width must be positive");
        }
        let mut names = HashSet::new();
        for objective in &slo.objectives {
            objective.validate().map_err(|e| anyhow::anyhow!(e))?;
            if !names.insert(objective.name.as_str()) {
                anyhow::bail!("Duplicate SLO name: '{}'", objective.name);
            }
        }

        if !matches!(self.spec.observability.logging.format.as_str(), "json" | "text") {
            anyhow::bail!(
                "observability.logging.format must be 'json' or 'text', got '{}'",
                self.spec.observability.logging.format
            );
        }

        Ok(())
    }
}
