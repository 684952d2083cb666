//! Configuration: TOML file at `~/.switchboard/config.toml`, created
//! with defaults on first run, with environment-variable overrides
//! applied after load. Every field has a serde default so partial
//! files keep working across upgrades.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stable identity of this deployment's agent.
    pub agent_id: String,
    /// Workspace-level scope for cross-session conversation search.
    pub gateway_id: String,
    pub default_model: String,
    pub default_temperature: f64,
    /// Store backend name, resolved by the store factory.
    pub store_backend: String,
    /// Optional prefix prepended to every outbound reply.
    pub response_prefix: Option<String>,
    pub segmentation: SegmentationConfig,
    pub agent: AgentConfig,
    pub gate: GateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_id: "switchboard".to_string(),
            gateway_id: "default".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            default_temperature: 0.7,
            store_backend: "memory".to_string(),
            response_prefix: None,
            segmentation: SegmentationConfig::default(),
            agent: AgentConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

/// Segmentation engine tuning. Defaults follow the documented decision
/// order: 8h gap, classification from the 3rd message every 3rd after,
/// overlap 2 (1 with resume intent).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub gap_hours: i64,
    pub classify_start: u64,
    pub classify_interval: u64,
    pub overlap_threshold: usize,
    pub resume_overlap_threshold: usize,
    /// Max related conversation ids recorded beside the chained one.
    pub related_limit: usize,
    /// How many recently closed conversations the resume search scans.
    pub search_window: usize,
    /// Messages handed to the classifier as context.
    pub recent_window: usize,
    /// Ancestors included in chain context.
    pub max_chain_depth: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            gap_hours: 8,
            classify_start: 3,
            classify_interval: 3,
            overlap_threshold: 2,
            resume_overlap_threshold: 1,
            related_limit: 5,
            search_window: 20,
            recent_window: 10,
            max_chain_depth: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on model rounds per turn.
    pub max_rounds: usize,
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Duplicate-suppression window for redelivered inbound messages.
    pub dedup_window_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 2000,
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let base = BaseDirs::new().context("cannot determine home directory")?;
        Ok(base.home_dir().join(".switchboard"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the config file, writing a default one if it is missing.
    pub fn load_or_init() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            let config = Self::default();
            config.save_to(&path)?;
            info!(path = %path.display(), "wrote default config");
            config
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SWITCHBOARD_AGENT_ID") {
            self.agent_id = v;
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_GATEWAY_ID") {
            self.gateway_id = v;
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_MODEL") {
            self.default_model = v;
        }
        if let Ok(v) = std::env::var("SWITCHBOARD_STORE_BACKEND") {
            self.store_backend = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_roundtrip_through_toml() {
        let config = Config::default();
        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.agent_id, config.agent_id);
        assert_eq!(parsed.segmentation.gap_hours, 8);
        assert_eq!(parsed.agent.max_rounds, 5);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let parsed: Config = toml::from_str(
            r#"
            agent_id = "custom"

            [segmentation]
            gap_hours = 12
            "#,
        )
        .unwrap();
        assert_eq!(parsed.agent_id, "custom");
        assert_eq!(parsed.segmentation.gap_hours, 12);
        assert_eq!(parsed.segmentation.classify_start, 3);
        assert_eq!(parsed.default_model, "gpt-4o-mini");
    }

    #[test]
    fn save_and_load_via_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.gateway_id = "work".into();
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.gateway_id, "work");
    }
}
