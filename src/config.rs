use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as AnyhowCtx, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ai_enabled:        bool,
    pub ai_endpoint:       String,
    pub ai_model:          String,
    pub ai_system_prompt:  String,
    pub reply_latency_ms:  u64,
    pub particle_count:    usize,
    pub scrollback_lines:  usize,
    pub stats_interval_ms: u64,
    pub font_size:         f32,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            ai_enabled:        true,
            ai_endpoint:       "http://localhost:11434/api/chat".into(),
            ai_model:          "llama3".into(),
            ai_system_prompt:  "You are KAISEL, an eerie but helpful AI terminal.".into(),
            reply_latency_ms:  600,
            particle_count:    100,
            scrollback_lines:  5000,
            stats_interval_ms: 1200,
            font_size:         14.0,
        }
    }
}
impl Config {
    /// Reads the config file, falling back to defaults. A missing file is
    /// seeded with the defaults so users have something to edit.
    pub fn load() -> Self {
        let path = Self::path();
        if !path.exists() {
            let c = Self::default();
            if let Err(e) = c.save() { log::warn!("could not write default config: {e:#}"); }
            return c;
        }
        match Self::read_from(&path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("ignoring unreadable config {}: {e:#}", path.display());
                Self::default()
            }
        }
    }
    pub fn read_from(path: &PathBuf) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&data)
    }
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str::<Config>(data).context("parsing config json")
    }
    pub fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
    }
    fn path() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("kaisel").join("config.json")
    }

    pub fn reply_latency(&self) -> Duration { Duration::from_millis(self.reply_latency_ms) }
    pub fn stats_interval(&self) -> Duration { Duration::from_millis(self.stats_interval_ms.max(100)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let c = Config::from_json(r#"{ "ai_enabled": false, "particle_count": 12 }"#).unwrap();
        assert!(!c.ai_enabled);
        assert_eq!(c.particle_count, 12);
        assert_eq!(c.ai_model, "llama3");
        assert_eq!(c.reply_latency(), Duration::from_millis(600));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Config::from_json("{ not json").is_err());
    }

    #[test]
    fn stats_interval_has_a_floor() {
        let c = Config { stats_interval_ms: 0, ..Config::default() };
        assert_eq!(c.stats_interval(), Duration::from_millis(100));
    }
}
