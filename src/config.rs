// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "CRAWL_CONSOLE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/console.toml";

const ENV_DB_PATH: &str = "CONSOLE_DB_PATH";
const ENV_BIND: &str = "CONSOLE_BIND";
const ENV_SCHEDULER_ENABLED: &str = "CONSOLE_SCHEDULER_ENABLED";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36 Edg/142.0.0.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub crawl: CrawlConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/app.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Sleep between ticks, measured from the end of one tick to the start of the next.
    pub tick_secs: u64,
    /// Item cap handed to every dispatch.
    pub max_items: usize,
    pub lock_path: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 60,
            max_items: 10,
            lock_path: PathBuf::from("data/scheduler.pid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub default_strategy: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_pages: usize,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            default_strategy: "baidu".to_string(),
            timeout_secs: 10,
            connect_timeout_secs: 4,
            max_pages: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" is the only remote provider; anything else disables the adapter.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: "ENV".to_string(),
            timeout_secs: 20,
        }
    }
}

impl AppConfig {
    /// Load from an explicit TOML file, then apply env overrides and sanitize.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg.finish())
    }

    /// Load using env var + fallbacks:
    /// 1) $CRAWL_CONSOLE_CONFIG (must exist)
    /// 2) config/console.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(Self::default().finish())
    }

    fn finish(mut self) -> Self {
        if let Ok(p) = std::env::var(ENV_DB_PATH) {
            if !p.trim().is_empty() {
                self.store.path = PathBuf::from(p.trim());
            }
        }
        if let Ok(b) = std::env::var(ENV_BIND) {
            if !b.trim().is_empty() {
                self.server.bind = b.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var(ENV_SCHEDULER_ENABLED) {
            self.scheduler.enabled = !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        self.sanitize();
        self
    }

    fn sanitize(&mut self) {
        self.scheduler.tick_secs = self.scheduler.tick_secs.max(1);
        self.scheduler.max_items = self.scheduler.max_items.max(1);
        self.crawl.timeout_secs = self.crawl.timeout_secs.max(1);
        self.crawl.connect_timeout_secs = self.crawl.connect_timeout_secs.max(1);
        self.crawl.max_pages = self.crawl.max_pages.max(1);
        self.ai.timeout_secs = self.ai.timeout_secs.max(1);
        self.crawl.default_strategy = self.crawl.default_strategy.trim().to_ascii_lowercase();
        self.ai.provider = self.ai.provider.trim().to_ascii_lowercase();
    }
}

impl AiConfig {
    /// Resolve `api_key = "ENV"` against the environment. Empty when unset.
    pub fn resolved_api_key(&self) -> String {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            self.api_key.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn partial_toml_keeps_defaults_and_sanitizes() {
        let toml = r#"
            [scheduler]
            tick_secs = 0
            max_items = 25

            [crawl]
            default_strategy = " Xinhua "
            timeout_secs = 0
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        let mut cfg = cfg;
        cfg.sanitize();
        assert_eq!(cfg.scheduler.tick_secs, 1);
        assert_eq!(cfg.scheduler.max_items, 25);
        assert_eq!(cfg.crawl.default_strategy, "xinhua");
        assert_eq!(cfg.crawl.timeout_secs, 1);
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert!(!cfg.ai.enabled);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_DB_PATH);

        // No file in the temp CWD: defaults
        let cfg = AppConfig::load_default().unwrap();
        assert_eq!(cfg.scheduler.tick_secs, 60);

        // Env path wins, and must exist
        let p = tmp.path().join("c.toml");
        fs::write(&p, "[store]\npath = \"x.db\"\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = AppConfig::load_default().unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("x.db"));

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(AppConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
