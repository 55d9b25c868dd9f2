use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ── LLM ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `ollama` or `openrouter`.
    pub provider: String,
    pub ollama_model: String,
    pub openrouter_model: String,
    /// Base URL for the Ollama API.  Overridden at runtime by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub ollama_base_url: String,
    /// Per-request timeout.  Long chapters can take a while to analyse.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            openrouter_model: "openai/gpt-4o-mini".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
        }
    }
}

// ── Editor ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of history entries kept per document.  The oldest
    /// entries are evicted first.  `0` keeps everything.
    pub history_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self { history_limit: 500 }
    }
}

// ── Indexer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub enabled: bool,
    /// Idle time after the last text change before a chapter is re-indexed.
    pub debounce_ms: u64,
    /// Chapters with fewer trimmed characters than this are not sent to the
    /// extractor at all.
    pub min_text_chars: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 5_000,
            min_text_chars: 100,
        }
    }
}

// ── Storage / telemetry ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for documents and project indexes.  Overridden by
    /// `QUILL_DATA_DIR`.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".quill".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub editor: EditorConfig,
    pub indexer: IndexerConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?;
        }

        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            if !value.is_empty() {
                config.llm.ollama_base_url = value;
            }
        }

        if let Ok(dir) = env::var("QUILL_DATA_DIR") {
            if !dir.is_empty() {
                config.storage.data_dir = dir;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn active_model(&self) -> &str {
        if self.llm.provider.eq_ignore_ascii_case("openrouter") {
            &self.llm.openrouter_model
        } else {
            &self.llm.ollama_model
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(cfg.llm.ollama_model, "llama3.1:8b");
        assert_eq!(cfg.llm.ollama_base_url, "http://localhost:11434");
        assert_eq!(cfg.editor.history_limit, 500);
        assert!(cfg.indexer.enabled);
        assert_eq!(cfg.indexer.debounce_ms, 5_000);
        assert_eq!(cfg.indexer.min_text_chars, 100);
        assert_eq!(cfg.storage.data_dir, ".quill");
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    // ── load_from ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(cfg.editor.history_limit, 500);
    }

    #[test]
    fn load_from_partial_toml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(
            &path,
            r#"
[indexer]
debounce_ms = 1500

[editor]
history_limit = 0
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.indexer.debounce_ms, 1500);
        assert_eq!(cfg.indexer.min_text_chars, 100);
        assert_eq!(cfg.editor.history_limit, 0);
        assert_eq!(cfg.llm.ollama_model, "llama3.1:8b");
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    // ── save_to + roundtrip ────────────────────────────────────────────────

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.llm.provider = "openrouter".to_string();
        cfg.indexer.enabled = false;
        cfg.editor.history_limit = 42;

        cfg.save_to(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.llm.provider, "openrouter");
        assert!(!loaded.indexer.enabled);
        assert_eq!(loaded.editor.history_limit, 42);
    }

    // ── active_model ───────────────────────────────────────────────────────

    #[test]
    fn active_model_follows_provider() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.active_model(), "llama3.1:8b");
        cfg.llm.provider = "OpenRouter".to_string();
        assert_eq!(cfg.active_model(), "openai/gpt-4o-mini");
    }

    // ── Env var overrides ──────────────────────────────────────────────────

    #[test]
    fn env_data_dir_overrides_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.toml");
        fs::write(
            &path,
            r#"
[storage]
data_dir = "from-file"
"#,
        )
        .unwrap();

        // SAFETY: no other test reads or writes QUILL_DATA_DIR.
        unsafe { env::set_var("QUILL_DATA_DIR", "from-env") };
        let cfg = AppConfig::load_from(&path).unwrap();
        unsafe { env::remove_var("QUILL_DATA_DIR") };
        assert_eq!(cfg.storage.data_dir, "from-env");
        assert_eq!(cfg.data_dir(), PathBuf::from("from-env"));
    }
}
