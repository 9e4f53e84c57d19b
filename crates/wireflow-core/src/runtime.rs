//! Process-wide configuration, loaded once from the environment at startup
//! and threaded through the scheduler by reference (§6, §9 glossary entry
//! for `RuntimeConfig`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable runtime configuration: safe roots, per-executor timeouts, the
/// ollama allow-list, default foreach concurrency, and the HTTP bind
/// address. Every field has a documented default so the engine runs with
/// no environment at all.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// File node sandbox; also holds the vector-search extension library.
    pub files_root: PathBuf,
    /// Database node sandbox for SQL files.
    pub dbs_root: PathBuf,

    /// HTTP node default timeout when the node doesn't specify one.
    pub http_timeout: Duration,
    /// Typescript inline-script hard wall-clock ceiling.
    pub typescript_timeout: Duration,
    /// Chat-completion-compatible LLM provider timeout.
    pub llm_chat_timeout: Duration,
    /// Ollama provider timeout (local inference is slower).
    pub llm_ollama_timeout: Duration,

    /// Default bounded-parallel foreach concurrency.
    pub max_concurrency: usize,

    /// Env var name holding the OpenRouter fallback API key.
    pub openrouter_api_key_env: String,
    /// Default ollama endpoint when a node doesn't specify `ollama_host`.
    pub ollama_host: Option<String>,
    /// Hostnames and CIDR ranges permitted for ollama.
    pub allowed_ollama_hosts: String,

    /// `host:port` the HTTP surface binds to.
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            files_root: PathBuf::from("/tmp/workflow_files"),
            dbs_root: PathBuf::from("/tmp/workflow_dbs"),
            http_timeout: Duration::from_secs(30),
            typescript_timeout: Duration::from_secs(5),
            llm_chat_timeout: Duration::from_secs(60),
            llm_ollama_timeout: Duration::from_secs(120),
            max_concurrency: 5,
            openrouter_api_key_env: "OPENROUTER_API_KEY".to_string(),
            ollama_host: None,
            allowed_ollama_hosts: "localhost,127.0.0.1,192.168.0.0/16,10.0.0.0/8".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Build from the process environment, falling back to documented
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ollama_host: env::var("OLLAMA_HOST").ok().or(defaults.ollama_host),
            allowed_ollama_hosts: env::var("ALLOWED_OLLAMA_HOSTS")
                .unwrap_or(defaults.allowed_ollama_hosts),
            bind_addr: env::var("N8N_ENGINE_ADDR").unwrap_or(defaults.bind_addr),
            ..defaults
        }
    }

    /// Ensure both safe roots exist, creating them if this is the first use.
    pub fn ensure_roots(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.files_root)?;
        std::fs::create_dir_all(&self.dbs_root)?;
        Ok(())
    }

    /// Path to the vector-search extension library for this platform,
    /// under `files_root`.
    pub fn vector_extension_path(&self) -> PathBuf {
        let name = if cfg!(target_os = "macos") {
            "vec0.dylib"
        } else if cfg!(target_os = "windows") {
            "vec0.dll"
        } else {
            "vec0.so"
        };
        self.files_root.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.max_concurrency, 5);
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(
            cfg.allowed_ollama_hosts,
            "localhost,127.0.0.1,192.168.0.0/16,10.0.0.0/8"
        );
    }

    #[test]
    fn vector_extension_path_is_under_files_root() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.vector_extension_path().starts_with(&cfg.files_root));
    }
}
