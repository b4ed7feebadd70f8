use crate::defaults;
use crate::error::{ReadaloudError, Result};
use crate::pipeline::{
    AssemblyConfig, DispatchConfig, PartialFailurePolicy, PipelineConfig, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub chunker: ChunkerSettings,
    pub backend: BackendSettings,
    pub dispatch: DispatchSettings,
    pub assembly: AssemblySettings,
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkerSettings {
    pub max_chunk_chars: usize,
}

/// Synthesis backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub url: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Concurrency and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchSettings {
    pub concurrency_limit: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

/// Output assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AssemblySettings {
    pub partial_failure: PartialFailurePolicy,
    pub failed_segment_silence_ms: u32,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: defaults::MAX_CHUNK_CHARS,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: defaults::API_URL.to_string(),
            timeout_secs: defaults::TIMEOUT_SECS,
            voice: None,
            model: None,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: defaults::CONCURRENCY_LIMIT,
            max_attempts: defaults::MAX_ATTEMPTS,
            backoff_ms: defaults::BACKOFF_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    ///
    /// # Errors
    /// [`ReadaloudError::ConfigFileNotFound`] if the file does not exist,
    /// [`ReadaloudError::Config`] if it is not valid TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReadaloudError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ReadaloudError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ReadaloudError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - READALOUD_API_URL → backend.url
    /// - READALOUD_CONCURRENCY → dispatch.concurrency_limit
    /// - READALOUD_VOICE → backend.voice
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("READALOUD_API_URL")
            && !url.is_empty()
        {
            self.backend.url = url;
        }

        if let Ok(value) = std::env::var("READALOUD_CONCURRENCY")
            && !value.is_empty()
        {
            match value.parse::<usize>() {
                Ok(limit) => self.dispatch.concurrency_limit = limit,
                Err(_) => tracing::warn!("ignoring READALOUD_CONCURRENCY={value:?}: not a number"),
            }
        }

        if let Ok(voice) = std::env::var("READALOUD_VOICE")
            && !voice.is_empty()
        {
            self.backend.voice = Some(voice);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/readaloud/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ReadaloudError::Other("Could not determine config directory".into()))?;
        Ok(dir.join("readaloud").join("config.toml"))
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        self.pipeline_config().validate()?;

        let url = self.backend.url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ReadaloudError::invalid_config(
                "backend.url",
                format!("expected an http:// or https:// URL, got {url:?}"),
            ));
        }
        Ok(())
    }

    /// Serialize to TOML, e.g. for `config init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ReadaloudError::ConfigParse {
            message: e.to_string(),
        })
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            concurrency_limit: self.dispatch.concurrency_limit,
            retry: RetryPolicy {
                max_attempts: self.dispatch.max_attempts,
                backoff_delay: Duration::from_millis(self.dispatch.backoff_ms),
            },
            per_call_timeout: Duration::from_secs(self.backend.timeout_secs),
        }
    }

    pub fn assembly_config(&self) -> AssemblyConfig {
        AssemblyConfig {
            policy: self.assembly.partial_failure,
            failed_segment_silence_ms: self.assembly.failed_segment_silence_ms,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_chunk_chars: self.chunker.max_chunk_chars,
            dispatch: self.dispatch_config(),
            assembly: self.assembly_config(),
            ..PipelineConfig::default()
        }
    }

    #[cfg(feature = "http")]
    pub fn http_config(&self) -> crate::synth::HttpConfig {
        crate::synth::HttpConfig {
            base_url: self.backend.url.clone(),
            timeout: Duration::from_secs(self.backend.timeout_secs),
            voice: self.backend.voice.clone(),
            model: self.backend.model.clone(),
        }
    }
}
