//! Model config to model handle resolution.

use std::sync::Arc;

use tracing::debug;

use super::openai::{OpenAiClient, OpenAiConfig};
use super::{GenerationConfig, Model};
use crate::domain::{BuildError, ModelConfig};

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A callable model plus the generation settings agents should use with it.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model: Arc<dyn Model>,
    pub generation: GenerationConfig,
}

pub trait ModelResolver: Send + Sync {
    fn resolve(&self, config: &ModelConfig, stream: bool) -> Result<ResolvedModel, BuildError>;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves `openai` configs into [`OpenAiClient`]s.
///
/// Environment access goes through an injectable lookup so tests never touch
/// the process environment.
#[derive(Clone)]
pub struct DefaultModelResolver {
    env: EnvLookup,
    http: reqwest::Client,
}

impl DefaultModelResolver {
    pub fn new() -> Self {
        Self::with_env(|name| std::env::var(name).ok())
    }

    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            env: Arc::new(lookup),
            http: reqwest::Client::new(),
        }
    }

    fn env_var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.trim().is_empty())
    }

    /// `sk-` prefixed values are literal keys, anything else names an env var.
    fn resolve_api_key(&self, config: &ModelConfig) -> Result<String, BuildError> {
        let reference = config
            .api_key_env
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_API_KEY_ENV);

        if reference.starts_with("sk-") {
            return Ok(reference.to_string());
        }

        self.env_var(reference)
            .ok_or_else(|| BuildError::MissingCredential(reference.to_string()))
    }

    fn resolve_base_url(&self, config: &ModelConfig) -> String {
        config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| self.env_var(BASE_URL_ENV))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}

impl Default for DefaultModelResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelResolver for DefaultModelResolver {
    fn resolve(&self, config: &ModelConfig, stream: bool) -> Result<ResolvedModel, BuildError> {
        match config.provider.as_str() {
            "openai" => {
                let api_key = self.resolve_api_key(config)?;
                let base_url = self.resolve_base_url(config);
                debug!(model = %config.model, base_url = %base_url, "resolved openai model");

                let client = OpenAiClient::with_http(
                    OpenAiConfig {
                        api_key,
                        base_url,
                        model: config.model.clone(),
                    },
                    self.http.clone(),
                );
                Ok(ResolvedModel {
                    model: Arc::new(client),
                    generation: GenerationConfig {
                        stream,
                        ..GenerationConfig::default()
                    },
                })
            }
            other => Err(BuildError::UnsupportedProvider(other.to_string())),
        }
    }
}
