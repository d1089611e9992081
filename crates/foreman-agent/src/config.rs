// ABOUTME: Runtime configuration loaded from environment variables.
// ABOUTME: Provider selection, model override, temperature, and the answer language.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },

    #[error("unknown provider: {0} (expected \"anthropic\" or \"openai\")")]
    UnknownProvider(String),
}

/// Environment-driven settings for the orchestrator.
///
/// Provider API keys and base URLs (`ANTHROPIC_API_KEY`,
/// `OPENAI_API_KEY`, `*_BASE_URL`) are read by the provider clients
/// themselves, not here.
#[derive(Debug, Clone)]
pub struct ForemanConfig {
    /// Which chat provider backs the agents. `FOREMAN_PROVIDER`,
    /// default "anthropic".
    pub provider: String,
    /// Model override. `FOREMAN_MODEL`; each provider falls back to
    /// its own default when unset.
    pub model: Option<String>,
    /// Sampling temperature for every agent. `FOREMAN_TEMPERATURE`.
    pub temperature: Option<f32>,
    /// Language the agents answer in. `FOREMAN_LANGUAGE`, default
    /// "English".
    pub language: String,
}

impl ForemanConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = std::env::var("FOREMAN_PROVIDER")
            .unwrap_or_else(|_| "anthropic".to_string())
            .to_lowercase();
        if provider != "anthropic" && provider != "openai" {
            return Err(ConfigError::UnknownProvider(provider));
        }

        let model = std::env::var("FOREMAN_MODEL").ok().filter(|m| !m.is_empty());

        let temperature = match std::env::var("FOREMAN_TEMPERATURE") {
            Ok(raw) if !raw.is_empty() => {
                let parsed = raw.parse::<f32>().map_err(|_| ConfigError::Invalid {
                    var: "FOREMAN_TEMPERATURE",
                    value: raw.clone(),
                })?;
                if !(0.0..=2.0).contains(&parsed) {
                    return Err(ConfigError::Invalid {
                        var: "FOREMAN_TEMPERATURE",
                        value: raw,
                    });
                }
                Some(parsed)
            }
            _ => None,
        };

        let language =
            std::env::var("FOREMAN_LANGUAGE").unwrap_or_else(|_| "English".to_string());

        Ok(Self {
            provider,
            model,
            temperature,
            language,
        })
    }
}
