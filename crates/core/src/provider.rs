use crate::error::{KeyMomentsError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Openai,
    Grok,
    Gemini,
}

/// Request shape a provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiStyle {
    AnthropicMessages,
    ChatCompletions,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
    pub style: ApiStyle,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Anthropic => ProviderConfig {
                api_url: "https://api.anthropic.com/v1/messages",
                model: "claude-3-5-sonnet-20241022",
                env_var: "ANTHROPIC_API_KEY",
                style: ApiStyle::AnthropicMessages,
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
                env_var: "OPENAI_API_KEY",
                style: ApiStyle::ChatCompletions,
            },
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
                style: ApiStyle::ChatCompletions,
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-3-pro",
                env_var: "GEMINI_API_KEY",
                style: ApiStyle::ChatCompletions,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::Openai => "OpenAI",
            Provider::Grok => "Grok",
            Provider::Gemini => "Gemini",
        }
    }

    /// Lowercase identifier used in config files.
    pub fn key(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Openai => "openai",
            Provider::Grok => "grok",
            Provider::Gemini => "gemini",
        }
    }

    /// An explicit key wins; the environment is only consulted without one.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Result<String> {
        self.resolve_api_key_with(explicit, |name| std::env::var(name).ok())
    }

    pub fn resolve_api_key_with(
        &self,
        explicit: Option<&str>,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        if let Some(key) = explicit.map(str::trim).filter(|key| !key.is_empty()) {
            return Ok(key.to_string());
        }

        let config = self.config();
        lookup_env(config.env_var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(KeyMomentsError::AuthConfig {
                provider: self.name(),
                env_var: config.env_var,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_overrides_environment() {
        let key = Provider::Openai
            .resolve_api_key_with(Some("cli-key"), |_| Some("env-key".to_string()))
            .unwrap();
        assert_eq!(key, "cli-key");
    }

    #[test]
    fn falls_back_to_provider_env_var() {
        let key = Provider::Grok
            .resolve_api_key_with(None, |name| {
                (name == "XAI_API_KEY").then(|| "xai-key".to_string())
            })
            .unwrap();
        assert_eq!(key, "xai-key");
    }

    #[test]
    fn missing_key_is_auth_config_error() {
        let err = Provider::Anthropic
            .resolve_api_key_with(Some("  "), |_| Some(String::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            KeyMomentsError::AuthConfig {
                env_var: "ANTHROPIC_API_KEY",
                ..
            }
        ));
    }
}
