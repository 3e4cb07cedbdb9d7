//! Environment-driven configuration.
//!
//! Every option has a default so the relay starts with nothing but an API key
//! for the active provider. See [`AppConfig::from_lookup`] for the variable names.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::LlmError;
use crate::telemetry::{OutputFormat, SubscriberConfig};
use crate::types::ProviderType;

/// OpenAI chat-completions settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Gemini `streamGenerateContent` settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash-latest".to_string(),
            temperature: 0.7,
            max_output_tokens: 1000,
        }
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub const fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Ollama `/api/chat` settings.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Sent as `options.num_predict` when set
    pub max_tokens: Option<u32>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ollama:11434".to_string(),
            model: "phi3".to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl OllamaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity after which a session is swept
    pub timeout: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(86_400_000),
            sweep_interval: Duration::from_millis(3_600_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(3_600_000),
            max_requests: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub active_provider: ProviderType,
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
    pub telemetry: SubscriberConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_provider: ProviderType::Gemini,
            openai: OpenAiConfig::default(),
            gemini: GeminiConfig::default(),
            ollama: OllamaConfig::default(),
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            server: ServerConfig::default(),
            telemetry: SubscriberConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// Recognized variables:
    /// - `AI_PROVIDER`: `openai`, `gemini` or `ollama` (alias `local`)
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`, `OPENAI_TEMPERATURE`, `OPENAI_MAX_TOKENS`
    /// - `GEMINI_API_KEY`, `GEMINI_BASE_URL`, `GEMINI_MODEL`, `GEMINI_TEMPERATURE`, `GEMINI_MAX_TOKENS`
    /// - `OLLAMA_BASE_URL`, `OLLAMA_MODEL`, `OLLAMA_TEMPERATURE`, `OLLAMA_MAX_TOKENS`
    /// - `CHAT_SESSION_TIMEOUT`, `CHAT_SESSION_SWEEP_INTERVAL` (milliseconds)
    /// - `CHAT_RATE_LIMIT_WINDOW` (milliseconds), `CHAT_RATE_LIMIT_MAX_REQUESTS`
    /// - `HOST`, `PORT`
    /// - `LOG_LEVEL`, `LOG_FORMAT`, `LOG_FILE`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let active_provider = match env.string("AI_PROVIDER") {
            Some(name) => name.parse()?,
            None => defaults.active_provider,
        };

        let openai = OpenAiConfig {
            api_key: env.secret("OPENAI_API_KEY"),
            base_url: env.string_or("OPENAI_BASE_URL", defaults.openai.base_url),
            model: env.string_or("OPENAI_MODEL", defaults.openai.model),
            temperature: env.parse_or("OPENAI_TEMPERATURE", defaults.openai.temperature)?,
            max_tokens: env.parse_or("OPENAI_MAX_TOKENS", defaults.openai.max_tokens)?,
        };

        let gemini = GeminiConfig {
            api_key: env.secret("GEMINI_API_KEY"),
            base_url: env.string_or("GEMINI_BASE_URL", defaults.gemini.base_url),
            model: env.string_or("GEMINI_MODEL", defaults.gemini.model),
            temperature: env.parse_or("GEMINI_TEMPERATURE", defaults.gemini.temperature)?,
            max_output_tokens: env
                .parse_or("GEMINI_MAX_TOKENS", defaults.gemini.max_output_tokens)?,
        };

        let ollama = OllamaConfig {
            base_url: env.string_or("OLLAMA_BASE_URL", defaults.ollama.base_url),
            model: env.string_or("OLLAMA_MODEL", defaults.ollama.model),
            temperature: env.parse_or("OLLAMA_TEMPERATURE", defaults.ollama.temperature)?,
            max_tokens: env.parse_opt("OLLAMA_MAX_TOKENS")?,
        };

        let session = SessionConfig {
            timeout: env.positive_millis_or("CHAT_SESSION_TIMEOUT", defaults.session.timeout)?,
            sweep_interval: env
                .positive_millis_or("CHAT_SESSION_SWEEP_INTERVAL", defaults.session.sweep_interval)?,
        };

        let rate_limit = RateLimitConfig {
            window: env.positive_millis_or("CHAT_RATE_LIMIT_WINDOW", defaults.rate_limit.window)?,
            max_requests: env
                .parse_or("CHAT_RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit.max_requests)?,
        };

        let server = ServerConfig {
            host: env.string_or("HOST", defaults.server.host),
            port: env.parse_or("PORT", defaults.server.port)?,
        };

        let mut telemetry = SubscriberConfig::builder();
        if let Some(level) = env.string("LOG_LEVEL") {
            telemetry = telemetry.log_level_str(&level)?;
        }
        if let Some(format) = env.string("LOG_FORMAT") {
            telemetry = telemetry.output_format(format.parse::<OutputFormat>()?);
        }
        if let Some(path) = env.string("LOG_FILE") {
            telemetry = telemetry.log_file(PathBuf::from(path));
        }

        Ok(Self {
            active_provider,
            openai,
            gemini,
            ollama,
            session,
            rate_limit,
            server,
            telemetry: telemetry.build(),
        })
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank values are treated the same.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: String) -> String {
        self.string(key).unwrap_or(default)
    }

    fn secret(&self, key: &str) -> Option<SecretString> {
        self.string(key).map(SecretString::from)
    }

    fn parse_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>, LlmError> {
        match self.string(key) {
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                LlmError::ConfigurationError(format!("{key} has an invalid value: {raw:?}"))
            }),
            None => Ok(None),
        }
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, LlmError> {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn millis_or(&self, key: &str, default: Duration) -> Result<Duration, LlmError> {
        Ok(self
            .parse_opt::<u64>(key)?
            .map(Duration::from_millis)
            .unwrap_or(default))
    }

    /// Like [`Self::millis_or`] but rejects zero.
    fn positive_millis_or(&self, key: &str, default: Duration) -> Result<Duration, LlmError> {
        let value = self.millis_or(key, default)?;
        if value.is_zero() {
            return Err(LlmError::ConfigurationError(format!(
                "{key} has an invalid value: must be greater than 0"
            )));
        }
        Ok(value)
    }
}
