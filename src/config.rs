use std::time::Duration;

/// Runtime configuration for the devroom server.
///
/// Values come from the environment (a `.env` file is loaded by the binary
/// before this is constructed). The token secret is deliberately optional:
/// an unconfigured secret must reject connections at verification time, not
/// crash the server at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub dev_mode: bool,
    /// Shared secret for signing and verifying bearer tokens.
    pub secret_key: Option<String>,
    /// How long a minted token stays valid.
    pub token_ttl: Duration,
    /// Allowed browser origin for CORS. `None` allows any origin.
    pub client_url: Option<String>,
    pub ai: AiConfig,
}

/// Generation backend settings.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
}

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_AI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_AI_MODEL: &str = "gemini-2.5-flash";

impl Config {
    /// Build a Config from the process environment.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let token_ttl = std::env::var("TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TOKEN_TTL_SECS));

        Self {
            port,
            dev_mode: false,
            secret_key: std::env::var("SECRET_KEY").ok().filter(|s| !s.is_empty()),
            token_ttl,
            client_url: std::env::var("CLIENT_URL").ok().filter(|s| !s.is_empty()),
            ai: AiConfig {
                endpoint: std::env::var("AI_ENDPOINT")
                    .unwrap_or_else(|_| DEFAULT_AI_ENDPOINT.to_string()),
                api_key: std::env::var("GEMINI_API_KEY").ok().filter(|s| !s.is_empty()),
                model: std::env::var("AI_MODEL").unwrap_or_else(|_| DEFAULT_AI_MODEL.to_string()),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dev_mode: false,
            secret_key: None,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            client_url: None,
            ai: AiConfig {
                endpoint: DEFAULT_AI_ENDPOINT.to_string(),
                api_key: None,
                model: DEFAULT_AI_MODEL.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_secret() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(config.secret_key.is_none());
        assert_eq!(config.token_ttl, Duration::from_secs(86400));
        assert_eq!(config.ai.model, "gemini-2.5-flash");
    }
}
