//! Typed error hierarchy for the devroom server.
//!
//! Four top-level enums cover the four subsystems:
//! - `TokenError` — bearer credential verification failures
//! - `GatewayError` — websocket handshake rejections
//! - `DispatchError` — AI mention handling failures
//! - `SandboxError` — workspace materialization and run failures

use thiserror::Error;

/// Errors from bearer token verification.
///
/// Every variant is fatal to the request or connection that presented the
/// token; there is no partially-verified identity.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is malformed")]
    Malformed,

    #[error("Token signature does not verify")]
    BadSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is no longer valid")]
    Blacklisted,

    #[error("Server misconfiguration: token secret missing")]
    SecretMissing,
}

/// Errors from the websocket handshake gate.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid project ID '{id}'")]
    InvalidProjectId { id: String },

    #[error("Unauthorized: socket token not found")]
    NoSocketToken,

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl GatewayError {
    /// Machine-readable rejection code delivered to the client.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidProjectId { .. } => "INVALID_PROJECT_ID",
            GatewayError::NoSocketToken => "NO_SOCKET_TOKEN",
            GatewayError::Token(_) => "UNAUTHORIZED",
        }
    }
}

/// Errors from the AI mention dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Mention prompt is empty after stripping the trigger")]
    EmptyPrompt,

    #[error("Generation backend error: {0}")]
    Backend(String),
}

/// Errors from the sandbox subsystem.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Container boot failed: {0}")]
    Boot(String),

    #[error("A run is already in progress for this session")]
    RunInProgress,

    #[error("An install is already in progress for this session")]
    InstallInProgress,

    #[error("Failed to materialize workspace: {0}")]
    Materialize(String),

    #[error("Failed to spawn '{command}': {message}")]
    SpawnFailed { command: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_codes_match_rejections() {
        let err = GatewayError::InvalidProjectId {
            id: "not-a-uuid".to_string(),
        };
        assert_eq!(err.code(), "INVALID_PROJECT_ID");
        assert!(err.to_string().contains("not-a-uuid"));

        assert_eq!(GatewayError::NoSocketToken.code(), "NO_SOCKET_TOKEN");
        assert_eq!(
            GatewayError::Token(TokenError::Expired).code(),
            "UNAUTHORIZED"
        );
    }

    #[test]
    fn token_error_converts_into_gateway_error() {
        let err: GatewayError = TokenError::BadSignature.into();
        match &err {
            GatewayError::Token(TokenError::BadSignature) => {}
            _ => panic!("Expected Token(BadSignature)"),
        }
    }

    #[test]
    fn dispatch_error_empty_prompt_is_matchable() {
        let err = DispatchError::EmptyPrompt;
        assert!(matches!(err, DispatchError::EmptyPrompt));
    }

    #[test]
    fn sandbox_error_spawn_failed_carries_command() {
        let err = SandboxError::SpawnFailed {
            command: "npm run start".to_string(),
            message: "no such file".to_string(),
        };
        assert!(err.to_string().contains("npm run start"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&TokenError::Expired);
        assert_std_error(&GatewayError::NoSocketToken);
        assert_std_error(&DispatchError::EmptyPrompt);
        assert_std_error(&SandboxError::RunInProgress);
    }
}
