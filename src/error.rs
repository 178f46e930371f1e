//! Error reporting and connection retry policy
//!
//! Typed errors live next to the code that raises them (`FrameError`,
//! `PushError`, `TransportError`, `FormError`); this module classifies them
//! for user-facing reports and holds the reconnection policy of the push
//! channel.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::millis;
use crate::push::{FrameError, PushError};
use crate::transport::TransportError;
use crate::ui::FormError;

/// Reconnection policy for the push channel.
///
/// The default is a single attempt: connect once, no retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Maximum number of connection attempts (at least one is always made)
    pub max_attempts: u32,

    /// Initial delay between attempts
    #[serde(with = "millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Maximum delay between attempts
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Exponential backoff capped at `max_attempts`
    pub fn backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Run `operation` until it succeeds or the policy's attempts are exhausted.
pub async fn with_retry<F, Fut, T>(policy: &ReconnectPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempts >= max_attempts {
                    if max_attempts == 1 {
                        return Err(e);
                    }
                    return Err(e.context(format!("gave up after {} attempts", attempts)));
                }

                let delay = policy.delay_after(attempts);
                tracing::warn!(
                    "attempt {}/{} failed: {:#}. Retrying in {:?}",
                    attempts,
                    max_attempts,
                    e,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

/// Categorized error types for user-facing reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Backend unreachable or connection dropped
    Network,

    /// Backend answered with an error status
    Backend,

    /// Push channel protocol violation
    Protocol,

    /// Bad configuration value
    Configuration,

    /// Rejected user input
    Validation,

    /// Operation timed out
    Timeout,

    /// Unknown errors
    Unknown,
}

impl ErrorCategory {
    /// Whether trying the same thing again may help
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Timeout)
    }
}

/// Categorize an error, preferring the typed errors of this crate.
pub fn categorize_error(error: &anyhow::Error) -> ErrorCategory {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<TransportError>() {
            return match e {
                TransportError::Status { .. } => ErrorCategory::Backend,
                TransportError::Request(inner) if inner.is_timeout() => ErrorCategory::Timeout,
                TransportError::Request(_) => ErrorCategory::Network,
                TransportError::InvalidBody(_) => ErrorCategory::Backend,
                TransportError::MissingId => ErrorCategory::Validation,
            };
        }
        if let Some(e) = cause.downcast_ref::<PushError>() {
            return match e {
                PushError::Timeout(_) => ErrorCategory::Timeout,
                PushError::WebSocket(_) | PushError::Closed | PushError::NotConnected => {
                    ErrorCategory::Network
                }
                PushError::Rejected(_) | PushError::Frame(_) | PushError::UnexpectedFrame(_) => {
                    ErrorCategory::Protocol
                }
                PushError::InvalidUrl(_) => ErrorCategory::Configuration,
            };
        }
        if cause.downcast_ref::<FrameError>().is_some() {
            return ErrorCategory::Protocol;
        }
        if cause.downcast_ref::<FormError>().is_some() {
            return ErrorCategory::Validation;
        }
    }

    let error_str = format!("{:#}", error).to_lowercase();

    if error_str.contains("timeout") || error_str.contains("timed out") {
        ErrorCategory::Timeout
    } else if error_str.contains("network")
        || error_str.contains("connection")
        || error_str.contains("dns")
    {
        ErrorCategory::Network
    } else if error_str.contains("config") || error_str.contains("invalid") {
        ErrorCategory::Configuration
    } else {
        ErrorCategory::Unknown
    }
}

/// Error with context and suggestions, printed by the CLI
#[derive(Debug)]
pub struct EnhancedError {
    pub error: anyhow::Error,
    pub category: ErrorCategory,
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
}

impl EnhancedError {
    pub fn new(error: anyhow::Error) -> Self {
        let category = categorize_error(&error);
        let (context, suggestions) = generate_context_and_suggestions(&category, &error);

        Self {
            error,
            category,
            context,
            suggestions,
        }
    }

    /// Display the error with all context
    pub fn display(&self) -> String {
        let mut output = format!("Error: {:#}\n", self.error);

        if !self.context.is_empty() {
            output.push_str("\nContext:\n");
            for ctx in &self.context {
                output.push_str(&format!("   • {}\n", ctx));
            }
        }

        if !self.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in &self.suggestions {
                output.push_str(&format!("   • {}\n", suggestion));
            }
        }

        output
    }
}

fn generate_context_and_suggestions(
    category: &ErrorCategory,
    error: &anyhow::Error,
) -> (Vec<String>, Vec<String>) {
    let mut context = Vec::new();
    let mut suggestions = Vec::new();

    match category {
        ErrorCategory::Network => {
            context.push("Could not reach the users backend".to_string());
            suggestions.push("Check that the backend is running".to_string());
            suggestions.push("Verify --base-url / USER_DESK_BASE_URL".to_string());
        }
        ErrorCategory::Backend => {
            context.push("The backend rejected the request".to_string());
            suggestions.push("Check that the user id exists".to_string());
        }
        ErrorCategory::Protocol => {
            context.push("The push channel sent an unexpected frame".to_string());
            suggestions.push("Verify the WebSocket endpoint speaks STOMP 1.2".to_string());
        }
        ErrorCategory::Configuration => {
            context.push("Configuration error detected".to_string());
            suggestions.push("Review your configuration file".to_string());
            suggestions.push("Check USER_DESK_* environment variables".to_string());
        }
        ErrorCategory::Validation => {
            context.push("Validation error".to_string());
            suggestions.push("Name and phone are required".to_string());
        }
        ErrorCategory::Timeout => {
            context.push("Operation timed out".to_string());
            suggestions.push("Try increasing the timeouts in the config file".to_string());
        }
        ErrorCategory::Unknown => {
            context.push(format!("Unexpected error: {}", error));
            suggestions.push("Run with RUST_LOG=user_desk=debug for details".to_string());
        }
    }

    (context, suggestions)
}

/// Result type with enhanced error
pub type EnhancedResult<T> = Result<T, EnhancedError>;

/// Convert regular Result to EnhancedResult
pub trait ToEnhanced<T> {
    fn enhance(self) -> EnhancedResult<T>;
}

impl<T, E: Into<anyhow::Error>> ToEnhanced<T> for Result<T, E> {
    fn enhance(self) -> EnhancedResult<T> {
        self.map_err(|e| EnhancedError::new(e.into()))
    }
}
