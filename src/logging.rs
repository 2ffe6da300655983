//! # Structured Logging Module
//!
//! Environment-aware structured logging for the message processing core. Embedding
//! applications that install their own subscriber keep it; initialization here never panics.

use crate::models::MessageUnitEntity;
use crate::state_machine::{ProcessingState, TransitionOutcome};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with the human readable console format
pub fn init_structured_logging() {
    init_structured_logging_with(false);
}

/// Initialize structured logging, optionally writing JSON lines instead of plain text.
///
/// `RUST_LOG` takes precedence over the level derived from `EBMS_ENV`.
pub fn init_structured_logging_with(json: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level))
        };

        let console = (!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter())
        });
        let json_layer = json.then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
        });

        let subscriber = tracing_subscriber::registry().with(console).with(json_layer);

        // Use try_init to avoid panic if global subscriber already set
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("EBMS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log the outcome of a processing state change
pub fn log_state_transition(
    entity: &MessageUnitEntity,
    expected: Option<ProcessingState>,
    new_state: ProcessingState,
    outcome: &TransitionOutcome,
) {
    match outcome {
        TransitionOutcome::Applied(record) => tracing::info!(
            internal_id = %entity.internal_id(),
            message_id = %entity.message_id(),
            unit_type = %entity.unit_type(),
            direction = %entity.direction(),
            state = %new_state,
            sequence = record.sequence,
            description = record.description.as_deref(),
            "🔄 STATE_TRANSITION"
        ),
        TransitionOutcome::AlreadyChanged { current } => tracing::debug!(
            internal_id = %entity.internal_id(),
            message_id = %entity.message_id(),
            expected = ?expected,
            current = %current,
            requested = %new_state,
            "🔄 STATE_TRANSITION rejected, state already changed"
        ),
    }
}

/// Log a decision taken by a pipeline stage for a message unit
pub fn log_stage_decision(stage: &str, message_id: &str, decision: &str, details: Option<&str>) {
    tracing::info!(
        stage = %stage,
        message_id = %message_id,
        decision = %decision,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🧩 STAGE_DECISION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
