// src/error.rs
//! Unified error handling for the trial engine
//!
//! Every component reports failures through [`ExoError`], which carries an
//! [`ErrorContext`] naming the component and operation that failed. Leaf
//! errors (device, bus, loader, recorder) convert into it with `From`.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use serde::{Deserialize, Serialize};

/// Unified error type for the entire experiment engine
#[derive(Debug, Clone)]
pub enum ExoError {
    /// Exoskeleton hardware errors
    Device {
        device_kind: DeviceKind,
        error: Arc<dyn Error + Send + Sync>,
        context: ErrorContext,
    },

    /// Configuration and script generation errors
    Configuration {
        component: String,
        reason: String,
        context: ErrorContext,
    },

    /// Telemetry bus errors
    Bus {
        channel: BusChannel,
        reason: String,
        context: ErrorContext,
    },

    /// Timing and scheduling errors
    Timing {
        reason: String,
        context: ErrorContext,
    },

    /// Internal state that cannot be represented (e.g. an unknown phase id)
    InvalidState {
        value: i64,
        reason: String,
        context: ErrorContext,
    },

    /// A background worker stopped or could not be started
    Worker {
        worker: String,
        reason: String,
        context: ErrorContext,
    },

    /// Recording to disk failed
    Persistence {
        path: Option<String>,
        reason: String,
        context: ErrorContext,
    },

    /// System-level errors
    System {
        subsystem: String,
        reason: String,
        context: ErrorContext,
    },
}

/// Device kinds for error categorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceKind {
    Simulated,
    Exoskeleton,
    Unknown(String),
}

/// Bus channels for error tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusChannel {
    Telemetry,
    Events,
    Predictions,
}

/// Error context for debugging and analysis
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub thread_id: Option<String>,
    pub component: String,
    pub operation: String,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
    pub additional_info: HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            timestamp: SystemTime::now(),
            thread_id: Self::current_thread_id(),
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
            additional_info: HashMap::new(),
        }
    }

    /// Create error context with file and line information
    pub fn with_location(
        component: &str,
        operation: &str,
        file: &'static str,
        line: u32,
    ) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file);
        context.line = Some(line);
        context
    }

    /// Add additional information to the context
    pub fn add_info<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }

    fn current_thread_id() -> Option<String> {
        std::thread::current().name().map(|s| s.to_string())
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

impl ExoError {
    /// Wrap a device driver error
    pub fn device<E>(device_kind: DeviceKind, error: E, context: ErrorContext) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        ExoError::Device {
            device_kind,
            error: Arc::new(error),
            context,
        }
    }

    /// Context attached to this error
    pub fn context(&self) -> &ErrorContext {
        match self {
            ExoError::Device { context, .. }
            | ExoError::Configuration { context, .. }
            | ExoError::Bus { context, .. }
            | ExoError::Timing { context, .. }
            | ExoError::InvalidState { context, .. }
            | ExoError::Worker { context, .. }
            | ExoError::Persistence { context, .. }
            | ExoError::System { context, .. } => context,
        }
    }

    /// Whether the error should stop the session rather than be counted as a miss
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExoError::Configuration { .. } | ExoError::InvalidState { .. } | ExoError::System { .. }
        )
    }
}

impl fmt::Display for ExoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExoError::Device { device_kind, error, context } => {
                write!(f, "[{}] Device error in {}: {} (at {}:{})",
                       device_kind, context.component, error,
                       context.file.unwrap_or("unknown"), context.line.unwrap_or(0))
            }
            ExoError::Configuration { component, reason, context } => {
                write!(f, "[CONFIG] Configuration error in {}: {} ({})",
                       component, reason, context.operation)
            }
            ExoError::Bus { channel, reason, context } => {
                write!(f, "[BUS] {:?} channel error: {} ({})", channel, reason, context.operation)
            }
            ExoError::Timing { reason, context } => {
                write!(f, "[TIMING] Timing error: {} ({})", reason, context.operation)
            }
            ExoError::InvalidState { value, reason, context } => {
                write!(f, "[STATE] Invalid state {}: {} ({})", value, reason, context.operation)
            }
            ExoError::Worker { worker, reason, context } => {
                write!(f, "[WORKER] {} stopped: {} ({})", worker, reason, context.operation)
            }
            ExoError::Persistence { path, reason, context } => match path {
                Some(path) => write!(f, "[RECORD] Failed to write {}: {} ({})", path, reason, context.operation),
                None => write!(f, "[RECORD] Recording error: {} ({})", reason, context.operation),
            },
            ExoError::System { subsystem, reason, context } => {
                write!(f, "[SYSTEM] {} error: {} ({})", subsystem, reason, context.operation)
            }
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Simulated => write!(f, "SIMULATED-EXO"),
            DeviceKind::Exoskeleton => write!(f, "EXO"),
            DeviceKind::Unknown(name) => write!(f, "UNKNOWN-{}", name),
        }
    }
}

impl Error for ExoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExoError::Device { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<crate::config::ConfigError> for ExoError {
    fn from(err: crate::config::ConfigError) -> Self {
        ExoErrorBuilder::new("config_loader", "load").configuration(&err.to_string())
    }
}

impl From<crate::hal::simulator::SimulatorError> for ExoError {
    fn from(err: crate::hal::simulator::SimulatorError) -> Self {
        ExoError::device(DeviceKind::Simulated, err, error_context!("simulator", "device_operation"))
    }
}

impl From<crate::hal::BusError> for ExoError {
    fn from(err: crate::hal::BusError) -> Self {
        ExoError::Bus {
            channel: err.channel(),
            reason: err.to_string(),
            context: error_context!("bus", "push"),
        }
    }
}

impl From<crate::recording::RecorderError> for ExoError {
    fn from(err: crate::recording::RecorderError) -> Self {
        ExoError::Persistence {
            path: err.path().map(|p| p.display().to_string()),
            reason: err.to_string(),
            context: error_context!("recorder", "write"),
        }
    }
}

/// Result type alias for engine operations
pub type ExoResult<T> = Result<T, ExoError>;

/// Error builder for convenient error construction
pub struct ExoErrorBuilder {
    component: String,
    operation: String,
}

impl ExoErrorBuilder {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }

    fn context(&self) -> ErrorContext {
        ErrorContext::new(&self.component, &self.operation)
    }

    pub fn configuration(self, reason: &str) -> ExoError {
        let context = self.context();
        ExoError::Configuration {
            component: self.component,
            reason: reason.to_string(),
            context,
        }
    }

    pub fn bus(self, channel: BusChannel, reason: &str) -> ExoError {
        ExoError::Bus {
            channel,
            reason: reason.to_string(),
            context: self.context(),
        }
    }

    pub fn timing(self, reason: &str) -> ExoError {
        ExoError::Timing {
            reason: reason.to_string(),
            context: self.context(),
        }
    }

    pub fn invalid_state(self, value: i64, reason: &str) -> ExoError {
        ExoError::InvalidState {
            value,
            reason: reason.to_string(),
            context: self.context(),
        }
    }

    pub fn worker(self, worker: &str, reason: &str) -> ExoError {
        ExoError::Worker {
            worker: worker.to_string(),
            reason: reason.to_string(),
            context: self.context(),
        }
    }
}

/// Convenience trait for error building
pub trait IntoExoError<T> {
    fn exo_err(self, component: &str, operation: &str) -> ExoResult<T>;
}

impl<T, E> IntoExoError<T> for Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn exo_err(self, component: &str, operation: &str) -> ExoResult<T> {
        self.map_err(|err| ExoError::System {
            subsystem: component.to_string(),
            reason: err.to_string(),
            context: ErrorContext::new(component, operation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("controller", "tick");
        assert_eq!(context.component, "controller");
        assert_eq!(context.operation, "tick");
        assert!(context.timestamp <= SystemTime::now());
    }

    #[test]
    fn test_error_context_macro_records_location() {
        let context = error_context!("generator", "generate");
        assert_eq!(context.file, Some(file!()));
        assert!(context.line.is_some());
    }

    #[test]
    fn test_error_builder() {
        let err = ExoErrorBuilder::new("generator", "generate").configuration("unknown assist mode");

        match err {
            ExoError::Configuration { component, reason, .. } => {
                assert_eq!(component, "generator");
                assert_eq!(reason, "unknown assist mode");
            }
            _ => panic!("Expected configuration error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ExoErrorBuilder::new("phase", "from_id").invalid_state(42, "no such phase");
        let display = format!("{}", err);
        assert!(display.contains("42"));
        assert!(display.contains("no such phase"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ExoErrorBuilder::new("a", "b").configuration("x").is_fatal());
        assert!(ExoErrorBuilder::new("a", "b").invalid_state(99, "x").is_fatal());
        assert!(!ExoErrorBuilder::new("a", "b").bus(BusChannel::Events, "x").is_fatal());
        assert!(!ExoErrorBuilder::new("a", "b").worker("telemetry", "x").is_fatal());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExoError>();
    }

    #[test]
    fn test_simulator_error_conversion() {
        use crate::hal::simulator::SimulatorError;

        let err: ExoError = SimulatorError::Unplugged.into();
        match err {
            ExoError::Device { device_kind, .. } => assert_eq!(device_kind, DeviceKind::Simulated),
            _ => panic!("Expected device error"),
        }
    }

    #[test]
    fn test_into_exo_error_trait() {
        let result: Result<i32, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing results dir",
        ));

        match result.exo_err("recorder", "open").unwrap_err() {
            ExoError::System { subsystem, reason, .. } => {
                assert_eq!(subsystem, "recorder");
                assert!(reason.contains("missing results dir"));
            }
            _ => panic!("Expected system error"),
        }
    }
}
