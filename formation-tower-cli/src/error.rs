//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use formation_tower::config::{ConfigFileError, WatchError};
use formation_tower::service::ServiceError;
use formation_tower::transport::TransportError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start or drive the tower
    Service(ServiceError),
    /// Failed to open the field-bus transport
    Transport(TransportError),
    /// Failed to watch the configuration file
    Watch(WatchError),
    /// Terminal prompt failed
    Prompt(String),
    /// Failed to install the interrupt handler
    Signal(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Transport(TransportError::Bind { .. }) => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. Another towerctl is already running on this host");
                eprintln!("  2. listen_addr in [transport] names an address this host lacks");
            }
            CliError::Config(_) => {
                eprintln!();
                eprintln!("Run 'towerctl config init --force' to write a fresh default file.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Service(e) => write!(f, "Tower error: {}", e),
            CliError::Transport(e) => write!(f, "Transport error: {}", e),
            CliError::Watch(e) => write!(f, "Failed to watch configuration: {}", e),
            CliError::Prompt(msg) => write!(f, "Prompt failed: {}", msg),
            CliError::Signal(e) => write!(f, "Failed to wait for interrupt: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Service(e) => Some(e),
            CliError::Transport(e) => Some(e),
            CliError::Watch(e) => Some(e),
            CliError::Signal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Transport(e)
    }
}

impl From<WatchError> for CliError {
    fn from(e: WatchError) -> Self {
        CliError::Watch(e)
    }
}
