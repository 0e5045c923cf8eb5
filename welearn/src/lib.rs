pub mod actions;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod html;
pub mod sync;

use moodle_core::MoodleError;
use thiserror::Error;

use crate::calendar::CalendarError;
use crate::cli::CliError;
use crate::config::ConfigError;

pub use actions::run;

const EXIT_PERMISSION: u8 = 1;
const EXIT_OTHER: u8 = 2;
const EXIT_ACCESS: u8 = 13;
const EXIT_NOT_DIRECTORY: u8 = 20;
const EXIT_NO_DATA: u8 = 61;

/// Fatal errors that end a run with a specific exit status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid credentials!")]
    Auth(#[source] MoodleError),
    #[error(transparent)]
    Usage(#[from] CliError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Auth(_) => EXIT_ACCESS,
            AppError::Usage(_) => EXIT_PERMISSION,
            AppError::Config(ConfigError::PrefixNotDirectory(_)) => EXIT_NOT_DIRECTORY,
            AppError::Calendar(err) if err.is_configuration() => EXIT_NO_DATA,
            _ => EXIT_OTHER,
        }
    }
}

/// Process exit status for an error that ended the run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(app) = cause.downcast_ref::<AppError>() {
            return app.exit_code();
        }
        if cause
            .downcast_ref::<MoodleError>()
            .is_some_and(MoodleError::is_auth_failure)
        {
            return EXIT_ACCESS;
        }
    }
    EXIT_OTHER
}
