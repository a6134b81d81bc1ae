//! Shared error types for the workshop renderer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid log level: {level}")]
    InvalidLogLevel { level: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
