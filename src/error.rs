//! Error types for the webmail service core
//!
//! The four public kinds map straight onto boundary semantics:
//! `Validation` is a caller input problem, `NotFound` a lookup miss,
//! `Conflict` a disallowed state transition, and `Remote` a failure
//! talking to an external mail server. `Config` and `Io` only occur
//! while wiring the process up.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("remote mail error: {0}")]
    Remote(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
