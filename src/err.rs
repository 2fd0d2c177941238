//! The typed error taxonomy (spec §4.9).
//!
//! Mirrors `tor-error`'s split between a single concrete error enum and a
//! coarse [`ErrorKind`] that callers can match on without enumerating every
//! variant.

use std::sync::Arc;

use derive_more::Display;
use strum::EnumDiscriminants;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to a tor control port.
///
/// Every variant records the command text (if any) and/or the offending
/// reply line (if any), per spec §4.9.
#[derive(Clone, Debug, thiserror::Error, EnumDiscriminants)]
#[strum_discriminants(name(ErrorKind), derive(Display, Hash))]
#[non_exhaustive]
pub enum Error {
    /// The connection was not `Ready`, left `Ready` mid-exchange, or the
    /// transport closed under a waiter.
    #[error("connection is shutting down or shut down{}", display_cmd(.command))]
    Shutdown {
        /// The command that was in flight, if any.
        command: Option<String>,
    },

    /// A reply batch carried at least one non-success status line.
    #[error("tor rejected `{}`: {line}", display_cmd_req(.command))]
    Protocol {
        /// The command that provoked the rejection.
        command: String,
        /// The first non-success reply line, verbatim.
        line: String,
    },

    /// The wire codec observed something that isn't a well-formed reply.
    #[error("malformed control-protocol reply{}: {reason}", display_cmd(.command))]
    Parse {
        /// The command awaiting a reply, if the parse failure happened mid-exchange.
        command: Option<String>,
        /// Human-readable description of what was expected.
        reason: String,
    },

    /// Cooperative cancellation: the caller's token fired, or the action
    /// queue pre-empted this caller's turn.
    #[error("operation cancelled{}", display_cmd(.command))]
    Cancelled {
        /// The command that was cancelled, if any.
        command: Option<String>,
    },

    /// A higher-priority Stop/Restart pre-empted a multi-step manager action.
    #[error("interrupted by a competing manager action")]
    Interrupted,

    /// The manager this handle referred to has already been torn down.
    #[error("tor manager has been destroyed")]
    ManagerDestroyed,

    /// An external collaborator (process launcher, network observer, ...)
    /// reported a failure that the core cannot itself recover from.
    #[error("external collaborator failed: {0}")]
    Collaborator(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

fn display_cmd(command: &Option<String>) -> String {
    match command {
        Some(c) => format!(" (command: {c})"),
        None => String::new(),
    }
}

fn display_cmd_req(command: &str) -> &str {
    command
}

impl Error {
    /// Build a [`Error::Shutdown`] tagged with the in-flight command, if any.
    pub fn shutdown(command: Option<impl Into<String>>) -> Self {
        Error::Shutdown {
            command: command.map(Into::into),
        }
    }

    /// Build a [`Error::Protocol`] from a command and its rejecting line.
    pub fn protocol(command: impl Into<String>, line: impl Into<String>) -> Self {
        Error::Protocol {
            command: command.into(),
            line: line.into(),
        }
    }

    /// Build a [`Error::Parse`] error.
    pub fn parse(command: Option<impl Into<String>>, reason: impl Into<String>) -> Self {
        Error::Parse {
            command: command.map(Into::into),
            reason: reason.into(),
        }
    }

    /// Build a [`Error::Cancelled`] error.
    pub fn cancelled(command: Option<impl Into<String>>) -> Self {
        Error::Cancelled {
            command: command.map(Into::into),
        }
    }

    /// Returns the coarse [`ErrorKind`] for this error, for callers that
    /// want to `match` without listing every variant.
    pub fn kind(&self) -> ErrorKind {
        self.into()
    }
}
