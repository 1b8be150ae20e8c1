use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Document;
use crate::topology::Endpoint;

/// Wire-level option flags forwarded with a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandOptions {
    pub flags: u32,
}

impl CommandOptions {
    /// The caller accepts answers from a secondary member.
    pub const SECONDARY_OK: u32 = 1 << 2;
    /// The caller accepts partial results when some shards are down.
    pub const PARTIAL: u32 = 1 << 7;

    pub const fn none() -> Self {
        Self { flags: 0 }
    }

    pub const fn with_flags(flags: u32) -> Self {
        Self { flags }
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    pub fn is_empty(&self) -> bool {
        self.flags == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Unreachable,
    Timeout,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Unreachable => write!(f, "unreachable"),
            TransportErrorKind::Timeout => write!(f, "timed out"),
        }
    }
}

/// A call that produced no response document.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Unreachable,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Runs one command against one storage node.
///
/// A well-formed failure is a response document with a falsy `ok`, never a
/// `TransportError`.
#[async_trait]
pub trait ShardExecutor: Send + Sync {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        db: &str,
        command: &Document,
        options: CommandOptions,
    ) -> TransportResult<Document>;
}
