use thiserror::Error;

/// Numeric error codes surfaced in cluster replies.
///
/// Codes match the values storage nodes use, so a code lifted from a shard
/// response and a code produced by the router are interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    BadValue,
    HostUnreachable,
    Unauthorized,
    TypeMismatch,
    IllegalOperation,
    NamespaceNotFound,
    CommandNotFound,
    StaleShardVersion,
    ShardNotFound,
    InvalidOptions,
    InvalidNamespace,
    NetworkTimeout,
    OperationFailed,
    RecvStaleConfig,
    StaleConfig,
}

impl ErrorCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::InternalError => 1,
            Self::BadValue => 2,
            Self::HostUnreachable => 6,
            Self::Unauthorized => 13,
            Self::TypeMismatch => 14,
            Self::IllegalOperation => 20,
            Self::NamespaceNotFound => 26,
            Self::CommandNotFound => 59,
            Self::StaleShardVersion => 63,
            Self::ShardNotFound => 70,
            Self::InvalidOptions => 72,
            Self::InvalidNamespace => 73,
            Self::NetworkTimeout => 89,
            Self::OperationFailed => 96,
            Self::RecvStaleConfig => 9996,
            Self::StaleConfig => 13388,
        }
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        const ALL: [ErrorCode; 16] = [
            ErrorCode::InternalError,
            ErrorCode::BadValue,
            ErrorCode::HostUnreachable,
            ErrorCode::Unauthorized,
            ErrorCode::TypeMismatch,
            ErrorCode::IllegalOperation,
            ErrorCode::NamespaceNotFound,
            ErrorCode::CommandNotFound,
            ErrorCode::StaleShardVersion,
            ErrorCode::ShardNotFound,
            ErrorCode::InvalidOptions,
            ErrorCode::InvalidNamespace,
            ErrorCode::NetworkTimeout,
            ErrorCode::OperationFailed,
            ErrorCode::RecvStaleConfig,
            ErrorCode::StaleConfig,
        ];
        ALL.into_iter().find(|known| known.as_i32() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::InternalError => "InternalError",
            Self::BadValue => "BadValue",
            Self::HostUnreachable => "HostUnreachable",
            Self::Unauthorized => "Unauthorized",
            Self::TypeMismatch => "TypeMismatch",
            Self::IllegalOperation => "IllegalOperation",
            Self::NamespaceNotFound => "NamespaceNotFound",
            Self::CommandNotFound => "CommandNotFound",
            Self::StaleShardVersion => "StaleShardVersion",
            Self::ShardNotFound => "ShardNotFound",
            Self::InvalidOptions => "InvalidOptions",
            Self::InvalidNamespace => "InvalidNamespace",
            Self::NetworkTimeout => "NetworkTimeout",
            Self::OperationFailed => "OperationFailed",
            Self::RecvStaleConfig => "RecvStaleConfig",
            Self::StaleConfig => "StaleConfig",
        }
    }

    /// Renders the `codeName` for any numeric code, known or not.
    pub fn name_for(code: i32) -> String {
        match Self::from_i32(code) {
            Some(known) => known.name().to_string(),
            None => format!("Location{}", code),
        }
    }

    /// True for the codes a shard uses to say the router's partition map is outdated.
    pub fn is_stale_topology(code: i32) -> bool {
        matches!(
            Self::from_i32(code),
            Some(Self::StaleConfig | Self::RecvStaleConfig | Self::StaleShardVersion)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Bad value: {0}")]
    BadValue(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    /// A command-specific precondition failed before dispatch.
    ///
    /// Failures reported by a shard use `Remote` instead.
    #[error("{message}")]
    Rejected { code: i32, message: String },

    #[error("Namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("Shard '{0}' not found")]
    ShardNotFound(String),

    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Transport error on shard '{shard}': {message}")]
    Transport {
        shard: String,
        message: String,
        timed_out: bool,
    },

    #[error("Command failed on shard '{shard}': {message}")]
    Remote {
        shard: String,
        code: Option<i32>,
        message: String,
    },

    /// A shard reported that the router's partition map for `ns` is outdated.
    ///
    /// `retryable` is only set on single-target passthrough dispatches.
    #[error("Stale topology reported by shard '{shard}' for {ns}: {message}")]
    StaleTopology {
        shard: String,
        ns: String,
        message: String,
        retryable: bool,
    },

    #[error("Chained command failed at part {failed_at} on shard '{shard}': {message}")]
    ChainBroken {
        shard: String,
        failed_at: i64,
        code: Option<i32>,
        message: String,
    },

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl RouterError {
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidNamespace(_) => ErrorCode::InvalidNamespace.as_i32(),
            Self::BadValue(_) => ErrorCode::BadValue.as_i32(),
            Self::TypeMismatch(_) => ErrorCode::TypeMismatch.as_i32(),
            Self::IllegalOperation(_) => ErrorCode::IllegalOperation.as_i32(),
            Self::Rejected { code, .. } => *code,
            Self::NamespaceNotFound(_) => ErrorCode::NamespaceNotFound.as_i32(),
            Self::ShardNotFound(_) => ErrorCode::ShardNotFound.as_i32(),
            Self::CommandNotFound(_) => ErrorCode::CommandNotFound.as_i32(),
            Self::Transport { timed_out, .. } => {
                if *timed_out {
                    ErrorCode::NetworkTimeout.as_i32()
                } else {
                    ErrorCode::HostUnreachable.as_i32()
                }
            }
            Self::Remote { code, .. } | Self::ChainBroken { code, .. } => {
                code.unwrap_or(ErrorCode::OperationFailed.as_i32())
            }
            Self::StaleTopology { .. } => ErrorCode::StaleConfig.as_i32(),
            Self::LockError(_) | Self::ExecutionError(_) => ErrorCode::InternalError.as_i32(),
        }
    }

    pub fn code_name(&self) -> String {
        ErrorCode::name_for(self.code())
    }

    pub fn is_stale_topology(&self) -> bool {
        matches!(self, Self::StaleTopology { .. })
    }

    /// Routing rejections and input errors never reach a shard.
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(
            self,
            Self::InvalidNamespace(_)
                | Self::BadValue(_)
                | Self::TypeMismatch(_)
                | Self::IllegalOperation(_)
                | Self::Rejected { .. }
                | Self::CommandNotFound(_)
        )
    }

    /// The shard that produced this error, when one is known.
    pub fn shard(&self) -> Option<&str> {
        match self {
            Self::Transport { shard, .. }
            | Self::Remote { shard, .. }
            | Self::StaleTopology { shard, .. }
            | Self::ChainBroken { shard, .. } => Some(shard.as_str()),
            Self::ShardNotFound(shard) => Some(shard.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

impl<T> From<std::sync::PoisonError<T>> for RouterError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
