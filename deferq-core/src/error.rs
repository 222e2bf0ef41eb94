//! 事件分发子系统统一错误定义
//!
//! 聚焦序列化、存储、监听者解析与调度的最小必要集合。
//! 处理器（handler）自身的错误使用 `anyhow::Error`，不会向 `fire/schedule` 的调用方传播。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 存储 ---
    #[error("store error: {reason}")]
    Store { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },

    // --- 分发/调度 ---
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("scheduler error: {reason}")]
    Scheduler { reason: String },
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn store(reason: impl Into<String>) -> Self {
        DispatchError::Store {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        DispatchError::NotFound {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        DispatchError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// 存储不可用等瞬时错误，由调用方的事务/重试策略决定是否重试
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::Store { .. })
    }
}

// ---- Cross-crate conversions for infrastructure convenience ----

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DispatchError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DispatchError::Store {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for DispatchError {
    fn from(err: uuid::Error) -> Self {
        DispatchError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for DispatchError {
    fn from(err: chrono::ParseError) -> Self {
        DispatchError::Parse {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_errors_are_transient() {
        assert!(DispatchError::store("connection refused").is_transient());
        assert!(!DispatchError::not_found("event 1").is_transient());
        assert!(!DispatchError::invalid_argument("empty target").is_transient());
    }

    #[test]
    fn serde_error_converts() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: DispatchError = err.into();
        assert!(matches!(err, DispatchError::Serde { .. }));
    }
}
