//! 错误类型定义
//!
//! 代理引擎的统一错误类型。拦截器和目标对象抛出的业务失败通过 [`Failure`] 携带，
//! 引擎自身的协议错误（配置错误、基本类型返回空值等）由 [`AopError`] 的其余变体表示。

use std::fmt;

/// 代理引擎结果类型
pub type AopResult<T> = Result<T, AopError>;

/// 业务失败的分类
///
/// `Checked` 失败必须在方法签名上声明才能原样抛给调用方，
/// 未声明的会被包装成 [`AopError::Undeclared`]；`Unchecked` 失败总是原样传播。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 受检失败，携带失败种类名称
    Checked(&'static str),
    /// 非受检失败
    Unchecked,
}

/// 拦截器或目标方法抛出的失败
pub struct Failure {
    kind: FailureKind,
    error: anyhow::Error,
}

impl Failure {
    /// 创建受检失败
    pub fn checked(kind: &'static str, error: impl Into<anyhow::Error>) -> Self {
        Self {
            kind: FailureKind::Checked(kind),
            error: error.into(),
        }
    }

    /// 创建非受检失败
    pub fn unchecked(error: impl Into<anyhow::Error>) -> Self {
        Self {
            kind: FailureKind::Unchecked,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// 受检失败的种类名称
    pub fn checked_kind(&self) -> Option<&'static str> {
        match self.kind {
            FailureKind::Checked(kind) => Some(kind),
            FailureKind::Unchecked => None,
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self.kind, FailureKind::Checked(_))
    }

    /// 获取底层错误
    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// 取出底层错误
    pub fn into_error(self) -> anyhow::Error {
        self.error
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("kind", &self.kind)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Checked(kind) => write!(f, "{}: {}", kind, self.error),
            FailureKind::Unchecked => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// 代理引擎错误
#[derive(Debug, thiserror::Error)]
pub enum AopError {
    /// 代理配置无效，创建代理时立即抛出，不会重试
    #[error("AOP configuration error: {0}")]
    Configuration(String),

    /// 基本类型返回值的方法从通知链上拿到了空结果
    #[error("Null return value from advice does not match primitive return type `{return_type}` for: {method}")]
    Invocation {
        method: String,
        return_type: &'static str,
    },

    /// 方法签名未声明的受检失败
    #[error("Undeclared checked failure thrown from {method}")]
    Undeclared {
        method: String,
        #[source]
        failure: Failure,
    },

    /// 拦截器或目标对象抛出的失败
    #[error(transparent)]
    Raised(#[from] Failure),

    /// 当前线程没有暴露代理对象
    #[error("Cannot find current proxy: set 'expose_proxy' to true to make it available, and ensure the call happens on the thread handling the proxied invocation")]
    ProxyNotExposed,

    /// 没有适配器能处理的通知
    #[error("Advice '{0}' is not supported by any registered advisor adapter")]
    UnknownAdvice(String),

    /// 调用的方法不属于代理暴露的任何契约
    #[error("Method {method} is not declared on any contract exposed by the proxy")]
    UnsupportedMethod { method: String },

    /// 调用链走到末端时没有可用的目标对象
    #[error("No target object available to invoke {method}")]
    NoTarget { method: String },

    /// 目标来源无法提供目标对象
    #[error("Target source '{source_name}' could not provide a target: {reason}")]
    TargetUnavailable { source_name: String, reason: String },
}

impl AopError {
    /// 以非受检失败的形式抛出任意错误
    pub fn raise(error: impl Into<anyhow::Error>) -> Self {
        AopError::Raised(Failure::unchecked(error))
    }

    /// 以受检失败的形式抛出任意错误
    pub fn raise_checked(kind: &'static str, error: impl Into<anyhow::Error>) -> Self {
        AopError::Raised(Failure::checked(kind, error))
    }

    /// 如果是业务失败，返回其引用
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            AopError::Raised(failure) => Some(failure),
            AopError::Undeclared { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let checked = Failure::checked("IoFailure", anyhow::anyhow!("disk full"));
        assert!(checked.is_checked());
        assert_eq!(checked.checked_kind(), Some("IoFailure"));
        assert_eq!(checked.to_string(), "IoFailure: disk full");

        let unchecked = Failure::unchecked(anyhow::anyhow!("boom"));
        assert!(!unchecked.is_checked());
        assert_eq!(unchecked.checked_kind(), None);
        assert_eq!(unchecked.to_string(), "boom");
    }

    #[test]
    fn test_raised_is_transparent() {
        let err = AopError::raise(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
        assert!(err.as_failure().is_some());
        assert!(AopError::ProxyNotExposed.as_failure().is_none());
    }

    #[test]
    fn test_undeclared_keeps_source() {
        let err = AopError::Undeclared {
            method: "EchoService::execute".to_string(),
            failure: Failure::checked("IoFailure", anyhow::anyhow!("disk full")),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("IoFailure: disk full"));
    }
}
