//! 错误信息结构
//!
//! 把调用链上的错误整理成结构化信息，供异常通知和日志使用

use crate::error::AopError;
use std::error::Error;

/// 结构化的错误信息
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称
    pub error_type: String,

    /// 受检失败的种类，非受检失败和引擎错误为 `None`
    pub checked_kind: Option<&'static str>,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从代理引擎错误创建 ErrorInfo
    pub fn from_aop_error(error: &AopError) -> Self {
        let error_type = match error {
            AopError::Configuration(_) => "ConfigurationError",
            AopError::Invocation { .. } => "InvocationError",
            AopError::Undeclared { .. } => "UndeclaredFailure",
            AopError::Raised(failure) if failure.is_checked() => "CheckedFailure",
            AopError::Raised(_) => "UncheckedFailure",
            AopError::ProxyNotExposed => "ProxyNotExposed",
            AopError::UnknownAdvice(_) => "UnknownAdvice",
            AopError::UnsupportedMethod { .. } => "UnsupportedMethod",
            AopError::NoTarget { .. } => "NoTarget",
            AopError::TargetUnavailable { .. } => "TargetUnavailable",
        };
        Self {
            message: error.to_string(),
            error_type: error_type.to_string(),
            checked_kind: error.as_failure().and_then(|failure| failure.checked_kind()),
            source_chain: source_chain(error),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

impl From<&AopError> for ErrorInfo {
    fn from(error: &AopError) -> Self {
        Self::from_aop_error(error)
    }
}

fn source_chain(error: &dyn Error) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = error.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain
}
