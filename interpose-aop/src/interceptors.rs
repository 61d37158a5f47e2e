//! 预定义的常用拦截器

use crate::advice::MethodInterceptor;
use crate::error::AopResult;
use crate::error_info::ErrorInfo;
use crate::joinpoint::ProceedingJoinPoint;
use crate::signature::Object;
use std::time::{Duration, Instant};

/// 日志拦截器 - 记录方法调用
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    log_args: bool,
}

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录参数个数
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl MethodInterceptor for LoggingInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        if self.log_args {
            tracing::info!(
                "→ Entering: {} with {} argument(s)",
                pjp.signature(),
                pjp.arguments().len()
            );
        } else {
            tracing::info!("→ Entering: {}", pjp.signature());
        }

        let started = Instant::now();
        let result = pjp.proceed();
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => tracing::info!("← Exiting: {} (took {:?})", pjp.signature(), elapsed),
            Err(e) => tracing::info!("← Exiting: {} with error after {:?}: {}", pjp.signature(), elapsed, e),
        }
        result
    }
}

/// 性能监控拦截器
#[derive(Debug, Clone)]
pub struct PerformanceInterceptor {
    threshold: Duration,
}

impl PerformanceInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl MethodInterceptor for PerformanceInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        let started = Instant::now();
        let result = pjp.proceed();
        let elapsed = started.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {}ms (threshold: {}ms)",
                pjp.signature(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        } else {
            tracing::debug!("{} took {}µs", pjp.signature(), elapsed.as_micros());
        }
        result
    }
}

/// 异常日志拦截器
///
/// 记录失败及其原因链，错误原样返回。
#[derive(Debug, Clone, Default)]
pub struct ExceptionLoggingInterceptor;

impl MethodInterceptor for ExceptionLoggingInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        let result = pjp.proceed();
        if let Err(error) = &result {
            let info = ErrorInfo::from_aop_error(error);
            tracing::error!(
                error_type = %info.error_type,
                "❌ Exception in {}: {}",
                pjp.signature(),
                info.full_description()
            );
        }
        result
    }
}

/// 重试拦截器
///
/// 业务失败时重新执行剩余的调用链，最多 `max_attempts` 次。
/// 引擎自身的错误（配置、协议错误）不会重试。
#[derive(Debug, Clone)]
pub struct RetryInterceptor {
    max_attempts: usize,
    backoff: Duration,
}

impl RetryInterceptor {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    /// 每次重试前等待的时间
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

impl MethodInterceptor for RetryInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        let mut attempt = 1;
        loop {
            match pjp.proceed() {
                Err(error) if error.as_failure().is_some() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "Attempt {}/{} of {} failed: {}",
                        attempt,
                        self.max_attempts,
                        pjp.signature(),
                        error
                    );
                    attempt += 1;
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
                result => return result,
            }
        }
    }
}
