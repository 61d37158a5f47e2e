//! Interpose AOP - 运行时方法拦截引擎
//!
//! 给定目标对象和一组通知器，创建代理对象。每次调用经过代理时：
//! - 按通知器声明顺序选出适用于本次调用的拦截器，组成调用链
//! - 运行时匹配器在每次调用时用实际参数重新检查
//! - 拦截器通过 `proceed()` 推进调用链，可以短路，也可以多次执行剩余部分
//! - 目标对象尽可能晚地从目标来源获取，并在所有退出路径上释放
//! - 相等性、哈希、finalize 和当前代理暴露在两种代理策略下统一处理
//!
//! # 示例
//!
//! ```ignore
//! use interpose_aop::prelude::*;
//!
//! let proxy = ProxyFactory::for_target(service)
//!     .add_advisor(Advisor::with_pointcut(
//!         NameMatchPointcut::new(&["execute"]),
//!         Advice::around("logging", Arc::new(LoggingInterceptor::new())),
//!     ))
//!     .get_proxy()?;
//! ```

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod cache;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod error_info;
pub mod factory;
pub mod interceptors;
pub mod joinpoint;
pub mod logging;
pub mod matcher;
pub mod pointcut;
pub mod proxy;
pub mod signature;
pub mod target;

#[cfg(test)]
mod test_support;

// 重新导出核心类型
pub use adapter::{AdapterRegistration, AdvisorAdapter, AdvisorAdapterRegistry};
pub use advice::{
    Advice, AdviceKind, AdviceType, AfterAdvice, AfterReturningAdvice, BeforeAdvice, MethodInterceptor,
    ThrowsAdvice,
};
pub use advised::AdvisedSupport;
pub use advisor::{
    can_apply, find_advisors_that_can_apply, Advisor, DelegatingIntroductionInterceptor, IntroductionAdvisor,
    PointcutAdvisor,
};
pub use chain::{AdvisorChainFactory, ChainEntry, DefaultAdvisorChainFactory, InterceptorChain};
pub use config::ProxyConfig;
pub use context::AopContext;
pub use error::{AopError, AopResult, Failure, FailureKind};
pub use error_info::ErrorInfo;
pub use factory::ProxyFactory;
pub use interceptors::{ExceptionLoggingInterceptor, LoggingInterceptor, PerformanceInterceptor, RetryInterceptor};
pub use joinpoint::{InvocationPhase, JoinPoint, ProceedingJoinPoint};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use matcher::{ClassFilter, IntroductionAwareMethodMatcher, MethodMatcher};
pub use pointcut::{
    ComposablePointcut, DynamicPointcut, ExpressionPointcut, NameMatchPointcut, Pointcut, PointcutExpression,
};
pub use proxy::{AopProxy, ProxyStrategy};
pub use signature::{MethodKind, MethodSignature, Object, ReturnType, TypeInfo, TypeRef};
pub use target::{
    EmptyTargetSource, PooledTargetSource, PrototypeTargetSource, SingletonTargetSource, Target, TargetSource,
};

// 导出 inventory 供适配器注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advisor::{Advisor, IntroductionAdvisor};
    pub use crate::config::ProxyConfig;
    pub use crate::context::AopContext;
    pub use crate::error::{AopError, AopResult};
    pub use crate::factory::ProxyFactory;
    pub use crate::interceptors::*;
    pub use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
    pub use crate::logging::LoggingConfig;
    pub use crate::matcher::*;
    pub use crate::pointcut::*;
    pub use crate::proxy::AopProxy;
    pub use crate::signature::*;
    pub use crate::target::*;
    pub use std::sync::Arc;
}
