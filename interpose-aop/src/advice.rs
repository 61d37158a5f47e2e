//! 通知（Advice）定义
//!
//! 定义了在连接点执行的各种动作。环绕通知直接实现 [`MethodInterceptor`]，
//! 其余通知类型由适配器注册表转换成拦截器后再进入调用链。

use crate::error::{AopError, AopResult};
use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
use crate::signature::Object;
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 前置通知
    Before,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 后置通知（无论成功还是失败都执行）
    After,
}

/// 方法拦截器
///
/// 调用链中的执行单元。拦截器决定是否、以及调用几次 `proceed()`：
/// 不调用表示短路，目标方法不会执行；多次调用会重复执行剩余的调用链和目标方法。
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>>;
}

impl<F> MethodInterceptor for F
where
    F: Fn(&ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> + Send + Sync,
{
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        self(pjp)
    }
}

/// 前置通知 Trait
///
/// 在目标方法执行前调用，返回错误会阻止目标方法执行
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, join_point: &JoinPoint) -> AopResult<()>;
}

impl<F> BeforeAdvice for F
where
    F: Fn(&JoinPoint) -> AopResult<()> + Send + Sync,
{
    fn before(&self, join_point: &JoinPoint) -> AopResult<()> {
        self(join_point)
    }
}

/// 返回后通知 Trait
///
/// 在目标方法成功返回后调用
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, join_point: &JoinPoint, result: Option<&Object>) -> AopResult<()>;
}

impl<F> AfterReturningAdvice for F
where
    F: Fn(&JoinPoint, Option<&Object>) -> AopResult<()> + Send + Sync,
{
    fn after_returning(&self, join_point: &JoinPoint, result: Option<&Object>) -> AopResult<()> {
        self(join_point, result)
    }
}

/// 异常通知 Trait
///
/// 在目标方法失败时调用。返回 `Ok` 时原始错误继续传播，返回 `Err` 时以新错误替换。
pub trait ThrowsAdvice: Send + Sync {
    fn after_throwing(&self, join_point: &JoinPoint, error: &AopError) -> AopResult<()>;
}

impl<F> ThrowsAdvice for F
where
    F: Fn(&JoinPoint, &AopError) -> AopResult<()> + Send + Sync,
{
    fn after_throwing(&self, join_point: &JoinPoint, error: &AopError) -> AopResult<()> {
        self(join_point, error)
    }
}

/// 后置通知 Trait
///
/// 在目标方法执行后调用（无论成功还是失败）
pub trait AfterAdvice: Send + Sync {
    fn after(&self, join_point: &JoinPoint) -> AopResult<()>;
}

impl<F> AfterAdvice for F
where
    F: Fn(&JoinPoint) -> AopResult<()> + Send + Sync,
{
    fn after(&self, join_point: &JoinPoint) -> AopResult<()> {
        self(join_point)
    }
}

/// 通知的具体形态
#[derive(Clone)]
pub enum AdviceKind {
    Around(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn BeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn ThrowsAdvice>),
    After(Arc<dyn AfterAdvice>),
    /// 由自定义适配器识别的通知
    Custom {
        advice_type: AdviceType,
        payload: Object,
    },
}

/// 通知
///
/// 名称和类型共同决定通知的身份，代理相等性比较依赖它们。
#[derive(Clone)]
pub struct Advice {
    name: String,
    kind: AdviceKind,
}

impl Advice {
    pub fn new(name: impl Into<String>, kind: AdviceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// 环绕通知
    pub fn around(name: impl Into<String>, interceptor: Arc<dyn MethodInterceptor>) -> Self {
        Self::new(name, AdviceKind::Around(interceptor))
    }

    /// 前置通知
    pub fn before(name: impl Into<String>, advice: impl BeforeAdvice + 'static) -> Self {
        Self::new(name, AdviceKind::Before(Arc::new(advice)))
    }

    /// 返回后通知
    pub fn after_returning(name: impl Into<String>, advice: impl AfterReturningAdvice + 'static) -> Self {
        Self::new(name, AdviceKind::AfterReturning(Arc::new(advice)))
    }

    /// 异常通知
    pub fn after_throwing(name: impl Into<String>, advice: impl ThrowsAdvice + 'static) -> Self {
        Self::new(name, AdviceKind::AfterThrowing(Arc::new(advice)))
    }

    /// 后置通知
    pub fn after(name: impl Into<String>, advice: impl AfterAdvice + 'static) -> Self {
        Self::new(name, AdviceKind::After(Arc::new(advice)))
    }

    /// 自定义通知
    pub fn custom(name: impl Into<String>, advice_type: AdviceType, payload: Object) -> Self {
        Self::new(name, AdviceKind::Custom { advice_type, payload })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AdviceKind {
        &self.kind
    }

    pub fn advice_type(&self) -> AdviceType {
        match &self.kind {
            AdviceKind::Around(_) => AdviceType::Around,
            AdviceKind::Before(_) => AdviceType::Before,
            AdviceKind::AfterReturning(_) => AdviceType::AfterReturning,
            AdviceKind::AfterThrowing(_) => AdviceType::AfterThrowing,
            AdviceKind::After(_) => AdviceType::After,
            AdviceKind::Custom { advice_type, .. } => *advice_type,
        }
    }

    /// 环绕通知直接返回其拦截器
    pub fn as_interceptor(&self) -> Option<Arc<dyn MethodInterceptor>> {
        match &self.kind {
            AdviceKind::Around(interceptor) => Some(Arc::clone(interceptor)),
            _ => None,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advice")
            .field("name", &self.name)
            .field("type", &self.advice_type())
            .finish()
    }
}
