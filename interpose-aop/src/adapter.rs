//! 通知适配器
//!
//! 把非环绕形态的通知（前置、返回后、异常、后置、自定义）转换成统一的 [`MethodInterceptor`]。
//! 适配器注册表是一个显式的值，由调用链工厂持有；不存在全局单例。

use crate::advice::{
    Advice, AdviceKind, AfterAdvice, AfterReturningAdvice, BeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
use crate::error::{AopError, AopResult};
use crate::joinpoint::ProceedingJoinPoint;
use crate::signature::Object;
use std::sync::Arc;

/// 通知适配器 Trait
pub trait AdvisorAdapter: Send + Sync {
    /// 适配器名称
    fn name(&self) -> &str;

    /// 是否能处理给定的通知
    fn supports_advice(&self, advice: &Advice) -> bool;

    /// 把通知转换为拦截器，只在 `supports_advice` 返回 true 后调用
    fn get_interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>>;
}

/// 适配器注册器
///
/// 用于 inventory 在链接期收集额外的适配器
pub struct AdapterRegistration {
    /// 适配器名称
    pub name: &'static str,

    /// 创建适配器实例的函数
    pub creator: fn() -> Arc<dyn AdvisorAdapter>,
}

impl AdapterRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Arc<dyn AdvisorAdapter>) -> Self {
        Self { name, creator }
    }

    /// 创建适配器实例
    pub fn create_instance(&self) -> Arc<dyn AdvisorAdapter> {
        (self.creator)()
    }
}

// 使用 inventory 收集所有适配器注册器
inventory::collect!(AdapterRegistration);

/// 前置通知拦截器
pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn BeforeAdvice>,
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        self.advice.before(pjp)?;
        pjp.proceed()
    }
}

/// 返回后通知拦截器
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        let result = pjp.proceed()?;
        self.advice.after_returning(pjp, result.as_ref())?;
        Ok(result)
    }
}

/// 异常通知拦截器
pub struct ThrowsAdviceInterceptor {
    advice: Arc<dyn ThrowsAdvice>,
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        match pjp.proceed() {
            Ok(result) => Ok(result),
            Err(error) => {
                self.advice.after_throwing(pjp, &error)?;
                Err(error)
            }
        }
    }
}

/// 后置通知拦截器
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        let result = pjp.proceed();
        let after = self.advice.after(pjp);
        // 方法本身的错误优先于后置通知的错误
        match (result, after) {
            (Err(error), _) => Err(error),
            (Ok(_), Err(error)) => Err(error),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

/// 前置通知适配器
#[derive(Debug, Default)]
pub struct BeforeAdviceAdapter;

impl AdvisorAdapter for BeforeAdviceAdapter {
    fn name(&self) -> &str {
        "BeforeAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice.kind(), AdviceKind::Before(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice.kind() {
            AdviceKind::Before(before) => Ok(Arc::new(BeforeAdviceInterceptor {
                advice: Arc::clone(before),
            })),
            _ => Err(AopError::UnknownAdvice(advice.name().to_string())),
        }
    }
}

/// 返回后通知适配器
#[derive(Debug, Default)]
pub struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn name(&self) -> &str {
        "AfterReturningAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice.kind(), AdviceKind::AfterReturning(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice.kind() {
            AdviceKind::AfterReturning(after) => Ok(Arc::new(AfterReturningAdviceInterceptor {
                advice: Arc::clone(after),
            })),
            _ => Err(AopError::UnknownAdvice(advice.name().to_string())),
        }
    }
}

/// 异常通知适配器
#[derive(Debug, Default)]
pub struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn name(&self) -> &str {
        "ThrowsAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice.kind(), AdviceKind::AfterThrowing(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice.kind() {
            AdviceKind::AfterThrowing(throws) => Ok(Arc::new(ThrowsAdviceInterceptor {
                advice: Arc::clone(throws),
            })),
            _ => Err(AopError::UnknownAdvice(advice.name().to_string())),
        }
    }
}

/// 后置通知适配器
#[derive(Debug, Default)]
pub struct AfterAdviceAdapter;

impl AdvisorAdapter for AfterAdviceAdapter {
    fn name(&self) -> &str {
        "AfterAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice.kind(), AdviceKind::After(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice.kind() {
            AdviceKind::After(after) => Ok(Arc::new(AfterAdviceInterceptor {
                advice: Arc::clone(after),
            })),
            _ => Err(AopError::UnknownAdvice(advice.name().to_string())),
        }
    }
}

/// 通知适配器注册表
pub struct AdvisorAdapterRegistry {
    adapters: Vec<Arc<dyn AdvisorAdapter>>,
}

impl AdvisorAdapterRegistry {
    /// 创建包含内置适配器的注册表
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_adapter(Arc::new(BeforeAdviceAdapter));
        registry.register_adapter(Arc::new(AfterReturningAdviceAdapter));
        registry.register_adapter(Arc::new(ThrowsAdviceAdapter));
        registry.register_adapter(Arc::new(AfterAdviceAdapter));
        registry
    }

    /// 创建不含任何适配器的注册表，只接受环绕通知
    pub fn empty() -> Self {
        Self { adapters: Vec::new() }
    }

    /// 注册适配器
    pub fn register_adapter(&mut self, adapter: Arc<dyn AdvisorAdapter>) {
        tracing::debug!("Registering advisor adapter: {}", adapter.name());
        self.adapters.push(adapter);
    }

    /// 加载所有通过 inventory 注册的适配器
    pub fn load_registered(&mut self) {
        let registrations: Vec<_> = inventory::iter::<AdapterRegistration>().collect();
        tracing::info!("Loading {} registered advisor adapter(s)", registrations.len());

        for registration in registrations {
            tracing::debug!("  ├─ Loading adapter: {}", registration.name);
            self.register_adapter(registration.create_instance());
        }
    }

    /// 已注册的适配器数量
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// 把通知转换为拦截器
    ///
    /// 环绕通知直接使用，其余通知交给每个支持它的适配器。没有任何适配器支持时报错。
    pub fn interceptors(&self, advice: &Advice) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let mut interceptors = Vec::with_capacity(1);
        if let Some(interceptor) = advice.as_interceptor() {
            interceptors.push(interceptor);
        }
        for adapter in &self.adapters {
            if adapter.supports_advice(advice) {
                interceptors.push(adapter.get_interceptor(advice)?);
            }
        }
        if interceptors.is_empty() {
            return Err(AopError::UnknownAdvice(format!(
                "{} ({:?})",
                advice.name(),
                advice.advice_type()
            )));
        }
        Ok(interceptors)
    }

    /// 是否能处理给定通知
    pub fn supports(&self, advice: &Advice) -> bool {
        advice.as_interceptor().is_some() || self.adapters.iter().any(|a| a.supports_advice(advice))
    }
}

impl Default for AdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdvisorAdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorAdapterRegistry")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
