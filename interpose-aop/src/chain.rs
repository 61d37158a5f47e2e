//! 调用链构建
//!
//! 根据通知器列表、被调用的方法和目标类型计算出本次调用适用的有序拦截器链。

use crate::adapter::AdvisorAdapterRegistry;
use crate::advice::MethodInterceptor;
use crate::advisor::Advisor;
use crate::error::AopResult;
use crate::matcher::MethodMatcher;
use crate::signature::{MethodSignature, TypeInfo, TypeRef};
use std::fmt;
use std::sync::Arc;

/// 调用链条目
#[derive(Clone)]
pub enum ChainEntry {
    /// 构建时已确定匹配的拦截器
    Static(Arc<dyn MethodInterceptor>),
    /// 每次调用都要用实际参数复查的拦截器
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

impl ChainEntry {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainEntry::Static(interceptor) => interceptor,
            ChainEntry::Dynamic { interceptor, .. } => interceptor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainEntry::Dynamic { .. })
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEntry::Static(_) => write!(f, "Static"),
            ChainEntry::Dynamic { .. } => write!(f, "Dynamic"),
        }
    }
}

/// 不可变的调用链
pub type InterceptorChain = Arc<[ChainEntry]>;

/// 调用链工厂
pub trait AdvisorChainFactory: Send + Sync {
    /// 为一次调用构建调用链
    ///
    /// `pre_filtered` 为 true 表示所有通知器都已确认适用于目标类型，可跳过类型过滤。
    fn build_chain(
        &self,
        advisors: &[Advisor],
        pre_filtered: bool,
        method: &MethodSignature,
        target_type: Option<&TypeRef>,
    ) -> AopResult<Vec<ChainEntry>>;
}

/// 默认调用链工厂
#[derive(Debug)]
pub struct DefaultAdvisorChainFactory {
    registry: Arc<AdvisorAdapterRegistry>,
}

impl DefaultAdvisorChainFactory {
    pub fn new(registry: Arc<AdvisorAdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AdvisorAdapterRegistry {
        &self.registry
    }

    fn has_matching_introductions(advisors: &[Advisor], target_type: &TypeInfo) -> bool {
        advisors.iter().any(|advisor| match advisor {
            Advisor::Introduction(introduction) => introduction.class_filter().matches(target_type),
            _ => false,
        })
    }
}

impl Default for DefaultAdvisorChainFactory {
    fn default() -> Self {
        Self::new(Arc::new(AdvisorAdapterRegistry::new()))
    }
}

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn build_chain(
        &self,
        advisors: &[Advisor],
        pre_filtered: bool,
        method: &MethodSignature,
        target_type: Option<&TypeRef>,
    ) -> AopResult<Vec<ChainEntry>> {
        let effective_type = target_type.unwrap_or_else(|| method.declaring_type());
        let mut chain = Vec::with_capacity(advisors.len());
        let mut has_introductions: Option<bool> = None;

        for advisor in advisors {
            match advisor {
                Advisor::Pointcut(pointcut_advisor) => {
                    let pointcut = pointcut_advisor.pointcut();
                    if !pre_filtered && !pointcut.class_filter().matches(effective_type) {
                        continue;
                    }
                    let matcher = pointcut.method_matcher();
                    let matched = match matcher.as_introduction_aware() {
                        Some(aware) => {
                            let flag = *has_introductions
                                .get_or_insert_with(|| Self::has_matching_introductions(advisors, effective_type));
                            aware.matches_with_introductions(method, effective_type, flag)
                        }
                        None => matcher.matches(method, effective_type),
                    };
                    if !matched {
                        continue;
                    }
                    let interceptors = self.registry.interceptors(pointcut_advisor.advice())?;
                    if matcher.is_runtime() {
                        chain.extend(interceptors.into_iter().map(|interceptor| ChainEntry::Dynamic {
                            interceptor,
                            matcher: Arc::clone(&matcher),
                        }));
                    } else {
                        chain.extend(interceptors.into_iter().map(ChainEntry::Static));
                    }
                }
                Advisor::Introduction(introduction) => {
                    if pre_filtered || introduction.class_filter().matches(effective_type) {
                        let interceptors = self.registry.interceptors(introduction.advice())?;
                        chain.extend(interceptors.into_iter().map(ChainEntry::Static));
                    }
                }
                Advisor::Unconditional(advice) => {
                    let interceptors = self.registry.interceptors(advice)?;
                    chain.extend(interceptors.into_iter().map(ChainEntry::Static));
                }
            }
        }

        tracing::debug!(
            "Built interceptor chain for {} on {}: {} entr{}",
            method,
            effective_type,
            chain.len(),
            if chain.len() == 1 { "y" } else { "ies" }
        );
        Ok(chain)
    }
}
