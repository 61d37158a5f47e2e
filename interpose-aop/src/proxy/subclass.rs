//! 子类代理
//!
//! 代理对象是目标类型的子类，每个方法在第一次调用时选定一个回调并缓存。
//! 配置冻结且目标来源是静态的时候，方法的调用链在创建代理时预先计算。

use super::{invoke_advised, invoke_identity_method, process_return, AopProxy, ProxyDispatch, ProxyStrategy};
use crate::advised::AdvisedSupport;
use crate::chain::InterceptorChain;
use crate::error::{AopError, AopResult};
use crate::joinpoint::translate_undeclared;
use crate::signature::{MethodKey, MethodKind, MethodSignature, Object, ReturnType, TypeRef};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 方法回调
#[derive(Clone)]
pub enum Callback {
    /// 通用的通知调用流程
    AopProxy,
    /// 使用预先计算的调用链
    FixedChain(InterceptorChain),
    /// 没有通知，但需要处理返回值、释放目标或暴露代理
    InvokeTarget,
    /// 没有通知，直接调用静态目标
    DispatchTarget,
    /// 不覆盖，代理自身不做任何事
    NoOverride,
    /// 代理相等性
    InvokeEquals,
    /// 代理哈希
    InvokeHashCode,
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::AopProxy => write!(f, "AopProxy"),
            Callback::FixedChain(chain) => write!(f, "FixedChain({})", chain.len()),
            Callback::InvokeTarget => write!(f, "InvokeTarget"),
            Callback::DispatchTarget => write!(f, "DispatchTarget"),
            Callback::NoOverride => write!(f, "NoOverride"),
            Callback::InvokeEquals => write!(f, "InvokeEquals"),
            Callback::InvokeHashCode => write!(f, "InvokeHashCode"),
        }
    }
}

/// 子类代理分派
pub struct SubclassDispatch {
    target_type: TypeRef,
    fixed_chains: HashMap<MethodKey, InterceptorChain>,
    callbacks: DashMap<MethodKey, Callback>,
}

impl SubclassDispatch {
    /// 创建分派器，冻结且静态的配置会预先计算调用链
    pub fn new(advised: &AdvisedSupport, target_type: TypeRef) -> AopResult<Self> {
        let mut fixed_chains = HashMap::new();
        if advised.is_frozen() && advised.target_source().is_static() {
            for (method, chain) in advised.precompute_chains()? {
                fixed_chains.insert(method.key(), chain);
            }
            tracing::debug!(
                "Precomputed {} fixed chain(s) for subclass proxy of {}",
                fixed_chains.len(),
                target_type
            );
        }
        Ok(Self {
            target_type,
            fixed_chains,
            callbacks: DashMap::new(),
        })
    }

    /// 已缓存的回调
    pub fn callback(&self, method: &MethodSignature) -> Option<Callback> {
        self.callbacks.get(&method.key()).map(|c| c.value().clone())
    }

    fn resolve_callback(&self, advised: &AdvisedSupport, method: &MethodSignature) -> AopResult<Callback> {
        let key = method.key();
        if let Some(callback) = self.callbacks.get(&key) {
            return Ok(callback.value().clone());
        }
        let callback = self.accept(advised, method)?;
        tracing::trace!("Selected callback {:?} for {}", callback, method);
        Ok(self.callbacks.entry(key).or_insert(callback).value().clone())
    }

    fn accept(&self, advised: &AdvisedSupport, method: &MethodSignature) -> AopResult<Callback> {
        match method.kind() {
            MethodKind::Finalize => return Ok(Callback::NoOverride),
            MethodKind::Equals if !self.target_type.defines_equals() => return Ok(Callback::InvokeEquals),
            MethodKind::HashCode if !self.target_type.defines_hash() => return Ok(Callback::InvokeHashCode),
            _ => {}
        }

        let frozen = advised.is_frozen();
        let is_static = advised.target_source().is_static();
        let expose_proxy = advised.expose_proxy();
        let chain = advised.chain_for(method, Some(&self.target_type))?;

        if !chain.is_empty() || !frozen {
            if expose_proxy {
                return Ok(Callback::AopProxy);
            }
            if frozen && is_static {
                if let Some(chain) = self.fixed_chains.get(&method.key()) {
                    return Ok(Callback::FixedChain(Arc::clone(chain)));
                }
            }
            return Ok(Callback::AopProxy);
        }

        if expose_proxy || !is_static {
            return Ok(Callback::InvokeTarget);
        }
        let may_return_target = match method.return_type() {
            ReturnType::Reference(ty) => self.target_type.is_assignable_to(ty),
            ReturnType::Any => true,
            ReturnType::Unit | ReturnType::Primitive(_) => false,
        };
        if may_return_target {
            Ok(Callback::InvokeTarget)
        } else {
            Ok(Callback::DispatchTarget)
        }
    }

    fn dispatch_target(proxy: &AopProxy, method: &MethodSignature, args: &[Object]) -> AopResult<Option<Object>> {
        let target = proxy
            .config()
            .target_source()
            .get_target()?
            .ok_or_else(|| AopError::NoTarget {
                method: method.signature(),
            })?;
        let result = translate_undeclared(method, Arc::clone(&target).invoke(method, args))?;
        process_return(proxy, method, result, Some(&target))
    }
}

impl ProxyDispatch for SubclassDispatch {
    fn strategy(&self) -> ProxyStrategy {
        ProxyStrategy::Subclass
    }

    fn resolve_and_invoke(&self, proxy: &AopProxy, method: &MethodSignature, args: Vec<Object>) -> AopResult<Option<Object>> {
        match self.resolve_callback(proxy.config(), method)? {
            Callback::NoOverride | Callback::InvokeEquals | Callback::InvokeHashCode => {
                invoke_identity_method(proxy, method, &args, false, false).unwrap_or(Ok(None))
            }
            Callback::AopProxy => invoke_advised(proxy, method, args, None),
            Callback::FixedChain(chain) => invoke_advised(proxy, method, args, Some(chain)),
            Callback::InvokeTarget => invoke_advised(proxy, method, args, Some(InterceptorChain::from(Vec::new()))),
            Callback::DispatchTarget => Self::dispatch_target(proxy, method, &args),
        }
    }
}

impl fmt::Debug for SubclassDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubclassDispatch")
            .field("target_type", &self.target_type.name())
            .field("fixed_chains", &self.fixed_chains.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::advisor::Advisor;
    use crate::chain::DefaultAdvisorChainFactory;
    use crate::config::ProxyConfig;
    use crate::pointcut::NameMatchPointcut;
    use crate::signature::TypeInfo;
    use crate::target::{PrototypeTargetSource, SingletonTargetSource, TargetSource};
    use crate::test_support::*;

    fn advised(config: ProxyConfig, source: Arc<dyn TargetSource>) -> AdvisedSupport {
        let advised = AdvisedSupport::new(
            config,
            source,
            echo_methods(),
            Arc::new(DefaultAdvisorChainFactory::default()),
        );
        advised
            .add_advisor(Advisor::with_pointcut(
                NameMatchPointcut::new(&["execute"]),
                Advice::around("short", Arc::new(ShortCircuit)),
            ))
            .unwrap();
        if config.frozen {
            advised.freeze();
        }
        advised
    }

    fn singleton() -> Arc<dyn TargetSource> {
        Arc::new(SingletonTargetSource::new(echo_target()))
    }

    #[test]
    fn test_frozen_static_callbacks() {
        let advised = advised(ProxyConfig::new().frozen(true), singleton());
        let dispatch = SubclassDispatch::new(&advised, echo_impl_type()).unwrap();

        let accept = |method: MethodSignature| dispatch.accept(&advised, &method).unwrap();
        assert!(matches!(accept(echo_execute()), Callback::FixedChain(chain) if chain.len() == 1));
        assert!(matches!(accept(echo_itself()), Callback::InvokeTarget));
        assert!(matches!(accept(echo_as_object()), Callback::InvokeTarget));
        assert!(matches!(accept(echo_count()), Callback::DispatchTarget));
        assert!(matches!(accept(echo_risky()), Callback::DispatchTarget));
        assert!(matches!(accept(MethodSignature::finalize()), Callback::NoOverride));
        assert!(matches!(accept(MethodSignature::equals()), Callback::InvokeEquals));
        assert!(matches!(accept(MethodSignature::hash_code()), Callback::InvokeHashCode));
    }

    #[test]
    fn test_unfrozen_always_uses_general_path() {
        let advised = advised(ProxyConfig::new(), singleton());
        let dispatch = SubclassDispatch::new(&advised, echo_impl_type()).unwrap();

        assert!(matches!(dispatch.accept(&advised, &echo_execute()).unwrap(), Callback::AopProxy));
        assert!(matches!(dispatch.accept(&advised, &echo_count()).unwrap(), Callback::AopProxy));
    }

    #[test]
    fn test_exposed_or_dynamic_source_invokes_through_target_path() {
        let exposed = advised(ProxyConfig::new().frozen(true).expose_proxy(true), singleton());
        let dispatch = SubclassDispatch::new(&exposed, echo_impl_type()).unwrap();
        assert!(matches!(dispatch.accept(&exposed, &echo_execute()).unwrap(), Callback::AopProxy));
        assert!(matches!(dispatch.accept(&exposed, &echo_count()).unwrap(), Callback::InvokeTarget));

        let prototype: Arc<dyn TargetSource> = Arc::new(PrototypeTargetSource::new(&echo_impl_type(), echo_factory()));
        let per_call = advised(ProxyConfig::new().frozen(true), prototype);
        let dispatch = SubclassDispatch::new(&per_call, echo_impl_type()).unwrap();
        assert!(matches!(dispatch.accept(&per_call, &echo_execute()).unwrap(), Callback::AopProxy));
        assert!(matches!(dispatch.accept(&per_call, &echo_count()).unwrap(), Callback::InvokeTarget));
    }

    #[test]
    fn test_target_defined_identity_goes_through_advice() {
        let custom = TypeInfo::builder("ValueObject").defines_equals().defines_hash().build();
        let advised = advised(ProxyConfig::new().frozen(true), singleton());
        let dispatch = SubclassDispatch::new(&advised, custom).unwrap();

        assert!(matches!(
            dispatch.accept(&advised, &MethodSignature::equals()).unwrap(),
            Callback::DispatchTarget
        ));
        assert!(matches!(
            dispatch.accept(&advised, &MethodSignature::hash_code()).unwrap(),
            Callback::DispatchTarget
        ));
    }
}
