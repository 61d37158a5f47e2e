//! 代理工厂
//!
//! 收集目标、契约类型、通知器和配置，创建 [`AopProxy`]。
//!
//! # 示例
//!
//! ```ignore
//! let proxy = ProxyFactory::for_target(service)
//!     .add_advice(Advice::before("audit", |jp: &JoinPoint| { /* ... */ Ok(()) }))
//!     .methods(service_methods())
//!     .get_proxy()?;
//! let result = proxy.invoke(&execute, vec![Arc::new("x".to_string())])?;
//! ```

use crate::adapter::AdvisorAdapterRegistry;
use crate::advice::Advice;
use crate::advised::AdvisedSupport;
use crate::advisor::{find_advisors_that_can_apply, Advisor};
use crate::chain::{AdvisorChainFactory, DefaultAdvisorChainFactory};
use crate::config::ProxyConfig;
use crate::error::{AopError, AopResult};
use crate::proxy::{AopProxy, InterfaceDispatch, ProxyDispatch, SubclassDispatch};
use crate::signature::{MethodSignature, TypeInfo, TypeRef};
use crate::target::{EmptyTargetSource, SingletonTargetSource, Target, TargetSource};
use std::sync::Arc;

/// 代理工厂
#[derive(Default)]
pub struct ProxyFactory {
    config: ProxyConfig,
    target_source: Option<Arc<dyn TargetSource>>,
    interfaces: Vec<TypeRef>,
    advisors: Vec<Advisor>,
    methods: Vec<MethodSignature>,
    registry: Option<Arc<AdvisorAdapterRegistry>>,
    chain_factory: Option<Arc<dyn AdvisorChainFactory>>,
    pre_filter: bool,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以单例目标创建工厂，并暴露目标类型实现的所有契约
    pub fn for_target(target: Arc<dyn Target>) -> Self {
        let interfaces = collect_contracts(&target.target_type());
        let mut factory = Self::new().with_target(target);
        for interface in interfaces {
            factory = factory.interface(interface);
        }
        factory
    }

    /// 设置单例目标
    pub fn with_target(self, target: Arc<dyn Target>) -> Self {
        self.target_source(Arc::new(SingletonTargetSource::new(target)))
    }

    pub fn target_source(mut self, target_source: Arc<dyn TargetSource>) -> Self {
        self.target_source = Some(target_source);
        self
    }

    /// 添加暴露的契约类型
    pub fn interface(mut self, interface: TypeRef) -> Self {
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        self
    }

    pub fn add_advisor(mut self, advisor: impl Into<Advisor>) -> Self {
        self.advisors.push(advisor.into());
        self
    }

    /// 添加对所有方法生效的通知
    pub fn add_advice(self, advice: Advice) -> Self {
        self.add_advisor(Advisor::always(advice))
    }

    /// 目标类型声明的方法，用于预先计算调用链和预过滤
    pub fn methods(mut self, methods: Vec<MethodSignature>) -> Self {
        self.methods = methods;
        self
    }

    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用自定义的通知适配器注册表
    pub fn adapter_registry(mut self, registry: Arc<AdvisorAdapterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 使用自定义的调用链工厂，优先于适配器注册表
    pub fn chain_factory(mut self, chain_factory: Arc<dyn AdvisorChainFactory>) -> Self {
        self.chain_factory = Some(chain_factory);
        self
    }

    /// 创建代理前按目标类型筛选通知器，并开启预过滤标记
    pub fn pre_filter(mut self, value: bool) -> Self {
        self.pre_filter = value;
        self
    }

    /// 创建代理
    pub fn get_proxy(self) -> AopResult<Arc<AopProxy>> {
        let target_source = self
            .target_source
            .unwrap_or_else(|| Arc::new(EmptyTargetSource::new()));
        if self.advisors.is_empty() && target_source.is_empty() {
            return Err(AopError::Configuration(
                "No advisors and no target source specified".to_string(),
            ));
        }

        let target_type = target_source.target_type();
        let mut config = self.config;
        let mut advisors = self.advisors;
        if self.pre_filter {
            match &target_type {
                Some(target_type) => {
                    let before = advisors.len();
                    advisors = find_advisors_that_can_apply(&advisors, target_type, &self.methods);
                    config = config.pre_filtered(true);
                    tracing::debug!(
                        "Pre-filtered advisors for {}: {} of {} apply",
                        target_type,
                        advisors.len(),
                        before
                    );
                }
                None => tracing::warn!("Cannot pre-filter advisors without a target type"),
            }
        }

        let chain_factory = self.chain_factory.unwrap_or_else(|| {
            let registry = self
                .registry
                .unwrap_or_else(|| Arc::new(AdvisorAdapterRegistry::new()));
            Arc::new(DefaultAdvisorChainFactory::new(registry))
        });

        let advised = Arc::new(AdvisedSupport::new(
            config,
            Arc::clone(&target_source),
            self.methods,
            chain_factory,
        ));
        for interface in self.interfaces {
            advised.add_interface(interface)?;
        }
        for advisor in advisors {
            advised.add_advisor(advisor)?;
        }

        let target_is_contract = target_type.as_ref().map_or(false, |t| t.is_contract());
        if target_is_contract && advised.interfaces().is_empty() {
            if let Some(target_type) = &target_type {
                advised.add_interface(Arc::clone(target_type))?;
            }
        }
        let use_subclass = !target_is_contract
            && (config.proxy_target_class || config.optimize || advised.interfaces().is_empty());

        if config.frozen {
            advised.freeze();
        }

        let interfaces = advised.interfaces().to_vec();
        let (dispatch, proxied_types): (Box<dyn ProxyDispatch>, Vec<TypeRef>) = if use_subclass {
            let target_type = target_type.ok_or_else(|| {
                AopError::Configuration(
                    "Target type is required for subclass proxy: neither a target nor contracts were given".to_string(),
                )
            })?;
            let dispatch = SubclassDispatch::new(&advised, Arc::clone(&target_type))?;
            let mut proxied_types = vec![target_type];
            proxied_types.extend(interfaces);
            (Box::new(dispatch), proxied_types)
        } else {
            (Box::new(InterfaceDispatch::new(&interfaces)), interfaces)
        };

        let proxy = AopProxy::new(advised, dispatch, proxied_types);
        tracing::debug!(
            "Created {:?} proxy for {} with {} advisor(s)",
            proxy.strategy(),
            target_source.name(),
            proxy.config().advisors().len()
        );
        Ok(proxy)
    }
}

/// 收集类型实现的契约，契约自己的父契约不重复收集
fn collect_contracts(target_type: &TypeInfo) -> Vec<TypeRef> {
    let mut contracts = Vec::new();
    for supertype in target_type.supertypes() {
        if supertype.is_contract() {
            if !contracts.contains(supertype) {
                contracts.push(Arc::clone(supertype));
            }
        } else {
            for contract in collect_contracts(supertype) {
                if !contracts.contains(&contract) {
                    contracts.push(contract);
                }
            }
        }
    }
    contracts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::IntroductionAdvisor;
    use crate::pointcut::{ComposablePointcut, NameMatchPointcut};
    use crate::proxy::ProxyStrategy;
    use crate::target::PrototypeTargetSource;
    use crate::test_support::*;

    fn around(name: &'static str, journal: &Journal) -> Advice {
        Advice::around(name, RecordingInterceptor::new(name, journal))
    }

    #[test]
    fn test_no_advisors_and_empty_source_is_rejected() {
        let result = ProxyFactory::new().interface(echo_type()).get_proxy();
        assert!(matches!(result, Err(AopError::Configuration(_))));
    }

    #[test]
    fn test_collects_contracts_from_target() {
        let proxy = ProxyFactory::for_target(echo_target()).get_proxy().unwrap();
        assert_eq!(proxy.strategy(), ProxyStrategy::Interface);
        let names: Vec<_> = proxy.proxied_types().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["EchoService", "Unwrap"]);
        assert!(proxy.is_instance_of(&named_type()));
        assert!(!proxy.is_instance_of(&echo_impl_type()));
    }

    #[test]
    fn test_strategy_selection() {
        let subclass = ProxyFactory::for_target(echo_target())
            .config(ProxyConfig::new().proxy_target_class(true))
            .get_proxy()
            .unwrap();
        assert_eq!(subclass.strategy(), ProxyStrategy::Subclass);
        assert!(subclass.is_instance_of(&echo_impl_type()));

        let optimized = ProxyFactory::for_target(echo_target())
            .config(ProxyConfig::new().optimize(true))
            .get_proxy()
            .unwrap();
        assert_eq!(optimized.strategy(), ProxyStrategy::Subclass);

        let no_contracts = ProxyFactory::new()
            .with_target(echo_target())
            .get_proxy()
            .unwrap();
        assert_eq!(no_contracts.strategy(), ProxyStrategy::Subclass);
    }

    #[test]
    fn test_contract_target_type_uses_interface_strategy() {
        let journal = Journal::default();
        let proxy = ProxyFactory::new()
            .target_source(Arc::new(EmptyTargetSource::for_type(&echo_type())))
            .add_advice(around("a", &journal))
            .config(ProxyConfig::new().proxy_target_class(true))
            .get_proxy()
            .unwrap();
        assert_eq!(proxy.strategy(), ProxyStrategy::Interface);
        assert!(proxy.is_instance_of(&echo_type()));
    }

    #[test]
    fn test_subclass_requires_target_type() {
        let journal = Journal::default();
        let result = ProxyFactory::new().add_advice(around("a", &journal)).get_proxy();
        assert!(matches!(result, Err(AopError::Configuration(_))));
    }

    #[test]
    fn test_frozen_config_rejects_mutation() {
        let journal = Journal::default();
        let proxy = ProxyFactory::for_target(echo_target())
            .add_advice(around("a", &journal))
            .config(ProxyConfig::new().frozen(true))
            .get_proxy()
            .unwrap();
        let advised = proxy.advised().unwrap();
        assert!(advised.is_frozen());
        assert!(matches!(
            advised.add_advisor(Advisor::always(around("b", &journal))),
            Err(AopError::Configuration(_))
        ));
    }

    #[test]
    fn test_pre_filter_drops_inapplicable_advisors() {
        let journal = Journal::default();
        let proxy = ProxyFactory::for_target(echo_target())
            .methods(echo_methods())
            .add_advisor(Advisor::with_pointcut(NameMatchPointcut::new(&["execute"]), around("hit", &journal)))
            .add_advisor(Advisor::with_pointcut(NameMatchPointcut::new(&["ship*"]), around("miss", &journal)))
            .pre_filter(true)
            .get_proxy()
            .unwrap();
        let advised = proxy.advised().unwrap();
        assert!(advised.is_pre_filtered());
        let names: Vec<_> = advised.advisors().iter().map(|a| a.advice().name().to_string()).collect();
        assert_eq!(names, vec!["hit"]);
    }

    #[test]
    fn test_pre_filter_without_methods_keeps_pointcut_advisors() {
        let journal = Journal::default();
        let proxy = ProxyFactory::for_target(echo_target())
            .add_advisor(Advisor::with_pointcut(ComposablePointcut::always(), around("all", &journal)))
            .pre_filter(true)
            .get_proxy()
            .unwrap();
        assert_eq!(proxy.advised().unwrap().advisors().len(), 1);

        proxy.invoke(&echo_execute(), string_arg("x")).unwrap();
        assert_eq!(journal.entries(), vec!["all:pre", "all:post"]);
    }

    #[test]
    fn test_introduction_exposes_contract() {
        let proxy = ProxyFactory::for_target(echo_target())
            .add_advisor(IntroductionAdvisor::delegating("audit", Arc::new(AuditDelegate), vec![auditable_type()]))
            .get_proxy()
            .unwrap();
        assert!(proxy.is_instance_of(&auditable_type()));
    }

    #[test]
    fn test_opaque_hides_configuration() {
        let proxy = ProxyFactory::for_target(echo_target())
            .config(ProxyConfig::new().opaque(true))
            .get_proxy()
            .unwrap();
        assert!(proxy.advised().is_none());
    }

    #[test]
    fn test_prototype_source() {
        let journal = Journal::default();
        let proxy = ProxyFactory::new()
            .target_source(Arc::new(PrototypeTargetSource::new(&echo_impl_type(), echo_factory())))
            .interface(echo_type())
            .add_advice(around("a", &journal))
            .get_proxy()
            .unwrap();
        // 每次调用拿到新的目标，计数总是 1
        for _ in 0..3 {
            let count = proxy.invoke(&echo_count(), Vec::new()).unwrap().unwrap();
            assert_eq!(*count.downcast_ref::<i64>().unwrap(), 1);
        }
    }
}
