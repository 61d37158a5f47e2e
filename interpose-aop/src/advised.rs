//! 代理配置持有者
//!
//! [`AdvisedSupport`] 保存一个代理的目标来源、暴露的契约类型和通知器列表。
//! 未冻结时通知器可以增删，读取经过读写锁；冻结后通知器和契约类型被快照，
//! 之后的读取不再加锁，调用链也只有在冻结后才会被缓存。冻结不可撤销。

use crate::advisor::Advisor;
use crate::cache::{ChainCache, ChainKey};
use crate::chain::{AdvisorChainFactory, InterceptorChain};
use crate::config::ProxyConfig;
use crate::error::{AopError, AopResult};
use crate::signature::{MethodSignature, TypeRef};
use crate::target::TargetSource;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

struct FrozenState {
    advisors: Arc<[Advisor]>,
    interfaces: Arc<[TypeRef]>,
}

/// 代理配置
pub struct AdvisedSupport {
    config: ProxyConfig,
    target_source: Arc<dyn TargetSource>,
    methods: Vec<MethodSignature>,
    advisors: RwLock<Arc<[Advisor]>>,
    interfaces: RwLock<Arc<[TypeRef]>>,
    frozen: OnceCell<FrozenState>,
    chain_factory: Arc<dyn AdvisorChainFactory>,
    cache: ChainCache,
}

impl AdvisedSupport {
    /// 创建未冻结的配置
    ///
    /// `config.frozen` 只在 [`ProxyFactory`](crate::ProxyFactory) 组装完成后生效。
    pub fn new(
        config: ProxyConfig,
        target_source: Arc<dyn TargetSource>,
        methods: Vec<MethodSignature>,
        chain_factory: Arc<dyn AdvisorChainFactory>,
    ) -> Self {
        Self {
            config,
            target_source,
            methods,
            advisors: RwLock::new(Arc::from(Vec::new())),
            interfaces: RwLock::new(Arc::from(Vec::new())),
            frozen: OnceCell::new(),
            chain_factory,
            cache: ChainCache::new(),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn target_source(&self) -> &Arc<dyn TargetSource> {
        &self.target_source
    }

    /// 目标类型
    pub fn target_type(&self) -> Option<TypeRef> {
        self.target_source.target_type()
    }

    /// 目标类型声明的方法
    pub fn declared_methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    pub fn expose_proxy(&self) -> bool {
        self.config.expose_proxy
    }

    pub fn is_opaque(&self) -> bool {
        self.config.opaque
    }

    pub fn is_pre_filtered(&self) -> bool {
        self.config.pre_filtered
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// 冻结配置，之后不能再增删通知器或契约类型
    pub fn freeze(&self) {
        // 持有写锁快照，与正在进行的修改互斥
        let advisors = self.advisors.write();
        let interfaces = self.interfaces.write();
        let mut first = false;
        self.frozen.get_or_init(|| {
            first = true;
            FrozenState {
                advisors: advisors.clone(),
                interfaces: interfaces.clone(),
            }
        });
        drop(interfaces);
        drop(advisors);
        if first {
            self.cache.clear();
            tracing::debug!("Proxy configuration frozen with {} advisor(s)", self.advisors().len());
        }
    }

    /// 当前的通知器列表
    pub fn advisors(&self) -> Arc<[Advisor]> {
        match self.frozen.get() {
            Some(state) => Arc::clone(&state.advisors),
            None => self.advisors.read().clone(),
        }
    }

    /// 代理暴露的契约类型，包括引入的契约
    pub fn interfaces(&self) -> Arc<[TypeRef]> {
        match self.frozen.get() {
            Some(state) => Arc::clone(&state.interfaces),
            None => self.interfaces.read().clone(),
        }
    }

    /// 是否暴露了给定契约类型
    pub fn is_interface_proxied(&self, interface: &TypeRef) -> bool {
        self.interfaces().iter().any(|i| i.is_assignable_to(interface))
    }

    /// 添加契约类型，已存在时忽略
    pub fn add_interface(&self, interface: TypeRef) -> AopResult<()> {
        let mut interfaces = self.interfaces.write();
        self.ensure_mutable("add interface")?;
        push_interface(&mut interfaces, interface);
        Ok(())
    }

    /// 在末尾添加通知器
    pub fn add_advisor(&self, advisor: Advisor) -> AopResult<()> {
        self.insert_advisor(None, advisor)
    }

    /// 在指定位置添加通知器
    ///
    /// 引入通知器的契约类型会加入代理暴露的契约类型。位置非法时配置保持不变。
    pub fn add_advisor_at(&self, position: usize, advisor: Advisor) -> AopResult<()> {
        self.insert_advisor(Some(position), advisor)
    }

    /// 移除指定位置的通知器
    pub fn remove_advisor(&self, index: usize) -> AopResult<Advisor> {
        let mut advisors = self.advisors.write();
        self.ensure_mutable("remove advisor")?;
        if index >= advisors.len() {
            return Err(AopError::Configuration(format!(
                "Advisor index {} is out of bounds: only {} advisor(s) configured",
                index,
                advisors.len()
            )));
        }
        let mut updated = advisors.to_vec();
        let removed = updated.remove(index);
        *advisors = updated.into();
        Ok(removed)
    }

    fn insert_advisor(&self, position: Option<usize>, advisor: Advisor) -> AopResult<()> {
        let mut advisors = self.advisors.write();
        self.ensure_mutable("add advisor")?;
        let position = position.unwrap_or(advisors.len());
        if position > advisors.len() {
            return Err(AopError::Configuration(format!(
                "Illegal advisor position {}: only {} advisor(s) configured",
                position,
                advisors.len()
            )));
        }

        if let Advisor::Introduction(introduction) = &advisor {
            let mut interfaces = self.interfaces.write();
            for interface in introduction.interfaces() {
                push_interface(&mut interfaces, Arc::clone(interface));
            }
        }

        tracing::debug!("Adding advisor {:?} at position {}", advisor, position);
        let mut updated = advisors.to_vec();
        updated.insert(position, advisor);
        *advisors = updated.into();
        Ok(())
    }

    /// 获取一次调用的调用链
    ///
    /// 只有冻结后才使用缓存。
    pub fn chain_for(&self, method: &MethodSignature, target_type: Option<&TypeRef>) -> AopResult<InterceptorChain> {
        match self.frozen.get() {
            Some(state) => self.cache.get_or_build(ChainKey::new(method, target_type), || {
                self.build_chain(&state.advisors, method, target_type)
            }),
            None => {
                let advisors = self.advisors();
                self.build_chain(&advisors, method, target_type)
            }
        }
    }

    /// 为目标类型声明的所有方法预先计算调用链并写入缓存
    ///
    /// 只对冻结的配置有效，返回预先计算的调用链。
    pub fn precompute_chains(&self) -> AopResult<Vec<(MethodSignature, InterceptorChain)>> {
        if !self.is_frozen() {
            return Ok(Vec::new());
        }
        let target_type = self.target_type();
        self.methods
            .iter()
            .map(|method| {
                self.chain_for(method, target_type.as_ref())
                    .map(|chain| (method.clone(), chain))
            })
            .collect()
    }

    /// 缓存的调用链数量
    pub fn cached_chain_count(&self) -> usize {
        self.cache.len()
    }

    fn build_chain(
        &self,
        advisors: &[Advisor],
        method: &MethodSignature,
        target_type: Option<&TypeRef>,
    ) -> AopResult<InterceptorChain> {
        self.chain_factory
            .build_chain(advisors, self.config.pre_filtered, method, target_type)
            .map(InterceptorChain::from)
    }

    fn ensure_mutable(&self, action: &str) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::Configuration(format!(
                "Cannot {}: proxy configuration is frozen",
                action
            )));
        }
        Ok(())
    }
}

fn push_interface(interfaces: &mut Arc<[TypeRef]>, interface: TypeRef) {
    if interfaces.iter().any(|i| i == &interface) {
        return;
    }
    let mut updated = interfaces.to_vec();
    updated.push(interface);
    *interfaces = updated.into();
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisedSupport")
            .field("config", &self.config)
            .field("target_source", &self.target_source.name())
            .field(
                "interfaces",
                &self.interfaces().iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("advisors", &self.advisors())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
