//! 代理对象与共享的调用分派
//!
//! 两种代理策略（契约代理和子类代理）只在调用如何到达分派入口上不同，
//! 身份方法的处理、当前代理暴露、目标获取与释放、返回值处理都在这里统一实现。

mod identity;
mod interface;
mod subclass;

pub use identity::{equals_in_proxy, proxy_hash_code};
pub use interface::InterfaceDispatch;
pub use subclass::{Callback, SubclassDispatch};

use crate::advised::AdvisedSupport;
use crate::chain::InterceptorChain;
use crate::context::AopContext;
use crate::error::{AopError, AopResult};
use crate::joinpoint::{translate_undeclared, JoinPoint};
use crate::signature::{same_instance, MethodSignature, Object, ReturnType, TypeInfo, TypeRef};
use crate::target::Target;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// 代理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyStrategy {
    /// 实现一组契约类型
    Interface,
    /// 生成目标类型的子类
    Subclass,
}

/// 代理分派接口
///
/// 每种代理策略实现一次，把到达代理的调用送入共享的调用流程。
pub trait ProxyDispatch: Send + Sync {
    fn strategy(&self) -> ProxyStrategy;

    fn resolve_and_invoke(&self, proxy: &AopProxy, method: &MethodSignature, args: Vec<Object>) -> AopResult<Option<Object>>;
}

/// 代理对象
pub struct AopProxy {
    advised: Arc<AdvisedSupport>,
    dispatch: Box<dyn ProxyDispatch>,
    proxied_types: Vec<TypeRef>,
    this: Weak<AopProxy>,
}

impl AopProxy {
    /// 创建代理
    ///
    /// `proxied_types` 是代理对象可以赋给的类型，用于契约检查和返回值处理。
    pub(crate) fn new(
        advised: Arc<AdvisedSupport>,
        dispatch: Box<dyn ProxyDispatch>,
        proxied_types: Vec<TypeRef>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            advised,
            dispatch,
            proxied_types,
            this: this.clone(),
        })
    }

    /// 调用代理上的方法
    pub fn invoke(&self, method: &MethodSignature, args: Vec<Object>) -> AopResult<Option<Object>> {
        tracing::trace!("Proxy ({:?}) dispatching {}", self.strategy(), method);
        self.dispatch.resolve_and_invoke(self, method, args)
    }

    /// 获取代理配置，不透明代理返回 `None`
    pub fn advised(&self) -> Option<&Arc<AdvisedSupport>> {
        (!self.advised.is_opaque()).then_some(&self.advised)
    }

    pub fn strategy(&self) -> ProxyStrategy {
        self.dispatch.strategy()
    }

    /// 代理对象可以赋给的类型
    pub fn proxied_types(&self) -> &[TypeRef] {
        &self.proxied_types
    }

    /// 代理对象能否赋给给定类型
    pub fn is_instance_of(&self, ty: &TypeInfo) -> bool {
        ty.is_object() || self.proxied_types.iter().any(|t| t.is_assignable_to(ty))
    }

    /// 以通用对象的形式获取代理自身
    pub fn as_object(&self) -> Option<Object> {
        self.this.upgrade().map(|proxy| proxy as Object)
    }

    /// 代理相等性：同一个代理，或者配置等价的另一个代理
    pub fn equals(&self, other: Option<&Object>) -> bool {
        match other {
            Some(other) => match other.downcast_ref::<AopProxy>() {
                Some(other) => std::ptr::eq(self, other) || equals_in_proxy(&self.advised, &other.advised),
                None => false,
            },
            None => false,
        }
    }

    /// 代理哈希，由固定种子和目标来源身份组成
    pub fn identity_hash(&self) -> u64 {
        proxy_hash_code(&self.advised)
    }

    pub(crate) fn config(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    pub(crate) fn weak(&self) -> Weak<AopProxy> {
        self.this.clone()
    }
}

impl PartialEq for AopProxy {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || equals_in_proxy(&self.advised, &other.advised)
    }
}

impl Eq for AopProxy {}

impl Hash for AopProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_hash().hash(state);
    }
}

impl fmt::Debug for AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("strategy", &self.strategy())
            .field(
                "proxied_types",
                &self.proxied_types.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("advised", &self.advised)
            .finish()
    }
}

/// 处理身份相关方法
///
/// 返回 `None` 表示方法需要走普通调用流程。
pub(crate) fn invoke_identity_method(
    proxy: &AopProxy,
    method: &MethodSignature,
    args: &[Object],
    equals_defined: bool,
    hash_defined: bool,
) -> Option<AopResult<Option<Object>>> {
    use crate::signature::MethodKind;

    match method.kind() {
        MethodKind::Equals if !equals_defined => {
            let equal = proxy.equals(args.first());
            Some(Ok(Some(Arc::new(equal))))
        }
        MethodKind::HashCode if !hash_defined => Some(Ok(Some(Arc::new(proxy.identity_hash())))),
        MethodKind::Finalize => {
            tracing::trace!("Ignoring finalize on proxy");
            Some(Ok(None))
        }
        _ => None,
    }
}

/// 共享的调用流程
///
/// 依次完成：暴露当前代理、解析调用链、获取目标、执行、处理返回值、释放目标。
/// 传入 `fixed_chain` 时跳过调用链解析。
pub(crate) fn invoke_advised(
    proxy: &AopProxy,
    method: &MethodSignature,
    args: Vec<Object>,
    fixed_chain: Option<InterceptorChain>,
) -> AopResult<Option<Object>> {
    let advised = proxy.config();
    let source = advised.target_source();

    let _exposure = advised
        .expose_proxy()
        .then(|| AopContext::expose(proxy.as_object()));

    let target_type = source.target_type();
    let chain = match fixed_chain {
        Some(chain) => chain,
        None => advised.chain_for(method, target_type.as_ref())?,
    };

    // 调用链确定之后再获取目标，缩短池化目标的占用时间
    let target = source.get_target()?;

    let outcome = if chain.is_empty() {
        tracing::trace!("No interceptors for {}, invoking target directly", method);
        match &target {
            Some(target) => translate_undeclared(method, Arc::clone(target).invoke(method, &args)),
            None => Err(AopError::NoTarget {
                method: method.signature(),
            }),
        }
    } else {
        JoinPoint::new(method, args, target.clone(), target_type, chain)
            .with_proxy(proxy.weak())
            .invoke()
    }
    .and_then(|result| process_return(proxy, method, result, target.as_ref()));

    if let Some(target) = target {
        if !source.is_static() {
            if let Err(release_error) = source.release_target(target) {
                tracing::error!(
                    "Failed to release target from {} after {}: {}",
                    source.name(),
                    method,
                    release_error
                );
                if outcome.is_ok() {
                    return Err(release_error);
                }
            }
        }
    }

    outcome
}

/// 返回值处理
///
/// 目标返回自身时替换为代理；基本类型方法拿到空结果时报错。
pub(crate) fn process_return(
    proxy: &AopProxy,
    method: &MethodSignature,
    result: Option<Object>,
    target: Option<&Arc<dyn Target>>,
) -> AopResult<Option<Object>> {
    match result {
        Some(value) => {
            let returns_target = target.map_or(false, |t| same_instance(&value, t));
            if returns_target && rewrites_to_proxy(proxy, method) {
                tracing::trace!("Replacing target returned from {} with its proxy", method);
                return Ok(proxy.as_object().or(Some(value)));
            }
            Ok(Some(value))
        }
        None => match method.return_type() {
            ReturnType::Primitive(return_type) => Err(AopError::Invocation {
                method: method.signature(),
                return_type: *return_type,
            }),
            _ => Ok(None),
        },
    }
}

fn rewrites_to_proxy(proxy: &AopProxy, method: &MethodSignature) -> bool {
    match method.return_type() {
        ReturnType::Reference(ty) => {
            !ty.is_object() && !method.declaring_type().is_raw_target_access() && proxy.is_instance_of(ty)
        }
        _ => false,
    }
}
