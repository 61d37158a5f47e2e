//! 目标对象与目标来源
//!
//! [`TargetSource`] 负责在每次调用时获取和释放真正接收调用的目标对象。
//! 静态来源（单例）每次返回同一个实例且不需要释放；非静态来源（原型、池化）
//! 每次调用都要获取并在调用结束后释放。

use crate::error::{AopError, AopResult};
use crate::signature::{instance_address, MethodSignature, Object, TypeRef};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 目标对象
///
/// 由于没有运行时反射，目标对象自己负责把方法签名分派到具体实现上。
/// 返回 `Some(self)` 表示方法返回了目标自身。
pub trait Target: Any + Send + Sync {
    /// 目标对象的运行时类型
    fn target_type(&self) -> TypeRef;

    /// 在目标对象上执行方法
    fn invoke(self: Arc<Self>, method: &MethodSignature, args: &[Object]) -> AopResult<Option<Object>>;
}

/// 目标对象工厂
pub type TargetFactory = Arc<dyn Fn() -> AopResult<Arc<dyn Target>> + Send + Sync>;

/// 目标来源
pub trait TargetSource: Send + Sync {
    /// 来源名称，用于日志和错误信息
    fn name(&self) -> &str;

    /// 目标类型，未知时返回 `None`
    fn target_type(&self) -> Option<TypeRef>;

    /// 是否每次都返回同一个目标对象
    fn is_static(&self) -> bool;

    /// 获取目标对象
    fn get_target(&self) -> AopResult<Option<Arc<dyn Target>>>;

    /// 释放目标对象
    fn release_target(&self, target: Arc<dyn Target>) -> AopResult<()>;

    /// 是否是空来源（没有任何目标对象）
    fn is_empty(&self) -> bool {
        false
    }

    /// 来源身份，用于代理的相等性与哈希
    fn identity(&self) -> usize {
        self as *const Self as *const () as usize
    }
}

/// 单例目标来源
pub struct SingletonTargetSource {
    target: Arc<dyn Target>,
}

impl SingletonTargetSource {
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self { target }
    }
}

impl TargetSource for SingletonTargetSource {
    fn name(&self) -> &str {
        "SingletonTargetSource"
    }

    fn target_type(&self) -> Option<TypeRef> {
        Some(self.target.target_type())
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Target>>> {
        Ok(Some(Arc::clone(&self.target)))
    }

    fn release_target(&self, _target: Arc<dyn Target>) -> AopResult<()> {
        Ok(())
    }

    // 两个包装同一实例的单例来源视为同一个来源
    fn identity(&self) -> usize {
        instance_address(&self.target)
    }
}

impl fmt::Debug for SingletonTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonTargetSource")
            .field("target_type", &self.target.target_type().name())
            .finish()
    }
}

/// 空目标来源
///
/// 只包含引入（introduction）或完全由拦截器实现的代理使用。
#[derive(Debug, Default)]
pub struct EmptyTargetSource {
    target_type: Option<TypeRef>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带目标类型的空来源
    pub fn for_type(target_type: &TypeRef) -> Self {
        Self {
            target_type: Some(Arc::clone(target_type)),
        }
    }
}

impl TargetSource for EmptyTargetSource {
    fn name(&self) -> &str {
        "EmptyTargetSource"
    }

    fn target_type(&self) -> Option<TypeRef> {
        self.target_type.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Target>>> {
        Ok(None)
    }

    fn release_target(&self, _target: Arc<dyn Target>) -> AopResult<()> {
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.target_type.is_none()
    }
}

/// 原型目标来源：每次调用创建新的目标对象
pub struct PrototypeTargetSource {
    target_type: TypeRef,
    factory: TargetFactory,
}

impl PrototypeTargetSource {
    pub fn new(target_type: &TypeRef, factory: TargetFactory) -> Self {
        Self {
            target_type: Arc::clone(target_type),
            factory,
        }
    }
}

impl TargetSource for PrototypeTargetSource {
    fn name(&self) -> &str {
        "PrototypeTargetSource"
    }

    fn target_type(&self) -> Option<TypeRef> {
        Some(Arc::clone(&self.target_type))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Target>>> {
        (self.factory)().map(Some)
    }

    fn release_target(&self, _target: Arc<dyn Target>) -> AopResult<()> {
        tracing::trace!("Releasing prototype target of type {}", self.target_type);
        Ok(())
    }
}

/// 池化目标来源
///
/// 池中最多同时借出 `max_size` 个目标对象，空闲对象在归还后复用。
pub struct PooledTargetSource {
    target_type: TypeRef,
    factory: TargetFactory,
    max_size: usize,
    idle: Mutex<Vec<Arc<dyn Target>>>,
    active: AtomicUsize,
}

impl PooledTargetSource {
    pub fn new(target_type: &TypeRef, max_size: usize, factory: TargetFactory) -> Self {
        Self {
            target_type: Arc::clone(target_type),
            factory,
            max_size,
            idle: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
        }
    }

    /// 当前借出的目标数量
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// 当前空闲的目标数量
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn try_reserve(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.max_size).then_some(active + 1)
            })
            .is_ok()
    }
}

impl TargetSource for PooledTargetSource {
    fn name(&self) -> &str {
        "PooledTargetSource"
    }

    fn target_type(&self) -> Option<TypeRef> {
        Some(Arc::clone(&self.target_type))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Target>>> {
        if !self.try_reserve() {
            return Err(AopError::TargetUnavailable {
                source_name: self.name().to_string(),
                reason: format!("pool exhausted (max size {})", self.max_size),
            });
        }

        if let Some(target) = self.idle.lock().pop() {
            return Ok(Some(target));
        }

        match (self.factory)() {
            Ok(target) => Ok(Some(target)),
            Err(e) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn release_target(&self, target: Arc<dyn Target>) -> AopResult<()> {
        self.idle.lock().push(target);
        self.active.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }
}
