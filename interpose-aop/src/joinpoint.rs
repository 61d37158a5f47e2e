//! 连接点（JoinPoint）定义
//!
//! [`JoinPoint`] 表示一次正在进行的方法调用：目标对象、参数、声明的方法和调用链。
//! [`ProceedingJoinPoint`] 是指向调用链某个位置的游标视图，`proceed()` 从该位置继续执行。
//!
//! 游标只向前移动：每次 `proceed()` 都会为下一个位置创建新的视图，
//! 而不是修改当前视图，所以同一个拦截器可以安全地多次调用 `proceed()`。

use crate::chain::{ChainEntry, InterceptorChain};
use crate::error::{AopError, AopResult};
use crate::proxy::AopProxy;
use crate::signature::{MethodSignature, Object, TypeRef};
use crate::target::Target;
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// 调用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPhase {
    NotStarted,
    /// 正在执行调用链中指定位置的拦截器
    Running(usize),
    TargetInvoked,
    Complete,
    Failed,
}

/// 连接点信息
///
/// 每次调用创建一个，调用返回后丢弃
pub struct JoinPoint {
    proxy: Option<Weak<AopProxy>>,
    target: Option<Arc<dyn Target>>,
    method: MethodSignature,
    arguments: RefCell<Vec<Object>>,
    target_type: TypeRef,
    chain: InterceptorChain,
    phase: Cell<InvocationPhase>,
    attributes: RefCell<HashMap<String, Object>>,
    timestamp: Instant,
}

impl JoinPoint {
    /// 创建新的连接点
    ///
    /// 未提供目标类型时使用方法的声明类型。
    pub fn new(
        method: &MethodSignature,
        arguments: Vec<Object>,
        target: Option<Arc<dyn Target>>,
        target_type: Option<TypeRef>,
        chain: InterceptorChain,
    ) -> Self {
        let target_type = target_type.unwrap_or_else(|| Arc::clone(method.declaring_type()));
        Self {
            proxy: None,
            target,
            method: method.clone(),
            arguments: RefCell::new(arguments),
            target_type,
            chain,
            phase: Cell::new(InvocationPhase::NotStarted),
            attributes: RefCell::new(HashMap::new()),
            timestamp: Instant::now(),
        }
    }

    /// 关联处理此调用的代理
    pub fn with_proxy(mut self, proxy: Weak<AopProxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// 从调用链起点开始执行
    pub fn invoke(&self) -> AopResult<Option<Object>> {
        ProceedingJoinPoint {
            join_point: self,
            index: 0,
        }
        .proceed()
    }

    /// 获取方法签名
    pub fn method(&self) -> &MethodSignature {
        &self.method
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        self.method.signature()
    }

    /// 获取当前参数
    pub fn arguments(&self) -> Ref<'_, Vec<Object>> {
        self.arguments.borrow()
    }

    /// 尝试按类型获取参数
    pub fn argument<T: Send + Sync + 'static>(&self, index: usize) -> Option<Arc<T>> {
        let arg = self.arguments.borrow().get(index).cloned()?;
        arg.downcast::<T>().ok()
    }

    /// 替换参数，后续拦截器和目标方法看到新的参数
    pub fn set_arguments(&self, arguments: Vec<Object>) {
        *self.arguments.borrow_mut() = arguments;
    }

    /// 获取目标对象，空目标来源时为 `None`
    pub fn target(&self) -> Option<&Arc<dyn Target>> {
        self.target.as_ref()
    }

    /// 获取有效的目标类型
    pub fn target_type(&self) -> &TypeRef {
        &self.target_type
    }

    /// 获取处理此调用的代理
    pub fn this(&self) -> Option<Arc<AopProxy>> {
        self.proxy.as_ref().and_then(Weak::upgrade)
    }

    /// 调用链长度
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn phase(&self) -> InvocationPhase {
        self.phase.get()
    }

    /// 获取调用时间戳
    pub fn timestamp(&self) -> &Instant {
        &self.timestamp
    }

    /// 设置调用范围内的属性
    pub fn set_attribute(&self, name: impl Into<String>, value: Object) {
        self.attributes.borrow_mut().insert(name.into(), value);
    }

    /// 获取调用范围内的属性
    pub fn attribute(&self, name: &str) -> Option<Object> {
        self.attributes.borrow().get(name).cloned()
    }

    fn proceed_from(&self, start: usize) -> AopResult<Option<Object>> {
        let mut index = start;
        while let Some(entry) = self.chain.get(index) {
            let next = ProceedingJoinPoint {
                join_point: self,
                index: index + 1,
            };
            match entry {
                ChainEntry::Static(interceptor) => {
                    self.phase.set(InvocationPhase::Running(index));
                    return self.settle(interceptor.invoke(&next));
                }
                ChainEntry::Dynamic { interceptor, matcher } => {
                    let matched = {
                        let arguments = self.arguments.borrow();
                        matcher.matches_runtime(&self.method, &self.target_type, &arguments)
                    };
                    if matched {
                        self.phase.set(InvocationPhase::Running(index));
                        return self.settle(interceptor.invoke(&next));
                    }
                    tracing::trace!(
                        "Dynamic matcher rejected {} at chain position {}, skipping",
                        self.method,
                        index
                    );
                    index += 1;
                }
            }
        }
        self.invoke_target()
    }

    fn invoke_target(&self) -> AopResult<Option<Object>> {
        let target = match self.target.clone() {
            Some(target) => target,
            None => {
                return self.settle(Err(AopError::NoTarget {
                    method: self.method.signature(),
                }))
            }
        };
        self.phase.set(InvocationPhase::TargetInvoked);
        let arguments = self.arguments.borrow().clone();
        self.settle(target.invoke(&self.method, &arguments))
    }

    /// 按结果结束当前层，外层返回时会覆盖内层的状态
    fn settle(&self, result: AopResult<Option<Object>>) -> AopResult<Option<Object>> {
        self.phase.set(if result.is_ok() {
            InvocationPhase::Complete
        } else {
            InvocationPhase::Failed
        });
        result
    }

    /// 把方法未声明的受检失败包装为 [`AopError::Undeclared`]
    ///
    /// 已包装的错误不会被再次包装。
    pub fn translate(&self, result: AopResult<Option<Object>>) -> AopResult<Option<Object>> {
        translate_undeclared(&self.method, result)
    }
}

/// 把方法未声明的受检失败包装为 [`AopError::Undeclared`]
pub fn translate_undeclared<T>(method: &MethodSignature, result: AopResult<T>) -> AopResult<T> {
    match result {
        Err(AopError::Raised(failure))
            if failure
                .checked_kind()
                .map_or(false, |kind| !method.declares_failure(kind)) =>
        {
            Err(AopError::Undeclared {
                method: method.signature(),
                failure,
            })
        }
        other => other,
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("target_type", &self.target_type.name())
            .field("chain_len", &self.chain.len())
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 环绕通知的执行链
///
/// 允许拦截器控制是否继续执行目标方法
#[derive(Clone, Copy)]
pub struct ProceedingJoinPoint<'a> {
    join_point: &'a JoinPoint,
    index: usize,
}

impl<'a> ProceedingJoinPoint<'a> {
    /// 继续执行剩余的调用链，链尾执行目标方法
    ///
    /// 可以调用任意次。
    pub fn proceed(&self) -> AopResult<Option<Object>> {
        let result = self.join_point.proceed_from(self.index);
        self.join_point.translate(result)
    }

    /// 获取连接点信息
    pub fn join_point(&self) -> &'a JoinPoint {
        self.join_point
    }

    /// 下一个要执行的调用链位置
    pub fn position(&self) -> usize {
        self.index
    }
}

impl Deref for ProceedingJoinPoint<'_> {
    type Target = JoinPoint;

    fn deref(&self) -> &JoinPoint {
        self.join_point
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", &self.join_point)
            .field("position", &self.index)
            .finish()
    }
}
