//! 测试共用的目标类型和拦截器

use crate::advice::MethodInterceptor;
use crate::context::AopContext;
use crate::error::{AopError, AopResult};
use crate::joinpoint::ProceedingJoinPoint;
use crate::signature::{MethodSignature, Object, ReturnType, TypeInfo, TypeRef, RAW_TARGET_ACCESS};
use crate::target::{Target, TargetFactory};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NAMED: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("Named").contract().build());
static ECHO: Lazy<TypeRef> =
    Lazy::new(|| TypeInfo::builder("EchoService").contract().extends(&NAMED).build());
static UNWRAP: Lazy<TypeRef> =
    Lazy::new(|| TypeInfo::builder("Unwrap").contract().extends(&RAW_TARGET_ACCESS).build());
static ECHO_IMPL: Lazy<TypeRef> = Lazy::new(|| {
    TypeInfo::builder("DefaultEchoService")
        .extends(&ECHO)
        .extends(&UNWRAP)
        .build()
});
static ORDER: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("OrderService").build());
static STRING: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("String").build());
static AUDITABLE: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("Auditable").contract().build());

pub(crate) fn named_type() -> TypeRef {
    NAMED.clone()
}

pub(crate) fn echo_type() -> TypeRef {
    ECHO.clone()
}

pub(crate) fn echo_impl_type() -> TypeRef {
    ECHO_IMPL.clone()
}

pub(crate) fn order_type() -> TypeRef {
    ORDER.clone()
}

pub(crate) fn auditable_type() -> TypeRef {
    AUDITABLE.clone()
}

/// `EchoService::execute(String) -> String`，原样返回参数
pub(crate) fn echo_execute() -> MethodSignature {
    MethodSignature::new(&ECHO, "execute")
        .with_params(&["String"])
        .returns(ReturnType::Reference(STRING.clone()))
}

/// `EchoService::count() -> i64`，返回目标被调用的次数
pub(crate) fn echo_count() -> MethodSignature {
    MethodSignature::new(&ECHO, "count").returns(ReturnType::Primitive("i64"))
}

/// `EchoService::itself() -> EchoService`，返回目标自身
pub(crate) fn echo_itself() -> MethodSignature {
    MethodSignature::new(&ECHO, "itself").returns(ReturnType::Reference(ECHO.clone()))
}

/// `EchoService::as_named() -> Named`，以父契约类型返回目标自身
pub(crate) fn echo_as_named() -> MethodSignature {
    MethodSignature::new(&ECHO, "as_named").returns(ReturnType::Reference(NAMED.clone()))
}

/// `EchoService::as_object() -> Object`
pub(crate) fn echo_as_object() -> MethodSignature {
    MethodSignature::new(&ECHO, "as_object").returns(ReturnType::Any)
}

/// `Unwrap::unwrap() -> EchoService`，声明在原始目标访问类型上
pub(crate) fn echo_unwrap() -> MethodSignature {
    MethodSignature::new(&UNWRAP, "unwrap").returns(ReturnType::Reference(ECHO.clone()))
}

/// 声明了 IoFailure 的方法，总是失败
pub(crate) fn echo_risky() -> MethodSignature {
    MethodSignature::new(&ECHO, "risky").declares("IoFailure")
}

/// 未声明 IoFailure 的方法，但总是抛出 IoFailure
pub(crate) fn echo_sneaky() -> MethodSignature {
    MethodSignature::new(&ECHO, "sneaky")
}

/// 总是抛出非受检失败
pub(crate) fn echo_panicky() -> MethodSignature {
    MethodSignature::new(&ECHO, "panicky")
}

/// 在目标内部读取当前代理
pub(crate) fn echo_nested() -> MethodSignature {
    MethodSignature::new(&ECHO, "nested")
}

/// 引入的契约方法
pub(crate) fn audit_method() -> MethodSignature {
    MethodSignature::new(&AUDITABLE, "audit").returns(ReturnType::Reference(STRING.clone()))
}

pub(crate) fn echo_methods() -> Vec<MethodSignature> {
    vec![
        echo_execute(),
        echo_count(),
        echo_itself(),
        echo_as_named(),
        echo_as_object(),
        echo_unwrap(),
        echo_risky(),
        echo_sneaky(),
        echo_panicky(),
        echo_nested(),
    ]
}

pub(crate) fn string_arg(value: &str) -> Vec<Object> {
    vec![Arc::new(value.to_string())]
}

pub(crate) fn as_string(value: &Option<Object>) -> Option<String> {
    value
        .as_ref()
        .and_then(|v| v.downcast_ref::<String>())
        .cloned()
}

/// 测试用目标对象
#[derive(Default)]
pub(crate) struct EchoTarget {
    pub calls: AtomicUsize,
    pub seen_proxy: Mutex<Option<Object>>,
}

impl EchoTarget {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Target for EchoTarget {
    fn target_type(&self) -> TypeRef {
        ECHO_IMPL.clone()
    }

    fn invoke(self: Arc<Self>, method: &MethodSignature, args: &[Object]) -> AopResult<Option<Object>> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match method.name() {
            "execute" => Ok(args.first().cloned()),
            "count" => Ok(Some(Arc::new(calls as i64))),
            "itself" | "as_named" | "as_object" | "unwrap" => {
                let this: Object = self;
                Ok(Some(this))
            }
            "risky" | "sneaky" => Err(AopError::raise_checked("IoFailure", anyhow::anyhow!("disk full"))),
            "panicky" => Err(AopError::raise(anyhow::anyhow!("boom"))),
            "nested" => {
                let proxy = AopContext::current_proxy()?;
                *self.seen_proxy.lock() = Some(proxy);
                Ok(None)
            }
            other => Err(AopError::raise(anyhow::anyhow!("unknown method {}", other))),
        }
    }
}

pub(crate) fn echo_instance() -> Arc<EchoTarget> {
    Arc::new(EchoTarget::default())
}

pub(crate) fn echo_target() -> Arc<dyn Target> {
    echo_instance()
}

pub(crate) fn echo_factory() -> TargetFactory {
    Arc::new(|| -> AopResult<Arc<dyn Target>> { Ok(echo_target()) })
}

/// 引入的委托对象
pub(crate) struct AuditDelegate;

impl Target for AuditDelegate {
    fn target_type(&self) -> TypeRef {
        AUDITABLE.clone()
    }

    fn invoke(self: Arc<Self>, _method: &MethodSignature, _args: &[Object]) -> AopResult<Option<Object>> {
        Ok(Some(Arc::new("audited".to_string())))
    }
}

/// 调用记录
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// 在 proceed 前后写入调用记录的环绕拦截器
pub(crate) struct RecordingInterceptor {
    name: &'static str,
    journal: Journal,
}

impl RecordingInterceptor {
    pub fn new(name: &'static str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: journal.clone(),
        })
    }
}

impl MethodInterceptor for RecordingInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        self.journal.push(format!("{}:pre", self.name));
        let result = pjp.proceed();
        self.journal.push(format!("{}:post", self.name));
        result
    }
}

/// 不调用 proceed、直接返回空结果的拦截器
pub(crate) struct ShortCircuit;

impl MethodInterceptor for ShortCircuit {
    fn invoke(&self, _pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        Ok(None)
    }
}
