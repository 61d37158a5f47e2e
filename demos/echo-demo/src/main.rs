use interpose_aop::prelude::*;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ==================== 类型定义 ====================

static GREETER: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("Greeter").contract().build());

static FRIENDLY_GREETER: Lazy<TypeRef> =
    Lazy::new(|| TypeInfo::builder("FriendlyGreeter").extends(&GREETER).build());

static STRING: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("String").build());

static AUDITABLE: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("Auditable").contract().build());

fn greet() -> MethodSignature {
    MethodSignature::new(&GREETER, "greet")
        .with_params(&["String"])
        .returns(ReturnType::Reference(STRING.clone()))
}

fn flaky_greet() -> MethodSignature {
    MethodSignature::new(&GREETER, "flaky_greet")
        .with_params(&["String"])
        .returns(ReturnType::Reference(STRING.clone()))
}

fn greeting_count() -> MethodSignature {
    MethodSignature::new(&GREETER, "greeting_count").returns(ReturnType::Primitive("usize"))
}

fn polite() -> MethodSignature {
    MethodSignature::new(&GREETER, "polite").returns(ReturnType::Reference(GREETER.clone()))
}

fn audit() -> MethodSignature {
    MethodSignature::new(&AUDITABLE, "audit").returns(ReturnType::Reference(STRING.clone()))
}

// ==================== 目标对象 ====================

#[derive(Default)]
struct FriendlyGreeter {
    greetings: AtomicUsize,
    flaky_calls: AtomicUsize,
}

impl Target for FriendlyGreeter {
    fn target_type(&self) -> TypeRef {
        FRIENDLY_GREETER.clone()
    }

    fn invoke(self: Arc<Self>, method: &MethodSignature, args: &[Object]) -> AopResult<Option<Object>> {
        let name = args
            .first()
            .and_then(|a| a.downcast_ref::<String>())
            .cloned()
            .unwrap_or_else(|| "stranger".to_string());

        match method.name() {
            "greet" => {
                self.greetings.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Arc::new(format!("Hello, {}!", name))))
            }
            "flaky_greet" => {
                if self.flaky_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(AopError::raise(anyhow::anyhow!("greeting service is warming up")));
                }
                self.greetings.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Arc::new(format!("Hello at last, {}!", name))))
            }
            "greeting_count" => Ok(Some(Arc::new(self.greetings.load(Ordering::SeqCst)))),
            "polite" => {
                // 嵌套代码可以拿到处理当前调用的代理
                let proxy = AopContext::current::<AopProxy>()?;
                tracing::info!("polite() running behind {:?} proxy", proxy.strategy());
                let this: Object = self;
                Ok(Some(this))
            }
            other => Err(AopError::raise(anyhow::anyhow!("FriendlyGreeter has no method {}", other))),
        }
    }
}

struct AuditLog;

impl Target for AuditLog {
    fn target_type(&self) -> TypeRef {
        AUDITABLE.clone()
    }

    fn invoke(self: Arc<Self>, _method: &MethodSignature, _args: &[Object]) -> AopResult<Option<Object>> {
        Ok(Some(Arc::new("all greetings were polite".to_string())))
    }
}

fn as_text(value: &Option<Object>) -> String {
    value
        .as_ref()
        .and_then(|v| v.downcast_ref::<String>())
        .cloned()
        .unwrap_or_default()
}

// ==================== 主程序 ====================

const PROXY_CONFIG: &str = r#"
[proxy]
expose_proxy = true
frozen = true
"#;

fn main() -> anyhow::Result<()> {
    LoggingConfig::from_env().init()?;

    println!("🚀 Interpose AOP demo\n");

    let config = ProxyConfig::from_toml_str(PROXY_CONFIG)?.with_env_overrides();
    let target = Arc::new(FriendlyGreeter::default());

    let before = Advice::before("announce", |jp: &JoinPoint| -> AopResult<()> {
        tracing::info!("About to call {}", jp.signature());
        Ok(())
    });

    let proxy = ProxyFactory::for_target(target.clone())
        .config(config)
        .methods(vec![greet(), flaky_greet(), greeting_count(), polite()])
        .add_advisor(Advisor::with_pointcut(
            ExpressionPointcut::execution("* Greeter.*greet(..)"),
            before,
        ))
        .add_advice(Advice::around("logging", Arc::new(LoggingInterceptor::new().with_args())))
        .add_advisor(Advisor::with_pointcut(
            NameMatchPointcut::new(&["flaky_*"]),
            Advice::around("retry", Arc::new(RetryInterceptor::new(3))),
        ))
        .add_advice(Advice::around(
            "performance",
            Arc::new(PerformanceInterceptor::new(Duration::from_millis(5))),
        ))
        .add_advisor(IntroductionAdvisor::delegating(
            "audit",
            Arc::new(AuditLog),
            vec![AUDITABLE.clone()],
        ))
        .get_proxy()?;

    println!("📦 Proxy strategy: {:?}", proxy.strategy());

    let greeting = proxy.invoke(&greet(), vec![Arc::new("Ada".to_string())])?;
    println!("👋 {}", as_text(&greeting));

    let retried = proxy.invoke(&flaky_greet(), vec![Arc::new("Grace".to_string())])?;
    println!("🔁 {}", as_text(&retried));

    let count = proxy.invoke(&greeting_count(), Vec::new())?;
    if let Some(count) = count.as_ref().and_then(|c| c.downcast_ref::<usize>()) {
        println!("🔢 Greetings so far: {}", count);
    }

    let same = proxy.invoke(&polite(), Vec::new())?;
    let returned_proxy = same.as_ref().map_or(false, |s| s.downcast_ref::<AopProxy>().is_some());
    println!("🪞 polite() returned the proxy itself: {}", returned_proxy);

    let audited = proxy.invoke(&audit(), Vec::new())?;
    println!("📝 Audit: {}", as_text(&audited));

    println!("\n✅ Target received {} greeting(s)", target.greetings.load(Ordering::SeqCst));
    Ok(())
}
