//! 匹配原语：类型过滤器与方法匹配器
//!
//! 两者都是无状态的纯谓词。静态方法匹配器对同一 (方法, 类型) 总是返回相同结果，
//! 可以安全缓存；运行时匹配器（`is_runtime() == true`）在每次调用时还要用实际参数复查。

use crate::signature::{MethodSignature, Object, TypeInfo, TypeRef};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// 类型过滤器
pub trait ClassFilter: Send + Sync {
    /// 切点是否可能作用于给定类型
    fn matches(&self, target_type: &TypeInfo) -> bool;
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配：只看方法签名和目标类型
    fn matches(&self, method: &MethodSignature, target_type: &TypeInfo) -> bool;

    /// 是否需要在每次调用时用实际参数复查
    fn is_runtime(&self) -> bool {
        false
    }

    /// 运行时匹配，仅在静态匹配通过且 `is_runtime()` 为 true 时调用
    fn matches_runtime(&self, _method: &MethodSignature, _target_type: &TypeInfo, _args: &[Object]) -> bool {
        true
    }

    /// 是否对任何方法都匹配，预过滤时可以跳过逐个方法的判断
    fn matches_all(&self) -> bool {
        false
    }

    /// 如果匹配器关心引入，返回对应视图
    fn as_introduction_aware(&self) -> Option<&dyn IntroductionAwareMethodMatcher> {
        None
    }
}

/// 感知引入的方法匹配器
///
/// 构建调用链时会告诉它当前代理上是否有任何引入通知生效，
/// 以便它对引入的方法做特殊处理。
pub trait IntroductionAwareMethodMatcher: MethodMatcher {
    fn matches_with_introductions(
        &self,
        method: &MethodSignature,
        target_type: &TypeInfo,
        has_introductions: bool,
    ) -> bool;
}

/// 简单的通配符模式（支持 * 通配符）
///
/// 支持的模式：
/// - `*` - 匹配任意字符串
/// - `User*` - 以 User 开头
/// - `*Service` - 以 Service 结尾
/// - `*Service*` - 包含 Service
#[derive(Clone)]
pub struct WildcardPattern {
    raw: String,
    regex: Option<Regex>,
}

impl WildcardPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let regex = if raw != "*" && raw.contains('*') {
            let escaped: Vec<String> = raw.split('*').map(regex::escape).collect();
            Regex::new(&format!("^{}$", escaped.join(".*"))).ok()
        } else {
            None
        };
        Self { raw, regex }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, target: &str) -> bool {
        if self.raw == "*" {
            return true;
        }
        match &self.regex {
            Some(regex) => regex.is_match(target),
            None => self.raw == target,
        }
    }
}

impl fmt::Debug for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// 总是匹配的类型过滤器
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _target_type: &TypeInfo) -> bool {
        true
    }
}

/// 按类型名称通配符过滤
#[derive(Debug, Clone)]
pub struct TypeNameFilter {
    pattern: WildcardPattern,
}

impl TypeNameFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: WildcardPattern::new(pattern),
        }
    }
}

impl ClassFilter for TypeNameFilter {
    fn matches(&self, target_type: &TypeInfo) -> bool {
        self.pattern.matches(target_type.name())
    }
}

/// 匹配给定根类型及其所有子类型
#[derive(Debug, Clone)]
pub struct RootTypeFilter {
    root: TypeRef,
}

impl RootTypeFilter {
    pub fn new(root: &TypeRef) -> Self {
        Self {
            root: Arc::clone(root),
        }
    }
}

impl ClassFilter for RootTypeFilter {
    fn matches(&self, target_type: &TypeInfo) -> bool {
        target_type.is_assignable_to(&self.root)
    }
}

/// 自定义类型过滤函数
pub struct FnClassFilter(Arc<dyn Fn(&TypeInfo) -> bool + Send + Sync>);

impl FnClassFilter {
    pub fn new(filter: impl Fn(&TypeInfo) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(filter))
    }
}

impl ClassFilter for FnClassFilter {
    fn matches(&self, target_type: &TypeInfo) -> bool {
        (self.0)(target_type)
    }
}

/// 总是匹配的方法匹配器
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &MethodSignature, _target_type: &TypeInfo) -> bool {
        true
    }

    fn matches_all(&self) -> bool {
        true
    }
}

/// 静态方法匹配函数
pub struct FnMethodMatcher(Arc<dyn Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync>);

impl FnMethodMatcher {
    pub fn new(matcher: impl Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(matcher))
    }
}

impl MethodMatcher for FnMethodMatcher {
    fn matches(&self, method: &MethodSignature, target_type: &TypeInfo) -> bool {
        (self.0)(method, target_type)
    }
}

type RuntimeCheck = Arc<dyn Fn(&MethodSignature, &[Object]) -> bool + Send + Sync>;

/// 运行时方法匹配器
///
/// 静态部分在构建调用链时检查，参数部分在每次调用时检查。
pub struct DynamicMethodMatcher {
    static_check: Arc<dyn Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync>,
    runtime_check: RuntimeCheck,
}

impl DynamicMethodMatcher {
    /// 对所有方法都做参数检查
    pub fn new(runtime_check: impl Fn(&MethodSignature, &[Object]) -> bool + Send + Sync + 'static) -> Self {
        Self {
            static_check: Arc::new(|_: &MethodSignature, _: &TypeInfo| true),
            runtime_check: Arc::new(runtime_check),
        }
    }

    /// 只对方法名匹配的方法做参数检查
    pub fn for_method(
        pattern: impl Into<String>,
        runtime_check: impl Fn(&MethodSignature, &[Object]) -> bool + Send + Sync + 'static,
    ) -> Self {
        let pattern = WildcardPattern::new(pattern);
        Self {
            static_check: Arc::new(move |method: &MethodSignature, _: &TypeInfo| {
                pattern.matches(method.name())
            }),
            runtime_check: Arc::new(runtime_check),
        }
    }
}

impl MethodMatcher for DynamicMethodMatcher {
    fn matches(&self, method: &MethodSignature, target_type: &TypeInfo) -> bool {
        (self.static_check)(method, target_type)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(&self, method: &MethodSignature, _target_type: &TypeInfo, args: &[Object]) -> bool {
        (self.runtime_check)(method, args)
    }
}
