//! 切点（Pointcut）表达式系统
//!
//! 切点由两级规则组成：类型级的 [`ClassFilter`] 和方法级的 [`MethodMatcher`]。
//! 表达式切点在类型级使用三值求值：无法仅凭类型判断的子表达式不会排除该类型。

use crate::matcher::{
    ClassFilter, DynamicMethodMatcher, MethodMatcher, TrueClassFilter, TrueMethodMatcher, WildcardPattern,
};
use crate::signature::{MethodSignature, Object, TypeInfo, TypeRef};
use regex::Regex;
use std::sync::Arc;

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    /// 类型过滤器
    fn class_filter(&self) -> &dyn ClassFilter;

    /// 方法匹配器
    ///
    /// 运行时匹配器会被绑定到调用链条目上，所以这里返回共享引用。
    fn method_matcher(&self) -> Arc<dyn MethodMatcher>;
}

/// 切点表达式
///
/// 用于匹配连接点
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型（或其父类型）的所有方法
    /// 例如：TypePattern("UserService")
    TypePattern(WildcardPattern),

    /// 匹配特定方法名
    /// 例如：MethodPattern("get_user")
    MethodPattern(WildcardPattern),

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: WildcardPattern,
        method_pattern: WildcardPattern,
    },

    /// 使用正则表达式匹配类型
    TypeRegex(Regex),

    /// 使用正则表达式匹配方法
    MethodRegex(Regex),

    /// 匹配可以赋给指定类型的目标
    Within(TypeRef),

    /// 自定义匹配函数
    Custom(Arc<dyn Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync>),

    /// 参数匹配函数，包含它的表达式需要在每次调用时求值
    Args(Arc<dyn Fn(&[Object]) -> bool + Send + Sync>),

    /// 与运算（AND）
    And(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 或运算（OR）
    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 非运算（NOT）
    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 类型模式
    pub fn type_pattern(pattern: &str) -> Self {
        PointcutExpression::TypePattern(WildcardPattern::new(pattern))
    }

    /// 方法名模式
    pub fn method_pattern(pattern: &str) -> Self {
        PointcutExpression::MethodPattern(WildcardPattern::new(pattern))
    }

    /// 自定义匹配
    pub fn custom(f: impl Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync + 'static) -> Self {
        PointcutExpression::Custom(Arc::new(f))
    }

    /// 参数匹配
    pub fn args(f: impl Fn(&[Object]) -> bool + Send + Sync + 'static) -> Self {
        PointcutExpression::Args(Arc::new(f))
    }

    /// 创建 execution 表达式
    ///
    /// 例如：execution("* UserService.get_user(..)")
    /// 格式：返回类型 类型名.方法名(参数)
    ///
    /// 简化版本，只支持类型和方法名匹配
    pub fn execution(expression: &str) -> Self {
        // 解析表达式: "* UserService.get_user(..)"
        let parts: Vec<&str> = expression.split_whitespace().collect();

        if parts.len() < 2 {
            return PointcutExpression::All;
        }

        let method_part = parts[parts.len() - 1];
        // 移除参数部分 "(..)"
        let method_part = match method_part.find('(') {
            Some(idx) => &method_part[..idx],
            None => method_part,
        };

        if let Some((type_pattern, method_pattern)) = method_part.rsplit_once('.') {
            PointcutExpression::Execution {
                type_pattern: WildcardPattern::new(type_pattern),
                method_pattern: WildcardPattern::new(method_pattern),
            }
        } else {
            PointcutExpression::method_pattern(method_part)
        }
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }

    /// 表达式是否依赖调用参数
    pub fn is_runtime(&self) -> bool {
        match self {
            PointcutExpression::Args(_) => true,
            PointcutExpression::And(l, r) | PointcutExpression::Or(l, r) => {
                l.is_runtime() || r.is_runtime()
            }
            PointcutExpression::Not(e) => e.is_runtime(),
            _ => false,
        }
    }

    /// 类型级求值
    ///
    /// `None` 表示仅凭类型无法判断。
    pub fn could_match_type(&self, target_type: &TypeInfo) -> Option<bool> {
        match self {
            PointcutExpression::All => Some(true),
            PointcutExpression::TypePattern(pattern) => {
                Some(Self::type_hierarchy_matches(target_type, |name| pattern.matches(name)))
            }
            PointcutExpression::Execution { type_pattern, .. } => {
                if Self::type_hierarchy_matches(target_type, |name| type_pattern.matches(name)) {
                    None
                } else {
                    Some(false)
                }
            }
            PointcutExpression::TypeRegex(regex) => {
                Some(Self::type_hierarchy_matches(target_type, |name| regex.is_match(name)))
            }
            PointcutExpression::Within(root) => Some(target_type.is_assignable_to(root)),
            PointcutExpression::MethodPattern(_)
            | PointcutExpression::MethodRegex(_)
            | PointcutExpression::Custom(_)
            | PointcutExpression::Args(_) => None,
            PointcutExpression::And(l, r) => {
                Self::and3(l.could_match_type(target_type), r.could_match_type(target_type))
            }
            PointcutExpression::Or(l, r) => {
                Self::or3(l.could_match_type(target_type), r.could_match_type(target_type))
            }
            PointcutExpression::Not(e) => e.could_match_type(target_type).map(|v| !v),
        }
    }

    /// 方法级静态求值
    ///
    /// 参数条件无法静态判断，返回 `None`。
    pub fn matches_static(&self, method: &MethodSignature, target_type: &TypeInfo) -> Option<bool> {
        self.evaluate(method, target_type, None)
    }

    /// 带参数的完整求值
    pub fn matches_with_args(&self, method: &MethodSignature, target_type: &TypeInfo, args: &[Object]) -> bool {
        self.evaluate(method, target_type, Some(args)).unwrap_or(false)
    }

    fn evaluate(&self, method: &MethodSignature, target_type: &TypeInfo, args: Option<&[Object]>) -> Option<bool> {
        match self {
            PointcutExpression::All => Some(true),

            PointcutExpression::TypePattern(pattern) => {
                Some(Self::declaring_or_target_matches(method, target_type, |name| pattern.matches(name)))
            }

            PointcutExpression::MethodPattern(pattern) => Some(pattern.matches(method.name())),

            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => Some(
                Self::declaring_or_target_matches(method, target_type, |name| type_pattern.matches(name))
                    && method_pattern.matches(method.name()),
            ),

            PointcutExpression::TypeRegex(regex) => {
                Some(Self::declaring_or_target_matches(method, target_type, |name| regex.is_match(name)))
            }

            PointcutExpression::MethodRegex(regex) => Some(regex.is_match(method.name())),

            PointcutExpression::Within(root) => Some(target_type.is_assignable_to(root)),

            PointcutExpression::Custom(func) => Some(func(method, target_type)),

            PointcutExpression::Args(func) => args.map(|args| func(args)),

            PointcutExpression::And(left, right) => Self::and3(
                left.evaluate(method, target_type, args),
                right.evaluate(method, target_type, args),
            ),

            PointcutExpression::Or(left, right) => Self::or3(
                left.evaluate(method, target_type, args),
                right.evaluate(method, target_type, args),
            ),

            PointcutExpression::Not(expr) => expr.evaluate(method, target_type, args).map(|v| !v),
        }
    }

    fn type_hierarchy_matches(target_type: &TypeInfo, matches: impl Fn(&str) -> bool + Copy) -> bool {
        matches(target_type.name())
            || target_type
                .supertypes()
                .iter()
                .any(|s| Self::type_hierarchy_matches(s, matches))
    }

    fn declaring_or_target_matches(
        method: &MethodSignature,
        target_type: &TypeInfo,
        matches: impl Fn(&str) -> bool + Copy,
    ) -> bool {
        matches(method.declaring_type().name()) || Self::type_hierarchy_matches(target_type, matches)
    }

    fn and3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
        match (left, right) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        }
    }

    fn or3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
        match (left, right) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::TypePattern(p) => write!(f, "TypePattern({:?})", p),
            PointcutExpression::MethodPattern(p) => write!(f, "MethodPattern({:?})", p),
            PointcutExpression::Execution { type_pattern, method_pattern } => {
                write!(f, "Execution({:?}.{:?})", type_pattern, method_pattern)
            }
            PointcutExpression::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            PointcutExpression::Within(t) => write!(f, "Within({})", t.name()),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::Args(_) => write!(f, "Args(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 表达式匹配器，同时充当类型过滤器和方法匹配器
#[derive(Debug)]
pub struct ExpressionMatcher {
    expression: PointcutExpression,
    runtime: bool,
}

impl ClassFilter for ExpressionMatcher {
    fn matches(&self, target_type: &TypeInfo) -> bool {
        self.expression.could_match_type(target_type) != Some(false)
    }
}

impl MethodMatcher for ExpressionMatcher {
    fn matches(&self, method: &MethodSignature, target_type: &TypeInfo) -> bool {
        self.expression.matches_static(method, target_type) != Some(false)
    }

    fn is_runtime(&self) -> bool {
        self.runtime
    }

    fn matches_runtime(&self, method: &MethodSignature, target_type: &TypeInfo, args: &[Object]) -> bool {
        self.expression.matches_with_args(method, target_type, args)
    }
}

/// 基于表达式的切点
#[derive(Debug, Clone)]
pub struct ExpressionPointcut {
    matcher: Arc<ExpressionMatcher>,
}

impl ExpressionPointcut {
    pub fn new(expression: PointcutExpression) -> Self {
        let runtime = expression.is_runtime();
        Self {
            matcher: Arc::new(ExpressionMatcher { expression, runtime }),
        }
    }

    /// 从 execution 表达式创建
    pub fn execution(expression: &str) -> Self {
        Self::new(PointcutExpression::execution(expression))
    }

    /// 获取切点表达式
    pub fn expression(&self) -> &PointcutExpression {
        &self.matcher.expression
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.matcher.as_ref()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.matcher.clone()
    }
}

/// 由任意类型过滤器和方法匹配器组合成的切点
#[derive(Clone)]
pub struct ComposablePointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl ComposablePointcut {
    pub fn new(class_filter: Arc<dyn ClassFilter>, method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    /// 匹配一切的切点
    pub fn always() -> Self {
        Self::new(Arc::new(TrueClassFilter), Arc::new(TrueMethodMatcher))
    }

    /// 对所有类型生效，只使用给定的方法匹配器
    pub fn for_methods(method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self::new(Arc::new(TrueClassFilter), method_matcher)
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.method_matcher)
    }
}

/// 按方法名匹配的静态切点
#[derive(Clone)]
pub struct NameMatchPointcut {
    class_filter: Arc<dyn ClassFilter>,
    matcher: Arc<NameMatcher>,
}

/// 方法名匹配器
#[derive(Debug, Default)]
pub struct NameMatcher {
    names: Vec<WildcardPattern>,
}

impl MethodMatcher for NameMatcher {
    fn matches(&self, method: &MethodSignature, _target_type: &TypeInfo) -> bool {
        self.names.iter().any(|pattern| pattern.matches(method.name()))
    }
}

impl NameMatchPointcut {
    pub fn new(names: &[&str]) -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            matcher: Arc::new(NameMatcher {
                names: names.iter().map(|n| WildcardPattern::new(*n)).collect(),
            }),
        }
    }

    /// 设置类型过滤器，默认对所有类型生效
    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }
}

impl Pointcut for NameMatchPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.matcher.clone()
    }
}

/// 运行时切点：方法名静态预检，参数在每次调用时检查
#[derive(Clone)]
pub struct DynamicPointcut {
    class_filter: Arc<dyn ClassFilter>,
    matcher: Arc<DynamicMethodMatcher>,
}

impl DynamicPointcut {
    pub fn new(
        method_pattern: &str,
        runtime_check: impl Fn(&MethodSignature, &[Object]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            matcher: Arc::new(DynamicMethodMatcher::for_method(method_pattern, runtime_check)),
        }
    }

    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }
}

impl Pointcut for DynamicPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.matcher.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::TypeNameFilter;
    use crate::test_support::{echo_count, echo_execute, echo_impl_type, order_type};

    #[test]
    fn test_execution_parsing() {
        let expr = PointcutExpression::execution("* EchoService.execute(..)");
        match &expr {
            PointcutExpression::Execution { type_pattern, method_pattern } => {
                assert_eq!(type_pattern.as_str(), "EchoService");
                assert_eq!(method_pattern.as_str(), "execute");
            }
            other => panic!("unexpected expression: {:?}", other),
        }

        let with_modifiers = PointcutExpression::execution("public String EchoService.execute(..)");
        assert!(matches!(with_modifiers, PointcutExpression::Execution { .. }));
        assert!(matches!(PointcutExpression::execution("execute"), PointcutExpression::All));
    }

    #[test]
    fn test_execution_matches_declaring_type() {
        let pointcut = ExpressionPointcut::execution("* EchoService.execute(..)");
        let impl_type = echo_impl_type();

        assert!(pointcut.class_filter().matches(&impl_type));
        assert!(!pointcut.class_filter().matches(&order_type()));
        let mm = pointcut.method_matcher();
        assert!(mm.matches(&echo_execute(), &impl_type));
        assert!(!mm.matches(&echo_count(), &impl_type));
        assert!(!mm.is_runtime());
    }

    #[test]
    fn test_class_level_three_valued() {
        let impl_type = echo_impl_type();
        let method_only = PointcutExpression::method_pattern("execute");
        assert_eq!(method_only.could_match_type(&impl_type), None);

        // 方法条件取反后仍然无法在类型级排除
        let negated = PointcutExpression::method_pattern("execute").not();
        assert_eq!(negated.could_match_type(&impl_type), None);

        let wrong_type = PointcutExpression::type_pattern("Order*").and(method_only.clone());
        assert_eq!(wrong_type.could_match_type(&impl_type), Some(false));

        let either = PointcutExpression::type_pattern("Order*").or(method_only);
        assert_eq!(either.could_match_type(&impl_type), None);
        assert_eq!(PointcutExpression::All.could_match_type(&impl_type), Some(true));
    }

    #[test]
    fn test_args_make_expression_dynamic() {
        let expr = PointcutExpression::method_pattern("execute").and(PointcutExpression::args(|args| {
            args.first()
                .and_then(|a| a.downcast_ref::<String>())
                .map_or(false, |s| s.starts_with('x'))
        }));
        assert!(expr.is_runtime());

        let pointcut = ExpressionPointcut::new(expr);
        let mm = pointcut.method_matcher();
        let impl_type = echo_impl_type();
        let method = echo_execute();
        assert!(mm.is_runtime());
        assert!(mm.matches(&method, &impl_type));
        assert!(!mm.matches(&echo_count(), &impl_type));

        let yes: Vec<Object> = vec![Arc::new("xyz".to_string())];
        let no: Vec<Object> = vec![Arc::new("abc".to_string())];
        assert!(mm.matches_runtime(&method, &impl_type, &yes));
        assert!(!mm.matches_runtime(&method, &impl_type, &no));
    }

    #[test]
    fn test_regex_and_custom() {
        let impl_type = echo_impl_type();
        let method = echo_execute();
        let regex = PointcutExpression::MethodRegex(Regex::new("^exe.*$").unwrap());
        assert_eq!(regex.matches_static(&method, &impl_type), Some(true));

        let custom = PointcutExpression::custom(|m, _| m.parameter_types().len() == 1);
        assert_eq!(custom.matches_static(&method, &impl_type), Some(true));
        assert_eq!(custom.matches_static(&echo_count(), &impl_type), Some(false));
    }

    #[test]
    fn test_name_match_pointcut() {
        let pointcut = NameMatchPointcut::new(&["exec*", "count"])
            .with_class_filter(Arc::new(TypeNameFilter::new("Default*")));
        let impl_type = echo_impl_type();

        assert!(pointcut.class_filter().matches(&impl_type));
        assert!(!pointcut.class_filter().matches(&order_type()));
        assert!(pointcut.method_matcher().matches(&echo_execute(), &impl_type));
        assert!(pointcut.method_matcher().matches(&echo_count(), &impl_type));
    }

    #[test]
    fn test_dynamic_pointcut() {
        let pointcut = DynamicPointcut::new("exec*", |_, args| args.len() == 1);
        let impl_type = echo_impl_type();
        let mm = pointcut.method_matcher();

        assert!(mm.is_runtime());
        assert!(mm.matches(&echo_execute(), &impl_type));
        assert!(!mm.matches(&echo_count(), &impl_type));
        let one: Vec<Object> = vec![Arc::new(1i64)];
        assert!(mm.matches_runtime(&echo_execute(), &impl_type, &one));
        assert!(!mm.matches_runtime(&echo_execute(), &impl_type, &[]));
    }
}
