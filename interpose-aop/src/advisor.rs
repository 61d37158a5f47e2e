//! 通知器（Advisor）
//!
//! 通知器把匹配规则和通知绑定在一起，共有三种：
//! 切点通知器、引入通知器和无条件通知器。

use crate::advice::{Advice, MethodInterceptor};
use crate::error::AopResult;
use crate::joinpoint::ProceedingJoinPoint;
use crate::matcher::{ClassFilter, TrueClassFilter};
use crate::pointcut::Pointcut;
use crate::signature::{same_instance, MethodSignature, Object, TypeInfo, TypeRef};
use crate::target::Target;
use std::fmt;
use std::sync::Arc;

/// 由切点决定是否生效的通知器
#[derive(Clone)]
pub struct PointcutAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
}

impl PointcutAdvisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self { pointcut, advice }
    }

    pub fn pointcut(&self) -> &dyn Pointcut {
        self.pointcut.as_ref()
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }
}

/// 引入通知器
///
/// 只在类型级别匹配，为代理增加额外的契约类型。
#[derive(Clone)]
pub struct IntroductionAdvisor {
    class_filter: Arc<dyn ClassFilter>,
    interfaces: Vec<TypeRef>,
    advice: Advice,
}

impl IntroductionAdvisor {
    pub fn new(interfaces: Vec<TypeRef>, advice: Advice) -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            interfaces,
            advice,
        }
    }

    /// 通过委托对象实现引入的契约
    pub fn delegating(name: impl Into<String>, delegate: Arc<dyn Target>, interfaces: Vec<TypeRef>) -> Self {
        let interceptor = DelegatingIntroductionInterceptor::new(delegate, interfaces.clone());
        Self::new(interfaces, Advice::around(name, Arc::new(interceptor)))
    }

    /// 设置类型过滤器，默认对所有类型生效
    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }

    pub fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    /// 引入的契约类型
    pub fn interfaces(&self) -> &[TypeRef] {
        &self.interfaces
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }
}

/// 通知器
#[derive(Clone)]
pub enum Advisor {
    /// 由切点匹配
    Pointcut(PointcutAdvisor),
    /// 引入新的契约类型
    Introduction(IntroductionAdvisor),
    /// 对所有方法生效
    Unconditional(Advice),
}

impl Advisor {
    /// 创建切点通知器
    pub fn with_pointcut(pointcut: impl Pointcut + 'static, advice: Advice) -> Self {
        Advisor::Pointcut(PointcutAdvisor::new(Arc::new(pointcut), advice))
    }

    /// 创建无条件通知器
    pub fn always(advice: Advice) -> Self {
        Advisor::Unconditional(advice)
    }

    /// 获取通知
    pub fn advice(&self) -> &Advice {
        match self {
            Advisor::Pointcut(advisor) => advisor.advice(),
            Advisor::Introduction(advisor) => advisor.advice(),
            Advisor::Unconditional(advice) => advice,
        }
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self, Advisor::Introduction(_))
    }
}

impl From<IntroductionAdvisor> for Advisor {
    fn from(advisor: IntroductionAdvisor) -> Self {
        Advisor::Introduction(advisor)
    }
}

impl From<PointcutAdvisor> for Advisor {
    fn from(advisor: PointcutAdvisor) -> Self {
        Advisor::Pointcut(advisor)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisor::Pointcut(advisor) => f.debug_tuple("Pointcut").field(advisor.advice()).finish(),
            Advisor::Introduction(advisor) => f
                .debug_struct("Introduction")
                .field("advice", advisor.advice())
                .field(
                    "interfaces",
                    &advisor.interfaces().iter().map(|i| i.name()).collect::<Vec<_>>(),
                )
                .finish(),
            Advisor::Unconditional(advice) => f.debug_tuple("Unconditional").field(advice).finish(),
        }
    }
}

/// 通知器能否作用于给定类型的某个方法
///
/// 用于在创建代理前预先过滤通知器。`methods` 为空时切点通知器一律视为适用。
pub fn can_apply(advisor: &Advisor, target_type: &TypeInfo, methods: &[MethodSignature], has_introductions: bool) -> bool {
    match advisor {
        Advisor::Introduction(introduction) => introduction.class_filter().matches(target_type),
        Advisor::Pointcut(advisor) => {
            let pointcut = advisor.pointcut();
            if !pointcut.class_filter().matches(target_type) {
                return false;
            }
            let matcher = pointcut.method_matcher();
            // 没有声明方法时无法判断，保留通知器
            if matcher.matches_all() || methods.is_empty() {
                return true;
            }
            methods.iter().any(|method| match matcher.as_introduction_aware() {
                Some(aware) => aware.matches_with_introductions(method, target_type, has_introductions),
                None => matcher.matches(method, target_type),
            })
        }
        Advisor::Unconditional(_) => true,
    }
}

/// 筛选出能作用于给定类型的通知器
///
/// 引入通知器先于其他通知器判断，结果保持原有顺序。
pub fn find_advisors_that_can_apply(advisors: &[Advisor], target_type: &TypeInfo, methods: &[MethodSignature]) -> Vec<Advisor> {
    let has_introductions = advisors
        .iter()
        .any(|advisor| advisor.is_introduction() && can_apply(advisor, target_type, methods, false));
    advisors
        .iter()
        .filter(|advisor| can_apply(advisor, target_type, methods, has_introductions))
        .cloned()
        .collect()
}

/// 委托引入拦截器
///
/// 引入契约上的方法交给委托对象执行，其他方法继续执行调用链。
pub struct DelegatingIntroductionInterceptor {
    delegate: Arc<dyn Target>,
    interfaces: Vec<TypeRef>,
}

impl DelegatingIntroductionInterceptor {
    pub fn new(delegate: Arc<dyn Target>, interfaces: Vec<TypeRef>) -> Self {
        Self { delegate, interfaces }
    }

    fn is_introduced(&self, method: &MethodSignature) -> bool {
        let declaring = method.declaring_type();
        !declaring.is_object() && self.interfaces.iter().any(|i| i.is_assignable_to(declaring))
    }
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, pjp: &ProceedingJoinPoint<'_>) -> AopResult<Option<Object>> {
        if !self.is_introduced(pjp.method()) {
            return pjp.proceed();
        }

        let arguments = pjp.arguments().clone();
        let result = Arc::clone(&self.delegate).invoke(pjp.method(), &arguments)?;
        // 委托对象返回自身时替换为代理
        match result {
            Some(value) if same_instance(&value, &self.delegate) => {
                Ok(pjp.this().map(|proxy| proxy as Object).or(Some(value)))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{FnMethodMatcher, IntroductionAwareMethodMatcher, MethodMatcher, TypeNameFilter};
    use crate::pointcut::{ComposablePointcut, ExpressionPointcut, NameMatchPointcut};
    use crate::test_support::*;

    fn noop(name: &str) -> Advice {
        Advice::around(name, Arc::new(ShortCircuit))
    }

    #[test]
    fn test_can_apply_pointcut_advisor() {
        let impl_type = echo_impl_type();
        let methods = echo_methods();

        let matching = Advisor::with_pointcut(NameMatchPointcut::new(&["exec*"]), noop("a"));
        assert!(can_apply(&matching, &impl_type, &methods, false));

        let no_method = Advisor::with_pointcut(NameMatchPointcut::new(&["missing"]), noop("b"));
        assert!(!can_apply(&no_method, &impl_type, &methods, false));

        let wrong_type = Advisor::with_pointcut(ExpressionPointcut::execution("* OrderService.*(..)"), noop("c"));
        assert!(!can_apply(&wrong_type, &impl_type, &methods, false));

        assert!(can_apply(&Advisor::always(noop("d")), &impl_type, &methods, false));
    }

    #[test]
    fn test_can_apply_without_declared_methods() {
        let impl_type = echo_impl_type();

        let match_all = Advisor::with_pointcut(ComposablePointcut::always(), noop("all"));
        assert!(can_apply(&match_all, &impl_type, &[], false));
        assert!(can_apply(&match_all, &impl_type, &echo_methods()[..0], false));

        // 方法未知时只能依据类型过滤器判断
        let by_name = Advisor::with_pointcut(NameMatchPointcut::new(&["missing"]), noop("name"));
        assert!(can_apply(&by_name, &impl_type, &[], false));

        let wrong_type = Advisor::with_pointcut(ExpressionPointcut::execution("* OrderService.*(..)"), noop("type"));
        assert!(!can_apply(&wrong_type, &impl_type, &[], false));
    }

    #[test]
    fn test_match_all_skips_method_scan() {
        let match_all = Advisor::with_pointcut(ComposablePointcut::always(), noop("all"));
        let unrelated = vec![MethodSignature::new(&order_type(), "ship")];
        assert!(can_apply(&match_all, &echo_impl_type(), &unrelated, false));
    }

    #[test]
    fn test_can_apply_introduction_uses_class_filter_only() {
        let introduction = IntroductionAdvisor::delegating("audit", Arc::new(AuditDelegate), vec![auditable_type()])
            .with_class_filter(Arc::new(TypeNameFilter::new("Default*")));
        let advisor = Advisor::from(introduction);

        assert!(can_apply(&advisor, &echo_impl_type(), &[], false));
        assert!(!can_apply(&advisor, &order_type(), &[], false));
    }

    struct IntroducedOnly;

    impl MethodMatcher for IntroducedOnly {
        fn matches(&self, _method: &MethodSignature, _target_type: &TypeInfo) -> bool {
            false
        }

        fn as_introduction_aware(&self) -> Option<&dyn IntroductionAwareMethodMatcher> {
            Some(self)
        }
    }

    impl IntroductionAwareMethodMatcher for IntroducedOnly {
        fn matches_with_introductions(&self, _method: &MethodSignature, _target_type: &TypeInfo, has_introductions: bool) -> bool {
            has_introductions
        }
    }

    #[test]
    fn test_find_advisors_passes_introduction_flag() {
        let aware = Advisor::with_pointcut(ComposablePointcut::for_methods(Arc::new(IntroducedOnly)), noop("aware"));
        let plain = Advisor::with_pointcut(
            ComposablePointcut::for_methods(Arc::new(FnMethodMatcher::new(|m, _| m.name() == "count"))),
            noop("plain"),
        );
        let introduction: Advisor = IntroductionAdvisor::delegating("audit", Arc::new(AuditDelegate), vec![auditable_type()]).into();

        let without = find_advisors_that_can_apply(&[aware.clone(), plain.clone()], &echo_impl_type(), &echo_methods());
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].advice().name(), "plain");

        let with = find_advisors_that_can_apply(&[aware, introduction, plain], &echo_impl_type(), &echo_methods());
        let names: Vec<_> = with.iter().map(|a| a.advice().name().to_string()).collect();
        assert_eq!(names, vec!["aware", "audit", "plain"]);
    }
}
