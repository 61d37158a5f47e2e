//! 当前代理的线程内暴露
//!
//! 配置了 `expose_proxy` 的代理在进入调用链前把自己写入当前线程的槽位，
//! 调用结束时恢复槽位的旧值。嵌套的代理调用因此总能看到最内层的代理，
//! 返回外层后又能看到外层的代理。

use crate::error::{AopError, AopResult};
use crate::signature::Object;
use std::cell::RefCell;

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Object>> = const { RefCell::new(None) };
}

/// 当前代理访问入口
pub struct AopContext;

impl AopContext {
    /// 获取当前线程正在处理调用的代理
    ///
    /// 代理没有开启 `expose_proxy`，或者不在代理调用中时返回 [`AopError::ProxyNotExposed`]。
    pub fn current_proxy() -> AopResult<Object> {
        CURRENT_PROXY
            .with(|slot| slot.borrow().clone())
            .ok_or(AopError::ProxyNotExposed)
    }

    /// 获取当前代理并转换为具体类型
    pub fn current<T: Send + Sync + 'static>() -> AopResult<std::sync::Arc<T>> {
        Self::current_proxy()?
            .downcast::<T>()
            .map_err(|_| AopError::ProxyNotExposed)
    }

    /// 当前线程是否暴露了代理
    pub fn is_exposed() -> bool {
        CURRENT_PROXY.with(|slot| slot.borrow().is_some())
    }

    /// 设置当前代理，返回在作用域结束时恢复旧值的守卫
    pub fn expose(proxy: Option<Object>) -> ExposureGuard {
        let previous = CURRENT_PROXY.with(|slot| slot.replace(proxy));
        ExposureGuard {
            previous: Some(previous),
        }
    }
}

/// 恢复旧代理的守卫
///
/// 错误路径和 panic 展开时同样会恢复。
#[must_use = "the previous proxy is restored when the guard is dropped"]
pub struct ExposureGuard {
    previous: Option<Option<Object>>,
}

impl Drop for ExposureGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT_PROXY.with(|slot| {
                slot.replace(previous);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::same_instance;
    use std::sync::Arc;

    #[test]
    fn test_not_exposed_by_default() {
        assert!(!AopContext::is_exposed());
        assert!(matches!(AopContext::current_proxy(), Err(AopError::ProxyNotExposed)));
    }

    #[test]
    fn test_nested_exposure_restores_previous() {
        let outer: Object = Arc::new("outer".to_string());
        let inner: Object = Arc::new("inner".to_string());

        {
            let _outer_guard = AopContext::expose(Some(outer.clone()));
            assert!(same_instance(&AopContext::current_proxy().unwrap(), &outer));
            {
                let _inner_guard = AopContext::expose(Some(inner.clone()));
                assert!(same_instance(&AopContext::current_proxy().unwrap(), &inner));
                let typed = AopContext::current::<String>().unwrap();
                assert_eq!(typed.as_str(), "inner");
            }
            assert!(same_instance(&AopContext::current_proxy().unwrap(), &outer));
        }
        assert!(!AopContext::is_exposed());
    }

    #[test]
    fn test_slot_is_per_thread() {
        let proxy: Object = Arc::new(1u32);
        let _guard = AopContext::expose(Some(proxy));
        let seen_elsewhere = std::thread::spawn(AopContext::is_exposed).join().unwrap();
        assert!(!seen_elsewhere);
        assert!(AopContext::is_exposed());
    }
}
