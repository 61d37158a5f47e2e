//! 调用链缓存
//!
//! 以 (方法, 目标类型) 为键缓存调用链。只有冻结的配置才允许使用缓存，
//! 未冻结时通知器随时可能变化，每次调用都必须重新计算。

use crate::chain::InterceptorChain;
use crate::error::AopResult;
use crate::signature::{MethodKey, MethodSignature, TypeRef};
use dashmap::DashMap;

/// 缓存键
///
/// 类型按实例身份参与比较，同名的不同类型各自占用缓存项。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainKey {
    method: MethodKey,
    target_type: Option<TypeRef>,
}

impl ChainKey {
    pub fn new(method: &MethodSignature, target_type: Option<&TypeRef>) -> Self {
        Self {
            method: method.key(),
            target_type: target_type.cloned(),
        }
    }
}

/// 调用链缓存
#[derive(Debug, Default)]
pub struct ChainCache {
    entries: DashMap<ChainKey, InterceptorChain>,
}

impl ChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查找缓存，未命中时构建并写入
    ///
    /// 构建过程不持有分片锁；并发构建同一个键时保留先写入的结果。
    pub fn get_or_build(
        &self,
        key: ChainKey,
        build: impl FnOnce() -> AopResult<InterceptorChain>,
    ) -> AopResult<InterceptorChain> {
        if let Some(chain) = self.entries.get(&key) {
            return Ok(chain.value().clone());
        }

        let chain = build()?;
        tracing::debug!("Caching interceptor chain for {:?}", key);
        Ok(self.entries.entry(key).or_insert(chain).value().clone())
    }

    /// 直接写入
    pub fn insert(&self, key: ChainKey, chain: InterceptorChain) {
        self.entries.insert(key, chain);
    }

    pub fn get(&self, key: &ChainKey) -> Option<InterceptorChain> {
        self.entries.get(key).map(|chain| chain.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainEntry;
    use crate::signature::TypeInfo;
    use crate::test_support::*;
    use std::cell::Cell;
    use std::sync::Arc;

    #[test]
    fn test_builds_once_per_key() {
        let cache = ChainCache::new();
        let builds = Cell::new(0);
        let build = || -> AopResult<InterceptorChain> {
            builds.set(builds.get() + 1);
            Ok(vec![ChainEntry::Static(Arc::new(ShortCircuit))].into())
        };

        let key = ChainKey::new(&echo_execute(), Some(&echo_impl_type()));
        let first = cache.get_or_build(key.clone(), build).unwrap();
        let second = cache.get_or_build(key, build).unwrap();
        assert_eq!(builds.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        let other = ChainKey::new(&echo_execute(), None);
        cache.get_or_build(other, build).unwrap();
        assert_eq!(builds.get(), 2);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_same_named_types_get_separate_entries() {
        let cache = ChainCache::new();
        let first = TypeInfo::builder("DefaultEchoService").build();
        let second = TypeInfo::builder("DefaultEchoService").build();
        let short: InterceptorChain = vec![ChainEntry::Static(Arc::new(ShortCircuit))].into();
        let empty: InterceptorChain = Arc::from(Vec::<ChainEntry>::new());

        cache.insert(ChainKey::new(&echo_execute(), Some(&first)), short);
        cache.insert(ChainKey::new(&echo_execute(), Some(&second)), empty);

        assert_eq!(cache.len(), 2);
        let chain = cache.get(&ChainKey::new(&echo_execute(), Some(&first))).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = ChainCache::new();
        let key = ChainKey::new(&echo_count(), None);
        let failed = cache.get_or_build(key.clone(), || {
            Err(crate::error::AopError::UnknownAdvice("broken".to_string()))
        });
        assert!(failed.is_err());
        assert!(cache.get(&key).is_none());
    }
}
