//! 代理身份：相等性与哈希

use crate::advised::AdvisedSupport;

/// 代理哈希种子
const PROXY_HASH_SEED: u64 = 0x4150_5258;

/// 两个代理配置是否等价
///
/// 暴露的契约类型相同且顺序一致，通知器的类型和名称序列相同，目标来源是同一个。
pub fn equals_in_proxy(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    equal_interfaces(a, b) && equal_advisors(a, b) && a.target_source().identity() == b.target_source().identity()
}

/// 代理哈希，同一配置多次调用结果不变
pub fn proxy_hash_code(advised: &AdvisedSupport) -> u64 {
    PROXY_HASH_SEED
        .wrapping_mul(13)
        .wrapping_add(advised.target_source().identity() as u64)
}

fn equal_interfaces(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    let (left, right) = (a.interfaces(), b.interfaces());
    left.len() == right.len() && left.iter().zip(right.iter()).all(|(l, r)| l == r)
}

fn equal_advisors(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    let (left, right) = (a.advisors(), b.advisors());
    left.len() == right.len()
        && left.iter().zip(right.iter()).all(|(l, r)| {
            l.advice().advice_type() == r.advice().advice_type() && l.advice().name() == r.advice().name()
        })
}
