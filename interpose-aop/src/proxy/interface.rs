//! 契约代理
//!
//! 代理对象只实现一组契约类型，所有调用经过统一的处理入口。

use super::{invoke_advised, invoke_identity_method, AopProxy, ProxyDispatch, ProxyStrategy};
use crate::error::{AopError, AopResult};
use crate::signature::{MethodKind, MethodSignature, Object, TypeRef};

/// 契约代理分派
#[derive(Debug)]
pub struct InterfaceDispatch {
    equals_defined: bool,
    hash_defined: bool,
}

impl InterfaceDispatch {
    /// 根据暴露的契约类型创建分派器
    ///
    /// 任一契约自己定义了相等性或哈希时，对应方法交给目标处理。
    pub fn new(interfaces: &[TypeRef]) -> Self {
        Self {
            equals_defined: interfaces.iter().any(|i| i.defines_equals()),
            hash_defined: interfaces.iter().any(|i| i.defines_hash()),
        }
    }
}

impl ProxyDispatch for InterfaceDispatch {
    fn strategy(&self) -> ProxyStrategy {
        ProxyStrategy::Interface
    }

    fn resolve_and_invoke(&self, proxy: &AopProxy, method: &MethodSignature, args: Vec<Object>) -> AopResult<Option<Object>> {
        if let Some(result) = invoke_identity_method(proxy, method, &args, self.equals_defined, self.hash_defined) {
            return result;
        }

        let declaring = method.declaring_type();
        if method.kind() == MethodKind::Regular && !declaring.is_object() && !proxy.is_instance_of(declaring) {
            return Err(AopError::UnsupportedMethod {
                method: method.signature(),
            });
        }

        invoke_advised(proxy, method, args, None)
    }
}
