//! 类型与方法签名模型
//!
//! Rust 没有运行时反射，代理引擎需要的类型信息（名称、父类型、是否自定义相等性）
//! 和方法信息（声明类型、返回类型、声明的受检失败）由这里的描述结构显式提供。

use once_cell::sync::Lazy;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 在调用中流动的任意值：参数、返回值、目标对象、代理对象
pub type Object = Arc<dyn Any + Send + Sync>;

/// 类型引用
pub type TypeRef = Arc<TypeInfo>;

/// 所有类型的公共根类型
pub static OBJECT_TYPE: Lazy<TypeRef> = Lazy::new(|| TypeInfo::builder("Object").build());

/// 原始目标访问标记类型
///
/// 声明在实现了此标记的类型上的方法，返回目标自身时不会被替换为代理对象。
pub static RAW_TARGET_ACCESS: Lazy<TypeRef> =
    Lazy::new(|| TypeInfo::builder("RawTargetAccess").contract().build());

/// 比较两个对象是否是同一个实例
pub fn same_instance<A, B>(a: &Arc<A>, b: &Arc<B>) -> bool
where
    A: ?Sized,
    B: ?Sized,
{
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// 对象实例的地址，用作身份哈希
pub fn instance_address<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

/// 运行时类型描述
///
/// 类型按实例身份比较：分别构建的两个同名类型互不相等。
pub struct TypeInfo {
    name: &'static str,
    supertypes: Vec<TypeRef>,
    contract: bool,
    defines_equals: bool,
    defines_hash: bool,
}

impl TypeInfo {
    /// 创建类型构建器
    pub fn builder(name: &'static str) -> TypeInfoBuilder {
        TypeInfoBuilder {
            name,
            supertypes: Vec::new(),
            contract: false,
            defines_equals: false,
            defines_hash: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn supertypes(&self) -> &[TypeRef] {
        &self.supertypes
    }

    /// 是否是契约类型（类似接口，只声明方法）
    pub fn is_contract(&self) -> bool {
        self.contract
    }

    pub fn defines_equals(&self) -> bool {
        self.defines_equals
    }

    pub fn defines_hash(&self) -> bool {
        self.defines_hash
    }

    /// 是否是公共根类型
    pub fn is_object(&self) -> bool {
        self == &**OBJECT_TYPE
    }

    /// 当前类型的值能否赋给 `other` 类型
    ///
    /// 每个类型都可以赋给根类型；其余情况沿父类型图查找。
    pub fn is_assignable_to(&self, other: &TypeInfo) -> bool {
        if self == other || other.is_object() {
            return true;
        }
        self.supertypes.iter().any(|s| s.is_assignable_to(other))
    }

    /// 是否实现了原始目标访问标记
    pub fn is_raw_target_access(&self) -> bool {
        self.is_assignable_to(&RAW_TARGET_ACCESS)
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field(
                "supertypes",
                &self.supertypes.iter().map(|s| s.name).collect::<Vec<_>>(),
            )
            .field("contract", &self.contract)
            .finish()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 类型构建器
pub struct TypeInfoBuilder {
    name: &'static str,
    supertypes: Vec<TypeRef>,
    contract: bool,
    defines_equals: bool,
    defines_hash: bool,
}

impl TypeInfoBuilder {
    /// 标记为契约类型
    pub fn contract(mut self) -> Self {
        self.contract = true;
        self
    }

    /// 添加父类型或实现的契约
    pub fn extends(mut self, supertype: &TypeRef) -> Self {
        self.supertypes.push(Arc::clone(supertype));
        self
    }

    /// 类型自己定义了相等性
    pub fn defines_equals(mut self) -> Self {
        self.defines_equals = true;
        self
    }

    /// 类型自己定义了哈希
    pub fn defines_hash(mut self) -> Self {
        self.defines_hash = true;
        self
    }

    pub fn build(self) -> TypeRef {
        Arc::new(TypeInfo {
            name: self.name,
            supertypes: self.supertypes,
            contract: self.contract,
            defines_equals: self.defines_equals,
            defines_hash: self.defines_hash,
        })
    }
}

/// 方法返回类型
#[derive(Clone, Debug)]
pub enum ReturnType {
    /// 无返回值
    Unit,
    /// 不可为空的基本类型，例如 `i32`、`bool`
    Primitive(&'static str),
    /// 引用类型
    Reference(TypeRef),
    /// 公共根类型
    Any,
}

impl ReturnType {
    pub fn is_primitive(&self) -> bool {
        matches!(self, ReturnType::Primitive(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReturnType::Unit => "()",
            ReturnType::Primitive(name) => *name,
            ReturnType::Reference(ty) => ty.name(),
            ReturnType::Any => OBJECT_TYPE.name(),
        }
    }
}

/// 方法类别
///
/// 身份相关的方法在进入通知链之前由代理统一处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Regular,
    Equals,
    HashCode,
    Finalize,
}

/// 方法缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub declaring_type: TypeRef,
    pub name: &'static str,
    pub parameter_types: Vec<&'static str>,
}

/// 方法签名
#[derive(Clone)]
pub struct MethodSignature {
    declaring_type: TypeRef,
    name: &'static str,
    parameter_types: Vec<&'static str>,
    return_type: ReturnType,
    declared_failures: Vec<&'static str>,
    kind: MethodKind,
}

impl MethodSignature {
    /// 创建普通方法签名，默认无参数、无返回值
    pub fn new(declaring_type: &TypeRef, name: &'static str) -> Self {
        Self {
            declaring_type: Arc::clone(declaring_type),
            name,
            parameter_types: Vec::new(),
            return_type: ReturnType::Unit,
            declared_failures: Vec::new(),
            kind: MethodKind::Regular,
        }
    }

    /// 根类型上的 `equals(Object)`
    pub fn equals() -> Self {
        let mut method = Self::new(&OBJECT_TYPE, "equals")
            .with_params(&["Object"])
            .returns(ReturnType::Primitive("bool"));
        method.kind = MethodKind::Equals;
        method
    }

    /// 根类型上的 `hash_code()`
    pub fn hash_code() -> Self {
        let mut method = Self::new(&OBJECT_TYPE, "hash_code").returns(ReturnType::Primitive("u64"));
        method.kind = MethodKind::HashCode;
        method
    }

    /// 根类型上的 `finalize()`
    pub fn finalize() -> Self {
        let mut method = Self::new(&OBJECT_TYPE, "finalize");
        method.kind = MethodKind::Finalize;
        method
    }

    /// 设置参数类型
    pub fn with_params(mut self, params: &[&'static str]) -> Self {
        self.parameter_types = params.to_vec();
        self
    }

    /// 设置返回类型
    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    /// 声明可抛出的受检失败
    pub fn declares(mut self, failure_kind: &'static str) -> Self {
        self.declared_failures.push(failure_kind);
        self
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parameter_types(&self) -> &[&'static str] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &ReturnType {
        &self.return_type
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn declared_failures(&self) -> &[&'static str] {
        &self.declared_failures
    }

    /// 签名是否声明了指定种类的受检失败
    pub fn declares_failure(&self, kind: &str) -> bool {
        self.declared_failures.iter().any(|declared| *declared == kind)
    }

    /// 缓存键
    pub fn key(&self) -> MethodKey {
        MethodKey {
            declaring_type: Arc::clone(&self.declaring_type),
            name: self.name,
            parameter_types: self.parameter_types.clone(),
        }
    }

    /// 完整的方法签名，例如 `EchoService::execute(String)`
    pub fn signature(&self) -> String {
        format!(
            "{}::{}({})",
            self.declaring_type.name(),
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

impl PartialEq for MethodSignature {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type
            && self.name == other.name
            && self.parameter_types == other.parameter_types
    }
}

impl Eq for MethodSignature {}

impl Hash for MethodSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.name.hash(state);
        self.parameter_types.hash(state);
    }
}

impl fmt::Debug for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSignature")
            .field("signature", &self.signature())
            .field("return_type", &self.return_type.name())
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignability() {
        let service = TypeInfo::builder("EchoService").contract().build();
        let impl_type = TypeInfo::builder("DefaultEchoService").extends(&service).build();
        let other = TypeInfo::builder("Other").build();

        assert!(impl_type.is_assignable_to(&service));
        assert!(impl_type.is_assignable_to(&impl_type));
        assert!(impl_type.is_assignable_to(&OBJECT_TYPE));
        assert!(!service.is_assignable_to(&impl_type));
        assert!(!impl_type.is_assignable_to(&other));
    }

    #[test]
    fn test_types_compare_by_identity() {
        let first = TypeInfo::builder("EchoService").contract().build();
        let second = TypeInfo::builder("EchoService").contract().build();

        assert_eq!(first, Arc::clone(&first));
        assert_ne!(first, second);
        assert!(!first.is_assignable_to(&second));
        assert_ne!(
            MethodSignature::new(&first, "execute").key(),
            MethodSignature::new(&second, "execute").key()
        );
    }

    #[test]
    fn test_raw_target_access() {
        let raw = TypeInfo::builder("Unwrap").extends(&RAW_TARGET_ACCESS).build();
        assert!(raw.is_raw_target_access());
        assert!(!OBJECT_TYPE.is_raw_target_access());
    }

    #[test]
    fn test_method_signature() {
        let service = TypeInfo::builder("EchoService").contract().build();
        let method = MethodSignature::new(&service, "execute")
            .with_params(&["String"])
            .returns(ReturnType::Reference(Arc::clone(&service)))
            .declares("IoFailure");

        assert_eq!(method.signature(), "EchoService::execute(String)");
        assert!(method.declares_failure("IoFailure"));
        assert!(!method.declares_failure("TimeoutFailure"));
        assert_eq!(method.kind(), MethodKind::Regular);
        assert_eq!(method.key(), method.clone().key());
    }

    #[test]
    fn test_identity_methods() {
        assert_eq!(MethodSignature::equals().kind(), MethodKind::Equals);
        assert_eq!(MethodSignature::hash_code().kind(), MethodKind::HashCode);
        assert_eq!(MethodSignature::finalize().kind(), MethodKind::Finalize);
        assert!(MethodSignature::hash_code().return_type().is_primitive());
    }

    #[test]
    fn test_same_instance() {
        let a: Object = Arc::new(1u32);
        let b = Arc::clone(&a);
        let c: Object = Arc::new(1u32);
        assert!(same_instance(&a, &b));
        assert!(!same_instance(&a, &c));
    }
}
