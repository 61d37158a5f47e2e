//! 代理配置
//!
//! 支持从 TOML 的 `[proxy]` 表或配置文件读取，并可用 `INTERPOSE_PROXY_*` 环境变量覆盖。
//!
//! ```toml
//! [proxy]
//! proxy_target_class = false
//! expose_proxy = true
//! frozen = true
//! ```

use crate::error::{AopError, AopResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "INTERPOSE_PROXY_";

/// 代理配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// 是否使用子类策略代理目标类型本身（默认：false）
    pub proxy_target_class: bool,

    /// 是否启用激进优化，同样会选择子类策略（默认：false）
    pub optimize: bool,

    /// 是否禁止通过代理访问配置（默认：false）
    pub opaque: bool,

    /// 是否在调用期间暴露当前代理（默认：false）
    pub expose_proxy: bool,

    /// 创建后是否冻结配置（默认：false）
    pub frozen: bool,

    /// 通知器是否已预先过滤（默认：false）
    pub pre_filtered: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    proxy: ProxyConfig,
}

impl ProxyConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文本读取 `[proxy]` 表，缺失时使用默认值
    pub fn from_toml_str(content: &str) -> AopResult<Self> {
        let document: ConfigDocument = toml::from_str(content)
            .map_err(|e| AopError::Configuration(format!("Failed to parse proxy config: {}", e)))?;
        Ok(document.proxy)
    }

    /// 从 TOML 文件读取
    pub fn from_file<P: AsRef<Path>>(path: P) -> AopResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AopError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded proxy config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// 用环境变量覆盖配置
    ///
    /// 例如 `INTERPOSE_PROXY_EXPOSE_PROXY=true`，无法解析的值被忽略。
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flags: [(&str, &mut bool); 6] = [
            ("PROXY_TARGET_CLASS", &mut self.proxy_target_class),
            ("OPTIMIZE", &mut self.optimize),
            ("OPAQUE", &mut self.opaque),
            ("EXPOSE_PROXY", &mut self.expose_proxy),
            ("FROZEN", &mut self.frozen),
            ("PRE_FILTERED", &mut self.pre_filtered),
        ];
        for (key, flag) in flags {
            if let Some(raw) = lookup(key) {
                match parse_bool(&raw) {
                    Some(value) => {
                        tracing::debug!("Proxy config override {}{}={}", ENV_PREFIX, key, value);
                        *flag = value;
                    }
                    None => tracing::warn!("Ignoring invalid boolean for {}{}: {}", ENV_PREFIX, key, raw),
                }
            }
        }
        self
    }

    /// 设置是否代理目标类型本身
    pub fn proxy_target_class(mut self, value: bool) -> Self {
        self.proxy_target_class = value;
        self
    }

    /// 设置是否启用优化
    pub fn optimize(mut self, value: bool) -> Self {
        self.optimize = value;
        self
    }

    /// 设置是否禁止访问配置
    pub fn opaque(mut self, value: bool) -> Self {
        self.opaque = value;
        self
    }

    /// 设置是否暴露当前代理
    pub fn expose_proxy(mut self, value: bool) -> Self {
        self.expose_proxy = value;
        self
    }

    /// 设置是否冻结
    pub fn frozen(mut self, value: bool) -> Self {
        self.frozen = value;
        self
    }

    /// 设置通知器是否已预先过滤
    pub fn pre_filtered(mut self, value: bool) -> Self {
        self.pre_filtered = value;
        self
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_toml_str() {
        let config = ProxyConfig::from_toml_str(
            r#"
            [proxy]
            expose_proxy = true
            frozen = true
            "#,
        )
        .unwrap();

        assert!(config.expose_proxy);
        assert!(config.frozen);
        assert!(!config.proxy_target_class);
        assert_eq!(ProxyConfig::from_toml_str("").unwrap(), ProxyConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let result = ProxyConfig::from_toml_str("[proxy]\nfrozen = \"sometimes\"");
        assert!(matches!(result, Err(AopError::Configuration(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = ProxyConfig::from_file("/nonexistent/interpose.toml");
        assert!(matches!(result, Err(AopError::Configuration(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [("OPTIMIZE", "yes"), ("OPAQUE", "maybe"), ("FROZEN", "0")]
            .into_iter()
            .collect();
        let config = ProxyConfig::new()
            .frozen(true)
            .with_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert!(config.optimize);
        assert!(!config.opaque);
        assert!(!config.frozen);
    }

    #[test]
    fn test_builder() {
        let config = ProxyConfig::new()
            .proxy_target_class(true)
            .expose_proxy(true)
            .pre_filtered(true);
        assert!(config.proxy_target_class);
        assert!(config.expose_proxy);
        assert!(config.pre_filtered);
        assert!(!config.optimize);
    }
}
