//! 日志初始化
//!
//! 引擎本身只通过 `tracing` 宏输出日志，订阅者由使用方决定是否安装。
//! [`LoggingConfig`] 提供一个基于 `tracing-subscriber` 的默认安装方式，
//! 可以从 TOML 的 `[logging]` 表或环境变量读取。

use crate::error::{AopError, AopResult};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 紧凑格式（默认）
    Compact,
    /// 完整格式
    Full,
    /// JSON 格式
    Json,
    /// 美化格式（适合开发）
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（默认：Info）
    pub level: LogLevel,

    /// 日志格式（默认：Compact）
    pub format: LogFormat,

    /// 是否显示时间戳（默认：true）
    pub show_timestamp: bool,

    /// 是否显示目标（模块路径）（默认：false）
    pub show_target: bool,

    /// 是否显示线程 ID（默认：false）
    pub show_thread_ids: bool,

    /// 是否显示线程名（默认：false）
    pub show_thread_names: bool,

    /// 自定义过滤器，例如 "interpose_aop=trace,echo_demo=info"
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_timestamp: true,
            show_target: false,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoggingDocument {
    #[serde(default)]
    logging: LoggingConfig,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_timestamp(mut self, show: bool) -> Self {
        self.show_timestamp = show;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_threads(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self.show_thread_names = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从 TOML 文本读取 `[logging]` 表
    pub fn from_toml_str(content: &str) -> AopResult<Self> {
        let document: LoggingDocument = toml::from_str(content)
            .map_err(|e| AopError::Configuration(format!("Failed to parse logging config: {}", e)))?;
        Ok(document.logging)
    }

    /// 从环境变量读取配置（`RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`）
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(filter) = lookup("RUST_LOG") {
            self.filter = Some(filter);
        }
        if let Some(level) = lookup("LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT").and_then(|v| v.parse().ok()) {
            self.format = format;
        }
        self
    }

    /// 实际使用的过滤指令
    pub fn directive(&self) -> String {
        match &self.filter {
            Some(filter) if EnvFilter::try_new(filter).is_ok() => filter.clone(),
            _ => self.level.to_string(),
        }
    }

    /// 安装全局订阅者
    ///
    /// 已经安装过订阅者时返回配置错误。
    pub fn init(self) -> AopResult<()> {
        let filter = EnvFilter::try_new(self.directive())
            .map_err(|e| AopError::Configuration(format!("Invalid log filter: {}", e)))?;
        tracing_subscriber::registry()
            .with(self.layer())
            .with(filter)
            .try_init()
            .map_err(|e| AopError::Configuration(format!("Failed to initialize logging: {}", e)))
    }

    fn layer(&self) -> BoxedLayer {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_thread_names(self.show_thread_names);
        match (self.format, self.show_timestamp) {
            (LogFormat::Compact, true) => layer.compact().boxed(),
            (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
            (LogFormat::Full, true) => layer.boxed(),
            (LogFormat::Full, false) => layer.without_time().boxed(),
            (LogFormat::Json, _) => layer.json().boxed(),
            (LogFormat::Pretty, _) => layer.pretty().boxed(),
        }
    }
}
