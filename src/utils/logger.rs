//! 日志系统模块
//!
//! 基于 tracing 生态为协议栈提供诊断输出：
//!
//! - 控制台输出（pretty 或 JSON）
//! - 文件输出（非阻塞写入，按时间轮转）
//! - `RUST_LOG` / 过滤指令按模块调整级别
//!
//! 栈本身只把日志当作“发出即忘”的诊断通道，初始化失败不会影响栈的启停。
//!
//! # 示例
//!
//! ```rust,no_run
//! use gd_stack::utils::logger::{Logger, LoggerConfig, RotationStrategy};
//!
//! let config = LoggerConfig::builder()
//!     .level("debug")
//!     .file_output("./logs")
//!     .rotation(RotationStrategy::Hourly)
//!     .build();
//! let _guard = Logger::init(config).unwrap();
//!
//! tracing::info!(module = "HciLayer", "模块已启动");
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::utils::{CoreError, Result};

// ============================================================================
// 日志轮转策略
// ============================================================================

/// 日志文件轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转
    Never,
    /// 每小时轮转
    Hourly,
    /// 每天轮转（默认）
    #[default]
    Daily,
}

impl RotationStrategy {
    fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }

    /// 从字符串解析，无法识别时回退到 `Daily`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "never" | "none" => RotationStrategy::Never,
            "hourly" | "hour" => RotationStrategy::Hourly,
            _ => RotationStrategy::Daily,
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationStrategy::Never => write!(f, "never"),
            RotationStrategy::Hourly => write!(f, "hourly"),
            RotationStrategy::Daily => write!(f, "daily"),
        }
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 默认日志级别（"trace" / "debug" / "info" / "warn" / "error"）
    pub level: String,

    /// 是否使用 JSON 格式
    pub json_format: bool,

    /// 是否输出到控制台
    pub console_output: bool,

    /// 文件输出目录（None 表示不写文件）
    pub file_output: Option<PathBuf>,

    /// 日志文件名前缀
    pub file_prefix: String,

    /// 轮转策略
    pub rotation: RotationStrategy,

    /// 是否显示 target
    pub show_target: bool,

    /// 是否显示线程名（栈线程的日志因此可以和调用方区分开）
    pub show_thread_names: bool,

    /// 是否显示文件名和行号
    pub show_file_line: bool,

    /// 额外的过滤指令（EnvFilter 格式），例如 "gd_stack::module=debug"
    pub filter_directives: Option<String>,

    /// 控制台是否启用 ANSI 颜色
    pub ansi_colors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: None,
            file_prefix: "gd-stack".to_string(),
            rotation: RotationStrategy::Daily,
            show_target: true,
            show_thread_names: true,
            show_file_line: false,
            filter_directives: None,
            ansi_colors: true,
        }
    }
}

impl LoggerConfig {
    /// 创建配置构建器
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::new()
    }

    /// 从 CoreConfig 的 LogConfig 创建
    pub fn from_log_config(log_config: &crate::core::config::LogConfig) -> Self {
        Self {
            level: log_config.level.clone(),
            json_format: log_config.json_format,
            file_output: if log_config.file_output {
                log_config.log_dir.clone()
            } else {
                None
            },
            rotation: RotationStrategy::parse(&log_config.rotation),
            ..Default::default()
        }
    }

    fn parse_level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// 日志配置构建器
#[derive(Debug, Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    /// 设置日志级别
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// 启用 JSON 格式
    pub fn json_format(mut self, enable: bool) -> Self {
        self.config.json_format = enable;
        self
    }

    /// 设置控制台输出
    pub fn console_output(mut self, enable: bool) -> Self {
        self.config.console_output = enable;
        self
    }

    /// 设置文件输出目录
    pub fn file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_output = Some(dir.into());
        self
    }

    /// 设置日志文件前缀
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    /// 设置轮转策略
    pub fn rotation(mut self, strategy: RotationStrategy) -> Self {
        self.config.rotation = strategy;
        self
    }

    pub fn show_target(mut self, enable: bool) -> Self {
        self.config.show_target = enable;
        self
    }

    pub fn show_thread_names(mut self, enable: bool) -> Self {
        self.config.show_thread_names = enable;
        self
    }

    pub fn show_file_line(mut self, enable: bool) -> Self {
        self.config.show_file_line = enable;
        self
    }

    /// 设置过滤指令
    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    pub fn ansi_colors(mut self, enable: bool) -> Self {
        self.config.ansi_colors = enable;
        self
    }

    /// 构建配置
    pub fn build(self) -> LoggerConfig {
        self.config
    }
}

// ============================================================================
// 日志守卫
// ============================================================================

/// 日志系统守卫
///
/// 持有非阻塞写入器的 `WorkerGuard`，丢弃时刷新所有挂起的日志。
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

impl LogGuard {
    fn empty() -> Self {
        Self {
            _guards: Vec::new(),
        }
    }

    /// 守卫持有的写入器数量
    pub fn writer_count(&self) -> usize {
        self._guards.len()
    }
}

// ============================================================================
// 日志系统
// ============================================================================

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志系统入口
pub struct Logger;

impl Logger {
    /// 初始化全局日志
    ///
    /// 返回的 [`LogGuard`] 必须保持存活直到进程退出。
    ///
    /// # Errors
    ///
    /// 已经初始化过，或全局 subscriber 已被其他代码设置时返回 `InitFailed`。
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if LOGGER_INITIALIZED.get().is_some() {
            return Err(CoreError::InitFailed(
                "日志系统已初始化，不能重复初始化".to_string(),
            ));
        }

        let env_filter = Self::create_env_filter(&config);
        let mut guard = LogGuard::empty();
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if config.console_output {
            let (writer, console_guard) = tracing_appender::non_blocking(io::stdout());
            guard._guards.push(console_guard);
            layers.push(Self::build_layer(&config, writer, config.ansi_colors));
        }

        if let Some(ref log_dir) = config.file_output {
            let appender = RollingFileAppender::new(
                config.rotation.to_rotation(),
                log_dir,
                format!("{}.log", config.file_prefix),
            );
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard._guards.push(file_guard);
            layers.push(Self::build_layer(&config, writer, false));
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| CoreError::InitFailed(format!("日志系统初始化失败: {}", e)))?;

        let _ = LOGGER_INITIALIZED.set(());
        Ok(guard)
    }

    /// 尝试初始化日志，失败时返回空守卫
    ///
    /// 适用于测试以及可能被多次调用的场景。
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_else(|_| LogGuard::empty())
    }

    fn build_layer(config: &LoggerConfig, writer: NonBlocking, ansi: bool) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(config.show_target)
            .with_thread_names(config.show_thread_names)
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line);

        if config.json_format {
            layer.json().with_ansi(false).boxed()
        } else {
            layer.with_ansi(ansi).boxed()
        }
    }

    /// 创建 EnvFilter，`RUST_LOG` 优先于配置中的级别
    fn create_env_filter(config: &LoggerConfig) -> EnvFilter {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.parse_level().to_string()));

        match config.filter_directives {
            Some(ref directives) => directives
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .fold(filter, |f, directive| match directive.parse() {
                    Ok(d) => f.add_directive(d),
                    Err(_) => f,
                }),
            None => filter,
        }
    }
}

// ============================================================================
// 结构化日志字段定义
// ============================================================================

/// 标准日志字段名称
pub mod fields {
    /// 模块名
    pub const MODULE: &str = "module";
    /// 模块在启动顺序中的位置
    pub const ORDER: &str = "order";
    /// 启动模式（idle / legacy / core）
    pub const MODE: &str = "mode";
    /// 执行上下文线程名
    pub const THREAD: &str = "thread";
    /// 栈运行状态
    pub const STATE: &str = "state";
    /// 错误码
    pub const ERROR_CODE: &str = "error_code";
    /// 耗时（微秒）
    pub const DURATION_US: &str = "duration_us";
}

/// 创建模块生命周期 span
///
/// ```rust,ignore
/// let span = gd_stack::module_span!("start", "HciLayer");
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! module_span {
    ($phase:expr, $module:expr) => {
        tracing::info_span!("module", phase = %$phase, module = %$module)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_strategy_parse() {
        assert_eq!(RotationStrategy::parse("daily"), RotationStrategy::Daily);
        assert_eq!(RotationStrategy::parse("HOURLY"), RotationStrategy::Hourly);
        assert_eq!(RotationStrategy::parse("none"), RotationStrategy::Never);
        assert_eq!(RotationStrategy::parse("weekly"), RotationStrategy::Daily);
        assert_eq!(RotationStrategy::Hourly.to_string(), "hourly");
    }

    #[test]
    fn test_logger_config_default() {
        let config = LoggerConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output.is_none());
        assert_eq!(config.file_prefix, "gd-stack");
        assert!(config.show_thread_names);
    }

    #[test]
    fn test_logger_config_builder() {
        let config = LoggerConfig::builder()
            .level("debug")
            .json_format(true)
            .file_output("/var/log/gd")
            .file_prefix("stack")
            .rotation(RotationStrategy::Never)
            .filter_directives("gd_stack::os=trace")
            .ansi_colors(false)
            .build();

        assert_eq!(config.parse_level(), Level::DEBUG);
        assert!(config.json_format);
        assert_eq!(config.file_output, Some(PathBuf::from("/var/log/gd")));
        assert_eq!(config.file_prefix, "stack");
        assert_eq!(config.rotation, RotationStrategy::Never);
        assert_eq!(
            config.filter_directives.as_deref(),
            Some("gd_stack::os=trace")
        );
        assert!(!config.ansi_colors);
    }

    #[test]
    fn test_parse_level_fallback() {
        let config = LoggerConfig::builder().level("verbose").build();
        assert_eq!(config.parse_level(), Level::INFO);
        let config = LoggerConfig::builder().level("WARNING").build();
        assert_eq!(config.parse_level(), Level::WARN);
    }

    #[test]
    fn test_from_log_config() {
        use crate::core::config::LogConfig;

        let log_config = LogConfig {
            level: "trace".to_string(),
            file_output: false,
            log_dir: Some(PathBuf::from("/tmp/logs")),
            json_format: true,
            rotation: "hourly".to_string(),
        };

        let config = LoggerConfig::from_log_config(&log_config);
        assert_eq!(config.level, "trace");
        assert!(config.json_format);
        // file_output=false 时即使给了目录也不写文件
        assert!(config.file_output.is_none());
        assert_eq!(config.rotation, RotationStrategy::Hourly);
    }

    #[test]
    fn test_try_init_never_fails() {
        let _guard = Logger::try_init(LoggerConfig::builder().console_output(false).build());
        let guard = Logger::try_init(LoggerConfig::default());
        // 第二次初始化拿到的是空守卫
        assert_eq!(guard.writer_count(), 0);
    }
}
