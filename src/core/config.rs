//! 协议栈配置
//!
//! 定义栈的配置结构和加载逻辑。配置文件按扩展名选择 JSON 或 YAML。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::flags::InitFlags;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 栈执行上下文配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// 栈线程名称
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_thread_name() -> String {
    "gd_stack_thread".to_string()
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

/// 顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 栈配置
    #[serde(default)]
    pub stack: StackConfig,

    /// 特性开关
    #[serde(default)]
    pub init_flags: InitFlags,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

impl CoreConfig {
    /// 创建配置构建器
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> crate::utils::Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await?;

        let mut config: CoreConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        // 配置文件里的开关同样需要补齐前置开关并检查组合
        config.init_flags = config.init_flags.with_implied();
        config.init_flags.validate()?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// 合并另一个配置（用于命令行覆盖）
    ///
    /// 开关取并集，其余字段仅在非默认值时覆盖。
    pub fn merge(&mut self, other: CoreConfig) {
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.stack.thread_name != default_thread_name() {
            self.stack.thread_name = other.stack.thread_name;
        }

        let flags = &mut self.init_flags;
        flags.gd_hci |= other.init_flags.gd_hci;
        flags.gd_controller |= other.init_flags.gd_controller;
        flags.gd_acl |= other.init_flags.gd_acl;
        flags.gd_security |= other.init_flags.gd_security;
        flags.gd_core |= other.init_flags.gd_core;
        *flags = flags.with_implied();

        if other.dev_mode {
            self.dev_mode = true;
        }
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 设置栈线程名称
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.stack.thread_name = name.into();
        self
    }

    /// 设置特性开关（自动补齐前置开关）
    pub fn init_flags(mut self, flags: InitFlags) -> Self {
        self.config.init_flags = flags.with_implied();
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert!(!config.dev_mode);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.stack.thread_name, "gd_stack_thread");
        assert_eq!(config.init_flags, InitFlags::default());
    }

    #[test]
    fn test_config_builder() {
        let config = CoreConfig::builder()
            .log_level("debug")
            .thread_name("bt_stack")
            .init_flags(InitFlags {
                gd_acl: true,
                ..Default::default()
            })
            .build();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.stack.thread_name, "bt_stack");
        assert!(config.init_flags.gd_hci);
        assert!(config.init_flags.gd_controller);
        assert!(!config.init_flags.gd_security);
    }

    #[test]
    fn test_config_merge() {
        let mut base = CoreConfig::builder()
            .init_flags(InitFlags {
                gd_hci: true,
                ..Default::default()
            })
            .build();
        let override_config = CoreConfig::builder()
            .log_level("trace")
            .init_flags(InitFlags {
                gd_core: true,
                ..Default::default()
            })
            .dev_mode()
            .build();

        base.merge(override_config);

        assert_eq!(base.logging.level, "trace");
        assert_eq!(base.init_flags, InitFlags::all());
        assert!(base.dev_mode);
        assert_eq!(base.stack.thread_name, "gd_stack_thread");
    }

    #[test]
    fn test_config_serialization() {
        let config = CoreConfig::builder()
            .thread_name("stack")
            .init_flags(InitFlags {
                gd_controller: true,
                ..Default::default()
            })
            .build();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: CoreConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.stack.thread_name, "stack");
        assert!(parsed.init_flags.gd_hci);
        assert!(parsed.init_flags.gd_controller);
    }
}
