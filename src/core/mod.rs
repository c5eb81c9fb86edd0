//! 核心模块
//!
//! 包含栈配置与特性开关。

pub mod config;
pub mod flags;

pub use config::{CoreConfig, CoreConfigBuilder, LogConfig, StackConfig};
pub use flags::InitFlags;
