//! # GD Stack - 分层协议栈编排核心
//!
//! 以模块为单位组织的蓝牙协议栈启动核心，提供：
//!
//! - **模块契约**: 每个模块静态声明依赖，在栈线程上启动与停止
//! - **依赖解析**: 对请求的模块列表做拓扑排序，检测缺失依赖与环
//! - **生命周期管理**: 按依赖顺序启动、逆序停止，启动失败整体回滚
//! - **协议栈门面**: 进程级单例，按特性开关选择启动模式
//! - **配置与日志**: YAML/JSON 配置文件，基于 tracing 的结构化日志
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use gd_stack::{InitFlags, Stack};
//!
//! InitFlags::load(InitFlags::parse(&["INIT_gd_core=true"]).unwrap());
//!
//! let stack = Stack::get_instance();
//! stack.start_everything();
//! assert!(stack.get_btm().is_some());
//! stack.stop();
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块契约、依赖图与生命周期管理器
//! - `modules` - 协议栈各层模块
//! - `os` - 栈线程与任务处理器
//! - `shim` - 协议栈门面
//! - `core` - 配置与特性开关
//! - `utils` - 错误类型与日志系统

#![warn(rustdoc::missing_crate_level_docs)]

#[cfg(test)]
#[macro_use]
mod test_support;

pub mod core;
pub mod module;
pub mod modules;
pub mod os;
pub mod shim;
pub mod utils;

pub use module::{
    DependencyGraph, Module, ModuleContext, ModuleKind, ModuleList, ModuleStatus, StackManager,
};
pub use os::{Handler, Thread};
pub use shim::{Btm, NoopHooks, RunState, Stack, StackHooks, StartupMode};

pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, fatal, CoreError, Result};

pub use core::config::{CoreConfig, CoreConfigBuilder, LogConfig, StackConfig};
pub use core::flags::InitFlags;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
