//! 模块管理
//!
//! - [`metadata`] - 模块契约、模块种类与启动上下文
//! - [`list`] - 请求的模块列表
//! - [`dependency`] - 依赖图与启动顺序解析
//! - [`registry`] - 运行中模块的注册表
//! - [`manager`] - 生命周期管理器

pub mod dependency;
pub mod list;
pub mod manager;
pub mod metadata;
pub mod registry;

pub use dependency::DependencyGraph;
pub use list::ModuleList;
pub use manager::StackManager;
pub use metadata::{Module, ModuleContext, ModuleKind, ModuleStatus};
pub use registry::ModuleRegistry;
