//! 协议栈门面
//!
//! - [`stack`] - 单例门面与启动模式
//! - [`btm`] - core 模式下的设备发现门面
//! - [`legacy`] - 传统模式下的 ACL 连接管理
//! - [`hooks`] - 生命周期回调

pub mod btm;
pub mod hooks;
pub mod legacy;
pub mod stack;

pub use btm::Btm;
pub use hooks::{NoopHooks, StackHooks};
pub use stack::{RunState, Stack, StartupMode};
