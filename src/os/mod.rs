//! 执行上下文
//!
//! - [`Thread`] - 串行处理所有模块工作的栈线程
//! - [`Handler`] - 绑定到栈线程的任务队列

pub mod handler;
pub mod thread;

pub use handler::Handler;
pub use thread::Thread;
