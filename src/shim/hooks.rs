//! 外部回调
//!
//! 旧 HCI 接口需要知道栈何时完成复位、何时开始关闭。

/// 协议栈生命周期回调
///
/// 回调在门面持有锁时同步调用，实现可以再调用门面的查询接口（锁可重入），
/// 但不能调用 start/stop。
pub trait StackHooks: Send + Sync {
    /// 传统模式下 `start_everything` 完成后调用
    fn on_reset_complete(&self) {}

    /// 非 core 模式下 `stop` 开始时调用
    fn on_shutting_down(&self) {}
}

/// 默认回调：什么也不做
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl StackHooks for NoopHooks {}
