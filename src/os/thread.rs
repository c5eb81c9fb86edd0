//! 栈线程
//!
//! 一个具名的 OS 线程，内部运行 tokio 单线程运行时，按 FIFO 顺序处理消息。
//! 所有模块的启动、停止以及之后的模块内部工作都在这里串行执行，
//! 模块之间因此不需要各自加锁。

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::handler::{HandlerQueue, Task};
use crate::utils::{CoreError, Result};

/// 栈线程消息
pub(crate) enum Message {
    /// 执行一个处理器任务，代号过期时跳过
    Run {
        queue: Arc<HandlerQueue>,
        generation: u64,
        task: Task,
    },
    /// 屏障：之前入队的消息全部处理完后回复
    Barrier(oneshot::Sender<()>),
    /// 退出消息循环
    Stop,
}

/// 栈线程
pub struct Thread {
    name: String,
    sender: mpsc::UnboundedSender<Message>,
    thread_id: ThreadId,
    join: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Thread {
    /// 创建并启动栈线程
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let loop_name = name.clone();
        let join = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || runtime.block_on(run_loop(loop_name, receiver)))?;
        let thread_id = join.thread().id();

        info!(thread = %name, "栈线程已创建");
        Ok(Self {
            name,
            sender,
            thread_id,
            join: Mutex::new(Some(join)),
            stopped: AtomicBool::new(false),
        })
    }

    /// 线程名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前调用是否发生在本线程上
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// 是否已停止
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.sender.clone()
    }

    /// 等待此前入队的所有消息处理完毕
    ///
    /// 在栈线程自身上调用会返回 `InvalidState`（否则会自锁）。
    pub fn sync(&self) -> Result<()> {
        if self.is_current() {
            return Err(CoreError::InvalidState(format!(
                "不能在栈线程 '{}' 上同步等待自身",
                self.name
            )));
        }

        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Message::Barrier(tx))
            .map_err(|_| CoreError::ThreadStopped(self.name.clone()))?;
        rx.blocking_recv()
            .map_err(|_| CoreError::ThreadStopped(self.name.clone()))
    }

    /// 停止线程并等待其退出
    ///
    /// 停止标记之后的消息不再处理。重复调用返回 `false`。
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }

        let _ = self.sender.send(Message::Stop);

        if self.is_current() {
            warn!(thread = %self.name, "在栈线程自身上请求停止，跳过 join");
            return true;
        }

        if let Some(join) = self.join.lock().take() {
            if join.join().is_err() {
                error!(thread = %self.name, "栈线程异常退出");
            }
        }

        info!(thread = %self.name, "栈线程已停止");
        true
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn run_loop(name: String, mut receiver: mpsc::UnboundedReceiver<Message>) {
    debug!(thread = %name, "消息循环开始");

    while let Some(message) = receiver.recv().await {
        match message {
            Message::Run {
                queue,
                generation,
                task,
            } => {
                // 任务 panic 只丢弃该任务，等待结果的一方会收到通道关闭
                if panic::catch_unwind(AssertUnwindSafe(|| queue.run(generation, task))).is_err() {
                    error!(thread = %name, "栈线程上的任务 panic");
                }
            }
            Message::Barrier(done) => {
                let _ = done.send(());
            }
            Message::Stop => break,
        }
        // 让 Handler::spawn 提交的异步任务有机会推进
        tokio::task::yield_now().await;
    }

    debug!(thread = %name, "消息循环结束");
}
