//! 任务处理器
//!
//! 每个 [`Handler`] 拥有自己的任务计数和代号，任务随消息一起进入栈线程的
//! 通道，按全局提交顺序执行。`clear()` 递增代号，旧代号的任务在出队时被跳过，
//! 不影响同一线程上的其他处理器。`spawn` 出去的异步任务也记在处理器上，
//! `settle()` 等待它们结束，`clear()` / `close()` 取消它们。

use std::future::Future;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::thread::{Message, Thread};
use crate::utils::{CoreError, Result};

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct QueueState {
    /// `clear()` 时递增
    generation: u64,
    /// 已提交、尚未执行的任务数
    pending: usize,
    closed: bool,
    /// `spawn` 出去、可能仍在运行的异步任务
    spawned: Vec<JoinHandle<()>>,
}

/// 处理器队列（与栈线程共享）
pub(crate) struct HandlerQueue {
    state: Mutex<QueueState>,
    sender: mpsc::UnboundedSender<Message>,
    thread_name: String,
    thread_id: ThreadId,
}

impl HandlerQueue {
    /// 执行一条任务；处理器已清空或关闭时丢弃
    pub(crate) fn run(&self, generation: u64, task: Task) {
        {
            let mut state = self.state.lock();
            if state.closed || state.generation != generation {
                return;
            }
            state.pending = state.pending.saturating_sub(1);
        }
        task();
    }
}

/// 绑定到栈线程的任务处理器
#[derive(Clone)]
pub struct Handler {
    queue: Arc<HandlerQueue>,
}

impl Handler {
    /// 创建绑定到 `thread` 的处理器
    pub fn new(thread: &Thread) -> Self {
        Self {
            queue: Arc::new(HandlerQueue {
                state: Mutex::new(QueueState::default()),
                sender: thread.sender(),
                thread_name: thread.name().to_string(),
                thread_id: thread.thread_id(),
            }),
        }
    }

    /// 提交任务
    ///
    /// 处理器已关闭或线程已停止时返回 `false`，任务被丢弃。
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.queue.state.lock();
        if state.closed {
            warn!(thread = %self.queue.thread_name, "处理器已关闭，任务被丢弃");
            return false;
        }

        let message = Message::Run {
            queue: self.queue.clone(),
            generation: state.generation,
            task: Box::new(task),
        };
        if self.queue.sender.send(message).is_err() {
            warn!(thread = %self.queue.thread_name, "栈线程已停止，任务被丢弃");
            return false;
        }
        state.pending += 1;
        true
    }

    /// 在栈线程的运行时上启动异步任务
    ///
    /// 任务记在本处理器上：`settle()` 会等待它结束，`clear()` 和 `close()`
    /// 会取消它。
    pub fn spawn<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let queue = self.queue.clone();
        self.post(move || {
            let handle = tokio::spawn(future);
            let mut state = queue.state.lock();
            state.spawned.retain(|h| !h.is_finished());
            if state.closed {
                handle.abort();
            } else {
                state.spawned.push(handle);
            }
        })
    }

    /// 在栈线程上执行 `f` 并等待结果
    ///
    /// 处理器已关闭返回 `HandlerClosed`；任务 panic、被清空或线程在执行前停止
    /// 返回 `ThreadStopped`。
    pub fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_off_stack_thread()?;

        let (tx, rx) = oneshot::channel();
        if !self.post(move || {
            let _ = tx.send(f());
        }) {
            return Err(self.rejected());
        }

        rx.blocking_recv().map_err(|_| self.rejected())
    }

    /// 等待本处理器此前提交的任务全部执行完
    pub fn sync(&self) -> Result<()> {
        self.call(|| ())
    }

    /// 等待本处理器的任务以及它 `spawn` 的异步任务全部结束
    ///
    /// 异步任务在运行中又提交的工作也会被等待。
    pub fn settle(&self) -> Result<()> {
        loop {
            self.sync()?;

            let handles = std::mem::take(&mut self.queue.state.lock().spawned);
            if handles.is_empty() {
                return Ok(());
            }

            let done = self.call(move || {
                let (tx, rx) = oneshot::channel();
                tokio::spawn(async move {
                    for handle in handles {
                        let _ = handle.await;
                    }
                    let _ = tx.send(());
                });
                rx
            })?;
            done.blocking_recv().map_err(|_| self.rejected())?;
        }
    }

    /// 丢弃所有尚未执行的任务并取消异步任务，返回丢弃的任务数
    pub fn clear(&self) -> usize {
        self.reset(false)
    }

    /// 清空并关闭处理器，之后提交的任务一律被拒绝
    pub fn close(&self) -> usize {
        self.reset(true)
    }

    fn reset(&self, close: bool) -> usize {
        let (dropped, spawned) = {
            let mut state = self.queue.state.lock();
            state.generation += 1;
            state.closed |= close;
            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.spawned),
            )
        };

        let mut aborted = 0;
        for handle in spawned {
            if !handle.is_finished() {
                handle.abort();
                aborted += 1;
            }
        }

        if dropped > 0 || aborted > 0 {
            debug!(thread = %self.queue.thread_name, dropped, aborted, close, "已清空处理器队列");
        }
        dropped
    }

    /// 尚未执行的任务数
    pub fn pending(&self) -> usize {
        self.queue.state.lock().pending
    }

    pub fn is_closed(&self) -> bool {
        self.queue.state.lock().closed
    }

    /// 当前调用是否在栈线程上
    pub fn is_on_stack_thread(&self) -> bool {
        std::thread::current().id() == self.queue.thread_id
    }

    /// 绑定线程的名称
    pub fn thread_name(&self) -> &str {
        &self.queue.thread_name
    }

    fn rejected(&self) -> CoreError {
        if self.is_closed() {
            CoreError::HandlerClosed(self.queue.thread_name.clone())
        } else {
            CoreError::ThreadStopped(self.queue.thread_name.clone())
        }
    }

    fn ensure_off_stack_thread(&self) -> Result<()> {
        if self.is_on_stack_thread() {
            return Err(CoreError::InvalidState(format!(
                "不能在栈线程 '{}' 上同步等待",
                self.queue.thread_name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("thread", &self.queue.thread_name)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}
