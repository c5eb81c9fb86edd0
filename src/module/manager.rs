//! 模块生命周期管理器
//!
//! 将请求的 [`ModuleList`] 解析为启动顺序，在栈线程上逐个启动模块，
//! 并在关闭时按相反顺序停止它们。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::dependency::DependencyGraph;
use super::list::ModuleList;
use super::metadata::{Module, ModuleContext, ModuleKind, ModuleStatus};
use super::registry::{ModuleRegistry, RegistryEntry};
use crate::os::{Handler, Thread};
use crate::utils::{CoreError, Result};

/// 模块生命周期管理器
///
/// `start_up` 要么启动全部模块，要么逆序停止已启动的模块后返回错误；
/// 失败返回时注册表为空。
#[derive(Default)]
pub struct StackManager {
    /// 运行中的模块
    registry: RwLock<ModuleRegistry>,
    /// 串行化 start_up / shut_down
    lifecycle: Mutex<()>,
}

impl StackManager {
    /// 创建空的管理器
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析启动顺序
    ///
    /// 依赖总在依赖方之前；平局按列表插入顺序裁决。
    pub fn resolve_order(list: &ModuleList) -> Result<Vec<ModuleKind>> {
        DependencyGraph::build(list)?.topological_sort()
    }

    /// 按依赖顺序启动列表中的所有模块
    ///
    /// # 错误
    ///
    /// - 已有模块在运行：`InvalidState`
    /// - 依赖缺失或成环：`DependencyNotFound` / `CircularDependency`，不会启动任何模块
    /// - 某个模块启动失败：`ModuleStartFailed`，此前启动的模块全部被逆序停止
    #[instrument(skip_all, fields(thread = %thread.name(), requested = list.len()))]
    pub fn start_up(&self, list: &ModuleList, thread: &Thread) -> Result<()> {
        let _guard = self.lifecycle.lock();

        if !self.registry.read().is_empty() {
            return Err(CoreError::InvalidState(
                "模块已启动，不能重复 start_up".to_string(),
            ));
        }

        let order = Self::resolve_order(list)?;
        debug!(order = ?order, "启动顺序已解析");

        let begin = Instant::now();
        for kind in &order {
            if let Err(e) = self.start_one(*kind, thread) {
                error!(module = kind.name(), error = %e, error_code = e.error_code(), "模块启动失败，回滚");
                self.stop_all();
                return Err(e);
            }
        }

        info!(
            modules = order.len(),
            duration_us = begin.elapsed().as_micros() as u64,
            "所有模块已启动"
        );
        Ok(())
    }

    fn start_one(&self, kind: ModuleKind, thread: &Thread) -> Result<()> {
        let dependencies: HashMap<_, _> = {
            let registry = self.registry.read();
            kind.dependencies()
                .iter()
                .filter_map(|dep| registry.get_any(dep.id()).map(|any| (dep.id(), any)))
                .collect()
        };

        let handler = Handler::new(thread);
        let ctx = ModuleContext::new(kind.name(), dependencies, handler.clone());

        let span = crate::module_span!("start", kind.name());
        let begin = Instant::now();
        let started = match handler.call(move || span.in_scope(|| kind.construct(&ctx))) {
            Ok(Ok(started)) => started,
            Ok(Err(e)) => {
                return Err(Self::abandon(
                    &handler,
                    CoreError::ModuleStartFailed {
                        module: kind.name().to_string(),
                        reason: e.to_string(),
                    },
                ))
            }
            Err(_) if thread.is_stopped() => {
                return Err(Self::abandon(
                    &handler,
                    CoreError::ThreadStopped(thread.name().to_string()),
                ))
            }
            Err(_) => {
                return Err(Self::abandon(
                    &handler,
                    CoreError::ModuleStartFailed {
                        module: kind.name().to_string(),
                        reason: "start 在栈线程上 panic".to_string(),
                    },
                ))
            }
        };

        let order = match self.registry.write().insert(kind, started, handler.clone()) {
            Ok(order) => order,
            Err(e) => return Err(Self::abandon(&handler, e)),
        };

        // 模块在 start 中提交或 spawn 的初始化工作也要在下一个模块之前完成，
        // 包括它通过依赖的处理器提交的工作
        let handlers = self.registry.read().handlers();
        for handler in handlers.iter().rev() {
            handler.settle()?;
        }
        thread.sync()?;
        info!(
            module = kind.name(),
            order,
            duration_us = begin.elapsed().as_micros() as u64,
            "模块已启动"
        );
        Ok(())
    }

    /// 启动失败的模块不进注册表，它已提交的工作也不再执行
    fn abandon(handler: &Handler, err: CoreError) -> CoreError {
        handler.close();
        err
    }

    /// 按启动的相反顺序停止所有模块
    ///
    /// 每个模块先清空自己的处理器队列，再在栈线程上执行 `stop`。
    /// 没有运行中的模块时为空操作。
    #[instrument(skip_all, fields(thread = %thread.name()))]
    pub fn shut_down(&self, thread: &Thread) {
        let _guard = self.lifecycle.lock();
        let count = self.stop_all();
        if let Err(e) = thread.sync() {
            warn!(error = %e, "等待栈线程清空失败");
        }
        info!(modules = count, "所有模块已停止");
    }

    fn stop_all(&self) -> usize {
        let entries = self.registry.write().drain_reverse();
        let count = entries.len();
        for entry in entries {
            Self::stop_one(entry);
        }
        count
    }

    fn stop_one(entry: RegistryEntry) {
        let name = entry.kind.name();
        let dropped = entry.handler.clear();

        let instance = entry.instance.clone();
        let span = crate::module_span!("stop", name);
        match entry.handler.call(move || span.in_scope(|| instance.stop_module())) {
            Ok(()) => info!(module = name, order = entry.order, dropped, "模块已停止"),
            Err(e) => error!(module = name, error = %e, "模块停止失败"),
        }
        entry.handler.close();
    }

    /// 获取运行中的模块实例
    pub fn get_instance<M: Module>(&self) -> Result<Arc<M>> {
        self.registry
            .read()
            .get::<M>()
            .ok_or_else(|| CoreError::ModuleNotStarted(M::NAME.to_string()))
    }

    pub fn is_started<M: Module>(&self) -> bool {
        self.registry.read().contains(&ModuleKind::of::<M>())
    }

    /// 运行中的模块，按启动顺序
    pub fn started_modules(&self) -> Vec<ModuleKind> {
        self.registry.read().start_order()
    }

    pub fn module_count(&self) -> usize {
        self.registry.read().len()
    }

    /// 模块专属的处理器
    pub fn handler_of<M: Module>(&self) -> Option<Handler> {
        self.registry.read().handler_of(&ModuleKind::of::<M>())
    }

    /// 运行中模块的状态
    pub fn statuses(&self) -> Vec<ModuleStatus> {
        self.registry.read().statuses()
    }

    /// 诊断输出，每个模块一行
    pub fn dump(&self) -> Vec<String> {
        self.statuses()
            .iter()
            .map(|s| {
                format!(
                    "#{:<2} {:<24} started_at={}",
                    s.order,
                    s.name,
                    s.started_at.format("%Y-%m-%d %H:%M:%S%.3f")
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for StackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackManager")
            .field("registry", &*self.registry.read())
            .finish()
    }
}
