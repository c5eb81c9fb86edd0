//! 模块注册表
//!
//! 按 `TypeId` 保存运行中的模块实例，并记录它们的启动顺序。
//! 注册表只在生命周期管理器内部修改，对外暴露的是只读查询。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::metadata::{AnyModule, Module, ModuleKind, ModuleStatus, StartedModule};
use crate::os::Handler;
use crate::utils::{CoreError, Result};

/// 注册表中的一项
pub(crate) struct RegistryEntry {
    pub(crate) kind: ModuleKind,
    pub(crate) instance: Arc<dyn AnyModule>,
    pub(crate) any: Arc<dyn Any + Send + Sync>,
    pub(crate) handler: Handler,
    pub(crate) order: usize,
    pub(crate) started_at: DateTime<Utc>,
}

impl RegistryEntry {
    fn status(&self) -> ModuleStatus {
        ModuleStatus {
            name: self.kind.name().to_string(),
            order: self.order,
            started_at: self.started_at,
        }
    }
}

/// 运行中模块的注册表
#[derive(Default)]
pub struct ModuleRegistry {
    /// 按启动顺序排列的条目
    entries: Vec<RegistryEntry>,
    /// TypeId -> entries 下标
    index: HashMap<TypeId, usize>,
}

impl ModuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个刚启动的模块，启动顺序即插入顺序
    pub(crate) fn insert(
        &mut self,
        kind: ModuleKind,
        started: StartedModule,
        handler: Handler,
    ) -> Result<usize> {
        if self.index.contains_key(&kind.id()) {
            return Err(CoreError::InvalidState(format!(
                "模块 '{}' 已在注册表中",
                kind.name()
            )));
        }

        let order = self.entries.len();
        self.entries.push(RegistryEntry {
            kind,
            instance: started.instance,
            any: started.any,
            handler,
            order,
            started_at: Utc::now(),
        });
        self.index.insert(kind.id(), order);
        Ok(order)
    }

    /// 获取模块实例
    ///
    /// 类型不匹配（理论上不会发生）与未注册同样返回 `None`。
    pub fn get<M: Module>(&self) -> Option<Arc<M>> {
        self.get_any(TypeId::of::<M>())
            .and_then(|any| any.downcast::<M>().ok())
    }

    pub(crate) fn get_any(&self, id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.index.get(&id).map(|&i| self.entries[i].any.clone())
    }

    /// 模块专属的处理器
    pub(crate) fn handler_of(&self, kind: &ModuleKind) -> Option<Handler> {
        self.index
            .get(&kind.id())
            .map(|&i| self.entries[i].handler.clone())
    }

    /// 所有模块的处理器，按启动顺序
    pub(crate) fn handlers(&self) -> Vec<Handler> {
        self.entries.iter().map(|e| e.handler.clone()).collect()
    }

    pub fn contains(&self, kind: &ModuleKind) -> bool {
        self.index.contains_key(&kind.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 已记录的启动顺序
    pub fn start_order(&self) -> Vec<ModuleKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    /// 取出全部条目，最后启动的在前；注册表随之清空
    pub(crate) fn drain_reverse(&mut self) -> Vec<RegistryEntry> {
        self.index.clear();
        let mut drained: Vec<RegistryEntry> = self.entries.drain(..).collect();
        drained.reverse();
        drained
    }

    /// 各模块的状态快照，按启动顺序
    pub fn statuses(&self) -> Vec<ModuleStatus> {
        self.entries.iter().map(RegistryEntry::status).collect()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.start_order())
            .finish()
    }
}
