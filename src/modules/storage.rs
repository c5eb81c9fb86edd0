//! 持久化与诊断输出
//!
//! [`StorageModule`] 是内存中的键值存储，空闲模式下唯一启动的模块。
//! [`Dumpsys`] 把存储内容导出为 JSON。

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::info;

use crate::module::{Module, ModuleContext, ModuleList};
use crate::utils::Result;

/// 键值存储
pub struct StorageModule {
    entries: RwLock<BTreeMap<String, String>>,
}

impl StorageModule {
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// 写入键值，返回旧值
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.write().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().remove(key)
    }

    /// 以 `prefix` 开头的键数量
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

impl Module for StorageModule {
    const NAME: &'static str = "StorageModule";

    fn start(_ctx: &ModuleContext) -> Result<Self> {
        info!("存储模块已加载");
        Ok(Self {
            entries: RwLock::new(BTreeMap::new()),
        })
    }

    fn stop(&self) {
        info!(entries = self.len(), "存储模块已卸载");
    }
}

/// 诊断输出
pub struct Dumpsys {
    storage: Arc<StorageModule>,
}

impl Dumpsys {
    /// 导出当前存储内容
    pub fn dump(&self) -> serde_json::Value {
        json!({
            "storage": self.storage.snapshot(),
            "entries": self.storage.len(),
        })
    }
}

impl Module for Dumpsys {
    const NAME: &'static str = "Dumpsys";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<StorageModule>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            storage: ctx.get::<StorageModule>()?,
        })
    }
}
