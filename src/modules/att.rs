//! ATT 属性协议

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, Ordering};

use parking_lot::RwLock;
use tracing::info;

use super::l2cap::L2capLeModule;
use crate::module::{Module, ModuleContext, ModuleList};
use crate::utils::Result;

/// ATT 固定信道
const ATT_PSM: u16 = 0x0004;

/// 属性句柄
pub type AttributeHandle = u16;

pub struct AttModule {
    attributes: RwLock<BTreeMap<AttributeHandle, Vec<u8>>>,
    next_handle: AtomicU16,
}

impl AttModule {
    /// 添加属性，返回分配的句柄
    pub fn add_attribute(&self, value: Vec<u8>) -> AttributeHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.attributes.write().insert(handle, value);
        handle
    }

    pub fn read(&self, handle: AttributeHandle) -> Option<Vec<u8>> {
        self.attributes.read().get(&handle).cloned()
    }

    /// 写入已存在的属性
    pub fn write(&self, handle: AttributeHandle, value: Vec<u8>) -> bool {
        match self.attributes.write().get_mut(&handle) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.read().len()
    }
}

impl Module for AttModule {
    const NAME: &'static str = "AttModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<L2capLeModule>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        ctx.get::<L2capLeModule>()?.register_service(ATT_PSM)?;
        Ok(Self {
            attributes: RwLock::new(BTreeMap::new()),
            // 句柄 0 保留
            next_handle: AtomicU16::new(1),
        })
    }

    fn stop(&self) {
        info!(attributes = self.attribute_count(), "ATT 已停止");
    }
}
