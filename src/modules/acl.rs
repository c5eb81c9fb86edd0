//! 链路连接管理
//!
//! [`AclManager`] 维护 ACL 连接表；LE 广播与扫描管理器建立在其上。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::controller::Controller;
use super::hci::{opcode, Address, HciLayer};
use crate::module::{Module, ModuleContext, ModuleList};
use crate::utils::{CoreError, Result};

/// ACL 连接句柄
pub type ConnectionHandle = u16;

/// ACL 连接管理器
pub struct AclManager {
    hci: Arc<HciLayer>,
    controller: Arc<Controller>,
    connections: RwLock<BTreeMap<ConnectionHandle, Address>>,
    next_handle: AtomicU16,
}

impl AclManager {
    /// 建立到 `address` 的连接，返回连接句柄
    ///
    /// 已连接时返回已有句柄；超出控制器缓冲区数量时返回错误。
    pub fn create_connection(&self, address: Address) -> Result<ConnectionHandle> {
        let mut connections = self.connections.write();

        if let Some((&handle, _)) = connections.iter().find(|(_, a)| **a == address) {
            return Ok(handle);
        }
        if connections.len() >= usize::from(self.controller.acl_buffers()) {
            return Err(CoreError::Internal(format!(
                "ACL 连接数已达上限 {}",
                self.controller.acl_buffers()
            )));
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        connections.insert(handle, address);
        self.hci.enqueue_command(opcode::CREATE_CONNECTION);
        debug!(%address, handle, "ACL 连接已建立");
        Ok(handle)
    }

    /// 断开连接，返回是否存在该连接
    pub fn disconnect(&self, handle: ConnectionHandle) -> bool {
        let removed = self.connections.write().remove(&handle).is_some();
        if removed {
            self.hci.enqueue_command(opcode::DISCONNECT);
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_connected(&self, address: &Address) -> bool {
        self.connections.read().values().any(|a| a == address)
    }
}

impl Module for AclManager {
    const NAME: &'static str = "AclManager";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>().add::<Controller>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            hci: ctx.get::<HciLayer>()?,
            controller: ctx.get::<Controller>()?,
            connections: RwLock::new(BTreeMap::new()),
            next_handle: AtomicU16::new(1),
        })
    }

    fn stop(&self) {
        let dropped = std::mem::take(&mut *self.connections.write());
        if !dropped.is_empty() {
            warn!(connections = dropped.len(), "停止时仍有 ACL 连接，已全部断开");
        }
    }
}

/// LE 广播管理器
pub struct LeAdvertisingManager {
    hci: Arc<HciLayer>,
    _acl: Arc<AclManager>,
    next_id: AtomicU32,
    active: RwLock<Vec<u32>>,
}

impl LeAdvertisingManager {
    /// 创建一个广播集，返回其编号
    pub fn create_advertiser(&self) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active.write().push(id);
        self.hci.enqueue_command(opcode::LE_SET_ADVERTISING_ENABLE);
        id
    }

    pub fn remove_advertiser(&self, id: u32) -> bool {
        let mut active = self.active.write();
        let before = active.len();
        active.retain(|&a| a != id);
        active.len() != before
    }

    pub fn advertiser_count(&self) -> usize {
        self.active.read().len()
    }
}

impl Module for LeAdvertisingManager {
    const NAME: &'static str = "LeAdvertisingManager";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>().add::<Controller>().add::<AclManager>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        ctx.get::<Controller>()?;
        Ok(Self {
            hci: ctx.get::<HciLayer>()?,
            _acl: ctx.get::<AclManager>()?,
            next_id: AtomicU32::new(0),
            active: RwLock::new(Vec::new()),
        })
    }

    fn stop(&self) {
        self.active.write().clear();
    }
}

/// LE 扫描管理器
pub struct LeScanningManager {
    hci: Arc<HciLayer>,
    _acl: Arc<AclManager>,
    scanning: AtomicBool,
}

impl LeScanningManager {
    pub fn start_scan(&self) {
        if !self.scanning.swap(true, Ordering::AcqRel) {
            self.hci.enqueue_command(opcode::LE_SET_SCAN_ENABLE);
            info!("LE 扫描已开始");
        }
    }

    pub fn stop_scan(&self) {
        if self.scanning.swap(false, Ordering::AcqRel) {
            self.hci.enqueue_command(opcode::LE_SET_SCAN_ENABLE);
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }
}

impl Module for LeScanningManager {
    const NAME: &'static str = "LeScanningManager";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>().add::<Controller>().add::<AclManager>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        ctx.get::<Controller>()?;
        Ok(Self {
            hci: ctx.get::<HciLayer>()?,
            _acl: ctx.get::<AclManager>()?,
            scanning: AtomicBool::new(false),
        })
    }

    fn stop(&self) {
        self.stop_scan();
    }
}
