//! 安全管理
//!
//! 配对结果持久化在 [`StorageModule`] 中，键为 `bond/<地址>`。

use std::sync::Arc;

use tracing::info;

use super::acl::AclManager;
use super::controller::Controller;
use super::hci::{Address, HciLayer};
use super::l2cap::{L2capClassicModule, L2capLeModule};
use super::storage::StorageModule;
use crate::module::{Module, ModuleContext, ModuleList};
use crate::utils::{CoreError, Result};

const BOND_PREFIX: &str = "bond/";
/// SMP 使用的 LE 固定信道
const SMP_PSM: u16 = 0x0006;

pub struct SecurityModule {
    acl: Arc<AclManager>,
    storage: Arc<StorageModule>,
}

impl SecurityModule {
    /// 与已连接设备配对
    pub fn create_bond(&self, address: Address) -> Result<()> {
        if !self.acl.is_connected(&address) {
            return Err(CoreError::InvalidState(format!("设备 {} 未连接", address)));
        }
        self.storage
            .set(format!("{}{}", BOND_PREFIX, address), "bonded");
        info!(%address, "配对完成");
        Ok(())
    }

    pub fn remove_bond(&self, address: Address) -> bool {
        self.storage
            .remove(&format!("{}{}", BOND_PREFIX, address))
            .is_some()
    }

    pub fn is_bonded(&self, address: &Address) -> bool {
        self.storage
            .get(&format!("{}{}", BOND_PREFIX, address))
            .is_some()
    }

    pub fn bonded_count(&self) -> usize {
        self.storage.count_prefix(BOND_PREFIX)
    }
}

impl Module for SecurityModule {
    const NAME: &'static str = "SecurityModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>()
            .add::<Controller>()
            .add::<AclManager>()
            .add::<StorageModule>()
            .add::<L2capClassicModule>()
            .add::<L2capLeModule>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        ctx.get::<HciLayer>()?;
        ctx.get::<Controller>()?;
        ctx.get::<L2capClassicModule>()?;
        ctx.get::<L2capLeModule>()?.register_service(SMP_PSM)?;

        let module = Self {
            acl: ctx.get::<AclManager>()?,
            storage: ctx.get::<StorageModule>()?,
        };
        info!(bonded = module.bonded_count(), "安全模块已启动");
        Ok(module)
    }
}
