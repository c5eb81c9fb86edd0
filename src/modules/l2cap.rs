//! L2CAP 信道层
//!
//! 经典与 LE 两套服务注册表，以及面向旧接口的 [`L2capShim`]。

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::acl::AclManager;
use crate::module::{Module, ModuleContext, ModuleList};
use crate::utils::{CoreError, Result};

/// 协议/服务复用号
pub type Psm = u16;

/// 服务注册表，经典与 LE 共用
struct ServiceTable {
    name: &'static str,
    services: RwLock<BTreeSet<Psm>>,
}

impl ServiceTable {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            services: RwLock::new(BTreeSet::new()),
        }
    }

    fn register(&self, psm: Psm) -> Result<()> {
        if !self.services.write().insert(psm) {
            return Err(CoreError::InvalidState(format!(
                "{} 服务 {:#06x} 已注册",
                self.name, psm
            )));
        }
        debug!(table = self.name, psm, "L2CAP 服务已注册");
        Ok(())
    }

    fn unregister(&self, psm: Psm) -> bool {
        self.services.write().remove(&psm)
    }

    fn len(&self) -> usize {
        self.services.read().len()
    }

    fn clear(&self) -> usize {
        std::mem::take(&mut *self.services.write()).len()
    }
}

/// 经典 L2CAP
pub struct L2capClassicModule {
    acl: Arc<AclManager>,
    table: ServiceTable,
}

impl L2capClassicModule {
    pub fn register_service(&self, psm: Psm) -> Result<()> {
        // 经典 PSM 必须为奇数
        if psm % 2 == 0 {
            return Err(CoreError::PreconditionViolated(format!(
                "无效的经典 PSM {:#06x}",
                psm
            )));
        }
        self.table.register(psm)
    }

    pub fn unregister_service(&self, psm: Psm) -> bool {
        self.table.unregister(psm)
    }

    pub fn service_count(&self) -> usize {
        self.table.len()
    }

    pub fn acl(&self) -> &Arc<AclManager> {
        &self.acl
    }
}

impl Module for L2capClassicModule {
    const NAME: &'static str = "L2capClassicModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<AclManager>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            acl: ctx.get::<AclManager>()?,
            table: ServiceTable::new("classic"),
        })
    }

    fn stop(&self) {
        let removed = self.table.clear();
        info!(services = removed, "经典 L2CAP 已停止");
    }
}

/// LE L2CAP
pub struct L2capLeModule {
    _acl: Arc<AclManager>,
    table: ServiceTable,
}

impl L2capLeModule {
    pub fn register_service(&self, psm: Psm) -> Result<()> {
        self.table.register(psm)
    }

    pub fn unregister_service(&self, psm: Psm) -> bool {
        self.table.unregister(psm)
    }

    pub fn service_count(&self) -> usize {
        self.table.len()
    }
}

impl Module for L2capLeModule {
    const NAME: &'static str = "L2capLeModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<AclManager>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            _acl: ctx.get::<AclManager>()?,
            table: ServiceTable::new("le"),
        })
    }

    fn stop(&self) {
        self.table.clear();
    }
}

/// 旧接口兼容层
///
/// 以旧的“注册后即可用”语义包装经典 L2CAP。
pub struct L2capShim {
    classic: Arc<L2capClassicModule>,
}

impl L2capShim {
    /// 注册服务，已注册时视为成功
    pub fn register_service(&self, psm: Psm) -> bool {
        match self.classic.register_service(psm) {
            Ok(()) | Err(CoreError::InvalidState(_)) => true,
            Err(_) => false,
        }
    }

    pub fn unregister_service(&self, psm: Psm) {
        self.classic.unregister_service(psm);
    }
}

impl Module for L2capShim {
    const NAME: &'static str = "L2capShim";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<L2capClassicModule>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            classic: ctx.get::<L2capClassicModule>()?,
        })
    }
}
