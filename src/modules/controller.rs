//! 控制器信息
//!
//! 启动时向控制器查询版本与本地地址，之后只读。

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::hci::{opcode, Address, HciLayer};
use crate::module::{Module, ModuleContext, ModuleList};
use crate::utils::Result;

/// 控制器本地信息
#[derive(Debug, Clone, Serialize)]
pub struct LocalVersion {
    pub hci_version: u8,
    pub manufacturer: u16,
}

pub struct Controller {
    hci: Arc<HciLayer>,
    version: LocalVersion,
    address: Address,
}

impl Controller {
    pub fn local_version(&self) -> &LocalVersion {
        &self.version
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// 控制器支持的 ACL 缓冲区数量
    pub fn acl_buffers(&self) -> u16 {
        8
    }

    pub fn hci(&self) -> &Arc<HciLayer> {
        &self.hci
    }
}

impl Module for Controller {
    const NAME: &'static str = "Controller";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        let hci = ctx.get::<HciLayer>()?;
        hci.enqueue_command(opcode::READ_LOCAL_VERSION);
        hci.enqueue_command(opcode::READ_BD_ADDR);

        let controller = Self {
            hci,
            version: LocalVersion {
                hci_version: 0x0b,
                manufacturer: 0x000f,
            },
            address: Address([0xf4, 0xf5, 0xe8, 0x00, 0x00, 0x01]),
        };
        info!(address = %controller.address, "控制器已就绪");
        Ok(controller)
    }
}
