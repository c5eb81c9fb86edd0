//! HCI 传输层
//!
//! [`HciHal`] 模拟硬件抽象层，只记录发送的命令；[`HciLayer`] 在其之上
//! 提供命令队列，命令通过模块处理器在栈线程上送达 HAL。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::module::{Module, ModuleContext, ModuleList};
use crate::os::Handler;
use crate::utils::Result;

/// 常用 HCI 命令码
pub mod opcode {
    pub const RESET: u16 = 0x0c03;
    pub const READ_LOCAL_VERSION: u16 = 0x1001;
    pub const READ_BD_ADDR: u16 = 0x1009;
    pub const CREATE_CONNECTION: u16 = 0x0405;
    pub const DISCONNECT: u16 = 0x0406;
    pub const INQUIRY: u16 = 0x0401;
    pub const INQUIRY_CANCEL: u16 = 0x0402;
    pub const REMOTE_NAME_REQUEST: u16 = 0x0419;
    pub const WRITE_SCAN_ENABLE: u16 = 0x0c1a;
    pub const WRITE_PAGE_TIMEOUT: u16 = 0x0c18;
    pub const LE_SET_ADVERTISING_ENABLE: u16 = 0x200a;
    pub const LE_SET_SCAN_ENABLE: u16 = 0x200c;
}

/// 蓝牙设备地址
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 6]);

impl Address {
    pub const EMPTY: Address = Address([0; 6]);
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 硬件抽象层
pub struct HciHal {
    sent: AtomicU64,
    last_opcode: Mutex<Option<u16>>,
}

impl HciHal {
    /// 向控制器发送命令
    pub fn send_command(&self, opcode: u16) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        *self.last_opcode.lock() = Some(opcode);
        debug!(opcode = format_args!("{:#06x}", opcode), "HAL 发送命令");
    }

    /// 已发送的命令数
    pub fn commands_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn last_opcode(&self) -> Option<u16> {
        *self.last_opcode.lock()
    }
}

impl Module for HciHal {
    const NAME: &'static str = "HciHal";

    fn start(_ctx: &ModuleContext) -> Result<Self> {
        info!("HCI HAL 已打开");
        Ok(Self {
            sent: AtomicU64::new(0),
            last_opcode: Mutex::new(None),
        })
    }

    fn stop(&self) {
        info!(commands = self.commands_sent(), "HCI HAL 已关闭");
    }
}

/// HCI 命令层
pub struct HciLayer {
    hal: Arc<HciHal>,
    handler: Handler,
    enqueued: AtomicU64,
}

impl HciLayer {
    /// 将命令排入队列，在栈线程上交给 HAL
    pub fn enqueue_command(&self, opcode: u16) -> bool {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        let hal = self.hal.clone();
        self.handler.post(move || hal.send_command(opcode))
    }

    /// 已入队的命令数
    pub fn commands_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn hal(&self) -> &Arc<HciHal> {
        &self.hal
    }
}

impl Module for HciLayer {
    const NAME: &'static str = "HciLayer";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciHal>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        let layer = Self {
            hal: ctx.get::<HciHal>()?,
            handler: ctx.handler().clone(),
            enqueued: AtomicU64::new(0),
        };
        layer.enqueue_command(opcode::RESET);
        Ok(layer)
    }

    fn stop(&self) {
        info!(commands = self.commands_enqueued(), "HCI 层已停止");
    }
}
