//! 邻居发现
//!
//! 扫描使能、查询、远端名称、寻呼，以及建立在扫描之上的可连接性与可发现性。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::hci::{opcode, Address, HciLayer};
use crate::module::{Module, ModuleContext, ModuleList};
use crate::utils::Result;

/// 扫描使能
pub struct ScanModule {
    hci: Arc<HciLayer>,
    inquiry_scan: AtomicBool,
    page_scan: AtomicBool,
}

impl ScanModule {
    pub fn set_inquiry_scan(&self, enabled: bool) {
        if self.inquiry_scan.swap(enabled, Ordering::AcqRel) != enabled {
            self.hci.enqueue_command(opcode::WRITE_SCAN_ENABLE);
        }
    }

    pub fn set_page_scan(&self, enabled: bool) {
        if self.page_scan.swap(enabled, Ordering::AcqRel) != enabled {
            self.hci.enqueue_command(opcode::WRITE_SCAN_ENABLE);
        }
    }

    pub fn is_inquiry_scan_enabled(&self) -> bool {
        self.inquiry_scan.load(Ordering::Acquire)
    }

    pub fn is_page_scan_enabled(&self) -> bool {
        self.page_scan.load(Ordering::Acquire)
    }
}

impl Module for ScanModule {
    const NAME: &'static str = "ScanModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            hci: ctx.get::<HciLayer>()?,
            inquiry_scan: AtomicBool::new(false),
            page_scan: AtomicBool::new(false),
        })
    }

    fn stop(&self) {
        self.set_inquiry_scan(false);
        self.set_page_scan(false);
    }
}

/// 查询（经典设备发现）
pub struct InquiryModule {
    hci: Arc<HciLayer>,
    active: AtomicBool,
    results: Mutex<BTreeSet<Address>>,
}

impl InquiryModule {
    /// 开始查询，已在查询中时返回 `false`
    pub fn start_inquiry(&self) -> bool {
        if self.active.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.results.lock().clear();
        self.hci.enqueue_command(opcode::INQUIRY);
        info!("查询已开始");
        true
    }

    /// 停止查询，未在查询中时返回 `false`
    pub fn stop_inquiry(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.hci.enqueue_command(opcode::INQUIRY_CANCEL);
        info!(found = self.results.lock().len(), "查询已停止");
        true
    }

    pub fn is_inquiry_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 记录一次查询结果，不在查询中时忽略
    pub fn report_result(&self, address: Address) -> bool {
        if !self.is_inquiry_active() {
            return false;
        }
        self.results.lock().insert(address)
    }

    pub fn results(&self) -> Vec<Address> {
        self.results.lock().iter().copied().collect()
    }
}

impl Module for InquiryModule {
    const NAME: &'static str = "InquiryModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            hci: ctx.get::<HciLayer>()?,
            active: AtomicBool::new(false),
            results: Mutex::new(BTreeSet::new()),
        })
    }

    fn stop(&self) {
        self.stop_inquiry();
    }
}

/// 远端名称请求
pub struct NameModule {
    hci: Arc<HciLayer>,
    pending: Mutex<BTreeSet<Address>>,
}

impl NameModule {
    /// 发起远端名称请求，已有相同请求时返回 `false`
    pub fn read_remote_name(&self, address: Address) -> bool {
        if !self.pending.lock().insert(address) {
            return false;
        }
        self.hci.enqueue_command(opcode::REMOTE_NAME_REQUEST);
        true
    }

    /// 名称请求完成
    pub fn complete(&self, address: &Address) -> bool {
        self.pending.lock().remove(address)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Module for NameModule {
    const NAME: &'static str = "NameModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            hci: ctx.get::<HciLayer>()?,
            pending: Mutex::new(BTreeSet::new()),
        })
    }

    fn stop(&self) {
        self.pending.lock().clear();
    }
}

/// 寻呼参数
pub struct PageModule {
    hci: Arc<HciLayer>,
    timeout_slots: AtomicU16,
}

impl PageModule {
    /// 默认寻呼超时（5.12 秒）
    pub const DEFAULT_TIMEOUT_SLOTS: u16 = 0x2000;

    pub fn set_timeout(&self, slots: u16) {
        self.timeout_slots.store(slots, Ordering::Release);
        self.hci.enqueue_command(opcode::WRITE_PAGE_TIMEOUT);
    }

    pub fn timeout(&self) -> u16 {
        self.timeout_slots.load(Ordering::Acquire)
    }
}

impl Module for PageModule {
    const NAME: &'static str = "PageModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            hci: ctx.get::<HciLayer>()?,
            timeout_slots: AtomicU16::new(Self::DEFAULT_TIMEOUT_SLOTS),
        })
    }
}

/// 可连接性（寻呼扫描）
pub struct ConnectabilityModule {
    scan: Arc<ScanModule>,
}

impl ConnectabilityModule {
    pub fn start_connectability(&self) {
        self.scan.set_page_scan(true);
    }

    pub fn stop_connectability(&self) {
        self.scan.set_page_scan(false);
    }

    pub fn is_connectable(&self) -> bool {
        self.scan.is_page_scan_enabled()
    }
}

impl Module for ConnectabilityModule {
    const NAME: &'static str = "ConnectabilityModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>().add::<ScanModule>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        ctx.get::<HciLayer>()?;
        Ok(Self {
            scan: ctx.get::<ScanModule>()?,
        })
    }
}

/// 可发现性（查询扫描）
pub struct DiscoverabilityModule {
    scan: Arc<ScanModule>,
}

impl DiscoverabilityModule {
    pub fn start_general_discoverability(&self) {
        self.scan.set_inquiry_scan(true);
    }

    pub fn stop_discoverability(&self) {
        self.scan.set_inquiry_scan(false);
    }

    pub fn is_discoverable(&self) -> bool {
        self.scan.is_inquiry_scan_enabled()
    }
}

impl Module for DiscoverabilityModule {
    const NAME: &'static str = "DiscoverabilityModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<HciLayer>().add::<ScanModule>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        ctx.get::<HciLayer>()?;
        Ok(Self {
            scan: ctx.get::<ScanModule>()?,
        })
    }
}

/// 远端名称缓存
pub struct NameDbModule {
    name: Arc<NameModule>,
    names: RwLock<BTreeMap<Address, String>>,
}

impl NameDbModule {
    /// 名称未缓存时发起远端名称请求
    pub fn read_remote_name(&self, address: Address) {
        if !self.is_known(&address) {
            self.name.read_remote_name(address);
        }
    }

    /// 记录远端名称
    pub fn on_name_read(&self, address: Address, name: impl Into<String>) {
        let name = name.into();
        self.name.complete(&address);
        debug!(%address, name = %name, "远端名称已缓存");
        self.names.write().insert(address, name);
    }

    pub fn is_known(&self, address: &Address) -> bool {
        self.names.read().contains_key(address)
    }

    pub fn get_name(&self, address: &Address) -> Option<String> {
        self.names.read().get(address).cloned()
    }
}

impl Module for NameDbModule {
    const NAME: &'static str = "NameDbModule";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<NameModule>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            name: ctx.get::<NameModule>()?,
            names: RwLock::new(BTreeMap::new()),
        })
    }
}
