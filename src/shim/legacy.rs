//! 传统连接管理
//!
//! 启用了 acl 但未启用 core 时由门面直接在栈处理器上构造。
//! 连接表只在栈线程上修改。

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::modules::hci::Address;
use crate::os::Handler;
use crate::utils::Result;

/// 传统 ACL 连接管理
pub struct Acl {
    handler: Handler,
    connections: Arc<Mutex<BTreeMap<Address, u16>>>,
}

impl Acl {
    pub fn new(handler: Handler) -> Self {
        info!(thread = handler.thread_name(), "传统 ACL 已创建");
        Self {
            handler,
            connections: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// 在栈线程上建立连接，返回连接句柄
    pub fn create_connection(&self, address: Address) -> Result<u16> {
        let connections = self.connections.clone();
        self.handler.call(move || {
            let mut connections = connections.lock();
            let next = connections.values().max().map_or(1, |h| h + 1);
            let handle = *connections.entry(address).or_insert(next);
            handle
        })
    }

    /// 在栈线程上断开连接
    pub fn disconnect(&self, address: Address) -> Result<bool> {
        let connections = self.connections.clone();
        self.handler
            .call(move || connections.lock().remove(&address).is_some())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// 诊断输出
    pub fn dump(&self) -> Vec<String> {
        self.connections
            .lock()
            .iter()
            .map(|(address, handle)| format!("{} handle={:#06x}", address, handle))
            .collect()
    }
}

impl Drop for Acl {
    fn drop(&mut self) {
        debug!(connections = self.connection_count(), "传统 ACL 已销毁");
    }
}
