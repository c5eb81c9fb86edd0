//! 设备发现门面
//!
//! core 模式下由门面构造，绑定运行中的 [`InquiryModule`] 与栈处理器。
//! 所有对模块的操作都转发到栈线程上执行。

use std::sync::Arc;

use tracing::debug;

use crate::modules::hci::Address;
use crate::modules::InquiryModule;
use crate::os::Handler;
use crate::utils::Result;

pub struct Btm {
    handler: Handler,
    inquiry: Arc<InquiryModule>,
}

impl Btm {
    pub fn new(handler: Handler, inquiry: Arc<InquiryModule>) -> Self {
        debug!("Btm 已创建");
        Self { handler, inquiry }
    }

    /// 开始查询，已在查询中时返回 `Ok(false)`
    pub fn start_inquiry(&self) -> Result<bool> {
        let inquiry = self.inquiry.clone();
        self.handler.call(move || inquiry.start_inquiry())
    }

    /// 取消查询
    pub fn cancel_inquiry(&self) -> Result<bool> {
        let inquiry = self.inquiry.clone();
        self.handler.call(move || inquiry.stop_inquiry())
    }

    pub fn is_inquiry_active(&self) -> bool {
        self.inquiry.is_inquiry_active()
    }

    /// 本次查询发现的设备
    pub fn inquiry_results(&self) -> Vec<Address> {
        self.inquiry.results()
    }
}

impl Drop for Btm {
    fn drop(&mut self) {
        debug!("Btm 已销毁");
    }
}
