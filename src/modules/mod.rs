//! 协议栈模块
//!
//! 每个模块的依赖声明与其在协议栈中的位置一致：
//!
//! ```text
//! HciHal <- HciLayer <- Controller <- AclManager <- L2cap* <- SecurityModule
//!              ^                          ^
//!              +-- neighbor::*            +-- LeAdvertising / LeScanning
//! StorageModule <- Dumpsys
//! ```

pub mod acl;
pub mod att;
pub mod controller;
pub mod hci;
pub mod l2cap;
pub mod neighbor;
pub mod security;
pub mod storage;

pub use acl::{AclManager, LeAdvertisingManager, LeScanningManager};
pub use att::AttModule;
pub use controller::Controller;
pub use hci::{Address, HciHal, HciLayer};
pub use l2cap::{L2capClassicModule, L2capLeModule, L2capShim};
pub use neighbor::{
    ConnectabilityModule, DiscoverabilityModule, InquiryModule, NameDbModule, NameModule,
    PageModule, ScanModule,
};
pub use security::SecurityModule;
pub use storage::{Dumpsys, StorageModule};
