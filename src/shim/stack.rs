//! 协议栈门面
//!
//! 进程级单例，负责选择启动模式、组装模块列表、创建栈线程并驱动
//! [`StackManager`] 完成启动与关闭。
//!
//! ```text
//! Stopped --start_idle_mode / start_everything--> Running --stop--> Stopped
//! ```
//!
//! 控制面方法由同一把可重入锁串行化。已运行时再次启动、未运行时停止或
//! 访问运行期对象，都属于编程错误，通过 [`fatal`] 终止。

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::ReentrantMutex;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::btm::Btm;
use super::hooks::{NoopHooks, StackHooks};
use super::legacy;
use crate::core::{InitFlags, StackConfig};
use crate::module::{Module, ModuleList, StackManager};
use crate::modules::{
    AclManager, AttModule, ConnectabilityModule, Controller, DiscoverabilityModule, Dumpsys,
    HciHal, HciLayer, InquiryModule, L2capClassicModule, L2capLeModule, L2capShim,
    LeAdvertisingManager, LeScanningManager, NameDbModule, NameModule, PageModule, ScanModule,
    SecurityModule, StorageModule,
};
use crate::os::{Handler, Thread};
use crate::utils::{fatal, CoreError, Result};

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// 启动模式，每次启动选择一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    /// 只启动存储模块
    Idle,
    /// 按开关启动，未启用 core
    Legacy,
    /// 完整上层协议栈
    Core,
}

impl StartupMode {
    /// 根据开关选择模式
    ///
    /// 组合无效时返回 `InvalidFlagCombination`，见 [`InitFlags::validate`]。
    pub fn from_flags(flags: &InitFlags) -> Result<Self> {
        flags.validate()?;
        Ok(if flags.gd_core {
            StartupMode::Core
        } else {
            StartupMode::Legacy
        })
    }

    /// 本模式要启动的模块
    pub fn module_list(&self, flags: &InitFlags) -> ModuleList {
        match self {
            StartupMode::Idle => idle_modules(),
            StartupMode::Legacy | StartupMode::Core => flagged_modules(flags),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StartupMode::Idle => "idle",
            StartupMode::Legacy => "legacy",
            StartupMode::Core => "core",
        }
    }
}

impl fmt::Display for StartupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn idle_modules() -> ModuleList {
    let mut modules = ModuleList::new();
    modules.add::<StorageModule>();
    modules
}

fn flagged_modules(flags: &InitFlags) -> ModuleList {
    let mut modules = ModuleList::new();
    if flags.gd_hci {
        modules.add::<HciHal>().add::<HciLayer>();
    }
    modules.add::<StorageModule>().add::<Dumpsys>();
    if flags.gd_controller {
        modules.add::<Controller>();
    }
    if flags.gd_acl {
        modules.add::<AclManager>();
    }
    if flags.gd_security {
        modules.add::<SecurityModule>();
    }
    if flags.gd_core {
        modules
            .add::<AttModule>()
            .add::<LeAdvertisingManager>()
            .add::<LeScanningManager>()
            .add::<L2capClassicModule>()
            .add::<L2capLeModule>()
            .add::<ConnectabilityModule>()
            .add::<DiscoverabilityModule>()
            .add::<InquiryModule>()
            .add::<NameModule>()
            .add::<NameDbModule>()
            .add::<PageModule>()
            .add::<ScanModule>()
            .add::<L2capShim>();
    }
    modules
}

/// 运行期资源，Stop 时全部释放
struct Running {
    mode: StartupMode,
    thread: Arc<Thread>,
    manager: Arc<StackManager>,
    handler: Handler,
    btm: Option<Arc<Btm>>,
    acl: Option<Arc<legacy::Acl>>,
}

struct StackState {
    run_state: RunState,
    config: StackConfig,
    hooks: Arc<dyn StackHooks>,
    running: Option<Running>,
}

/// 协议栈门面
pub struct Stack {
    state: ReentrantMutex<RefCell<StackState>>,
}

impl Stack {
    /// 进程级单例
    pub fn get_instance() -> &'static Stack {
        static INSTANCE: OnceLock<Stack> = OnceLock::new();
        INSTANCE.get_or_init(Stack::new)
    }

    fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(StackState {
                run_state: RunState::Stopped,
                config: StackConfig::default(),
                hooks: Arc::new(NoopHooks),
                running: None,
            })),
        }
    }

    /// 替换栈配置，只能在停止状态下调用
    pub fn configure(&self, config: StackConfig) -> Result<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.run_state != RunState::Stopped {
            return Err(CoreError::InvalidState(format!(
                "栈处于 {:?} 状态，不能修改配置",
                state.run_state
            )));
        }
        state.config = config;
        Ok(())
    }

    /// 安装生命周期回调
    pub fn set_hooks(&self, hooks: Arc<dyn StackHooks>) {
        self.state.lock().borrow_mut().hooks = hooks;
    }

    /// 空闲模式启动，失败即终止
    pub fn start_idle_mode(&self) {
        if let Err(e) = self.try_start_idle_mode() {
            fatal(e);
        }
    }

    /// 空闲模式启动：只有存储模块
    #[instrument(skip(self))]
    pub fn try_start_idle_mode(&self) -> Result<()> {
        let _guard = self.state.lock();
        self.start_mode(StartupMode::Idle, &InitFlags::default())
    }

    /// 按当前特性开关快照启动，失败即终止
    pub fn start_everything(&self) {
        if let Err(e) = self.try_start_everything() {
            fatal(e);
        }
    }

    /// 按当前特性开关快照启动
    pub fn try_start_everything(&self) -> Result<()> {
        self.start_everything_with(&InitFlags::snapshot())
    }

    /// 按给定开关启动
    #[instrument(skip(self, flags), fields(flags = ?flags.enabled()))]
    pub fn start_everything_with(&self, flags: &InitFlags) -> Result<()> {
        let _guard = self.state.lock();
        self.ensure_stopped("start_everything")?;
        let mode = StartupMode::from_flags(flags)?;
        self.start_mode(mode, flags)
    }

    fn ensure_stopped(&self, op: &str) -> Result<()> {
        let guard = self.state.lock();
        let state = guard.borrow();
        if state.run_state != RunState::Stopped {
            return Err(CoreError::PreconditionViolated(format!(
                "{}: 协议栈已在运行 ({:?})",
                op, state.run_state
            )));
        }
        Ok(())
    }

    fn start_mode(&self, mode: StartupMode, flags: &InitFlags) -> Result<()> {
        let guard = self.state.lock();
        self.ensure_stopped(mode.name())?;

        let thread_name = {
            let mut state = guard.borrow_mut();
            state.run_state = RunState::Starting;
            state.config.thread_name.clone()
        };
        info!(mode = %mode, "启动协议栈");

        let started = Self::bring_up(mode, flags, &thread_name);
        let hooks = {
            let mut state = guard.borrow_mut();
            match started {
                Ok(running) => {
                    state.running = Some(running);
                    state.run_state = RunState::Running;
                    state.hooks.clone()
                }
                Err(e) => {
                    state.run_state = RunState::Stopped;
                    return Err(e);
                }
            }
        };

        info!(mode = %mode, "协议栈已启动");
        if mode == StartupMode::Legacy {
            hooks.on_reset_complete();
        }
        Ok(())
    }

    /// 创建栈线程、启动模块并构造派生对象；失败时已创建的资源全部释放
    fn bring_up(mode: StartupMode, flags: &InitFlags, thread_name: &str) -> Result<Running> {
        let modules = mode.module_list(flags);
        debug!(modules = ?modules.names(), "模块列表");

        let thread = Arc::new(Thread::new(thread_name)?);
        let manager = Arc::new(StackManager::new());
        if let Err(e) = manager.start_up(&modules, &thread) {
            thread.stop();
            return Err(e);
        }
        let handler = Handler::new(&thread);

        let mut running = Running {
            mode,
            thread,
            manager,
            handler,
            btm: None,
            acl: None,
        };

        let derived = match mode {
            StartupMode::Idle => Self::verify_idle(&running),
            StartupMode::Legacy => Self::derive_legacy(&mut running, flags),
            StartupMode::Core => Self::derive_core(&mut running),
        };
        if let Err(e) = derived {
            Self::tear_down(running);
            return Err(e);
        }
        Ok(running)
    }

    fn require<M: Module>(manager: &StackManager) -> Result<Arc<M>> {
        manager.get_instance::<M>().map_err(|_| {
            CoreError::InvalidState(format!("启动后缺少必需模块 '{}'", M::NAME))
        })
    }

    fn verify_idle(running: &Running) -> Result<()> {
        Self::require::<StorageModule>(&running.manager)?;
        Ok(())
    }

    fn derive_legacy(running: &mut Running, flags: &InitFlags) -> Result<()> {
        Self::require::<StorageModule>(&running.manager)?;
        Self::require::<Dumpsys>(&running.manager)?;
        if flags.gd_acl {
            running.acl = Some(Arc::new(legacy::Acl::new(running.handler.clone())));
        }
        Ok(())
    }

    fn derive_core(running: &mut Running) -> Result<()> {
        Self::require::<StorageModule>(&running.manager)?;
        Self::require::<Dumpsys>(&running.manager)?;
        Self::require::<L2capShim>(&running.manager)?;
        let inquiry = Self::require::<InquiryModule>(&running.manager)?;
        running.btm = Some(Arc::new(Btm::new(running.handler.clone(), inquiry)));
        Ok(())
    }

    /// 派生对象先于模块销毁，栈线程最后停止
    fn tear_down(mut running: Running) {
        running.acl.take();
        running.btm.take();

        running.handler.close();
        running.manager.shut_down(&running.thread);
        running.thread.stop();
    }

    /// 停止协议栈，未运行时终止
    pub fn stop(&self) {
        if let Err(e) = self.try_stop() {
            fatal(e);
        }
    }

    /// 停止协议栈
    #[instrument(skip(self))]
    pub fn try_stop(&self) -> Result<()> {
        let guard = self.state.lock();

        let (mode, hooks) = {
            let state = guard.borrow();
            (state.running.as_ref().map(|r| r.mode), state.hooks.clone())
        };
        if mode != Some(StartupMode::Core) {
            hooks.on_shutting_down();
        }

        let running = {
            let mut state = guard.borrow_mut();
            if state.run_state != RunState::Running {
                return Err(CoreError::PreconditionViolated(format!(
                    "stop: 协议栈未运行 ({:?})",
                    state.run_state
                )));
            }
            state.run_state = RunState::Stopping;
            state.running.take()
        };

        if let Some(running) = running {
            Self::tear_down(running);
        }

        guard.borrow_mut().run_state = RunState::Stopped;
        info!("协议栈已停止");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().borrow().run_state == RunState::Running
    }

    pub fn run_state(&self) -> RunState {
        self.state.lock().borrow().run_state
    }

    /// 当前启动模式，未运行时为 `None`
    pub fn running_mode(&self) -> Option<StartupMode> {
        self.state
            .lock()
            .borrow()
            .running
            .as_ref()
            .map(|r| r.mode)
    }

    /// 读取运行期资源，未运行时终止
    fn with_running<T>(&self, op: &str, f: impl FnOnce(&Running) -> T) -> T {
        let guard = self.state.lock();
        let state = guard.borrow();
        if let (RunState::Running, Some(running)) = (state.run_state, state.running.as_ref()) {
            return f(running);
        }
        let err = CoreError::PreconditionViolated(format!(
            "{}: 协议栈未运行 ({:?})",
            op, state.run_state
        ));
        drop(state);
        fatal(err)
    }

    /// 模块管理器；返回的引用只在运行期间有效
    pub fn get_stack_manager(&self) -> Arc<StackManager> {
        self.with_running("get_stack_manager", |r| r.manager.clone())
    }

    /// 传统 ACL，只在传统模式且启用 acl 时存在
    pub fn get_acl(&self) -> Option<Arc<legacy::Acl>> {
        self.with_running("get_acl", |r| r.acl.clone())
    }

    /// 设备发现门面，只在 core 模式下存在
    pub fn get_btm(&self) -> Option<Arc<Btm>> {
        self.with_running("get_btm", |r| r.btm.clone())
    }

    /// 栈处理器
    pub fn get_handler(&self) -> Handler {
        self.with_running("get_handler", |r| r.handler.clone())
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("run_state", &self.run_state())
            .field("mode", &self.running_mode())
            .finish()
    }
}
