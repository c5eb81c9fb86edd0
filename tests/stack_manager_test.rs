//! 生命周期管理器集成测试
//!
//! 使用记录启停事件的模块验证启动顺序、逆序关闭与失败回滚

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gd_stack::{
    CoreError, Module, ModuleContext, ModuleList, Result, StackManager, Thread,
};
use gd_stack::modules::hci::opcode;
use gd_stack::modules::{HciHal, HciLayer};
use parking_lot::{const_mutex, Mutex};

/// 启停事件日志
static DIAMOND_LOG: Mutex<Vec<String>> = const_mutex(Vec::new());
static ROLLBACK_LOG: Mutex<Vec<String>> = const_mutex(Vec::new());
static ASYNC_INIT_LOG: Mutex<Vec<String>> = const_mutex(Vec::new());
static BACKGROUND_LOG: Mutex<Vec<String>> = const_mutex(Vec::new());

/// 声明一个把启停事件写入日志的模块
macro_rules! recording_module {
    ($name:ident, $log:ident $(; $($dep:ident),+)?) => {
        struct $name {
            thread: Option<String>,
        }

        impl Module for $name {
            const NAME: &'static str = stringify!($name);

            #[allow(unused_variables)]
            fn list_dependencies(deps: &mut ModuleList) {
                $($( deps.add::<$dep>(); )+)?
            }

            fn start(ctx: &ModuleContext) -> Result<Self> {
                // 声明过的依赖此时必须已经可用
                $($( ctx.get::<$dep>()?; )+)?
                $log.lock().push(format!("start {}", Self::NAME));
                Ok(Self {
                    thread: std::thread::current().name().map(str::to_string),
                })
            }

            fn stop(&self) {
                $log.lock().push(format!("stop {}", Self::NAME));
            }
        }
    };
}

recording_module!(Base, DIAMOND_LOG);
recording_module!(Left, DIAMOND_LOG; Base);
recording_module!(Right, DIAMOND_LOG; Base);
recording_module!(Top, DIAMOND_LOG; Left, Right);

recording_module!(Good, ROLLBACK_LOG);
recording_module!(AlsoGood, ROLLBACK_LOG; Good);

struct Broken;

impl Module for Broken {
    const NAME: &'static str = "Broken";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<AlsoGood>();
    }

    fn start(_ctx: &ModuleContext) -> Result<Self> {
        ROLLBACK_LOG.lock().push("start Broken".to_string());
        Err(CoreError::Internal("无法打开设备".to_string()))
    }
}

struct Ping;

impl Module for Ping {
    const NAME: &'static str = "Ping";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<Pong>();
    }

    fn start(_ctx: &ModuleContext) -> Result<Self> {
        panic!("成环的模块不应被启动");
    }
}

struct Pong;

impl Module for Pong {
    const NAME: &'static str = "Pong";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<Ping>();
    }

    fn start(_ctx: &ModuleContext) -> Result<Self> {
        panic!("成环的模块不应被启动");
    }
}

/// 启动时 spawn 一段异步初始化工作
struct AsyncInit;

impl Module for AsyncInit {
    const NAME: &'static str = "AsyncInit";

    fn start(ctx: &ModuleContext) -> Result<Self> {
        ctx.handler().spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ASYNC_INIT_LOG.lock().push("AsyncInit ready".to_string());
        });
        Ok(AsyncInit)
    }

    fn stop(&self) {
        ASYNC_INIT_LOG.lock().push("stop AsyncInit".to_string());
    }
}

recording_module!(AfterAsyncInit, ASYNC_INIT_LOG; AsyncInit);

recording_module!(Background, BACKGROUND_LOG);

/// 启动时向自己的处理器提交工作的模块
struct Eager {
    done: Arc<AtomicUsize>,
}

impl Module for Eager {
    const NAME: &'static str = "Eager";

    fn start(ctx: &ModuleContext) -> Result<Self> {
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = done.clone();
            ctx.handler().post(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        Ok(Eager { done })
    }
}

/// 启动时要求 Eager 的工作已全部完成
struct Follower;

impl Module for Follower {
    const NAME: &'static str = "Follower";

    fn list_dependencies(deps: &mut ModuleList) {
        deps.add::<Eager>();
    }

    fn start(ctx: &ModuleContext) -> Result<Self> {
        if ctx.get::<Eager>()?.done.load(Ordering::SeqCst) != 5 {
            return Err(CoreError::Internal("依赖的初始化工作尚未完成".to_string()));
        }
        Ok(Follower)
    }
}

#[test]
fn test_diamond_start_and_reverse_stop() {
    let thread = Thread::new("diamond_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<Top>().add::<Right>().add::<Left>().add::<Base>();

    manager.start_up(&list, &thread).unwrap();

    let top = manager.get_instance::<Top>().unwrap();
    assert_eq!(top.thread.as_deref(), Some("diamond_stack_thread"));

    manager.shut_down(&thread);

    let log = DIAMOND_LOG.lock().clone();
    assert_eq!(
        log,
        vec![
            "start Base",
            "start Right",
            "start Left",
            "start Top",
            "stop Top",
            "stop Left",
            "stop Right",
            "stop Base",
        ]
    );
    assert_eq!(manager.module_count(), 0);
}

#[test]
fn test_cycle_starts_nothing() {
    let thread = Thread::new("cycle_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<Ping>().add::<Pong>();

    match manager.start_up(&list, &thread) {
        Err(CoreError::CircularDependency(path)) => {
            assert!(path.contains("Ping") && path.contains("Pong"));
        }
        other => panic!("期望 CircularDependency，实际 {:?}", other),
    }
    assert_eq!(manager.module_count(), 0);
}

#[test]
fn test_missing_dependency_is_config_error() {
    let thread = Thread::new("missing_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<Follower>();

    let err = manager.start_up(&list, &thread).unwrap_err();
    assert!(err.is_config_error());
    assert!(matches!(err, CoreError::DependencyNotFound { .. }));
    assert!(!manager.is_started::<Follower>());
}

#[test]
fn test_failed_start_rolls_back_in_reverse() {
    let thread = Thread::new("rollback_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<Good>().add::<AlsoGood>().add::<Broken>();

    let err = manager.start_up(&list, &thread).unwrap_err();
    assert!(matches!(err, CoreError::ModuleStartFailed { ref module, .. } if module == "Broken"));
    assert_eq!(manager.module_count(), 0);
    assert!(manager.get_instance::<Good>().is_err());

    let log = ROLLBACK_LOG.lock().clone();
    assert_eq!(
        log,
        vec![
            "start Good",
            "start AlsoGood",
            "start Broken",
            "stop AlsoGood",
            "stop Good",
        ]
    );
}

#[test]
fn test_start_waits_for_enqueued_work() {
    let thread = Thread::new("eager_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<Eager>().add::<Follower>();

    manager.start_up(&list, &thread).unwrap();
    assert!(manager.is_started::<Follower>());
    let eager = manager.get_instance::<Eager>().unwrap();
    assert_eq!(eager.done.load(Ordering::SeqCst), 5);

    manager.shut_down(&thread);
}

#[test]
fn test_instances_are_shared_not_copied() {
    let thread = Thread::new("shared_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<Eager>();
    manager.start_up(&list, &thread).unwrap();

    let a = manager.get_instance::<Eager>().unwrap();
    let b = manager.get_instance::<Eager>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    manager.shut_down(&thread);
}

#[test]
fn test_start_waits_for_spawned_init_work() {
    let thread = Thread::new("async_init_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<AfterAsyncInit>().add::<AsyncInit>();

    manager.start_up(&list, &thread).unwrap();
    manager.shut_down(&thread);

    let log = ASYNC_INIT_LOG.lock().clone();
    assert_eq!(
        log,
        vec![
            "AsyncInit ready",
            "start AfterAsyncInit",
            "stop AfterAsyncInit",
            "stop AsyncInit",
        ]
    );
}

#[test]
fn test_shut_down_cancels_background_work() {
    let thread = Thread::new("background_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<Background>();
    manager.start_up(&list, &thread).unwrap();

    let handler = manager.handler_of::<Background>().unwrap();
    assert!(handler.spawn(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        BACKGROUND_LOG.lock().push("background tick".to_string());
    }));
    handler.sync().unwrap();

    manager.shut_down(&thread);
    std::thread::sleep(Duration::from_millis(300));
    thread.sync().unwrap();

    let log = BACKGROUND_LOG.lock().clone();
    assert_eq!(log, vec!["start Background", "stop Background"]);
    assert!(handler.is_closed());
}

#[test]
fn test_stopped_module_rejects_new_work() {
    let thread = Thread::new("closed_stack_thread").unwrap();
    let manager = StackManager::new();

    let mut list = ModuleList::new();
    list.add::<HciHal>().add::<HciLayer>();
    manager.start_up(&list, &thread).unwrap();

    let layer = manager.get_instance::<HciLayer>().unwrap();
    assert_eq!(layer.hal().commands_sent(), 1);

    manager.shut_down(&thread);
    assert_eq!(manager.module_count(), 0);

    assert!(!layer.enqueue_command(opcode::RESET));
    thread.sync().unwrap();
    assert_eq!(layer.hal().commands_sent(), 1);
}
