//! 日志系统集成测试
//!
//! 全局 subscriber 只能安装一次，本文件只包含一个测试

use gd_stack::{
    fields, Logger, LoggerConfig, Module, ModuleContext, ModuleList, Result, RotationStrategy,
    StackManager, Thread,
};
use tempfile::TempDir;

struct Probe;

impl Module for Probe {
    const NAME: &'static str = "Probe";

    fn start(_ctx: &ModuleContext) -> Result<Self> {
        Ok(Probe)
    }
}

#[test]
fn test_lifecycle_events_are_logged_as_json() {
    let temp_dir = TempDir::new().unwrap();
    let config = LoggerConfig::builder()
        .level("info")
        .console_output(false)
        .file_output(temp_dir.path())
        .rotation(RotationStrategy::Never)
        .json_format(true)
        .build();

    let guard = Logger::init(config).unwrap();
    assert_eq!(guard.writer_count(), 1);
    assert!(Logger::init(LoggerConfig::default()).is_err());

    let thread = Thread::new("logging_stack_thread").unwrap();
    let manager = StackManager::new();
    let mut list = ModuleList::new();
    list.add::<Probe>();
    manager.start_up(&list, &thread).unwrap();
    manager.shut_down(&thread);
    thread.stop();

    // 丢弃守卫会刷新非阻塞写入器
    drop(guard);

    let content = std::fs::read_to_string(temp_dir.path().join("gd-stack.log")).unwrap();
    let events: Vec<serde_json::Value> = content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    let started = events
        .iter()
        .find(|e| e["fields"]["message"] == "模块已启动")
        .expect("应记录模块启动事件");
    assert_eq!(started["fields"][fields::MODULE], "Probe");
    assert_eq!(started["fields"][fields::ORDER], 0);
    assert!(started["fields"][fields::DURATION_US].is_u64());
    assert_eq!(started["level"], "INFO");

    assert!(events
        .iter()
        .any(|e| e["fields"]["message"] == "模块已停止" && e["fields"][fields::MODULE] == "Probe"));
}
