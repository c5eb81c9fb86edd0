//! 启动顺序解析与启停基准测试
//!
//! 使用 Criterion 框架，包括：
//! - 各启动模式的依赖解析
//! - 完整协议栈启动 + 关闭

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gd_stack::{DependencyGraph, InitFlags, StackManager, StartupMode, Thread};

fn profiles() -> Vec<(&'static str, StartupMode, InitFlags)> {
    vec![
        ("idle", StartupMode::Idle, InitFlags::default()),
        (
            "legacy_acl",
            StartupMode::Legacy,
            InitFlags::parse(&["INIT_gd_acl=true"]).unwrap_or_default(),
        ),
        ("core", StartupMode::Core, InitFlags::all()),
    ]
}

/// 依赖图构建 + 拓扑排序
fn resolve_order_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_order");

    for (name, mode, flags) in profiles() {
        let list = mode.module_list(&flags);
        group.bench_with_input(BenchmarkId::from_parameter(name), &list, |b, list| {
            b.iter(|| StackManager::resolve_order(black_box(list)).unwrap());
        });
    }

    group.finish();
}

/// 只做环检测
fn cycle_check_benchmark(c: &mut Criterion) {
    let list = StartupMode::Core.module_list(&InitFlags::all());
    let graph = DependencyGraph::build(&list).unwrap();

    c.bench_function("find_cycle_core", |b| {
        b.iter(|| black_box(&graph).has_cycle());
    });
}

/// 完整协议栈在栈线程上启动再关闭
fn start_stop_benchmark(c: &mut Criterion) {
    let thread = Thread::new("bench_stack_thread").unwrap();
    let list = StartupMode::Core.module_list(&InitFlags::all());

    c.bench_function("start_stop_core", |b| {
        b.iter(|| {
            let manager = StackManager::new();
            manager.start_up(&list, &thread).unwrap();
            manager.shut_down(&thread);
        });
    });
}

criterion_group!(
    benches,
    resolve_order_benchmark,
    cycle_check_benchmark,
    start_stop_benchmark
);
criterion_main!(benches);
