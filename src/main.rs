//! GD Stack 命令行入口
//!
//! # 命令概览
//!
//! - `idle` - 以空闲模式启动协议栈，Ctrl+C 后停止
//! - `start` - 按特性开关启动协议栈，Ctrl+C 后停止
//! - `order` - 打印解析出的启动顺序，不启动任何模块
//! - `check-config` - 验证配置文件
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 启动完整协议栈
//! gd-stack --flag INIT_gd_core=true start
//!
//! # 使用自定义配置文件启动
//! gd-stack -c stack.yaml start
//!
//! # 查看传统模式下的启动顺序
//! gd-stack --flag INIT_gd_acl=true order
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use gd_stack::{
    CoreConfig, InitFlags, LogGuard, Logger, LoggerConfig, Stack, StackManager, StartupMode,
};

/// GD Stack - 分层协议栈编排核心
#[derive(Parser)]
#[command(name = "gd-stack")]
#[command(version, about = "分层协议栈的模块依赖解析与生命周期编排", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示文件名与行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 特性开关，格式 INIT_<name>=true|false，可重复
    #[arg(long = "flag", value_name = "INIT_x=y", global = true)]
    flags: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 以空闲模式启动（只有存储模块）
    Idle,

    /// 按特性开关启动协议栈
    Start,

    /// 打印启动顺序
    Order {
        /// 显示空闲模式的启动顺序
        #[arg(long)]
        idle: bool,
    },

    /// 验证配置文件
    CheckConfig,

    /// 查看版本信息
    Version,
}

/// `idle` 与 `start` 的启动方式
#[derive(Clone, Copy, PartialEq, Eq)]
enum Launch {
    /// 只启动存储模块
    Idle,
    /// 按特性开关启动，模式由开关决定
    Everything,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 栈操作会同步等待栈线程，不能在异步上下文中调用；
    // 运行时只用于读取配置和等待 Ctrl+C
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("创建 tokio 运行时失败")?;

    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::CheckConfig => runtime.block_on(check_config(&cli.config)),
        Commands::Order { idle } => {
            let config = runtime.block_on(load_config(&cli))?;
            print_order(&config, idle)
        }
        Commands::Idle => {
            let config = runtime.block_on(load_config(&cli))?;
            let _guard = init_logging(&config, cli.dev);
            run_stack(&runtime, &config, Launch::Idle)
        }
        Commands::Start => {
            let config = runtime.block_on(load_config(&cli))?;
            let _guard = init_logging(&config, cli.dev);
            run_stack(&runtime, &config, Launch::Everything)
        }
    }
}

/// 加载配置文件并叠加命令行参数
async fn load_config(cli: &Cli) -> Result<CoreConfig> {
    let mut config = if cli.config.exists() {
        CoreConfig::from_file(&cli.config)
            .await
            .with_context(|| format!("加载配置文件 {} 失败", cli.config.display()))?
    } else {
        CoreConfig::default()
    };

    let mut overrides = CoreConfig::builder().init_flags(InitFlags::parse(&cli.flags)?);
    if let Some(level) = &cli.log_level {
        overrides = overrides.log_level(level.clone());
    }
    if cli.dev {
        overrides = overrides.dev_mode();
    }
    config.merge(overrides.build());

    // 文件与命令行的开关合并后才能判断组合是否有效
    config
        .init_flags
        .validate()
        .context("特性开关组合无效")?;

    Ok(config)
}

fn init_logging(config: &CoreConfig, dev: bool) -> LogGuard {
    let mut logger = LoggerConfig::from_log_config(&config.logging);
    if dev || config.dev_mode {
        logger.show_file_line = true;
    }
    Logger::try_init(logger)
}

/// 启动协议栈，等待 Ctrl+C 后停止
fn run_stack(runtime: &tokio::runtime::Runtime, config: &CoreConfig, launch: Launch) -> Result<()> {
    let stack = Stack::get_instance();
    stack.configure(config.stack.clone())?;

    match launch {
        Launch::Idle => stack.try_start_idle_mode()?,
        Launch::Everything => {
            InitFlags::load(config.init_flags);
            stack.try_start_everything()?;
        }
    }

    let mode = stack.running_mode().map(|m| m.name()).unwrap_or("unknown");
    println!();
    println!("协议栈已启动 (模式: {})", mode);
    println!("────────────────────────────────────────");
    for line in stack.get_stack_manager().dump() {
        println!("  {}", line);
    }
    println!("────────────────────────────────────────");
    println!("按 Ctrl+C 停止");
    println!();

    if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
        warn!(error = %e, "等待关闭信号失败，直接停止");
    }

    info!("收到关闭信号，正在停止协议栈");
    stack.try_stop()?;
    Ok(())
}

/// 打印启动顺序
fn print_order(config: &CoreConfig, idle: bool) -> Result<()> {
    let flags = config.init_flags;
    let mode = if idle {
        StartupMode::Idle
    } else {
        StartupMode::from_flags(&flags)?
    };

    let modules = mode.module_list(&flags);
    let order = StackManager::resolve_order(&modules)?;

    println!();
    println!("启动顺序 (模式: {}, 开关: {:?})", mode, flags.enabled());
    println!("────────────────────────────────────────");
    for (i, kind) in order.iter().enumerate() {
        let deps = kind.dependencies().names();
        if deps.is_empty() {
            println!("  {:>2}. {}", i, kind.name());
        } else {
            println!("  {:>2}. {:<24} <- {}", i, kind.name(), deps.join(", "));
        }
    }
    println!("────────────────────────────────────────");
    Ok(())
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<()> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  配置文件不存在，将使用默认配置");
        println!();
        print_config(&CoreConfig::default());
        return Ok(());
    }

    match CoreConfig::from_file(path).await {
        Ok(config) => {
            println!("✅ 配置文件有效！");
            println!();
            print_config(&config);
            Ok(())
        }
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            Err(e.into())
        }
    }
}

fn print_config(config: &CoreConfig) {
    let yes_no = |b: bool| if b { "是" } else { "否" };
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", yes_no(config.logging.file_output));
    println!("    JSON 格式:      {}", yes_no(config.logging.json_format));
    println!("    轮转策略:       {}", config.logging.rotation);
    println!();
    println!("  [栈配置]");
    println!("    栈线程名称:     {}", config.stack.thread_name);
    println!();
    println!("  [特性开关]");
    println!("    已开启:         {:?}", config.init_flags.enabled());
    println!();
    println!("  [其他]");
    println!("    开发模式:       {}", yes_no(config.dev_mode));
    println!("────────────────────────────────────────");
}

fn print_version() {
    println!();
    println!("GD Stack - 分层协议栈编排核心");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", gd_stack::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}
