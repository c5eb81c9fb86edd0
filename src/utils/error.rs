//! 协议栈错误类型定义
//!
//! 本模块定义了栈管理器与门面中使用的所有错误类型。
//!
//! 错误分为三类：
//! - 前置条件违例（重复启动、未运行时停止、停止状态下访问）
//! - 配置错误（缺失依赖、循环依赖、非法特性开关组合）
//! - 模块启动失败
//!
//! 这三类错误在门面层都通过 [`fatal`] 立即终止，不作为可恢复错误返回给调用方。

use thiserror::Error;

/// 协议栈核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 前置条件错误 ====================

    /// 前置条件违例（编程错误）
    #[error("前置条件违例: {0}")]
    PreconditionViolated(String),

    /// 状态不允许该操作
    #[error("状态无效: {0}")]
    InvalidState(String),

    // ==================== 模块管理错误 ====================

    /// 模块声明的依赖不在本次请求的模块列表中
    #[error("模块 '{module}' 的依赖 '{dependency}' 不在模块列表中")]
    DependencyNotFound {
        module: String,
        dependency: String,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    /// 模块启动失败
    #[error("模块启动失败: '{module}' - {reason}")]
    ModuleStartFailed {
        module: String,
        reason: String,
    },

    /// 模块未启动
    #[error("模块未启动: '{0}'")]
    ModuleNotStarted(String),

    // ==================== 执行上下文错误 ====================

    /// 栈线程已停止
    #[error("栈线程已停止: '{0}'")]
    ThreadStopped(String),

    /// 处理器已关闭（所属模块已停止）
    #[error("处理器已关闭: '{0}'")]
    HandlerClosed(String),

    // ==================== 配置错误 ====================

    /// 特性开关无效
    #[error("特性开关无效: '{flag}' - {reason}")]
    InvalidFlag {
        flag: String,
        reason: String,
    },

    /// 未定义的特性开关组合
    #[error("未定义的特性开关组合: {0}")]
    InvalidFlagCombination(String),

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 栈操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 栈状态错误 (STACK-xxx)
    pub const STACK_PRECONDITION: &str = "STACK-001";
    pub const STACK_INVALID_STATE: &str = "STACK-002";

    // 模块错误 (MODULE-xxx)
    pub const MODULE_DEPENDENCY_NOT_FOUND: &str = "MODULE-001";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-002";
    pub const MODULE_START_FAILED: &str = "MODULE-003";
    pub const MODULE_NOT_STARTED: &str = "MODULE-004";

    // 执行上下文错误 (THREAD-xxx)
    pub const THREAD_STOPPED: &str = "THREAD-001";
    pub const THREAD_HANDLER_CLOSED: &str = "THREAD-002";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_INVALID_FLAG: &str = "CONFIG-001";
    pub const CONFIG_INVALID_COMBINATION: &str = "CONFIG-002";
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-003";

    // 系统错误 (SYS-xxx)
    pub const SYS_IO: &str = "SYS-001";
    pub const SYS_INTERNAL: &str = "SYS-002";
    pub const SYS_INIT_FAILED: &str = "SYS-003";
    pub const SYS_OTHER: &str = "SYS-004";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::PreconditionViolated(_) => error_code::STACK_PRECONDITION,
            CoreError::InvalidState(_) => error_code::STACK_INVALID_STATE,
            CoreError::DependencyNotFound { .. } => error_code::MODULE_DEPENDENCY_NOT_FOUND,
            CoreError::CircularDependency(_) => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::ModuleStartFailed { .. } => error_code::MODULE_START_FAILED,
            CoreError::ModuleNotStarted(_) => error_code::MODULE_NOT_STARTED,
            CoreError::ThreadStopped(_) => error_code::THREAD_STOPPED,
            CoreError::HandlerClosed(_) => error_code::THREAD_HANDLER_CLOSED,
            CoreError::InvalidFlag { .. } => error_code::CONFIG_INVALID_FLAG,
            CoreError::InvalidFlagCombination(_) => error_code::CONFIG_INVALID_COMBINATION,
            CoreError::Json(_) | CoreError::Yaml(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::Io(_) => error_code::SYS_IO,
            CoreError::Internal(_) => error_code::SYS_INTERNAL,
            CoreError::InitFailed(_) => error_code::SYS_INIT_FAILED,
            CoreError::Other(_) => error_code::SYS_OTHER,
        }
    }

    /// 是否属于配置错误（在任何模块启动前即可发现）
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CoreError::DependencyNotFound { .. }
                | CoreError::CircularDependency(_)
                | CoreError::InvalidFlag { .. }
                | CoreError::InvalidFlagCombination(_)
        )
    }
}

/// 致命错误出口
///
/// 记录错误日志并写到 stderr 后中止进程。启动期基础设施宁可崩溃重启，
/// 也不带着缺失的保证继续运行。非主线程上的 panic 只会结束该线程，
/// 所以这里用 `abort`；单元测试中改为 panic，以便用 `should_panic` 断言。
#[track_caller]
pub fn fatal(err: CoreError) -> ! {
    tracing::error!(error_code = err.error_code(), error = %err, "致命错误");

    #[cfg(test)]
    panic!("[{}] {}", err.error_code(), err);

    #[cfg(not(test))]
    {
        // 非阻塞日志写入器来不及刷新，stderr 保证信息留下
        eprintln!("致命错误 [{}] {} ({})", err.error_code(), err, std::panic::Location::caller());
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DependencyNotFound {
            module: "HciLayer".to_string(),
            dependency: "HciHal".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HciLayer"));
        assert!(msg.contains("HciHal"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::CircularDependency("a -> b -> a".to_string());
        assert_eq!(err.error_code(), error_code::MODULE_CIRCULAR_DEPENDENCY);

        let err = CoreError::PreconditionViolated("栈已在运行".to_string());
        assert_eq!(err.error_code(), error_code::STACK_PRECONDITION);
    }

    #[test]
    fn test_every_variant_has_a_code() {
        let errors = vec![
            CoreError::HandlerClosed("t".to_string()),
            CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")),
            CoreError::Internal(String::new()),
            CoreError::InitFailed(String::new()),
            CoreError::Other(anyhow::anyhow!("x")),
        ];
        let codes: Vec<_> = errors.iter().map(CoreError::error_code).collect();
        assert_eq!(
            codes,
            vec![
                error_code::THREAD_HANDLER_CLOSED,
                error_code::SYS_IO,
                error_code::SYS_INTERNAL,
                error_code::SYS_INIT_FAILED,
                error_code::SYS_OTHER,
            ]
        );
    }

    #[test]
    fn test_is_config_error() {
        assert!(CoreError::CircularDependency(String::new()).is_config_error());
        assert!(CoreError::InvalidFlagCombination(String::new()).is_config_error());
        assert!(!CoreError::PreconditionViolated(String::new()).is_config_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }

    #[test]
    #[should_panic(expected = "STACK-001")]
    fn test_fatal_panics_with_code() {
        fatal(CoreError::PreconditionViolated("栈未运行".to_string()));
    }
}
