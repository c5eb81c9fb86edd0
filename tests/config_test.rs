//! 配置加载集成测试
//!
//! 测试配置文件解析、命令行覆盖以及开关补齐

use gd_stack::core::config::CoreConfig;
use gd_stack::{CoreError, InitFlags, StartupMode};
use tempfile::TempDir;

/// YAML 配置的完整加载流程
#[tokio::test]
async fn test_yaml_config_loading() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stack.yaml");
    tokio::fs::write(
        &path,
        r#"
logging:
  level: debug
  json_format: true
stack:
  thread_name: yaml_stack_thread
init_flags:
  gd_acl: true
"#,
    )
    .await
    .unwrap();

    let config = CoreConfig::from_file(&path).await.unwrap();

    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json_format);
    assert_eq!(config.stack.thread_name, "yaml_stack_thread");
    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));

    // acl 的前置开关被补齐
    let flags = config.init_flags;
    assert!(flags.gd_acl && flags.gd_controller && flags.gd_hci);
    assert!(!flags.gd_security && !flags.gd_core);
    assert_eq!(StartupMode::from_flags(&flags).unwrap(), StartupMode::Legacy);
}

/// JSON 配置按扩展名识别
#[tokio::test]
async fn test_json_config_format() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stack.json");
    tokio::fs::write(
        &path,
        r#"{
  "logging": { "level": "warn" },
  "init_flags": { "gd_core": true },
  "dev_mode": true
}"#,
    )
    .await
    .unwrap();

    let config = CoreConfig::from_file(&path).await.unwrap();

    assert_eq!(config.logging.level, "warn");
    assert!(config.dev_mode);
    assert_eq!(config.init_flags, InitFlags::all());
    assert_eq!(config.stack.thread_name, "gd_stack_thread");
    assert_eq!(
        StartupMode::from_flags(&config.init_flags).unwrap(),
        StartupMode::Core
    );
}

/// 缺省字段使用默认值
#[tokio::test]
async fn test_empty_sections_use_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("minimal.yaml");
    tokio::fs::write(&path, "dev_mode: false\n").await.unwrap();

    let config = CoreConfig::from_file(&path).await.unwrap();
    let defaults = CoreConfig::default();

    assert_eq!(config.logging.level, defaults.logging.level);
    assert_eq!(config.stack, defaults.stack);
    assert_eq!(config.init_flags, InitFlags::default());
}

/// 语法错误的文件返回配置错误
#[tokio::test]
async fn test_invalid_yaml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.yaml");
    tokio::fs::write(&path, "logging: [unterminated\n").await.unwrap();

    let err = CoreConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::Yaml(_)));
    assert_eq!(err.error_code(), "CONFIG-003");
}

/// 文件不存在返回 IO 错误
#[tokio::test]
async fn test_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = CoreConfig::from_file(temp_dir.path().join("absent.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Io(_)));
    assert_eq!(err.error_code(), "SYS-001");
}

/// 文件里 security 与 core 只开其一，加载时即被拒绝
#[tokio::test]
async fn test_undocumented_flag_combination_in_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("security.yaml");
    tokio::fs::write(
        &path,
        r#"
init_flags:
  gd_security: true
"#,
    )
    .await
    .unwrap();

    let err = CoreConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidFlagCombination(_)));
    assert!(err.is_config_error());
}

/// 命令行开关与文件开关取并集
#[tokio::test]
async fn test_cli_flags_merge_into_file_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("merge.yaml");
    tokio::fs::write(
        &path,
        r#"
init_flags:
  gd_hci: true
"#,
    )
    .await
    .unwrap();

    let mut config = CoreConfig::from_file(&path).await.unwrap();
    let cli_flags = InitFlags::parse(&["INIT_gd_core=true"]).unwrap();
    config.merge(
        CoreConfig::builder()
            .init_flags(cli_flags)
            .log_level("trace")
            .build(),
    );

    assert_eq!(config.init_flags, InitFlags::all());
    assert_eq!(config.logging.level, "trace");
}

/// 无效的开关参数
#[test]
fn test_invalid_flag_arguments() {
    assert!(matches!(
        InitFlags::parse(&["INIT_gd_bogus=true"]),
        Err(CoreError::InvalidFlag { .. })
    ));
    assert!(matches!(
        InitFlags::parse(&["INIT_gd_hci=maybe"]),
        Err(CoreError::InvalidFlag { .. })
    ));
    assert!(matches!(
        InitFlags::parse(&["INIT_gd_security=true"]),
        Err(CoreError::InvalidFlagCombination(_))
    ));
}
