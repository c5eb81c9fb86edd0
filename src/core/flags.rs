//! 特性开关
//!
//! 每个开关独立启用一组相关模块：传输层（hci）、控制器、链路连接管理（acl）、
//! 安全模块以及覆盖完整上层协议栈的 core 集群。
//!
//! 开关来自命令行参数，格式为 `INIT_<name>=true|false`：
//!
//! ```rust
//! use gd_stack::core::flags::InitFlags;
//!
//! let flags = InitFlags::parse(&["INIT_gd_acl=true"]).unwrap();
//! // acl 依赖控制器与传输层，解析时自动打开
//! assert!(flags.gd_controller && flags.gd_hci);
//! assert!(!flags.gd_core);
//! ```

use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::{CoreError, Result};

/// 开关参数前缀
const FLAG_PREFIX: &str = "INIT_";

/// 特性开关快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitFlags {
    /// 传输层（HCI HAL + HCI 层）
    #[serde(default)]
    pub gd_hci: bool,

    /// 控制器
    #[serde(default)]
    pub gd_controller: bool,

    /// 链路连接管理
    #[serde(default)]
    pub gd_acl: bool,

    /// 安全模块
    #[serde(default)]
    pub gd_security: bool,

    /// 完整上层协议栈
    #[serde(default)]
    pub gd_core: bool,
}

static CURRENT: OnceLock<RwLock<InitFlags>> = OnceLock::new();

fn current() -> &'static RwLock<InitFlags> {
    CURRENT.get_or_init(|| RwLock::new(InitFlags::default()))
}

impl InitFlags {
    /// 全部开启
    pub fn all() -> Self {
        Self {
            gd_hci: true,
            gd_controller: true,
            gd_acl: true,
            gd_security: true,
            gd_core: true,
        }
    }

    /// 解析命令行参数
    ///
    /// 不带 `INIT_` 前缀的参数会被忽略；未知开关或非布尔值返回 `InvalidFlag`。
    /// 解析完成后按 core ⇒ security ⇒ acl ⇒ controller ⇒ hci 补齐前置开关，
    /// 补齐后仍无效的组合（只开 security 不开 core）返回 `InvalidFlagCombination`。
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut flags = Self::default();

        for arg in args {
            let arg = arg.as_ref().trim();
            let Some(body) = arg.strip_prefix(FLAG_PREFIX) else {
                continue;
            };

            let (name, value) = body.split_once('=').ok_or_else(|| CoreError::InvalidFlag {
                flag: arg.to_string(),
                reason: "缺少 '='".to_string(),
            })?;

            let value = match value.trim() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(CoreError::InvalidFlag {
                        flag: name.to_string(),
                        reason: format!("值 '{}' 不是布尔值", other),
                    })
                }
            };

            match name.trim() {
                "gd_hci" => flags.gd_hci = value,
                "gd_controller" => flags.gd_controller = value,
                "gd_acl" => flags.gd_acl = value,
                "gd_security" => flags.gd_security = value,
                "gd_core" => flags.gd_core = value,
                unknown => {
                    return Err(CoreError::InvalidFlag {
                        flag: unknown.to_string(),
                        reason: "未知开关".to_string(),
                    })
                }
            }
        }

        let flags = flags.with_implied();
        flags.validate()?;
        Ok(flags)
    }

    /// 检查开关组合
    ///
    /// 某个集群开启而其前置集群关闭，或 security 与 core 只开启其一，
    /// 都返回 `InvalidFlagCombination`。
    pub fn validate(&self) -> Result<()> {
        let prerequisites = [
            (self.gd_controller, self.gd_hci, "gd_controller 需要 gd_hci"),
            (self.gd_acl, self.gd_controller, "gd_acl 需要 gd_controller"),
            (self.gd_security, self.gd_acl, "gd_security 需要 gd_acl"),
            (self.gd_security, self.gd_core, "gd_security 需要 gd_core"),
            (self.gd_core, self.gd_security, "gd_core 需要 gd_security"),
        ];

        match prerequisites
            .iter()
            .find(|(enabled, required, _)| *enabled && !*required)
        {
            Some((_, _, reason)) => Err(CoreError::InvalidFlagCombination(format!(
                "{} (当前开启: {:?})",
                reason,
                self.enabled()
            ))),
            None => Ok(()),
        }
    }

    /// 补齐被依赖的开关
    pub fn with_implied(mut self) -> Self {
        if self.gd_core {
            self.gd_security = true;
        }
        if self.gd_security {
            self.gd_acl = true;
        }
        if self.gd_acl {
            self.gd_controller = true;
        }
        if self.gd_controller {
            self.gd_hci = true;
        }
        self
    }

    /// 安装为进程级快照
    pub fn load(flags: Self) {
        *current().write() = flags;
        info!(?flags, "特性开关已加载");
    }

    /// 读取当前进程级快照
    pub fn snapshot() -> Self {
        let flags = *current().read();
        debug!(?flags, "读取特性开关快照");
        flags
    }

    /// 已开启的开关名列表
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            ("gd_hci", self.gd_hci),
            ("gd_controller", self.gd_controller),
            ("gd_acl", self.gd_acl),
            ("gd_security", self.gd_security),
            ("gd_core", self.gd_core),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let flags = InitFlags::parse::<&str>(&[]).unwrap();
        assert_eq!(flags, InitFlags::default());
        assert!(flags.enabled().is_empty());
    }

    #[test]
    fn test_parse_ignores_foreign_args() {
        let flags = InitFlags::parse(&["--verbose", "INIT_gd_hci=true", "OTHER=1"]).unwrap();
        assert!(flags.gd_hci);
        assert!(!flags.gd_controller);
    }

    #[test]
    fn test_parse_core_implies_everything() {
        let flags = InitFlags::parse(&["INIT_gd_core=true"]).unwrap();
        assert_eq!(flags, InitFlags::all());
    }

    #[test]
    fn test_parse_later_arg_wins() {
        let flags = InitFlags::parse(&["INIT_gd_hci=true", "INIT_gd_hci=false"]).unwrap();
        assert!(!flags.gd_hci);
    }

    #[test]
    fn test_parse_invalid_value() {
        let err = InitFlags::parse(&["INIT_gd_hci=yes"]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFlag { .. }));
    }

    #[test]
    fn test_parse_unknown_flag() {
        let err = InitFlags::parse(&["INIT_gd_rust=true"]).unwrap_err();
        match err {
            CoreError::InvalidFlag { flag, .. } => assert_eq!(flag, "gd_rust"),
            other => panic!("意外的错误: {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_equals() {
        assert!(InitFlags::parse(&["INIT_gd_hci"]).is_err());
    }

    #[test]
    fn test_parse_security_without_core_is_rejected() {
        let err = InitFlags::parse(&["INIT_gd_security=true"]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFlagCombination(_)));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_validate_documented_combinations() {
        assert!(InitFlags::default().validate().is_ok());
        assert!(InitFlags::all().validate().is_ok());
        for arg in ["INIT_gd_hci=true", "INIT_gd_controller=true", "INIT_gd_acl=true"] {
            assert!(InitFlags::parse(&[arg]).is_ok(), "{}", arg);
        }

        let acl_only = InitFlags {
            gd_acl: true,
            ..InitFlags::default()
        };
        assert!(matches!(
            acl_only.validate(),
            Err(CoreError::InvalidFlagCombination(_))
        ));
    }

    #[test]
    fn test_enabled_names() {
        let flags = InitFlags::parse(&["INIT_gd_controller=true"]).unwrap();
        assert_eq!(flags.enabled(), vec!["gd_hci", "gd_controller"]);
    }
}
