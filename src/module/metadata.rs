//! 模块元数据
//!
//! 定义模块契约 [`Module`]、类型擦除后的模块种类 [`ModuleKind`]、
//! 启动时传给模块的 [`ModuleContext`]，以及用于诊断输出的 [`ModuleStatus`]。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::list::ModuleList;
use crate::os::Handler;
use crate::utils::{CoreError, Result};

/// 模块契约
///
/// 一个模块种类对应一个实现此 trait 的类型。依赖声明是静态的，
/// 在任何实例存在之前就可以求值。
///
/// `start` 在栈线程上执行，必须返回完整初始化的实例，否则返回错误；
/// 不存在“部分启动”的实例。`stop` 对每次成功的 `start` 恰好调用一次，
/// 需要释放模块获取的全部资源。
pub trait Module: Send + Sync + Sized + 'static {
    /// 模块名称（日志与诊断使用）
    const NAME: &'static str;

    /// 声明依赖的模块种类
    fn list_dependencies(_deps: &mut ModuleList) {}

    /// 启动模块
    fn start(ctx: &ModuleContext) -> Result<Self>;

    /// 停止模块
    fn stop(&self) {}
}

/// 类型擦除后的模块实例
pub(crate) trait AnyModule: Send + Sync {
    fn stop_module(&self);
}

impl<M: Module> AnyModule for M {
    fn stop_module(&self) {
        Module::stop(self)
    }
}

/// 刚启动的模块实例，同时持有可停止视图和可向下转型视图
pub(crate) struct StartedModule {
    pub(crate) instance: Arc<dyn AnyModule>,
    pub(crate) any: Arc<dyn Any + Send + Sync>,
}

fn construct<M: Module>(ctx: &ModuleContext) -> Result<StartedModule> {
    let module = Arc::new(M::start(ctx)?);
    let instance: Arc<dyn AnyModule> = module.clone();
    let any: Arc<dyn Any + Send + Sync> = module;
    Ok(StartedModule { instance, any })
}

/// 模块种类
///
/// 模块类型的静态身份，与任何运行中的实例无关。按 `TypeId` 判等。
#[derive(Clone, Copy)]
pub struct ModuleKind {
    id: TypeId,
    name: &'static str,
    list_dependencies: fn(&mut ModuleList),
    construct: fn(&ModuleContext) -> Result<StartedModule>,
}

impl ModuleKind {
    /// 获取模块类型 `M` 的种类
    pub fn of<M: Module>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: M::NAME,
            list_dependencies: M::list_dependencies,
            construct: construct::<M>,
        }
    }

    /// 类型标识
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 模块名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 求值依赖声明
    pub fn dependencies(&self) -> ModuleList {
        let mut deps = ModuleList::new();
        (self.list_dependencies)(&mut deps);
        deps
    }

    pub(crate) fn construct(&self, ctx: &ModuleContext) -> Result<StartedModule> {
        (self.construct)(ctx)
    }
}

impl PartialEq for ModuleKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModuleKind {}

impl Hash for ModuleKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// 模块启动上下文
///
/// 持有已启动的依赖实例和该模块专属的 [`Handler`]。
pub struct ModuleContext {
    module: &'static str,
    dependencies: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    handler: Handler,
}

impl ModuleContext {
    pub(crate) fn new(
        module: &'static str,
        dependencies: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
        handler: Handler,
    ) -> Self {
        Self {
            module,
            dependencies,
            handler,
        }
    }

    /// 获取已声明并已启动的依赖
    ///
    /// 未在 `list_dependencies` 中声明的模块一律返回 `DependencyNotFound`，
    /// 即使它恰好也在运行。
    pub fn get<D: Module>(&self) -> Result<Arc<D>> {
        self.dependencies
            .get(&TypeId::of::<D>())
            .cloned()
            .and_then(|any| any.downcast::<D>().ok())
            .ok_or_else(|| CoreError::DependencyNotFound {
                module: self.module.to_string(),
                dependency: D::NAME.to_string(),
            })
    }

    /// 模块专属的任务处理器
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// 正在启动的模块名
    pub fn module_name(&self) -> &'static str {
        self.module
    }
}

/// 运行中模块的状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    /// 模块名称
    pub name: String,
    /// 在启动顺序中的位置（从 0 开始）
    pub order: usize,
    /// 启动完成时间
    pub started_at: DateTime<Utc>,
}
