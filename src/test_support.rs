//! 单元测试辅助宏

/// 声明一个无状态的测试模块及其依赖
///
/// ```rust,ignore
/// test_module!(Hal);
/// test_module!(Layer: Hal);
/// ```
macro_rules! test_module {
    ($name:ident $(: $($dep:ident),+)?) => {
        struct $name;

        impl $crate::module::Module for $name {
            const NAME: &'static str = stringify!($name);

            #[allow(unused_variables)]
            fn list_dependencies(deps: &mut $crate::module::ModuleList) {
                $($( deps.add::<$dep>(); )+)?
            }

            fn start(_ctx: &$crate::module::ModuleContext) -> $crate::utils::Result<Self> {
                Ok($name)
            }
        }
    };
}
