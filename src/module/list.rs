//! 模块列表
//!
//! 一次运行所请求的模块种类，按插入顺序记录并去重。插入顺序是启动顺序解析时
//! 的平局裁决依据，保证同一份列表每次解析出相同的顺序。

use std::any::TypeId;
use std::collections::HashSet;

use super::metadata::{Module, ModuleKind};

/// 有序、去重的模块种类列表
#[derive(Clone, Default)]
pub struct ModuleList {
    kinds: Vec<ModuleKind>,
    seen: HashSet<TypeId>,
}

impl ModuleList {
    /// 创建空列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加模块种类，重复添加是空操作
    pub fn add<M: Module>(&mut self) -> &mut Self {
        self.add_kind(ModuleKind::of::<M>());
        self
    }

    /// 添加已擦除类型的模块种类，返回是否为新插入
    pub fn add_kind(&mut self, kind: ModuleKind) -> bool {
        if self.seen.insert(kind.id()) {
            self.kinds.push(kind);
            true
        } else {
            false
        }
    }

    pub fn contains<M: Module>(&self) -> bool {
        self.seen.contains(&TypeId::of::<M>())
    }

    pub fn contains_kind(&self, kind: &ModuleKind) -> bool {
        self.seen.contains(&kind.id())
    }

    /// 在插入顺序中的位置
    pub fn position(&self, kind: &ModuleKind) -> Option<usize> {
        self.kinds.iter().position(|k| k == kind)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModuleKind> {
        self.kinds.iter()
    }

    /// 按插入顺序输出的种类序列
    pub fn to_ordered_set(&self) -> Vec<ModuleKind> {
        self.kinds.clone()
    }

    /// 按插入顺序输出的模块名
    pub fn names(&self) -> Vec<&'static str> {
        self.kinds.iter().map(ModuleKind::name).collect()
    }
}

impl std::fmt::Debug for ModuleList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a ModuleList {
    type Item = &'a ModuleKind;
    type IntoIter = std::slice::Iter<'a, ModuleKind>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    test_module!(Alpha);
    test_module!(Beta);
    test_module!(Gamma);

    #[test]
    fn test_new_list_is_empty() {
        let list = ModuleList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(!list.contains::<Alpha>());
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut list = ModuleList::new();
        list.add::<Gamma>().add::<Alpha>().add::<Beta>();

        assert_eq!(list.names(), vec!["Gamma", "Alpha", "Beta"]);
        assert_eq!(list.position(&ModuleKind::of::<Alpha>()), Some(1));
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut list = ModuleList::new();
        list.add::<Alpha>().add::<Beta>().add::<Alpha>();

        assert_eq!(list.len(), 2);
        assert_eq!(list.names(), vec!["Alpha", "Beta"]);
        assert!(!list.add_kind(ModuleKind::of::<Beta>()));
        assert!(list.add_kind(ModuleKind::of::<Gamma>()));
    }

    #[test]
    fn test_contains_and_ordered_set() {
        let mut list = ModuleList::new();
        list.add::<Beta>();

        assert!(list.contains::<Beta>());
        assert!(list.contains_kind(&ModuleKind::of::<Beta>()));
        assert!(!list.contains::<Gamma>());
        assert_eq!(list.to_ordered_set(), vec![ModuleKind::of::<Beta>()]);
    }
}
