//! 模块依赖管理
//!
//! 本模块提供由 [`ModuleList`] 导出的依赖关系图以及启动顺序解析。
//!
//! # 规则
//!
//! - 依赖图只覆盖列表中请求的模块种类；模块声明的依赖如果不在列表里，
//!   构建即失败（不会自动补齐，调用方必须显式列出）
//! - 图必须无环，环是致命配置错误
//! - 多个合法顺序并存时，按列表插入顺序裁决
//!
//! # 示例
//!
//! ```rust,ignore
//! let mut list = ModuleList::new();
//! list.add::<HciHal>().add::<HciLayer>();
//!
//! let graph = DependencyGraph::build(&list)?;
//! let order = graph.topological_sort()?;
//! assert_eq!(order[0], ModuleKind::of::<HciHal>());
//! ```

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};

use super::list::ModuleList;
use super::metadata::ModuleKind;
use crate::utils::{CoreError, Result};

/// 模块依赖关系图
///
/// 节点按列表插入顺序编号，边以下标存储。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点，按插入顺序
    nodes: Vec<ModuleKind>,
    /// TypeId -> 节点下标
    index: HashMap<TypeId, usize>,
    /// 正向边：节点 -> 它依赖的节点
    edges: Vec<Vec<usize>>,
    /// 反向边：节点 -> 依赖它的节点
    reverse_edges: Vec<Vec<usize>>,
}

/// DFS 着色
#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    /// 从模块列表构建依赖图
    ///
    /// # 错误
    ///
    /// 某个模块声明的依赖不在列表中时返回 `CoreError::DependencyNotFound`。
    pub fn build(list: &ModuleList) -> Result<Self> {
        let nodes = list.to_ordered_set();
        let index: HashMap<TypeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, kind)| (kind.id(), i))
            .collect();

        let mut edges = vec![Vec::new(); nodes.len()];
        let mut reverse_edges = vec![Vec::new(); nodes.len()];

        for (i, kind) in nodes.iter().enumerate() {
            for dep in kind.dependencies().iter() {
                let j = *index
                    .get(&dep.id())
                    .ok_or_else(|| CoreError::DependencyNotFound {
                        module: kind.name().to_string(),
                        dependency: dep.name().to_string(),
                    })?;

                if !edges[i].contains(&j) {
                    edges[i].push(j);
                    reverse_edges[j].push(i);
                }
            }
        }

        Ok(Self {
            nodes,
            index,
            edges,
            reverse_edges,
        })
    }

    /// 获取模块的直接依赖
    pub fn get_dependencies(&self, kind: &ModuleKind) -> Vec<ModuleKind> {
        self.neighbors(kind, &self.edges)
    }

    /// 获取直接依赖该模块的模块
    pub fn get_dependents(&self, kind: &ModuleKind) -> Vec<ModuleKind> {
        self.neighbors(kind, &self.reverse_edges)
    }

    fn neighbors(&self, kind: &ModuleKind, adjacency: &[Vec<usize>]) -> Vec<ModuleKind> {
        self.index
            .get(&kind.id())
            .map(|&i| adjacency[i].iter().map(|&j| self.nodes[j]).collect())
            .unwrap_or_default()
    }

    /// 获取模块的所有传递依赖，被依赖者在前
    pub fn get_all_dependencies(&self, kind: &ModuleKind) -> Vec<ModuleKind> {
        let Some(&start) = self.index.get(&kind.id()) else {
            return Vec::new();
        };

        let mut visited = vec![false; self.nodes.len()];
        let mut result = Vec::new();
        visited[start] = true;
        self.collect_dependencies(start, &mut visited, &mut result);
        result.into_iter().map(|i| self.nodes[i]).collect()
    }

    fn collect_dependencies(&self, node: usize, visited: &mut [bool], result: &mut Vec<usize>) {
        for &dep in &self.edges[node] {
            if !visited[dep] {
                visited[dep] = true;
                self.collect_dependencies(dep, visited, result);
                result.push(dep);
            }
        }
    }

    /// 是否存在循环依赖
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// 查找循环依赖路径
    ///
    /// 返回的路径首尾为同一模块，例如 `[A, B, A]`。
    pub fn find_cycle(&self) -> Option<Vec<ModuleKind>> {
        let mut colors = vec![Color::White; self.nodes.len()];
        let mut path = Vec::new();

        (0..self.nodes.len()).find_map(|node| {
            if colors[node] == Color::White {
                self.find_cycle_from(node, &mut colors, &mut path)
            } else {
                None
            }
        })
    }

    fn find_cycle_from(
        &self,
        node: usize,
        colors: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<ModuleKind>> {
        colors[node] = Color::Gray;
        path.push(node);

        for &next in &self.edges[node] {
            match colors[next] {
                Color::Gray => {
                    // 从路径上第一次出现 next 的位置截取，并闭合
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<ModuleKind> =
                        path[start..].iter().map(|&n| self.nodes[n]).collect();
                    cycle.push(self.nodes[next]);
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = self.find_cycle_from(next, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        None
    }

    /// 拓扑排序（Kahn 算法）
    ///
    /// 依赖总是排在依赖方之前；同时就绪的节点按插入顺序输出。
    ///
    /// # 错误
    ///
    /// 提取完所有入度为 0 的节点后仍有剩余，说明存在环，返回
    /// `CoreError::CircularDependency`，消息中包含环路径。
    pub fn topological_sort(&self) -> Result<Vec<ModuleKind>> {
        // 入度 = 该模块依赖的模块数，依赖全部输出后才能就绪
        let mut in_degree: Vec<usize> = self.edges.iter().map(Vec::len).collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| node)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            result.push(self.nodes[node]);

            for &dependent in &self.reverse_edges[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if result.len() != self.nodes.len() {
            let detail = match self.find_cycle() {
                Some(cycle) => cycle
                    .iter()
                    .map(|k| k.name())
                    .collect::<Vec<_>>()
                    .join(" -> "),
                None => "无法完成拓扑排序".to_string(),
            };
            return Err(CoreError::CircularDependency(detail));
        }

        Ok(result)
    }

    /// 卸载顺序（启动顺序的反序）
    pub fn get_unload_order(&self) -> Result<Vec<ModuleKind>> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// 图中模块数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, kind: &ModuleKind) -> bool {
        self.index.contains_key(&kind.id())
    }
}
