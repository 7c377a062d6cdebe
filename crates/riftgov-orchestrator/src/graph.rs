use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use riftgov_types::{Result, RiftError};

use crate::config::{RegistryConfig, ScriptHooks};
use crate::permissions::FileMode;

// ---------------------------------------------------------------------------
// ScriptNode
// ---------------------------------------------------------------------------

/// One registered script. Built once from configuration, read-only after.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptNode {
    pub name: String,
    /// Resolved location on disk.
    pub path: PathBuf,
    /// Path exactly as declared in the registry, used for permission rules.
    pub declared_path: String,
    pub stage: u8,
    pub depends_on: Vec<String>,
    pub required_permission_mode: Option<FileMode>,
    pub governance_policy: Vec<(String, String)>,
    #[serde(skip)]
    pub hooks: ScriptHooks,
    pub description: String,
}

impl ScriptNode {
    pub fn new(name: impl Into<String>, declared_path: impl Into<String>) -> Self {
        let declared_path = declared_path.into();
        Self {
            name: name.into(),
            path: PathBuf::from(&declared_path),
            declared_path,
            stage: 0,
            depends_on: Vec::new(),
            required_permission_mode: None,
            governance_policy: Vec::new(),
            hooks: ScriptHooks::default(),
            description: String::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, ScriptNode>,
    /// Names in declaration order.
    order: Vec<String>,
}

impl DependencyGraph {
    pub fn from_nodes(nodes: impl IntoIterator<Item = ScriptNode>) -> Result<Self> {
        let mut graph = Self::default();
        for node in nodes {
            if graph.nodes.contains_key(&node.name) {
                return Err(RiftError::Config(format!(
                    "script '{}' is declared twice",
                    node.name
                )));
            }
            graph.order.push(node.name.clone());
            graph.nodes.insert(node.name.clone(), node);
        }
        Ok(graph)
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Self::from_nodes(config.scripts.iter().map(|(name, script)| ScriptNode {
            name: name.clone(),
            path: config.script_path(script),
            declared_path: script.path.to_string_lossy().replace('\\', "/"),
            stage: script.stage,
            depends_on: script.depends_on.clone(),
            required_permission_mode: script.permissions,
            governance_policy: script.governance_policy.pairs(),
            hooks: script.hooks.clone(),
            description: script.description.clone(),
        }))
    }

    pub fn node(&self, name: &str) -> Option<&ScriptNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Direct dependents of `name`, in declaration order.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.order
            .iter()
            .filter(|n| {
                self.nodes[n.as_str()]
                    .depends_on
                    .iter()
                    .any(|d| d == name)
            })
            .map(String::as_str)
            .collect()
    }

    /// Execution order for `target`: every dependency before its dependent,
    /// siblings in declared `depends_on` order.
    ///
    /// A cycle, an unknown target, or a dependency on an undeclared script
    /// fails the whole resolution; no partial order is returned.
    pub fn resolve(&self, target: &str) -> Result<Vec<&ScriptNode>> {
        let Some((name, _)) = self.nodes.get_key_value(target) else {
            return Err(RiftError::UnknownTarget(target.to_string()));
        };
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        let mut order = Vec::new();
        self.visit(name, &mut marks, &mut path, &mut order)?;
        Ok(order)
    }

    /// Execution order over the whole registry, independent subgraphs in
    /// declaration order.
    pub fn resolve_all(&self) -> Result<Vec<&ScriptNode>> {
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        let mut order = Vec::new();
        for name in &self.order {
            self.visit(name, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<&'a ScriptNode>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Err(RiftError::Cycle { cycle });
            }
            None => {}
        }

        let node = match self.nodes.get(name) {
            Some(node) => node,
            None => {
                return Err(match path.last() {
                    Some(parent) => RiftError::UnknownDependency {
                        node: parent.to_string(),
                        dependency: name.to_string(),
                    },
                    None => RiftError::UnknownTarget(name.to_string()),
                })
            }
        };

        marks.insert(name, Mark::InProgress);
        path.push(name);
        for dep in &node.depends_on {
            self.visit(dep, marks, path, order)?;
        }
        path.pop();
        marks.insert(name, Mark::Done);
        order.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: Vec<ScriptNode>) -> DependencyGraph {
        DependencyGraph::from_nodes(nodes).unwrap()
    }

    fn names(order: &[&ScriptNode]) -> Vec<String> {
        order.iter().map(|n| n.name.clone()).collect()
    }

    #[test]
    fn cycle_is_fatal_with_no_order() {
        let g = graph(vec![
            ScriptNode::new("A", "a.sh").depends_on(["B"]),
            ScriptNode::new("B", "b.sh").depends_on(["C"]),
            ScriptNode::new("C", "c.sh").depends_on(["A"]),
        ]);
        let err = g.resolve("A").unwrap_err();
        match &err {
            RiftError::Cycle { cycle } => assert_eq!(cycle, &["A", "B", "C", "A"]),
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(err.is_fatal());
        assert!(g.resolve_all().is_err());
    }

    #[test]
    fn self_dependency_is_cycle() {
        let g = graph(vec![ScriptNode::new("A", "a.sh").depends_on(["A"])]);
        assert!(matches!(g.resolve("A"), Err(RiftError::Cycle { .. })));
    }

    #[test]
    fn independent_subgraphs() {
        let g = graph(vec![
            ScriptNode::new("A", "a.sh").depends_on(["B"]),
            ScriptNode::new("B", "b.sh"),
            ScriptNode::new("C", "c.sh"),
        ]);
        assert_eq!(names(&g.resolve("A").unwrap()), ["B", "A"]);
        assert_eq!(names(&g.resolve("C").unwrap()), ["C"]);
        assert_eq!(names(&g.resolve_all().unwrap()), ["B", "A", "C"]);
    }

    #[test]
    fn diamond_visits_shared_dependency_once() {
        let g = graph(vec![
            ScriptNode::new("base", "base.sh"),
            ScriptNode::new("left", "l.sh").depends_on(["base"]),
            ScriptNode::new("right", "r.sh").depends_on(["base"]),
            ScriptNode::new("top", "t.sh").depends_on(["right", "left"]),
        ]);
        assert_eq!(
            names(&g.resolve("top").unwrap()),
            ["base", "right", "left", "top"]
        );
    }

    #[test]
    fn undeclared_dependency_is_error() {
        let g = graph(vec![ScriptNode::new("emit", "e.sh").depends_on(["ghost"])]);
        match g.resolve("emit") {
            Err(RiftError::UnknownDependency { node, dependency }) => {
                assert_eq!(node, "emit");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected unknown dependency, got {other:?}"),
        }
    }

    #[test]
    fn unknown_target_is_error() {
        let g = graph(vec![ScriptNode::new("a", "a.sh")]);
        assert!(matches!(g.resolve("zzz"), Err(RiftError::UnknownTarget(_))));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = DependencyGraph::from_nodes(vec![
            ScriptNode::new("a", "a.sh"),
            ScriptNode::new("a", "b.sh"),
        ])
        .unwrap_err();
        assert!(matches!(err, RiftError::Config(_)));
    }

    #[test]
    fn dependents_in_declaration_order() {
        let g = graph(vec![
            ScriptNode::new("base", "base.sh"),
            ScriptNode::new("y", "y.sh").depends_on(["base"]),
            ScriptNode::new("x", "x.sh").depends_on(["base"]),
            ScriptNode::new("z", "z.sh"),
        ]);
        assert_eq!(g.dependents("base"), ["y", "x"]);
        assert!(g.dependents("z").is_empty());
    }
}
