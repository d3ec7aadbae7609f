//! Graph description to executable plan.
//!
//! [`StateGraph`] collects string-keyed nodes and edges. [`StateGraph::compile`]
//! validates every reference and assigns each node an index, so the
//! executor works purely on `usize` positions and never looks names up.

use std::collections::HashMap;

use crate::domain::{CompileError, GraphSpec};

pub const NODE_TYPE_ENTRY: &str = "entry";
pub const NODE_TYPE_LLM: &str = "llm";

/// Behaviour of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Pass-through; contributes no state.
    Entry,
    /// One model call with this instruction over the accumulated messages.
    Llm { instruction: String },
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Entry => NODE_TYPE_ENTRY,
            Self::Llm { .. } => NODE_TYPE_LLM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledNode {
    pub id: String,
    pub kind: NodeKind,
}

/// Mutable graph under construction.
#[derive(Debug, Clone, Default)]
pub struct StateGraph {
    nodes: Vec<CompiledNode>,
    edges: Vec<(String, String)>,
    entry: Option<String>,
    finish: Option<String>,
    duplicate: Option<String>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate a config graph. Unknown node types fail here.
    pub fn from_spec(spec: &GraphSpec) -> Result<Self, CompileError> {
        let mut graph = Self::new();
        for node in &spec.nodes {
            let kind = match node.node_type.as_str() {
                NODE_TYPE_ENTRY => NodeKind::Entry,
                NODE_TYPE_LLM => NodeKind::Llm {
                    instruction: node.instruction.clone(),
                },
                other => {
                    return Err(CompileError::UnsupportedNodeType {
                        node: node.id.clone(),
                        node_type: other.to_string(),
                    })
                }
            };
            graph.add_node(&node.id, kind);
        }
        for edge in &spec.edges {
            graph.add_edge(&edge.from, &edge.to);
        }
        Ok(graph
            .set_entry_point(&spec.entry)
            .set_finish_point(&spec.finish))
    }

    pub fn add_node(&mut self, id: impl Into<String>, kind: NodeKind) -> &mut Self {
        let id = id.into();
        if self.nodes.iter().any(|n| n.id == id) {
            self.duplicate.get_or_insert(id);
        } else {
            self.nodes.push(CompiledNode { id, kind });
        }
        self
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn set_entry_point(mut self, id: impl Into<String>) -> Self {
        self.entry = Some(id.into());
        self
    }

    pub fn set_finish_point(mut self, id: impl Into<String>) -> Self {
        self.finish = Some(id.into());
        self
    }

    pub fn compile(self) -> Result<CompiledGraph, CompileError> {
        if self.nodes.is_empty() {
            return Err(CompileError::EmptyGraph);
        }
        if let Some(id) = self.duplicate {
            return Err(CompileError::DuplicateNode(id));
        }

        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let entry_id = self.entry.unwrap_or_default();
        let entry = *index
            .get(entry_id.as_str())
            .ok_or_else(|| CompileError::UnknownEntry(entry_id.clone()))?;

        let finish_id = self.finish.unwrap_or_default();
        let finish = *index
            .get(finish_id.as_str())
            .ok_or_else(|| CompileError::UnknownFinish(finish_id.clone()))?;

        let mut successors = vec![Vec::new(); self.nodes.len()];
        for (from, to) in &self.edges {
            let lookup = |name: &String| {
                index
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| CompileError::UnknownEdgeEndpoint {
                        from: from.clone(),
                        to: to.clone(),
                        missing: name.clone(),
                    })
            };
            let src = lookup(from)?;
            let dst = lookup(to)?;
            let out: &mut Vec<usize> = &mut successors[src];
            if !out.contains(&dst) {
                out.push(dst);
            }
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            successors,
            entry,
            finish,
        })
    }
}

/// Validated, index-addressed graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    nodes: Vec<CompiledNode>,
    successors: Vec<Vec<usize>>,
    entry: usize,
    finish: usize,
}

impl CompiledGraph {
    pub fn node(&self, index: usize) -> &CompiledNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[CompiledNode] {
        &self.nodes
    }

    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn finish(&self) -> usize {
        self.finish
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeSpec, NodeSpec};

    fn node(id: &str, node_type: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            node_type: node_type.to_string(),
            instruction: String::new(),
        }
    }

    fn edge(from: &str, to: &str) -> EdgeSpec {
        EdgeSpec {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn spec(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>, entry: &str, finish: &str) -> GraphSpec {
        GraphSpec {
            nodes,
            edges,
            entry: entry.to_string(),
            finish: finish.to_string(),
        }
    }

    fn compile(spec: &GraphSpec) -> Result<CompiledGraph, CompileError> {
        StateGraph::from_spec(spec)?.compile()
    }

    #[test]
    fn test_linear_graph_compiles_to_indices() {
        let g = compile(&spec(
            vec![node("start", "entry"), node("answer", "llm")],
            vec![edge("start", "answer")],
            "start",
            "answer",
        ))
        .unwrap();

        assert_eq!(g.entry(), 0);
        assert_eq!(g.finish(), 1);
        assert_eq!(g.successors(0), &[1]);
        assert!(g.successors(1).is_empty());
    }

    #[test]
    fn test_single_node_graph_compiles() {
        let g = compile(&spec(vec![node("only", "entry")], vec![], "only", "only")).unwrap();
        assert_eq!(g.entry(), g.finish());
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_unknown_entry_and_finish() {
        let nodes = vec![node("a", "entry")];
        assert_eq!(
            compile(&spec(nodes.clone(), vec![], "missing", "a")).unwrap_err(),
            CompileError::UnknownEntry("missing".to_string())
        );
        assert_eq!(
            compile(&spec(nodes, vec![], "a", "missing")).unwrap_err(),
            CompileError::UnknownFinish("missing".to_string())
        );
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let err = compile(&spec(
            vec![node("a", "entry")],
            vec![edge("a", "ghost")],
            "a",
            "a",
        ))
        .unwrap_err();
        assert!(matches!(err, CompileError::UnknownEdgeEndpoint { missing, .. } if missing == "ghost"));
    }

    #[test]
    fn test_unsupported_node_type() {
        let err = compile(&spec(vec![node("t", "tool")], vec![], "t", "t")).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedNodeType { node_type, .. } if node_type == "tool"));
    }

    #[test]
    fn test_duplicate_and_empty() {
        let err = compile(&spec(
            vec![node("a", "entry"), node("a", "llm")],
            vec![],
            "a",
            "a",
        ))
        .unwrap_err();
        assert_eq!(err, CompileError::DuplicateNode("a".to_string()));

        assert_eq!(
            compile(&spec(vec![], vec![], "a", "a")).unwrap_err(),
            CompileError::EmptyGraph
        );
    }

    #[test]
    fn test_cycles_are_accepted() {
        let g = compile(&spec(
            vec![node("a", "entry"), node("b", "llm")],
            vec![edge("a", "b"), edge("b", "a"), edge("a", "b")],
            "a",
            "b",
        ))
        .unwrap();
        assert_eq!(g.successors(0), &[1]);
        assert_eq!(g.successors(1), &[0]);
    }
}
