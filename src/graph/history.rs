//! Bounded undo/redo log for topology edits.
//!
//! Every entry carries the full payload needed to replay it in either
//! direction. The inverse table:
//!
//! | operation | inverse |
//! |---|---|
//! | `AddNode { node, edges }` | `RemoveNode { node, edges }` |
//! | `RemoveNode { node, edges }` | `AddNode { node, edges }` |
//! | `AddEdge(e)` | `RemoveEdge(e)` |
//! | `RemoveEdge(e)` | `AddEdge(e)` |
//!
//! Parameter edits are not recorded.

use crate::graph::{Graph, GraphEdge, GraphNode, GraphResult};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphOperation {
    /// Add a node and then the listed edges
    AddNode { node: GraphNode, edges: Vec<GraphEdge> },
    /// Remove a node; `edges` are the incident edges removed with it
    RemoveNode { node: GraphNode, edges: Vec<GraphEdge> },
    AddEdge(GraphEdge),
    RemoveEdge(GraphEdge),
}

impl GraphOperation {
    pub fn inverse(&self) -> GraphOperation {
        match self {
            GraphOperation::AddNode { node, edges } => GraphOperation::RemoveNode {
                node: node.clone(),
                edges: edges.clone(),
            },
            GraphOperation::RemoveNode { node, edges } => GraphOperation::AddNode {
                node: node.clone(),
                edges: edges.clone(),
            },
            GraphOperation::AddEdge(edge) => GraphOperation::RemoveEdge(edge.clone()),
            GraphOperation::RemoveEdge(edge) => GraphOperation::AddEdge(edge.clone()),
        }
    }

    pub fn apply(&self, graph: &mut Graph) -> GraphResult<()> {
        match self {
            GraphOperation::AddNode { node, edges } => {
                graph.add_node(node.clone())?;
                for edge in edges {
                    graph.add_edge(edge.clone())?;
                }
            }
            GraphOperation::RemoveNode { node, .. } => {
                graph.remove_node(&node.id)?;
            }
            GraphOperation::AddEdge(edge) => graph.add_edge(edge.clone())?,
            GraphOperation::RemoveEdge(edge) => {
                graph.remove_edge(&edge.id)?;
            }
        }
        Ok(())
    }

    /// Short label for logs and the editor's undo menu
    pub fn label(&self) -> String {
        match self {
            GraphOperation::AddNode { node, .. } => format!("add node {}", node.id),
            GraphOperation::RemoveNode { node, .. } => format!("remove node {}", node.id),
            GraphOperation::AddEdge(edge) => format!("add edge {}", edge.id),
            GraphOperation::RemoveEdge(edge) => format!("remove edge {}", edge.id),
        }
    }
}

/// Bounded stack with a single cursor.
///
/// `entries[..cursor]` can be undone, `entries[cursor..]` can be redone.
#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: VecDeque<GraphOperation>,
    cursor: usize,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            cursor: 0,
            capacity,
        }
    }

    /// Record an operation that has already been applied
    pub fn push(&mut self, op: GraphOperation) {
        self.entries.truncate(self.cursor);
        self.entries.push_back(op);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len();
    }

    /// Revert the most recent operation on `graph`.
    ///
    /// Returns the operation that was applied, or `None` when there is
    /// nothing to undo. On failure the cursor does not move.
    pub fn undo(&mut self, graph: &mut Graph) -> GraphResult<Option<GraphOperation>> {
        if self.cursor == 0 {
            return Ok(None);
        }
        let inverse = self.entries[self.cursor - 1].inverse();
        inverse.apply(graph)?;
        self.cursor -= 1;
        Ok(Some(inverse))
    }

    /// Re-apply the next undone operation on `graph`
    pub fn redo(&mut self, graph: &mut Graph) -> GraphResult<Option<GraphOperation>> {
        let Some(op) = self.entries.get(self.cursor).cloned() else {
            return Ok(None);
        };
        op.apply(graph)?;
        self.cursor += 1;
        Ok(Some(op))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Number of operations that can currently be undone
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn entries(&self) -> impl Iterator<Item = &GraphOperation> {
        self.entries.iter()
    }
}
