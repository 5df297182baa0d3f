//! Graph compilation and structural validation.
//!
//! `compile()` turns a [`GraphBuilder`](super::GraphBuilder) into an
//! immutable executable [`App`](crate::app::App), rejecting graphs that
//! cannot run: references to unregistered nodes, no entry edge, or no
//! statically known path to `End`. Dynamic fan-out destinations are
//! resolved at runtime and are exempt from static checks.

use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;

use super::edges::Edge;
use crate::app::App;
use crate::types::NodeKind;

/// Structural problems detected at compile time. Fatal; the graph is not
/// usable until fixed.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// An edge references a node that was never registered.
    #[error("edge from `{from}` references unregistered node `{referenced}`")]
    #[diagnostic(
        code(plait::graphs::unknown_node),
        help("Register the node with add_node before referencing it in an edge.")
    )]
    UnknownNode { from: String, referenced: String },

    /// No edge leaves the virtual Start node.
    #[error("graph has no entry point (no edge from Start)")]
    #[diagnostic(
        code(plait::graphs::missing_entry),
        help("Add at least one edge from NodeKind::Start.")
    )]
    MissingEntry,

    /// No path from Start can statically reach End.
    #[error("End is not reachable from Start through declared edges")]
    #[diagnostic(
        code(plait::graphs::unreachable_end),
        help(
            "Add an edge (or a conditional edge declaring End) on some path \
             from Start. Dynamic fan-out edges satisfy reachability since \
             their destinations are resolved at runtime."
        )
    )]
    UnreachableEnd,
}

impl super::builder::GraphBuilder {
    /// Compiles the graph into an executable application.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownNode`] — a direct edge target, conditional
    ///   edge target declaration, or edge source names an unregistered
    ///   node
    /// - [`GraphError::MissingEntry`] — no edge from `Start`
    /// - [`GraphError::UnreachableEnd`] — no declared path reaches `End`
    pub fn compile(self) -> Result<App, GraphError> {
        self.validate()?;
        let Self {
            schema,
            nodes,
            edges,
            runtime_config,
        } = self;
        Ok(App::from_parts(schema, nodes, edges, runtime_config))
    }

    fn validate(&self) -> Result<(), GraphError> {
        let declared = |kind: &NodeKind| -> bool {
            match kind {
                NodeKind::Start | NodeKind::End => true,
                custom => self.nodes.contains_key(custom),
            }
        };

        for (from, edges) in &self.edges {
            if !declared(from) {
                return Err(GraphError::UnknownNode {
                    from: from.to_string(),
                    referenced: from.to_string(),
                });
            }
            for edge in edges {
                match edge {
                    Edge::Direct(to) => {
                        if !declared(to) {
                            return Err(GraphError::UnknownNode {
                                from: from.to_string(),
                                referenced: to.to_string(),
                            });
                        }
                    }
                    Edge::Conditional(ce) => {
                        for target in ce.targets() {
                            if !declared(target) {
                                return Err(GraphError::UnknownNode {
                                    from: from.to_string(),
                                    referenced: target.to_string(),
                                });
                            }
                        }
                    }
                    // Runtime-resolved; nothing to check statically.
                    Edge::Dynamic(_) => {}
                }
            }
        }

        if self
            .edges
            .get(&NodeKind::Start)
            .map(Vec::is_empty)
            .unwrap_or(true)
        {
            return Err(GraphError::MissingEntry);
        }

        self.check_end_reachable()?;

        // Unreachable registered nodes are suspicious but legal (they may
        // be dispatch-only targets); surface them in the logs.
        let reachable = self.reachable_from_start();
        for kind in self.nodes.keys() {
            if !reachable.contains(kind) {
                tracing::warn!(node = %kind, "node is not reachable through declared edges");
            }
        }

        Ok(())
    }

    /// Breadth-first reachability over declared edges. A dynamic edge on a
    /// reached node marks every registered node reachable, since its
    /// destinations are unknown until runtime.
    fn reachable_from_start(&self) -> FxHashSet<NodeKind> {
        let mut seen: FxHashSet<NodeKind> = FxHashSet::default();
        let mut queue: Vec<NodeKind> = vec![NodeKind::Start];
        while let Some(current) = queue.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(edges) = self.edges.get(&current) else {
                continue;
            };
            for edge in edges {
                match edge {
                    Edge::Direct(to) => queue.push(to.clone()),
                    Edge::Conditional(ce) => queue.extend(ce.targets().iter().cloned()),
                    Edge::Dynamic(_) => {
                        queue.extend(self.nodes.keys().cloned());
                        queue.push(NodeKind::End);
                    }
                }
            }
        }
        seen
    }

    fn check_end_reachable(&self) -> Result<(), GraphError> {
        if self.reachable_from_start().contains(&NodeKind::End) {
            Ok(())
        } else {
            Err(GraphError::UnreachableEnd)
        }
    }
}
