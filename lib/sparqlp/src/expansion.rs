//! The expansion tree: a depth-first search of the store, one level per triple pattern.
//!
//! Nodes live in an arena ([`ExpansionTree`]) and point to each other with [`NodeId`]s.
//! The arena order is the depth-first pre-order of the search.

use crate::bindings::Bindings;
use crate::error::SparqlError;
use crate::pattern::{GraphPattern, TermPattern};
use crate::store::TripleStore;
use oxrdf::{Term, Triple};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, trace};

/// Index of a node in its [`ExpansionTree`]
pub type NodeId = usize;

/// Signal returned up the expansion when enough answers have been found.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EnoughAnswers;

/// Book-keeping of one top-level evaluation.
#[derive(Debug, Clone, Default)]
pub(crate) struct EvaluationContext {
    eager_limit: Option<usize>,
    answers: usize,
}

impl EvaluationContext {
    pub(crate) fn new(eager_limit: Option<usize>) -> Self {
        Self {
            eager_limit,
            answers: 0,
        }
    }

    fn is_satisfied(&self) -> bool {
        self.eager_limit.is_some_and(|limit| self.answers >= limit)
    }

    pub(crate) fn answers(&self) -> usize {
        self.answers
    }
}

/// A node of the expansion tree: the bindings after matching the first `depth` triple patterns.
#[derive(Debug, Clone)]
pub struct ExpansionNode {
    parent: Option<NodeId>,
    bindings: Bindings,
    depth: usize,
    children: Vec<NodeId>,
    clash: bool,
    optional_trees: Vec<ExpansionTree>,
}

impl ExpansionNode {
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// The number of triple patterns matched to reach this node
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Is this branch proven inconsistent?
    #[inline]
    pub fn is_clash(&self) -> bool {
        self.clash
    }

    /// Are all the variables bound?
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.bindings.all_bound()
    }

    /// The trees of the OPTIONAL blocks evaluated from this node, if it is a complete match
    #[inline]
    pub fn optional_trees(&self) -> &[ExpansionTree] {
        &self.optional_trees
    }
}

/// The expansion of a [`GraphPattern`] against a store.
#[derive(Debug, Clone)]
pub struct ExpansionTree {
    pattern: Arc<GraphPattern>,
    nodes: Vec<ExpansionNode>,
}

impl ExpansionTree {
    /// Expands a pattern from some initial bindings, then attaches the OPTIONAL blocks to the complete matches.
    ///
    /// The OPTIONAL blocks are the ones nested in `pattern` followed by `optionals`.
    pub(crate) fn build<S: TripleStore + ?Sized>(
        store: &S,
        pattern: Arc<GraphPattern>,
        optionals: &[GraphPattern],
        initial: &Bindings,
        context: &mut EvaluationContext,
    ) -> Result<Self, SparqlError> {
        let root = ExpansionNode {
            parent: None,
            bindings: initial.extended(pattern.unbound_variables().iter().cloned()),
            depth: 0,
            children: Vec::new(),
            clash: false,
            optional_trees: Vec::new(),
        };
        let mut tree = Self {
            pattern,
            nodes: vec![root],
        };
        if tree.expand(store, 0, context)?.is_break() {
            debug!(
                answers = context.answers(),
                "stopped the expansion early, enough answers have been found"
            );
        }
        tree.attach_optionals(store, optionals)?;
        Ok(tree)
    }

    #[inline]
    pub fn pattern(&self) -> &GraphPattern {
        &self.pattern
    }

    #[inline]
    pub fn root(&self) -> &ExpansionNode {
        &self.nodes[0]
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&ExpansionNode> {
        self.nodes.get(id)
    }

    /// All the nodes, in depth-first pre-order
    #[inline]
    pub fn nodes(&self) -> &[ExpansionNode] {
        &self.nodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The ancestors of a node, from its parent up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &ExpansionNode> {
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        std::iter::from_fn(move || {
            let node = &self.nodes[current?];
            current = node.parent;
            Some(node)
        })
    }

    /// The complete, consistent matches of this tree pattern, ignoring the OPTIONAL blocks
    pub fn matches(&self) -> impl Iterator<Item = &ExpansionNode> {
        self.nodes.iter().filter(|n| self.is_contributing(n))
    }

    /// The solutions of the tree, in depth-first order.
    ///
    /// Each complete match is joined with the solutions of its OPTIONAL trees in turn:
    /// every row so far is combined with every solution of the next tree.
    /// A tree without solution leaves the rows unchanged, so a match without any OPTIONAL solution is kept as is.
    pub fn solutions(&self) -> Vec<Bindings> {
        let mut solutions = Vec::new();
        self.collect_solutions(&mut solutions);
        solutions
    }

    pub(crate) fn collect_solutions(&self, solutions: &mut Vec<Bindings>) {
        for node in self.matches() {
            let mut rows = vec![node.bindings.clone()];
            for optional in &node.optional_trees {
                let optional_rows = optional.solutions();
                if optional_rows.is_empty() {
                    continue;
                }
                rows = rows
                    .iter()
                    .flat_map(|row| optional_rows.iter().map(move |o| row.merged(o)))
                    .collect();
            }
            solutions.extend(rows);
        }
    }

    fn is_contributing(&self, node: &ExpansionNode) -> bool {
        node.children.is_empty()
            && node.depth == self.pattern.patterns().len()
            && !node.clash
            && node.is_bound()
    }

    fn expand<S: TripleStore + ?Sized>(
        &mut self,
        store: &S,
        id: NodeId,
        context: &mut EvaluationContext,
    ) -> Result<ControlFlow<EnoughAnswers>, SparqlError> {
        let pattern = Arc::clone(&self.pattern);
        let depth = self.nodes[id].depth;
        if context.is_satisfied() {
            self.nodes[id].clash = true;
            return Ok(ControlFlow::Break(EnoughAnswers));
        }
        let Some(triple_pattern) = pattern.patterns().get(depth) else {
            let node = &mut self.nodes[id];
            if !pattern.accepts(&node.bindings) {
                trace!(bindings = %node.bindings, "constraints rejected the match");
                node.clash = true;
                return Ok(ControlFlow::Continue(()));
            }
            context.answers += 1;
            return Ok(if context.is_satisfied() {
                ControlFlow::Break(EnoughAnswers)
            } else {
                ControlFlow::Continue(())
            });
        };

        let parent_bindings = self.nodes[id].bindings.clone();
        let [s, p, o] = triple_pattern
            .slots()
            .map(|slot| slot.resolve(&parent_bindings).cloned());
        let mut flow = ControlFlow::Continue(());
        for triple in store.triples_for_pattern(s.as_ref(), p.as_ref(), o.as_ref()) {
            let triple = triple.map_err(SparqlError::store)?;
            if !triple_pattern.accepts(&triple) {
                continue;
            }
            let Triple {
                subject,
                predicate,
                object,
            } = triple;
            let mut bindings = parent_bindings.clone();
            let mut clash = false;
            for (slot, value) in triple_pattern
                .slots()
                .into_iter()
                .zip([Term::from(subject), Term::from(predicate), object])
            {
                let consistent = match slot {
                    TermPattern::Variable(variable) => bindings.bind(variable, &value),
                    TermPattern::Constant(constant) => *constant == value,
                };
                clash |= !consistent;
            }

            let child = self.nodes.len();
            self.nodes.push(ExpansionNode {
                parent: Some(id),
                bindings,
                depth: depth + 1,
                children: Vec::new(),
                clash,
                optional_trees: Vec::new(),
            });
            self.nodes[id].children.push(child);
            if clash {
                trace!(
                    bindings = %self.nodes[child].bindings,
                    "store returned a triple inconsistent with the bindings"
                );
                continue;
            }
            if self.expand(store, child, context)?.is_break() {
                flow = ControlFlow::Break(EnoughAnswers);
                break;
            }
        }

        let clash = self.nodes[id]
            .children
            .iter()
            .all(|child| self.nodes[*child].clash);
        if clash {
            trace!(depth, bindings = %parent_bindings, "no consistent match for {triple_pattern}");
        }
        self.nodes[id].clash = clash;
        Ok(flow)
    }

    fn attach_optionals<S: TripleStore + ?Sized>(
        &mut self,
        store: &S,
        optionals: &[GraphPattern],
    ) -> Result<(), SparqlError> {
        let pattern = Arc::clone(&self.pattern);
        let optionals = pattern.optionals().iter().chain(optionals).collect::<Vec<_>>();
        if optionals.is_empty() {
            return Ok(());
        }
        for id in 0..self.nodes.len() {
            if !self.is_contributing(&self.nodes[id]) {
                continue;
            }
            for optional in &optionals {
                let leaf_bindings = &self.nodes[id].bindings;
                let tree = Self::build(
                    store,
                    Arc::new(optional.substitute(leaf_bindings)),
                    &[],
                    leaf_bindings,
                    &mut EvaluationContext::default(),
                )?;
                debug!(
                    leaf = %leaf_bindings,
                    matches = tree.matches().count(),
                    "attached OPTIONAL {optional}"
                );
                self.nodes[id].optional_trees.push(tree);
            }
        }
        Ok(())
    }
}

/// Checks that the variables introduced by an OPTIONAL block are not used by a previous OPTIONAL block.
///
/// Variables of the main pattern are shared by all its OPTIONAL blocks.
/// Nested OPTIONAL blocks are checked against the block that owns them.
pub(crate) fn check_optional_scope(
    pattern: &GraphPattern,
    optionals: &[GraphPattern],
) -> Result<(), SparqlError> {
    let mut previous = Vec::<&GraphPattern>::new();
    for optional in pattern.optionals().iter().chain(optionals) {
        for variable in optional.unbound_variables() {
            if !pattern.unbound_variables().contains(variable)
                && previous
                    .iter()
                    .any(|p| p.unbound_variables().contains(variable))
            {
                return Err(SparqlError::OptionalScope(variable.clone()));
            }
        }
        check_optional_scope(optional, &[])?;
        previous.push(optional);
    }
    Ok(())
}
