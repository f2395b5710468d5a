#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod bindings;
mod error;
mod expansion;
pub mod operators;
mod order;
mod pattern;
mod query;
mod store;

pub use crate::bindings::Bindings;
pub use crate::error::SparqlError;
pub use crate::expansion::{EnoughAnswers, ExpansionNode, ExpansionTree, NodeId};
pub use crate::order::{BindingsComparator, cmp_terms, equal_terms, partial_cmp_terms};
pub use crate::pattern::{Constraint, GraphPattern, TermPattern, TripleFilter, TriplePattern};
pub use crate::query::{
    Query, QueryEvaluator, QuerySolutions, SelectOptions, Selection, query, write_boolean,
};
pub use crate::store::TripleStore;
pub use sparesults::{QueryResultsFormat, QuerySolution};
