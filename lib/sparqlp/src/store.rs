use oxrdf::{Dataset, Graph, QuadRef, Term, TermRef, Triple, TripleRef};
use rustc_hash::FxHashSet;
use std::convert::Infallible;
use std::error::Error;
use std::iter::empty;

/// A source of triples that graph patterns are matched against.
///
/// The evaluator only needs wildcard matching: each slot is either a fixed term or `None` for
/// "any value". It does not pick indexes itself, implementations are free to do so.
///
/// ```
/// use oxrdf::{Graph, NamedNode, Triple};
/// use sparqlp::TripleStore;
///
/// let ex = NamedNode::new("http://example.com")?;
/// let mut graph = Graph::new();
/// graph.insert(&Triple::new(ex.clone(), ex.clone(), ex.clone()));
/// let results = graph
///     .triples_for_pattern(Some(&ex.clone().into()), None, None)
///     .collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(results.len(), 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait TripleStore {
    /// Error returned by the store.
    type Error: Error + Send + Sync + 'static;

    /// Fetches the triples matching a pattern
    ///
    /// A constant that can't appear at its position (a literal subject, a predicate that is not an IRI...)
    /// matches nothing.
    fn triples_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Result<Triple, Self::Error>> + 'a>;
}

impl<S: TripleStore + ?Sized> TripleStore for &S {
    type Error = S::Error;

    #[inline]
    fn triples_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Result<Triple, Self::Error>> + 'a> {
        (**self).triples_for_pattern(subject, predicate, object)
    }
}

impl TripleStore for Graph {
    type Error = Infallible;

    fn triples_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Result<Triple, Infallible>> + 'a> {
        if let Some(subject) = subject {
            match subject {
                Term::NamedNode(s) => {
                    filtered(self.triples_for_subject(s.as_ref()), predicate, object)
                }
                Term::BlankNode(s) => {
                    filtered(self.triples_for_subject(s.as_ref()), predicate, object)
                }
                _ => Box::new(empty()),
            }
        } else if let Some(object) = object {
            filtered(self.triples_for_object(object.as_ref()), predicate, None)
        } else if let Some(predicate) = predicate {
            if let Term::NamedNode(p) = predicate {
                filtered(self.triples_for_predicate(p.as_ref()), None, None)
            } else {
                Box::new(empty())
            }
        } else {
            filtered(self.iter(), None, None)
        }
    }
}

/// The triples of all the dataset graphs, each distinct triple being returned once.
impl TripleStore for Dataset {
    type Error = Infallible;

    fn triples_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Result<Triple, Infallible>> + 'a> {
        let quads: Box<dyn Iterator<Item = QuadRef<'a>> + 'a> = match (subject, object, predicate) {
            (Some(Term::NamedNode(s)), _, _) => Box::new(self.quads_for_subject(s.as_ref())),
            (Some(Term::BlankNode(s)), _, _) => Box::new(self.quads_for_subject(s.as_ref())),
            (Some(_), _, _) => return Box::new(empty()),
            (None, Some(o), _) => Box::new(self.quads_for_object(o.as_ref())),
            (None, None, Some(Term::NamedNode(p))) => {
                Box::new(self.quads_for_predicate(p.as_ref()))
            }
            (None, None, Some(_)) => return Box::new(empty()),
            (None, None, None) => Box::new(self.iter()),
        };
        let mut seen = FxHashSet::default();
        Box::new(
            quads
                .filter(move |q| {
                    predicate.is_none_or(|p| TermRef::from(q.predicate) == p.as_ref())
                        && object.is_none_or(|o| q.object == o.as_ref())
                })
                .map(|q| {
                    Triple::new(
                        q.subject.into_owned(),
                        q.predicate.into_owned(),
                        q.object.into_owned(),
                    )
                })
                .filter(move |t| seen.insert(t.clone()))
                .map(Ok),
        )
    }
}

fn filtered<'a>(
    triples: impl Iterator<Item = TripleRef<'a>> + 'a,
    predicate: Option<&'a Term>,
    object: Option<&'a Term>,
) -> Box<dyn Iterator<Item = Result<Triple, Infallible>> + 'a> {
    Box::new(
        triples
            .filter(move |t| {
                predicate.is_none_or(|p| TermRef::from(t.predicate) == p.as_ref())
                    && object.is_none_or(|o| t.object == o.as_ref())
            })
            .map(|t| Ok(t.into_owned())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{BlankNode, GraphName, Literal, NamedNode, Quad};

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.insert(&Triple::new(ex("a"), ex("knows"), ex("b")));
        graph.insert(&Triple::new(ex("b"), ex("knows"), ex("c")));
        graph.insert(&Triple::new(ex("b"), ex("name"), Literal::from("Bob")));
        graph.insert(&Triple::new(BlankNode::new_unchecked("x"), ex("knows"), ex("a")));
        graph
    }

    fn count(store: &impl TripleStore, s: Option<Term>, p: Option<Term>, o: Option<Term>) -> usize {
        store
            .triples_for_pattern(s.as_ref(), p.as_ref(), o.as_ref())
            .filter(Result::is_ok)
            .count()
    }

    #[test]
    fn graph_wildcards() {
        let graph = graph();
        assert_eq!(count(&graph, None, None, None), 4);
        assert_eq!(count(&graph, Some(ex("b").into()), None, None), 2);
        assert_eq!(count(&graph, None, Some(ex("knows").into()), None), 3);
        assert_eq!(count(&graph, None, None, Some(ex("a").into())), 1);
        assert_eq!(
            count(&graph, Some(ex("b").into()), Some(ex("knows").into()), None),
            1
        );
        assert_eq!(
            count(
                &graph,
                Some(BlankNode::new_unchecked("x").into()),
                None,
                Some(ex("a").into())
            ),
            1
        );
    }

    #[test]
    fn graph_wrong_kind_constants_match_nothing() {
        let graph = graph();
        assert_eq!(count(&graph, Some(Literal::from("Bob").into()), None, None), 0);
        assert_eq!(
            count(&graph, None, Some(Literal::from("knows").into()), None),
            0
        );
    }

    #[test]
    fn dataset_reports_each_triple_once() {
        let mut dataset = Dataset::new();
        let g = ex("g");
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph));
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), g.clone()));
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("c"), g));
        assert_eq!(count(&dataset, None, None, None), 2);
        assert_eq!(count(&dataset, None, None, Some(ex("c").into())), 1);
    }

    #[test]
    fn dataset_lookups() {
        let mut dataset = Dataset::new();
        let g = ex("g");
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph));
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), g.clone()));
        dataset.insert(&Quad::new(ex("a"), ex("q"), ex("c"), g.clone()));
        dataset.insert(&Quad::new(ex("b"), ex("p"), Literal::from("b"), g));
        assert_eq!(count(&dataset, Some(ex("a").into()), None, None), 2);
        assert_eq!(
            count(&dataset, Some(ex("a").into()), Some(ex("p").into()), None),
            1
        );
        assert_eq!(
            count(&dataset, Some(ex("a").into()), None, Some(ex("c").into())),
            1
        );
        assert_eq!(count(&dataset, None, Some(ex("p").into()), None), 2);
        assert_eq!(
            count(&dataset, None, Some(ex("p").into()), Some(ex("b").into())),
            1
        );
        assert_eq!(count(&dataset, Some(Literal::from("b").into()), None, None), 0);
        assert_eq!(
            count(&dataset, None, Some(Literal::from("p").into()), None),
            0
        );
    }
}
