use oxrdf::vocab::xsd;
use oxrdf::{Graph, Literal, NamedNode, Term, Triple, Variable};
use sparqlp::operators::greater_than;
use sparqlp::{
    GraphPattern, QueryEvaluator, QueryResultsFormat, SelectOptions, Selection, SparqlError,
    TripleStore, query,
};
use std::convert::Infallible;

/// A store returning the triples in insertion order
struct VecStore(Vec<Triple>);

impl TripleStore for VecStore {
    type Error = Infallible;

    fn triples_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
    ) -> Box<dyn Iterator<Item = Result<Triple, Infallible>> + 'a> {
        Box::new(
            self.0
                .iter()
                .filter(move |t| {
                    subject.is_none_or(|s| *s == Term::from(t.subject.clone()))
                        && predicate.is_none_or(|p| *p == Term::from(t.predicate.clone()))
                        && object.is_none_or(|o| *o == t.object)
                })
                .cloned()
                .map(Ok),
        )
    }
}

fn ex(name: &str) -> NamedNode {
    NamedNode::new(format!("http://example.com/{name}")).unwrap()
}

fn var(name: &str) -> Variable {
    Variable::new(name).unwrap()
}

fn knows_store() -> VecStore {
    VecStore(vec![
        Triple::new(ex("a"), ex("knows"), ex("b")),
        Triple::new(ex("b"), ex("knows"), ex("c")),
    ])
}

fn knows_pattern() -> GraphPattern {
    let mut pattern = GraphPattern::new();
    pattern.add_pattern(var("x"), ex("knows"), var("y"));
    pattern
}

fn numbers() -> Graph {
    let mut graph = Graph::new();
    for (name, value) in [("e", 5), ("b", 2), ("d", 4), ("a", 1), ("c", 3)] {
        graph.insert(&Triple::new(ex(name), ex("value"), Literal::from(value)));
    }
    graph
}

fn rows(solutions: &sparqlp::QuerySolutions) -> Vec<Vec<Option<Term>>> {
    solutions.rows().map(<[_]>::to_vec).collect()
}

#[test]
fn test_select_all_rows() -> Result<(), SparqlError> {
    let solutions = query(
        &knows_store(),
        &Selection::from([var("x"), var("y")]),
        [knows_pattern()],
        [],
    )?;
    assert_eq!(solutions.variables(), [var("x"), var("y")]);
    assert_eq!(
        rows(&solutions),
        [
            vec![Some(ex("a").into()), Some(ex("b").into())],
            vec![Some(ex("b").into()), Some(ex("c").into())],
        ]
    );
    Ok(())
}

#[test]
fn test_distinct_limit_keeps_the_first_row() -> Result<(), SparqlError> {
    let store = knows_store();
    let query = QueryEvaluator::new().evaluate(&store, [knows_pattern()], [])?;
    let solutions = query.select(
        &"?x ?y".parse::<Selection>()?,
        &SelectOptions::default().with_distinct().with_limit(1)?,
    )?;
    assert_eq!(
        rows(&solutions),
        [vec![Some(ex("a").into()), Some(ex("b").into())]]
    );
    Ok(())
}

#[test]
fn test_distinct_removes_duplicated_projections() -> Result<(), SparqlError> {
    let mut store = knows_store();
    store.0.push(Triple::new(ex("a"), ex("knows"), ex("c")));
    let query = QueryEvaluator::new().evaluate(&store, [knows_pattern()], [])?;
    let x = Selection::from(var("x"));
    let all = query.select(&x, &SelectOptions::default())?;
    assert_eq!(
        all.single_values(),
        [
            Some(ex("a").into()),
            Some(ex("b").into()),
            Some(ex("a").into())
        ]
    );
    let distinct = query.select(&x, &SelectOptions::default().with_distinct())?;
    assert_eq!(
        distinct.single_values(),
        [Some(ex("a").into()), Some(ex("b").into())]
    );
    Ok(())
}

#[test]
fn test_wildcard_selection_uses_first_appearance_order() -> Result<(), SparqlError> {
    let mut pattern = GraphPattern::new();
    pattern
        .add_pattern(var("y"), ex("knows"), var("z"))
        .add_pattern(var("x"), ex("knows"), var("y"));
    let solutions = query(&knows_store(), &Selection::All, [pattern], [])?;
    assert_eq!(solutions.variables(), [var("y"), var("z"), var("x")]);
    assert_eq!(
        rows(&solutions),
        [vec![
            Some(ex("b").into()),
            Some(ex("c").into()),
            Some(ex("a").into())
        ]]
    );
    Ok(())
}

#[test]
fn test_selection_of_unknown_variable_is_unbound() -> Result<(), SparqlError> {
    let solutions = query(
        &knows_store(),
        &Selection::from_names(["x", "?nope"])?,
        [knows_pattern()],
        [],
    )?;
    assert_eq!(solutions.len(), 2);
    assert!(solutions.rows().all(|row| row[1].is_none()));
    Ok(())
}

#[test]
fn test_order_offset_limit() -> Result<(), SparqlError> {
    let mut pattern = GraphPattern::new();
    pattern.add_pattern(var("s"), ex("value"), var("v"));
    let graph = numbers();
    let query = QueryEvaluator::new().evaluate(&graph, [pattern], [])?;
    let solutions = query.select(
        &Selection::from(var("v")),
        &SelectOptions::default()
            .with_order_by([var("v")])
            .with_offset(1)?
            .with_limit(2)?,
    )?;
    assert_eq!(
        solutions.single_values(),
        [Some(Literal::from(2).into()), Some(Literal::from(3).into())]
    );

    let descending = query.select(
        &Selection::from(var("s")),
        &SelectOptions::default()
            .with_order_by([var("v")])
            .with_order_ascending([false])
            .with_limit(1)?,
    )?;
    assert_eq!(descending.single_values(), [Some(ex("e").into())]);
    Ok(())
}

#[test]
fn test_order_is_numeric() -> Result<(), SparqlError> {
    let mut graph = Graph::new();
    for (name, value) in [("ten", "10"), ("nine", "9"), ("half", "0.5")] {
        graph.insert(&Triple::new(
            ex(name),
            ex("value"),
            Literal::new_typed_literal(
                value,
                if value.contains('.') {
                    xsd::DECIMAL
                } else {
                    xsd::INTEGER
                },
            ),
        ));
    }
    let mut pattern = GraphPattern::new();
    pattern.add_pattern(var("s"), ex("value"), var("v"));
    let solutions = QueryEvaluator::new()
        .evaluate(&graph, [pattern], [])?
        .select(
            &Selection::from(var("s")),
            &SelectOptions::default().with_order_by([var("v")]),
        )?;
    assert_eq!(
        solutions.single_values(),
        [
            Some(ex("half").into()),
            Some(ex("nine").into()),
            Some(ex("ten").into())
        ]
    );
    Ok(())
}

#[test]
fn test_order_with_unbound_keys() -> Result<(), SparqlError> {
    let mut graph = Graph::new();
    for i in 0..200_i32 {
        let subject = ex(&format!("s{i}"));
        graph.insert(&Triple::new(subject.clone(), ex("value"), Literal::from(i)));
        if i % 3 != 0 {
            graph.insert(&Triple::new(subject, ex("key"), Literal::from(i % 7)));
        }
    }
    let mut values = GraphPattern::new();
    values.add_pattern(var("s"), ex("value"), var("v"));
    let mut keys = GraphPattern::new();
    keys.add_pattern(var("s"), ex("key"), var("k"));
    let query = QueryEvaluator::new().evaluate(&graph, [values], [keys])?;
    let selection = Selection::from([var("k"), var("v")]);

    let ascending = rows(&query.select(
        &selection,
        &SelectOptions::default().with_order_by([var("k"), var("v")]),
    )?);
    assert_eq!(ascending.len(), 200);
    let (unbound, bound) = ascending.split_at(67);
    assert!(unbound.iter().all(|row| row[0].is_none()));
    assert!(bound.iter().all(|row| row[0].is_some()));
    assert_eq!(unbound[0][1], Some(Literal::from(0).into()));
    assert_eq!(unbound[66][1], Some(Literal::from(198).into()));
    assert_eq!(bound[0][0], Some(Literal::from(0).into()));
    for pair in bound.windows(2) {
        let (Some(a), Some(b)) = (&pair[0][0], &pair[1][0]) else {
            unreachable!()
        };
        assert_ne!(sparqlp::cmp_terms(a, b), std::cmp::Ordering::Greater);
    }

    let descending = rows(&query.select(
        &selection,
        &SelectOptions::default()
            .with_order_by([var("k"), var("v")])
            .with_order_ascending([false, true]),
    )?);
    assert_eq!(descending.len(), 200);
    let (bound, unbound) = descending.split_at(133);
    assert!(bound.iter().all(|row| row[0].is_some()));
    assert!(unbound.iter().all(|row| row[0].is_none()));
    assert_eq!(bound[0][0], Some(Literal::from(6).into()));
    Ok(())
}

#[test]
fn test_custom_comparator() -> Result<(), SparqlError> {
    let mut pattern = GraphPattern::new();
    pattern.add_pattern(var("s"), ex("value"), var("v"));
    let v = var("v");
    let solutions = QueryEvaluator::new()
        .evaluate(&numbers(), [pattern], [])?
        .select(
            &Selection::from(var("v")),
            &SelectOptions::default().with_comparator(move |a, b| {
                sparqlp::cmp_terms(b.get(&v).unwrap(), a.get(&v).unwrap())
            }),
        )?;
    assert_eq!(solutions.single_values()[0], Some(Literal::from(5).into()));
    Ok(())
}

#[test]
fn test_order_direction_mismatch() -> Result<(), SparqlError> {
    let store = knows_store();
    let query = QueryEvaluator::new().evaluate(&store, [knows_pattern()], [])?;
    let result = query.select(
        &Selection::All,
        &SelectOptions::default()
            .with_order_by([var("x")])
            .with_order_ascending([true, false]),
    );
    assert!(matches!(
        result,
        Err(SparqlError::OrderDirectionMismatch {
            keys: 1,
            directions: 2
        })
    ));
    Ok(())
}

#[test]
fn test_constraints_filter_solutions() -> Result<(), SparqlError> {
    let mut pattern = GraphPattern::new();
    pattern
        .add_pattern(var("s"), ex("value"), var("v"))
        .add_constraint(greater_than(var("v"), Literal::from(3)));
    let solutions = query(&numbers(), &Selection::from(var("s")), [pattern], [])?;
    assert_eq!(solutions.len(), 2);
    Ok(())
}

#[test]
fn test_initial_bindings() -> Result<(), SparqlError> {
    let store = knows_store();
    let query = QueryEvaluator::new()
        .with_initial_binding(var("x"), ex("b"))
        .evaluate(&store, [knows_pattern()], [])?;
    let solutions = query.select(&Selection::All, &SelectOptions::default())?;
    assert_eq!(solutions.variables(), [var("x"), var("y")]);
    assert_eq!(
        rows(&solutions),
        [vec![Some(ex("b").into()), Some(ex("c").into())]]
    );
    Ok(())
}

#[test]
fn test_eager_limit() -> Result<(), SparqlError> {
    let mut pattern = GraphPattern::new();
    pattern.add_pattern(var("s"), ex("value"), var("v"));
    let graph = numbers();
    let query = QueryEvaluator::new()
        .with_eager_limit(2)
        .evaluate(&graph, [pattern], [])?;
    assert_eq!(query.bindings().len(), 2);
    assert!(query.ask());
    Ok(())
}

#[test]
fn test_ask() -> Result<(), SparqlError> {
    let store = knows_store();
    assert!(QueryEvaluator::new().evaluate(&store, [knows_pattern()], [])?.ask());
    let mut nothing = GraphPattern::new();
    nothing.add_pattern(var("x"), ex("hates"), var("y"));
    assert!(!QueryEvaluator::new().evaluate(&store, [nothing], [])?.ask());
    Ok(())
}

#[test]
fn test_empty_pattern_list() {
    assert!(matches!(
        QueryEvaluator::new().evaluate(&knows_store(), [], []),
        Err(SparqlError::EmptyPatternList)
    ));
}

#[test]
fn test_serialization() -> Result<(), Box<dyn std::error::Error>> {
    let solutions = query(
        &knows_store(),
        &Selection::from([var("x"), var("y")]),
        [knows_pattern()],
        [],
    )?;
    let csv = solutions.write(Vec::new(), QueryResultsFormat::Csv)?;
    assert_eq!(
        String::from_utf8(csv)?,
        "x,y\r\nhttp://example.com/a,http://example.com/b\r\nhttp://example.com/b,http://example.com/c\r\n"
    );
    let tsv = solutions.write(Vec::new(), QueryResultsFormat::Tsv)?;
    assert!(String::from_utf8(tsv)?.starts_with("?x\t?y\n<http://example.com/a>\t"));
    Ok(())
}
