use crate::bindings::Bindings;
use crate::error::SparqlError;
use crate::expansion::{EvaluationContext, ExpansionTree, check_optional_scope};
use crate::order::{BindingsComparator, cmp_bindings};
use crate::pattern::GraphPattern;
use crate::store::TripleStore;
use oxrdf::{Graph, Term, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use sparesults::{QueryResultsFormat, QueryResultsSerializer, QuerySolution};
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Write};
use std::ops::Add;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Evaluates graph patterns against a [`TripleStore`].
///
/// ```
/// use oxrdf::{Graph, Literal, NamedNode, Triple, Variable};
/// use sparqlp::{GraphPattern, QueryEvaluator, SelectOptions, Selection};
///
/// let name = NamedNode::new("http://xmlns.com/foaf/0.1/name")?;
/// let mut graph = Graph::new();
/// graph.insert(&Triple::new(NamedNode::new("http://example.com/a")?, name.clone(), Literal::from("Alice")));
///
/// let x = Variable::new("x")?;
/// let mut pattern = GraphPattern::new();
/// pattern.add_pattern(NamedNode::new("http://example.com/a")?, name, x.clone());
/// let query = QueryEvaluator::new().evaluate(&graph, [pattern], [])?;
/// let solutions = query.select(&Selection::from(x), &SelectOptions::default())?;
/// assert_eq!(solutions.single_values(), [Some(Literal::from("Alice").into())]);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct QueryEvaluator {
    initial_bindings: Vec<(Variable, Term)>,
    eager_limit: Option<usize>,
}

impl QueryEvaluator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a variable before the evaluation, in the main patterns and in the OPTIONAL blocks
    #[inline]
    pub fn with_initial_binding(mut self, variable: Variable, value: impl Into<Term>) -> Self {
        self.initial_bindings.push((variable, value.into()));
        self
    }

    /// Stops the expansion of each main pattern as soon as `limit` complete matches have been found.
    ///
    /// It does not change which matches are found, only how many.
    /// Only use it if the solutions are not sorted or deduplicated afterwards.
    #[inline]
    pub fn with_eager_limit(mut self, limit: usize) -> Self {
        self.eager_limit = Some(limit);
        self
    }

    /// Expands the given patterns against the store.
    ///
    /// Several main patterns are combined with UNION, in the given order.
    /// The `optionals` OPTIONAL blocks are applied to every main pattern.
    pub fn evaluate<'a, S: TripleStore + ?Sized>(
        &self,
        store: &'a S,
        patterns: impl IntoIterator<Item = GraphPattern>,
        optionals: impl IntoIterator<Item = GraphPattern>,
    ) -> Result<Query<'a, S>, SparqlError> {
        let patterns = patterns.into_iter().collect::<Vec<_>>();
        let optionals = optionals.into_iter().collect::<Arc<[_]>>();
        for pattern in &patterns {
            check_optional_scope(pattern, &optionals)?;
        }
        let initial = self
            .initial_bindings
            .iter()
            .fold(Bindings::new([]), |bindings, (variable, value)| {
                bindings.with(variable, value.clone())
            });

        let mut query: Option<Query<'a, S>> = None;
        for pattern in patterns {
            let mut context = EvaluationContext::new(self.eager_limit);
            let tree = ExpansionTree::build(
                store,
                Arc::new(pattern),
                &optionals,
                &initial,
                &mut context,
            )?;
            debug!(
                nodes = tree.len(),
                matches = context.answers(),
                "expanded {}",
                tree.pattern()
            );
            let branch = Query {
                inner: QueryInner::Pattern {
                    store,
                    tree,
                    optionals: Arc::clone(&optionals),
                },
            };
            query = Some(match query {
                Some(query) => query.union(branch),
                None => branch,
            });
        }
        query.ok_or(SparqlError::EmptyPatternList)
    }
}

/// Shorthand for [`QueryEvaluator::evaluate`] followed by [`Query::select`] with the default options.
pub fn query<S: TripleStore + ?Sized>(
    store: &S,
    selection: &Selection,
    patterns: impl IntoIterator<Item = GraphPattern>,
    optionals: impl IntoIterator<Item = GraphPattern>,
) -> Result<QuerySolutions, SparqlError> {
    QueryEvaluator::new()
        .evaluate(store, patterns, optionals)?
        .select(selection, &SelectOptions::default())
}

/// An evaluated query: the expansion trees of its patterns, or the UNION of two queries.
///
/// The solutions are only shaped (projected, sorted...) when calling [`select`](Self::select),
/// [`ask`](Self::ask), [`construct`](Self::construct) or [`describe`](Self::describe).
pub struct Query<'a, S: ?Sized> {
    inner: QueryInner<'a, S>,
}

enum QueryInner<'a, S: ?Sized> {
    Pattern {
        store: &'a S,
        tree: ExpansionTree,
        optionals: Arc<[GraphPattern]>,
    },
    Union(Box<Query<'a, S>>, Box<Query<'a, S>>),
}

impl<'a, S: TripleStore + ?Sized> Query<'a, S> {
    /// UNION of two queries. Solutions are concatenated, not deduplicated.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            inner: QueryInner::Union(Box::new(self), Box::new(other)),
        }
    }

    /// The expansion tree, if this query is not a UNION
    pub fn tree(&self) -> Option<&ExpansionTree> {
        match &self.inner {
            QueryInner::Pattern { tree, .. } => Some(tree),
            QueryInner::Union(..) => None,
        }
    }

    /// All the solutions, UNION branches concatenated in order
    pub fn bindings(&self) -> Vec<Bindings> {
        let mut bindings = Vec::new();
        self.collect_bindings(&mut bindings);
        bindings
    }

    fn collect_bindings(&self, bindings: &mut Vec<Bindings>) {
        match &self.inner {
            QueryInner::Pattern { tree, .. } => tree.collect_solutions(bindings),
            QueryInner::Union(left, right) => {
                left.collect_bindings(bindings);
                right.collect_bindings(bindings);
            }
        }
    }

    /// SPARQL SELECT: sorts, projects, deduplicates then slices the solutions.
    pub fn select(
        &self,
        selection: &Selection,
        options: &SelectOptions,
    ) -> Result<QuerySolutions, SparqlError> {
        let ascending = options.order_ascending.as_deref();
        if let Some(ascending) = ascending {
            if ascending.len() != options.order_by.len() {
                return Err(SparqlError::OrderDirectionMismatch {
                    keys: options.order_by.len(),
                    directions: ascending.len(),
                });
            }
        }

        let mut rows = self.bindings();
        if let Some(comparator) = &options.comparator {
            rows.sort_by(|a, b| comparator(a, b));
        } else if !options.order_by.is_empty() {
            rows.sort_by(|a, b| cmp_bindings(a, b, &options.order_by, ascending));
        }

        let variables: Arc<[Variable]> = match selection {
            Selection::All => {
                let mut variables = Vec::new();
                for row in &rows {
                    for variable in row.variables() {
                        if !variables.contains(variable) {
                            variables.push(variable.clone());
                        }
                    }
                }
                variables.into()
            }
            Selection::Variables(variables) => variables.as_slice().into(),
        };
        let mut seen = FxHashSet::default();
        let solutions = rows
            .iter()
            .map(|row| {
                variables
                    .iter()
                    .map(|v| row.get(v).cloned())
                    .collect::<Vec<_>>()
            })
            .filter(|values| !options.distinct || seen.insert(values.clone()))
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|values| QuerySolution::from((Arc::clone(&variables), values)))
            .collect::<Vec<_>>();
        debug!(
            rows = rows.len(),
            solutions = solutions.len(),
            "selected {selection}"
        );
        Ok(QuerySolutions {
            variables,
            solutions,
        })
    }

    /// SPARQL ASK: is there at least one solution?
    pub fn ask(&self) -> bool {
        match &self.inner {
            QueryInner::Pattern { tree, .. } => tree.matches().next().is_some(),
            QueryInner::Union(left, right) => left.ask() || right.ask(),
        }
    }

    /// SPARQL CONSTRUCT: instantiates a template for every solution.
    ///
    /// Without template, the main patterns are instantiated, together with the OPTIONAL blocks fully bound in the solution.
    /// Blank nodes of the template are replaced by fresh blank nodes for each solution.
    /// A template variable unbound in a solution is an error.
    pub fn construct(&self, template: Option<&GraphPattern>) -> Result<Graph, SparqlError> {
        let mut graph = Graph::new();
        self.construct_into(template, &mut graph)?;
        Ok(graph)
    }

    fn construct_into(
        &self,
        template: Option<&GraphPattern>,
        graph: &mut Graph,
    ) -> Result<(), SparqlError> {
        let (tree, optionals) = match &self.inner {
            QueryInner::Pattern {
                tree, optionals, ..
            } => (tree, optionals),
            QueryInner::Union(left, right) => {
                left.construct_into(template, graph)?;
                return right.construct_into(template, graph);
            }
        };
        for row in tree.solutions() {
            let mut blank_nodes = FxHashMap::default();
            let patterns = if let Some(template) = template {
                template.patterns().iter().collect::<Vec<_>>()
            } else {
                let mut patterns = tree.pattern().patterns().iter().collect::<Vec<_>>();
                for optional in tree.pattern().optionals().iter().chain(optionals.iter()) {
                    if optional
                        .unbound_variables()
                        .iter()
                        .all(|v| row.is_bound(v))
                    {
                        patterns.extend(optional.patterns());
                    }
                }
                patterns
            };
            for pattern in patterns {
                let blank_nodes = template.is_some().then_some(&mut blank_nodes);
                if let Some(triple) = pattern.instantiate(&row, blank_nodes)? {
                    graph.insert(&triple);
                } else {
                    debug!(
                        bindings = %row,
                        "{pattern} does not instantiate to a valid RDF triple, skipping it"
                    );
                }
            }
        }
        Ok(())
    }

    /// Transitive closure of the store around the selected values.
    ///
    /// `forward` follows the arcs from the values to their predicates and objects,
    /// `backward` follows them back to the subjects and predicates.
    pub fn describe(
        &self,
        selection: &Selection,
        forward: bool,
        backward: bool,
    ) -> Result<Graph, SparqlError> {
        let mut graph = Graph::new();
        if forward {
            self.cluster_into(selection, Direction::Forward, &mut graph)?;
        }
        if backward {
            self.cluster_into(selection, Direction::Backward, &mut graph)?;
        }
        Ok(graph)
    }

    /// Forward transitive closure of the store from the selected values
    pub fn cluster_forward(&self, selection: &Selection) -> Result<Graph, SparqlError> {
        self.describe(selection, true, false)
    }

    /// Backward transitive closure of the store from the selected values
    pub fn cluster_backward(&self, selection: &Selection) -> Result<Graph, SparqlError> {
        self.describe(selection, false, true)
    }

    fn cluster_into(
        &self,
        selection: &Selection,
        direction: Direction,
        graph: &mut Graph,
    ) -> Result<(), SparqlError> {
        let store = match &self.inner {
            QueryInner::Pattern { store, .. } => *store,
            QueryInner::Union(left, right) => {
                left.cluster_into(selection, direction, graph)?;
                return right.cluster_into(selection, direction, graph);
            }
        };
        let mut todo = self
            .select(selection, &SelectOptions::default())?
            .into_iter()
            .flat_map(|solution| solution.values().to_vec())
            .flatten()
            .collect::<Vec<_>>();
        let mut visited = FxHashSet::default();
        while let Some(term) = todo.pop() {
            if !visited.insert(term.clone()) {
                continue;
            }
            let triples = match direction {
                Direction::Forward => store.triples_for_pattern(Some(&term), None, None),
                Direction::Backward => store.triples_for_pattern(None, None, Some(&term)),
            };
            for triple in triples {
                let triple = triple.map_err(SparqlError::store)?;
                graph.insert(&triple);
                match direction {
                    Direction::Forward => {
                        todo.push(triple.predicate.into());
                        todo.push(triple.object);
                    }
                    Direction::Backward => {
                        todo.push(triple.subject.into());
                        todo.push(triple.predicate.into());
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S: TripleStore + ?Sized> Add for Query<'_, S> {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        self.union(other)
    }
}

impl<S: ?Sized> fmt::Debug for Query<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            QueryInner::Pattern {
                tree, optionals, ..
            } => f
                .debug_struct("Query")
                .field("tree", tree)
                .field("optionals", optionals)
                .finish_non_exhaustive(),
            QueryInner::Union(left, right) => {
                f.debug_tuple("Union").field(left).field(right).finish()
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// The variables projected by [`Query::select`].
///
/// ```
/// use oxrdf::Variable;
/// use sparqlp::Selection;
///
/// assert_eq!("*".parse::<Selection>()?, Selection::All);
/// assert_eq!(
///     "?x y".parse::<Selection>()?,
///     Selection::Variables(vec![Variable::new("x")?, Variable::new("y")?])
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub enum Selection {
    /// `*`: all the variables, in order of first appearance
    #[default]
    All,
    Variables(Vec<Variable>),
}

impl Selection {
    /// Builds a selection from variable names, with or without a `?` or `$` prefix
    pub fn from_names(names: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self, SparqlError> {
        names
            .into_iter()
            .map(|name| parse_selected_variable(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Variables)
    }
}

impl FromStr for Selection {
    type Err = SparqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "*" {
            return Ok(Self::All);
        }
        let selection = Self::from_names(s.split_whitespace())?;
        if matches!(&selection, Self::Variables(v) if v.is_empty()) {
            return Err(SparqlError::InvalidSelection(s.into()));
        }
        Ok(selection)
    }
}

impl From<Variable> for Selection {
    #[inline]
    fn from(variable: Variable) -> Self {
        Self::Variables(vec![variable])
    }
}

impl From<Vec<Variable>> for Selection {
    #[inline]
    fn from(variables: Vec<Variable>) -> Self {
        Self::Variables(variables)
    }
}

impl<const N: usize> From<[Variable; N]> for Selection {
    #[inline]
    fn from(variables: [Variable; N]) -> Self {
        Self::Variables(variables.into())
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Variables(variables) => {
                for (i, variable) in variables.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{variable}")?;
                }
                Ok(())
            }
        }
    }
}

fn parse_selected_variable(name: &str) -> Result<Variable, SparqlError> {
    let stripped = name
        .strip_prefix('?')
        .or_else(|| name.strip_prefix('$'))
        .unwrap_or(name);
    Variable::new(stripped).map_err(|_| SparqlError::InvalidSelection(name.into()))
}

/// Solution modifiers of [`Query::select`].
///
/// ```
/// use oxrdf::Variable;
/// use sparqlp::SelectOptions;
///
/// let _options = SelectOptions::default()
///     .with_distinct()
///     .with_order_by([Variable::new("x")?])
///     .with_offset(1)?
///     .with_limit(2)?;
/// assert!(SelectOptions::default().with_limit(-1).is_err());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
#[must_use]
pub struct SelectOptions {
    distinct: bool,
    limit: Option<usize>,
    offset: usize,
    order_by: Vec<Variable>,
    order_ascending: Option<Vec<bool>>,
    comparator: Option<BindingsComparator>,
}

impl SelectOptions {
    /// Removes duplicated solutions, keeping the first one
    #[inline]
    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Keeps at most `limit` solutions. Negative or too large values are rejected.
    pub fn with_limit<T: TryInto<usize> + fmt::Display>(mut self, limit: T) -> Result<Self, SparqlError> {
        self.limit = Some(to_usize("limit", limit)?);
        Ok(self)
    }

    /// Skips the first `offset` solutions. Negative or too large values are rejected.
    pub fn with_offset<T: TryInto<usize> + fmt::Display>(
        mut self,
        offset: T,
    ) -> Result<Self, SparqlError> {
        self.offset = to_usize("offset", offset)?;
        Ok(self)
    }

    /// Sorts the solutions along these variables, the first one being the most significant
    pub fn with_order_by(mut self, keys: impl IntoIterator<Item = Variable>) -> Self {
        self.order_by = keys.into_iter().collect();
        self
    }

    /// Sets the sort direction of each [`with_order_by`](Self::with_order_by) key (`true` for ascending)
    pub fn with_order_ascending(mut self, ascending: impl IntoIterator<Item = bool>) -> Self {
        self.order_ascending = Some(ascending.into_iter().collect());
        self
    }

    /// Sorts the solutions with a custom comparator instead of the [`with_order_by`](Self::with_order_by) keys
    pub fn with_comparator(
        mut self,
        comparator: impl Fn(&Bindings, &Bindings) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.comparator = Some(Arc::new(comparator));
        self
    }
}

impl fmt::Debug for SelectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectOptions")
            .field("distinct", &self.distinct)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("order_by", &self.order_by)
            .field("order_ascending", &self.order_ascending)
            .field("comparator", &self.comparator.is_some())
            .finish()
    }
}

fn to_usize<T: TryInto<usize> + fmt::Display>(
    name: &'static str,
    value: T,
) -> Result<usize, SparqlError> {
    let text = value.to_string();
    value
        .try_into()
        .map_err(|_| SparqlError::InvalidArgument { name, value: text })
}

/// The result of [`Query::select`]: a table of solutions.
#[derive(Debug, Eq, PartialEq)]
pub struct QuerySolutions {
    variables: Arc<[Variable]>,
    solutions: Vec<QuerySolution>,
}

impl QuerySolutions {
    /// The projected variables, in column order
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, QuerySolution> {
        self.solutions.iter()
    }

    /// The rows as value tuples, in column order
    pub fn rows(&self) -> impl Iterator<Item = &[Option<Term>]> {
        self.solutions.iter().map(QuerySolution::values)
    }

    /// The values of the first column, handy when a single variable is selected
    pub fn single_values(&self) -> Vec<Option<Term>> {
        self.solutions
            .iter()
            .map(|s| s.values().first().cloned().flatten())
            .collect()
    }

    /// Serializes the solutions in one of the SPARQL results formats.
    ///
    /// ```
    /// use oxrdf::Variable;
    /// use sparesults::QueryResultsFormat;
    /// use sparqlp::{GraphPattern, QueryEvaluator, SelectOptions, Selection};
    ///
    /// let graph = oxrdf::Graph::new();
    /// let mut pattern = GraphPattern::new();
    /// pattern.add_pattern(Variable::new("s")?, Variable::new("p")?, Variable::new("o")?);
    /// let solutions = QueryEvaluator::new()
    ///     .evaluate(&graph, [pattern], [])?
    ///     .select(&"?s".parse::<Selection>()?, &SelectOptions::default())?;
    /// assert_eq!(solutions.write(Vec::new(), QueryResultsFormat::Csv)?, b"s\r\n");
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn write<W: Write>(&self, writer: W, format: QueryResultsFormat) -> io::Result<W> {
        let mut serializer = QueryResultsSerializer::from_format(format)
            .serialize_solutions_to_writer(writer, self.variables.to_vec())?;
        for solution in &self.solutions {
            serializer.serialize(solution)?;
        }
        serializer.finish()
    }
}

impl IntoIterator for QuerySolutions {
    type Item = QuerySolution;
    type IntoIter = std::vec::IntoIter<QuerySolution>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.solutions.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySolutions {
    type Item = &'a QuerySolution;
    type IntoIter = std::slice::Iter<'a, QuerySolution>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.solutions.iter()
    }
}

/// Serializes an ASK result in one of the SPARQL results formats
pub fn write_boolean<W: Write>(writer: W, value: bool, format: QueryResultsFormat) -> io::Result<W> {
    QueryResultsSerializer::from_format(format).serialize_boolean_to_writer(writer, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parsing() -> Result<(), SparqlError> {
        assert_eq!(" * ".parse::<Selection>()?, Selection::All);
        assert_eq!(
            Selection::from_names(["$a", "b"])?,
            Selection::Variables(vec![Variable::new_unchecked("a"), Variable::new_unchecked("b")])
        );
        assert!(matches!(
            "?x ?".parse::<Selection>(),
            Err(SparqlError::InvalidSelection(name)) if name == "?"
        ));
        assert!(matches!(
            "".parse::<Selection>(),
            Err(SparqlError::InvalidSelection(_))
        ));
        assert_eq!(
            Selection::from([Variable::new_unchecked("a")]).to_string(),
            "?a"
        );
        Ok(())
    }

    #[test]
    fn limit_and_offset_validation() {
        assert!(matches!(
            SelectOptions::default().with_limit(-3_i64),
            Err(SparqlError::InvalidArgument { name: "limit", value }) if value == "-3"
        ));
        assert!(matches!(
            SelectOptions::default().with_offset(-1),
            Err(SparqlError::InvalidArgument { name: "offset", .. })
        ));
        assert!(SelectOptions::default().with_limit(3_u8).is_ok());
        assert!(SelectOptions::default().with_offset(0_i32).is_ok());
    }

    #[test]
    fn boolean_serialization() -> io::Result<()> {
        let json = write_boolean(Vec::new(), true, QueryResultsFormat::Json)?;
        assert_eq!(json, br#"{"head":{},"boolean":true}"#);
        Ok(())
    }
}
