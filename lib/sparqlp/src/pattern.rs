use crate::bindings::Bindings;
use crate::error::SparqlError;
use oxrdf::{BlankNode, Literal, NamedNode, NamedNodeRef, Term, Triple, Variable};
use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A filter applied to each triple returned by the store for one triple pattern.
///
/// Triples for which it returns `false` are skipped before any binding happens.
pub type TripleFilter = Arc<dyn Fn(&Triple) -> bool + Send + Sync>;

/// A global constraint checked on the bindings of each complete match.
///
/// `Some(false)` rejects the match. `None` means that the constraint could not be evaluated
/// (an operand of the wrong kind for instance) and rejects the match too.
pub type Constraint = Arc<dyn Fn(&Bindings) -> Option<bool> + Send + Sync>;

/// A slot of a triple pattern: either a constant term or a variable.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum TermPattern {
    Constant(Term),
    Variable(Variable),
}

impl TermPattern {
    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    #[inline]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Variable(v) => Some(v),
            Self::Constant(_) => None,
        }
    }

    /// The term this slot stands for given some bindings: the constant itself or the variable value if it is bound
    #[inline]
    pub fn resolve<'a>(&'a self, bindings: &'a Bindings) -> Option<&'a Term> {
        match self {
            Self::Constant(t) => Some(t),
            Self::Variable(v) => bindings.get(v),
        }
    }

    /// Replaces the variable by its value if it is bound
    #[must_use]
    pub fn substitute(&self, bindings: &Bindings) -> Self {
        match self {
            Self::Variable(v) => bindings
                .get(v)
                .map_or_else(|| self.clone(), |t| Self::Constant(t.clone())),
            Self::Constant(_) => self.clone(),
        }
    }
}

impl From<Term> for TermPattern {
    #[inline]
    fn from(term: Term) -> Self {
        Self::Constant(term)
    }
}

impl From<NamedNode> for TermPattern {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::Constant(node.into())
    }
}

impl From<NamedNodeRef<'_>> for TermPattern {
    #[inline]
    fn from(node: NamedNodeRef<'_>) -> Self {
        Self::Constant(node.into())
    }
}

impl From<BlankNode> for TermPattern {
    #[inline]
    fn from(node: BlankNode) -> Self {
        Self::Constant(node.into())
    }
}

impl From<Literal> for TermPattern {
    #[inline]
    fn from(literal: Literal) -> Self {
        Self::Constant(literal.into())
    }
}

impl From<Variable> for TermPattern {
    #[inline]
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<&Variable> for TermPattern {
    #[inline]
    fn from(variable: &Variable) -> Self {
        Self::Variable(variable.clone())
    }
}

impl FromStr for TermPattern {
    type Err = SparqlError;

    /// Parses `?name` and `$name` as variables and anything else as an N-Triples term
    ///
    /// ```
    /// use oxrdf::{NamedNode, Variable};
    /// use sparqlp::TermPattern;
    ///
    /// assert_eq!("?x".parse::<TermPattern>()?, Variable::new("x")?.into());
    /// assert_eq!(
    ///     "<http://example.com>".parse::<TermPattern>()?,
    ///     NamedNode::new("http://example.com")?.into()
    /// );
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.starts_with('?') || s.starts_with('$') {
            Self::Variable(Variable::from_str(s)?)
        } else {
            Self::Constant(Term::from_str(s)?)
        })
    }
}

impl fmt::Display for TermPattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(t) => t.fmt(f),
            Self::Variable(v) => v.fmt(f),
        }
    }
}

/// A triple pattern with an optional per-triple filter.
#[derive(Clone)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
    filter: Option<TripleFilter>,
}

impl TriplePattern {
    #[inline]
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            filter: None,
        }
    }

    /// Sets the per-triple filter
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&Triple) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[inline]
    pub fn filter(&self) -> Option<&TripleFilter> {
        self.filter.as_ref()
    }

    /// Does the per-triple filter (if any) accept this triple?
    #[inline]
    pub fn accepts(&self, triple: &Triple) -> bool {
        self.filter.as_ref().is_none_or(|f| f(triple))
    }

    /// The three slots in subject, predicate, object order
    #[inline]
    pub fn slots(&self) -> [&TermPattern; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// The variables of the pattern, in slot order, possibly repeated
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.slots().into_iter().filter_map(TermPattern::as_variable)
    }

    /// Replaces the bound variables by their values, keeping the filter
    #[must_use]
    pub fn substitute(&self, bindings: &Bindings) -> Self {
        Self {
            subject: self.subject.substitute(bindings),
            predicate: self.predicate.substitute(bindings),
            object: self.object.substitute(bindings),
            filter: self.filter.clone(),
        }
    }

    /// Builds the triple described by this pattern for some bindings.
    ///
    /// If `blank_nodes` is set, the blank nodes of the pattern are replaced by fresh ones, shared through the map for a single row.
    /// Returns `Ok(None)` if the resulting terms do not form a valid RDF triple (literal subject...).
    pub(crate) fn instantiate(
        &self,
        bindings: &Bindings,
        mut blank_nodes: Option<&mut FxHashMap<BlankNode, BlankNode>>,
    ) -> Result<Option<Triple>, SparqlError> {
        let mut instantiate_slot = |slot: &TermPattern| -> Result<Term, SparqlError> {
            match slot {
                TermPattern::Constant(Term::BlankNode(b)) => Ok(match blank_nodes.as_deref_mut() {
                    Some(blank_nodes) => blank_nodes
                        .entry(b.clone())
                        .or_insert_with(BlankNode::default)
                        .clone()
                        .into(),
                    None => b.clone().into(),
                }),
                TermPattern::Constant(t) => Ok(t.clone()),
                TermPattern::Variable(v) => bindings
                    .get(v)
                    .cloned()
                    .ok_or_else(|| SparqlError::UnboundTemplateVariable(v.clone())),
            }
        };
        let subject = instantiate_slot(&self.subject)?;
        let predicate = instantiate_slot(&self.predicate)?;
        let object = instantiate_slot(&self.object)?;
        let Term::NamedNode(predicate) = predicate else {
            return Ok(None);
        };
        Ok(match subject {
            Term::NamedNode(s) => Some(Triple::new(s, predicate, object)),
            Term::BlankNode(s) => Some(Triple::new(s, predicate, object)),
            _ => None,
        })
    }
}

impl fmt::Debug for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriplePattern")
            .field("subject", &self.subject)
            .field("predicate", &self.predicate)
            .field("object", &self.object)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// A basic graph pattern: an ordered conjunction of triple patterns and a set of global constraints.
///
/// The patterns are matched in the order they are given, so putting the most selective one first
/// keeps the expansion tree small.
///
/// ```
/// use oxrdf::{NamedNode, Variable};
/// use sparqlp::GraphPattern;
///
/// let knows = NamedNode::new("http://xmlns.com/foaf/0.1/knows")?;
/// let (x, y, z) = (Variable::new("x")?, Variable::new("y")?, Variable::new("z")?);
/// let mut pattern = GraphPattern::new();
/// pattern
///     .add_pattern(x.clone(), knows.clone(), y.clone())
///     .add_pattern(y.clone(), knows, z.clone());
/// assert_eq!(pattern.unbound_variables(), [x, y, z]);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct GraphPattern {
    patterns: Vec<TriplePattern>,
    constraints: Vec<Constraint>,
    unbounds: Vec<Variable>,
    optionals: Vec<GraphPattern>,
}

impl GraphPattern {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a triple pattern
    pub fn add_pattern(
        &mut self,
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> &mut Self {
        self.add_triple_pattern(TriplePattern::new(subject, predicate, object))
    }

    /// Appends a triple pattern with a per-triple filter
    pub fn add_filtered_pattern(
        &mut self,
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
        filter: impl Fn(&Triple) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.add_triple_pattern(TriplePattern::new(subject, predicate, object).with_filter(filter))
    }

    /// Appends an already built triple pattern
    pub fn add_triple_pattern(&mut self, pattern: TriplePattern) -> &mut Self {
        for variable in pattern.variables() {
            if !self.unbounds.contains(variable) {
                self.unbounds.push(variable.clone());
            }
        }
        self.patterns.push(pattern);
        self
    }

    /// Inserts a triple pattern before all the others
    pub fn insert_pattern(&mut self, pattern: TriplePattern) -> &mut Self {
        self.patterns.insert(0, pattern);
        self.unbounds.clear();
        for variable in self.patterns.iter().flat_map(TriplePattern::variables) {
            if !self.unbounds.contains(variable) {
                self.unbounds.push(variable.clone());
            }
        }
        self
    }

    /// Adds a global constraint. All the constraints must accept a match for it to be kept.
    pub fn add_constraint(
        &mut self,
        constraint: impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static,
    ) -> &mut Self {
        self.constraints.push(Arc::new(constraint));
        self
    }

    /// Adds a nested OPTIONAL block, matched against each complete match of this pattern
    pub fn add_optional(&mut self, optional: GraphPattern) -> &mut Self {
        self.optionals.push(optional);
        self
    }

    /// Concatenates the patterns, constraints and nested optionals of another pattern to this one
    pub fn append(&mut self, other: &GraphPattern) -> &mut Self {
        for pattern in &other.patterns {
            self.add_triple_pattern(pattern.clone());
        }
        self.constraints.extend(other.constraints.iter().cloned());
        self.optionals.extend(other.optionals.iter().cloned());
        self
    }

    #[inline]
    pub fn patterns(&self) -> &[TriplePattern] {
        &self.patterns
    }

    #[inline]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    #[inline]
    pub fn optionals(&self) -> &[GraphPattern] {
        &self.optionals
    }

    /// The variables used in the triple patterns, in order of first appearance
    #[inline]
    pub fn unbound_variables(&self) -> &[Variable] {
        &self.unbounds
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Checks the constraints against some bindings
    pub(crate) fn accepts(&self, bindings: &Bindings) -> bool {
        self.constraints.iter().all(|c| c(bindings) == Some(true))
    }

    /// Copy of this pattern where the variables bound in `bindings` are replaced by their values.
    ///
    /// Constraints and nested optionals are kept as is: they see the full bindings at evaluation time.
    #[must_use]
    pub(crate) fn substitute(&self, bindings: &Bindings) -> Self {
        let mut substituted = Self {
            constraints: self.constraints.clone(),
            optionals: self.optionals.clone(),
            ..Self::default()
        };
        for pattern in &self.patterns {
            substituted.add_triple_pattern(pattern.substitute(bindings));
        }
        substituted
    }
}

impl FromIterator<TriplePattern> for GraphPattern {
    fn from_iter<I: IntoIterator<Item = TriplePattern>>(iter: I) -> Self {
        let mut pattern = Self::new();
        for p in iter {
            pattern.add_triple_pattern(p);
        }
        pattern
    }
}

impl fmt::Debug for GraphPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphPattern")
            .field("patterns", &self.patterns)
            .field("constraints", &self.constraints.len())
            .field("unbounds", &self.unbounds)
            .field("optionals", &self.optionals)
            .finish()
    }
}

impl fmt::Display for GraphPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for pattern in &self.patterns {
            write!(f, " {pattern}")?;
        }
        for optional in &self.optionals {
            write!(f, " OPTIONAL {optional}")?;
        }
        f.write_str(" }")
    }
}
