use oxrdf::{TermParseError, Variable, VariableNameParseError};
use std::convert::Infallible;
use std::error::Error;

/// An error raised while building or evaluating a graph pattern query.
///
/// Binding clashes are not errors: they only prune branches of the expansion tree and never
/// reach the caller.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SparqlError {
    /// Error from the underlying triple store
    #[error(transparent)]
    Store(Box<dyn Error + Send + Sync>),
    /// No graph pattern has been given to the evaluator
    #[error("At least one graph pattern is required to build a query")]
    EmptyPatternList,
    /// A selection entry is neither a variable nor a variable name
    #[error("'{0}' is not a valid selection, it must be '*', a variable or a list of variables")]
    InvalidSelection(String),
    /// A numeric argument like `limit` or `offset` is negative or out of range
    #[error("'{name}' argument is invalid: {value}")]
    InvalidArgument { name: &'static str, value: String },
    /// The ordering directions do not match the ordering keys
    #[error("'order_ascending' must have the same length as 'order_by' ({keys} keys, {directions} directions)")]
    OrderDirectionMismatch { keys: usize, directions: usize },
    /// A variable introduced by an OPTIONAL block already appears in a previous OPTIONAL block
    #[error("{0} is an illegal query variable, it appears in a previous OPTIONAL clause")]
    OptionalScope(Variable),
    /// A template variable is unbound while instantiating a construct template
    #[error("The variable {0} is unbound while instantiating the construct template")]
    UnboundTemplateVariable(Variable),
    /// A term given as text could not be parsed
    #[error(transparent)]
    TermParse(#[from] TermParseError),
    /// A variable name given as text could not be parsed
    #[error(transparent)]
    VariableParse(#[from] VariableNameParseError),
}

impl SparqlError {
    pub(crate) fn store(error: impl Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(error))
    }
}

impl From<Infallible> for SparqlError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}
