//! Ready-made global constraints.
//!
//! Each builder returns a closure usable with [`GraphPattern::add_constraint`](crate::GraphPattern::add_constraint).
//! Operands are [`TermPattern`]s: a constant or a variable looked up in the match bindings.
//! An unbound variable or operands of incompatible kinds make the constraint return `None`,
//! so the match is dropped.
//!
//! ```
//! use oxrdf::{Literal, Variable};
//! use sparqlp::operators::{and, greater_than, less_or_equal};
//! use sparqlp::Bindings;
//!
//! let age = Variable::new("age")?;
//! let adult_not_senior = and(
//!     greater_than(age.clone(), Literal::from(17)),
//!     less_or_equal(age.clone(), Literal::from(65)),
//! );
//! let bindings = Bindings::new([age.clone()]).with(&age, Literal::from(30).into());
//! assert_eq!(adult_not_senior(&bindings), Some(true));
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```

use crate::bindings::Bindings;
use crate::error::SparqlError;
use crate::order::{equal_terms, partial_cmp_terms};
use crate::pattern::TermPattern;
use oxrdf::{NamedNode, Term};
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::cmp::Ordering;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

/// `a < b`
pub fn less_than(
    a: impl Into<TermPattern>,
    b: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    comparison(a.into(), b.into(), Ordering::is_lt)
}

/// `a <= b`
pub fn less_or_equal(
    a: impl Into<TermPattern>,
    b: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    comparison(a.into(), b.into(), Ordering::is_le)
}

/// `a > b`
pub fn greater_than(
    a: impl Into<TermPattern>,
    b: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    comparison(a.into(), b.into(), Ordering::is_gt)
}

/// `a >= b`
pub fn greater_or_equal(
    a: impl Into<TermPattern>,
    b: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    comparison(a.into(), b.into(), Ordering::is_ge)
}

/// `a = b`, with numeric literals compared by value
pub fn equal(
    a: impl Into<TermPattern>,
    b: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    let (a, b) = (a.into(), b.into());
    move |bindings| equal_terms(a.resolve(bindings)?, b.resolve(bindings)?)
}

/// `a != b`
pub fn not_equal(
    a: impl Into<TermPattern>,
    b: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    not(equal(a, b))
}

/// Is the operand bound? Never returns `None`.
pub fn bound(
    term: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    let term = term.into();
    move |bindings| Some(term.resolve(bindings).is_some())
}

pub fn is_iri(
    term: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    let term = term.into();
    move |bindings| Some(term.resolve(bindings)?.is_named_node())
}

pub fn is_blank(
    term: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    let term = term.into();
    move |bindings| Some(term.resolve(bindings)?.is_blank_node())
}

pub fn is_literal(
    term: impl Into<TermPattern>,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    let term = term.into();
    move |bindings| Some(term.resolve(bindings)?.is_literal())
}

/// Does the language tag of the operand match a basic language range?
///
/// `*` matches any language tagged literal, `en` matches `en` and `en-US` but not `eng`.
/// The comparison is case-insensitive.
pub fn lang_matches(
    term: impl Into<TermPattern>,
    language_range: &str,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    let term = term.into();
    let language_range = language_range.to_ascii_lowercase();
    move |bindings| {
        let Term::Literal(literal) = term.resolve(bindings)? else {
            return None;
        };
        let language = literal.language().unwrap_or_default().to_ascii_lowercase();
        Some(if language_range == "*" {
            !language.is_empty()
        } else {
            let mut subtags = language.split('-');
            language_range
                .split('-')
                .all(|range_subtag| subtags.next() == Some(range_subtag))
        })
    }
}

/// Is the operand a literal with this datatype?
pub fn has_datatype(
    term: impl Into<TermPattern>,
    datatype: NamedNode,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    let term = term.into();
    move |bindings| {
        let Term::Literal(literal) = term.resolve(bindings)? else {
            return None;
        };
        Some(literal.datatype() == datatype.as_ref())
    }
}

/// SPARQL `REGEX(term, pattern, flags)`.
///
/// The operand must be a literal. Allowed flags are `s`, `m`, `i`, `x` and `q`.
/// The regular expression is compiled once, an invalid pattern or flag is an [`SparqlError::InvalidArgument`].
pub fn regex(
    term: impl Into<TermPattern>,
    pattern: &str,
    flags: Option<&str>,
) -> Result<impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static, SparqlError> {
    let term = term.into();
    let regex = compile_pattern(pattern, flags).ok_or_else(|| SparqlError::InvalidArgument {
        name: "regex",
        value: format!("{pattern} (flags: {})", flags.unwrap_or_default()),
    })?;
    Ok(move |bindings: &Bindings| {
        let Term::Literal(literal) = term.resolve(bindings)? else {
            return None;
        };
        Some(regex.is_match(literal.value()))
    })
}

/// Both constraints hold.
///
/// Follows the SPARQL error semantics: `false && error` is `false`.
pub fn and(
    a: impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static,
    b: impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    move |bindings| match (a(bindings), b(bindings)) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// One of the constraints holds.
///
/// Follows the SPARQL error semantics: `true || error` is `true`.
pub fn or(
    a: impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static,
    b: impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    move |bindings| match (a(bindings), b(bindings)) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn not(
    a: impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    move |bindings| a(bindings).map(|v| !v)
}

fn comparison(
    a: TermPattern,
    b: TermPattern,
    test: fn(Ordering) -> bool,
) -> impl Fn(&Bindings) -> Option<bool> + Send + Sync + 'static {
    move |bindings| Some(test(partial_cmp_terms(a.resolve(bindings)?, b.resolve(bindings)?)?))
}

fn compile_pattern(pattern: &str, flags: Option<&str>) -> Option<Regex> {
    let mut pattern = Cow::Borrowed(pattern);
    let flags = flags.unwrap_or_default();
    if flags.contains('q') {
        pattern = regex::escape(&pattern).into();
    }
    let mut regex_builder = RegexBuilder::new(&pattern);
    regex_builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            's' => {
                regex_builder.dot_matches_new_line(true);
            }
            'm' => {
                regex_builder.multi_line(true);
            }
            'i' => {
                regex_builder.case_insensitive(true);
            }
            'x' => {
                regex_builder.ignore_whitespace(true);
            }
            'q' => (),
            _ => return None,
        }
    }
    regex_builder.build().ok()
}
