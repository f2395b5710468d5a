use crate::bindings::Bindings;
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNodeRef, Term, Variable};
use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer};
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

/// A user supplied ordering of solutions, replacing the ORDER BY keys.
pub type BindingsComparator = Arc<dyn Fn(&Bindings, &Bindings) -> Ordering + Send + Sync>;

/// Orders two bindings along a list of keys.
///
/// Each key is tried in turn, the first non-equal comparison wins.
/// An unbound key sorts before every bound value, before the direction is applied.
pub(crate) fn cmp_bindings(
    a: &Bindings,
    b: &Bindings,
    keys: &[Variable],
    ascending: Option<&[bool]>,
) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let ordering = match (a.get(key), b.get(key)) {
            (Some(a), Some(b)) => cmp_terms(a, b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        let ordering = if ascending.and_then(|a| a.get(i).copied()).unwrap_or(true) {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Total order on terms used for sorting: blank nodes, then IRIs, then literals.
///
/// Literals are grouped: numbers, then booleans, then dates, then everything else.
/// Numbers, booleans and dates are compared by value (`NaN` after the other numbers),
/// ties and the remaining literals by lexical form, datatype and language.
pub fn cmp_terms(a: &Term, b: &Term) -> Ordering {
    match (a, b) {
        (Term::BlankNode(a), Term::BlankNode(b)) => a.as_str().cmp(b.as_str()),
        (Term::BlankNode(_), _) => Ordering::Less,
        (_, Term::BlankNode(_)) => Ordering::Greater,
        (Term::NamedNode(a), Term::NamedNode(b)) => a.as_str().cmp(b.as_str()),
        (Term::NamedNode(_), _) => Ordering::Less,
        (_, Term::NamedNode(_)) => Ordering::Greater,
        (Term::Literal(a), Term::Literal(b)) => cmp_literals(a, b),
    }
}

fn cmp_literals(a: &Literal, b: &Literal) -> Ordering {
    let (va, vb) = (ComparableLiteral::from(a), ComparableLiteral::from(b));
    va.sort_group()
        .cmp(&vb.sort_group())
        .then_with(|| {
            if va.sort_group() == SortGroup::Lexical {
                return Ordering::Equal;
            }
            va.partial_cmp(&vb)
                .unwrap_or_else(|| va.is_nan().cmp(&vb.is_nan()))
        })
        .then_with(|| {
            (a.value(), a.datatype().as_str(), a.language()).cmp(&(
                b.value(),
                b.datatype().as_str(),
                b.language(),
            ))
        })
}

/// Comparison for the `<`, `>`, `<=` and `>=` operators.
///
/// Returns `None` if the terms are not comparable (an IRI and a number, two strings with different languages...).
pub fn partial_cmp_terms(a: &Term, b: &Term) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    if let (Term::Literal(a), Term::Literal(b)) = (a, b) {
        partial_cmp_literals(a, b)
    } else {
        None
    }
}

/// Value equality for the `=` and `!=` operators.
///
/// Identical terms are equal, `1` and `1.0` too. Returns `None` for literals of unknown datatypes that differ.
pub fn equal_terms(a: &Term, b: &Term) -> Option<bool> {
    if a == b {
        return Some(true);
    }
    match (a, b) {
        (Term::Literal(a), Term::Literal(b)) => {
            match (ComparableLiteral::from(a), ComparableLiteral::from(b)) {
                (ComparableLiteral::Other, _) | (_, ComparableLiteral::Other) => None,
                (a, b) => Some(a.partial_cmp(&b) == Some(Ordering::Equal)),
            }
        }
        _ => Some(false),
    }
}

fn partial_cmp_literals(a: &Literal, b: &Literal) -> Option<Ordering> {
    ComparableLiteral::from(a).partial_cmp(&ComparableLiteral::from(b))
}

/// The value of a literal, as far as comparisons are concerned
enum ComparableLiteral<'a> {
    String(&'a str),
    LangString { value: &'a str, language: &'a str },
    Boolean(bool),
    Integer(Integer),
    Decimal(Decimal),
    Float(Float),
    Double(Double),
    DateTime(DateTime),
    Other,
}

impl<'a> From<&'a Literal> for ComparableLiteral<'a> {
    fn from(literal: &'a Literal) -> Self {
        let value = literal.value();
        if let Some(language) = literal.language() {
            return Self::LangString { value, language };
        }
        let datatype = literal.datatype();
        let parsed = if datatype == xsd::STRING {
            Some(Self::String(value))
        } else if datatype == xsd::BOOLEAN {
            Boolean::from_str(value).ok().map(|v| Self::Boolean(v.into()))
        } else if datatype == xsd::DECIMAL {
            Decimal::from_str(value).ok().map(Self::Decimal)
        } else if datatype == xsd::FLOAT {
            Float::from_str(value).ok().map(Self::Float)
        } else if datatype == xsd::DOUBLE {
            Double::from_str(value).ok().map(Self::Double)
        } else if datatype == xsd::DATE_TIME {
            DateTime::from_str(value).ok().map(Self::DateTime)
        } else if is_integer_datatype(datatype) {
            Integer::from_str(value).ok().map(Self::Integer)
        } else {
            None
        };
        parsed.unwrap_or(Self::Other)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum SortGroup {
    Numeric,
    Boolean,
    DateTime,
    Lexical,
}

impl ComparableLiteral<'_> {
    fn sort_group(&self) -> SortGroup {
        match self {
            Self::Integer(_) | Self::Decimal(_) | Self::Float(_) | Self::Double(_) => {
                SortGroup::Numeric
            }
            Self::Boolean(_) => SortGroup::Boolean,
            Self::DateTime(_) => SortGroup::DateTime,
            Self::String(_) | Self::LangString { .. } | Self::Other => SortGroup::Lexical,
        }
    }

    /// Not comparable with itself: a `NaN` float or double
    fn is_nan(&self) -> bool {
        self.partial_cmp(self).is_none()
    }
}

impl PartialEq for ComparableLiteral<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for ComparableLiteral<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a.partial_cmp(b),
            (
                Self::LangString {
                    value: va,
                    language: la,
                },
                Self::LangString {
                    value: vb,
                    language: lb,
                },
            ) => la.eq_ignore_ascii_case(lb).then(|| va.cmp(vb)),
            (Self::Boolean(a), Self::Boolean(b)) => a.partial_cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Decimal(b)) => Decimal::from(*a).partial_cmp(b),
            (Self::Integer(a), Self::Float(b)) => Float::from(*a).partial_cmp(b),
            (Self::Integer(a), Self::Double(b)) => Double::from(*a).partial_cmp(b),
            (Self::Decimal(a), Self::Integer(b)) => a.partial_cmp(&Decimal::from(*b)),
            (Self::Decimal(a), Self::Decimal(b)) => a.partial_cmp(b),
            (Self::Decimal(a), Self::Float(b)) => Float::from(*a).partial_cmp(b),
            (Self::Decimal(a), Self::Double(b)) => Double::from(*a).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&Float::from(*b)),
            (Self::Float(a), Self::Decimal(b)) => a.partial_cmp(&Float::from(*b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Double(b)) => Double::from(*a).partial_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.partial_cmp(&Double::from(*b)),
            (Self::Double(a), Self::Decimal(b)) => a.partial_cmp(&Double::from(*b)),
            (Self::Double(a), Self::Float(b)) => a.partial_cmp(&Double::from(*b)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn is_integer_datatype(datatype: NamedNodeRef<'_>) -> bool {
    [
        xsd::INTEGER,
        xsd::LONG,
        xsd::INT,
        xsd::SHORT,
        xsd::BYTE,
        xsd::NON_NEGATIVE_INTEGER,
        xsd::NON_POSITIVE_INTEGER,
        xsd::POSITIVE_INTEGER,
        xsd::NEGATIVE_INTEGER,
        xsd::UNSIGNED_LONG,
        xsd::UNSIGNED_INT,
        xsd::UNSIGNED_SHORT,
        xsd::UNSIGNED_BYTE,
    ]
    .contains(&datatype)
}
