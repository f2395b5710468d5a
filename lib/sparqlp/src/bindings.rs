use oxrdf::{Term, Variable, VariableRef};
use std::fmt;
use std::sync::Arc;

/// A snapshot of variable bindings at one node of the expansion tree.
///
/// Every variable of the evaluated pattern has a slot, bound to a [`Term`] or still unbound.
/// The variable order is the order in which the variables first appear in the patterns and is
/// the column order of wildcard selections.
///
/// ```
/// use oxrdf::{Literal, Variable};
/// use sparqlp::Bindings;
///
/// let x = Variable::new("x")?;
/// let bindings = Bindings::new([x.clone(), Variable::new("y")?]).with(&x, Literal::from(1).into());
/// assert_eq!(bindings.get(&x), Some(&Literal::from(1).into()));
/// assert_eq!(bindings.get_by_name("y"), None);
/// assert!(!bindings.all_bound());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Bindings {
    variables: Arc<[Variable]>,
    values: Vec<Option<Term>>,
}

impl Bindings {
    /// Builds a snapshot where every given variable is unbound
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Self {
        let variables: Arc<[Variable]> = variables.into_iter().collect();
        let values = vec![None; variables.len()];
        Self { variables, values }
    }

    /// Returns a copy with the given variable bound to the given term
    ///
    /// Variables not known by this snapshot are appended.
    #[must_use]
    pub fn with(mut self, variable: &Variable, value: Term) -> Self {
        if let Some(i) = self.position(variable.as_ref()) {
            self.values[i] = Some(value);
        } else {
            self = self.extended([variable.clone()]);
            if let Some(last) = self.values.last_mut() {
                *last = Some(value);
            }
        }
        self
    }

    /// The variables of this snapshot, in column order
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// The values of this snapshot, in the same order as [`variables`](Self::variables)
    #[inline]
    pub fn values(&self) -> &[Option<Term>] {
        &self.values
    }

    /// The number of variables, bound or not
    #[inline]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// The value bound to a variable, if any
    #[inline]
    pub fn get<'a>(&self, variable: impl Into<VariableRef<'a>>) -> Option<&Term> {
        self.values[self.position(variable.into())?].as_ref()
    }

    /// The value bound to a variable given by name (without the `?` prefix), if any
    #[inline]
    pub fn get_by_name(&self, name: &str) -> Option<&Term> {
        self.get(VariableRef::new_unchecked(name))
    }

    /// Is this variable part of the snapshot and bound?
    #[inline]
    pub fn is_bound<'a>(&self, variable: impl Into<VariableRef<'a>>) -> bool {
        self.get(variable).is_some()
    }

    /// Is this variable part of the snapshot, bound or not?
    #[inline]
    pub fn contains<'a>(&self, variable: impl Into<VariableRef<'a>>) -> bool {
        self.position(variable.into()).is_some()
    }

    /// Are all the variables bound?
    #[inline]
    pub fn all_bound(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Iterates over all the variables and their optional values
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, Option<&Term>)> {
        self.variables.iter().zip(self.values.iter().map(Option::as_ref))
    }

    /// Iterates over the bound variables only
    #[inline]
    pub fn bound(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.variables
            .iter()
            .zip(&self.values)
            .filter_map(|(v, t)| Some((v, t.as_ref()?)))
    }

    /// Binds an unbound variable, or checks that an already bound variable has the same value
    ///
    /// Returns `false` on a clash. Unknown variables are ignored.
    pub(crate) fn bind(&mut self, variable: &Variable, value: &Term) -> bool {
        let Some(i) = self.position(variable.as_ref()) else {
            return true;
        };
        match &self.values[i] {
            Some(current) => current == value,
            None => {
                self.values[i] = Some(value.clone());
                true
            }
        }
    }

    /// Copy of these bindings where the given variables not already present are appended as unbound
    #[must_use]
    pub(crate) fn extended(&self, variables: impl IntoIterator<Item = Variable>) -> Self {
        let new = variables
            .into_iter()
            .filter(|v| !self.contains(v))
            .collect::<Vec<_>>();
        if new.is_empty() {
            return self.clone();
        }
        let mut values = self.values.clone();
        values.resize(values.len() + new.len(), None);
        Self {
            variables: self.variables.iter().cloned().chain(new).collect(),
            values,
        }
    }

    /// Copy of these bindings with the bound values of `other` added, its unknown variables appended
    #[must_use]
    pub(crate) fn merged(&self, other: &Self) -> Self {
        let mut merged = self.extended(other.variables.iter().cloned());
        for (variable, value) in other.bound() {
            if let Some(i) = merged.position(variable.as_ref()) {
                merged.values[i] = Some(value.clone());
            }
        }
        merged
    }

    fn position(&self, variable: VariableRef<'_>) -> Option<usize> {
        self.variables.iter().position(|v| v.as_ref() == variable)
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (variable, value) in self.iter() {
            map.entry(&variable.as_str(), &value);
        }
        map.finish()
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (variable, value)) in self.bound().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{variable} -> {value}")?;
        }
        f.write_str("}")
    }
}
