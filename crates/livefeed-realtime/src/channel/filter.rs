//! Subscription filter predicates over change-event payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Failure while evaluating a filter against a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// A custom predicate reported an error.
    #[error("predicate '{name}' failed: {reason}")]
    Predicate {
        /// Name the predicate was registered under.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

/// Signature of an opaque predicate.
pub type PredicateFn = dyn Fn(&Value) -> Result<bool, String> + Send + Sync;

/// Typed predicate evaluated against an event's `data` payload.
#[derive(Clone)]
pub enum FilterExpr {
    /// Field at a dot-separated `path` equals `value`.
    Eq {
        /// Dot-separated path into the payload (`customer.id`).
        path: String,
        /// Expected value.
        value: Value,
    },
    /// Every inner expression holds. An empty list holds.
    All(Vec<FilterExpr>),
    /// At least one inner expression holds. An empty list does not hold.
    Any(Vec<FilterExpr>),
    /// The inner expression does not hold.
    Not(Box<FilterExpr>),
    /// Caller-supplied predicate.
    Custom {
        /// Name used in logs.
        name: String,
        /// The predicate.
        predicate: Arc<PredicateFn>,
    },
}

impl FilterExpr {
    /// Field-equality shorthand.
    pub fn field_eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Wraps a closure as a named predicate.
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Negates this expression.
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Builds the conjunction of field equalities sent on the wire.
    ///
    /// Returns `None` for an empty map.
    pub fn from_equality_map(fields: &BTreeMap<String, Value>) -> Option<Self> {
        let mut terms: Vec<Self> = fields
            .iter()
            .map(|(path, value)| Self::field_eq(path.clone(), value.clone()))
            .collect();
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(Self::All(terms)),
        }
    }

    /// Renders this expression back into a wire equality map, if it is one.
    pub fn as_equality_map(&self) -> Option<BTreeMap<String, Value>> {
        match self {
            Self::Eq { path, value } => Some(BTreeMap::from([(path.clone(), value.clone())])),
            Self::All(terms) => {
                let mut map = BTreeMap::new();
                for term in terms {
                    match term {
                        Self::Eq { path, value } => {
                            map.insert(path.clone(), value.clone());
                        }
                        _ => return None,
                    }
                }
                Some(map)
            }
            _ => None,
        }
    }

    /// Evaluates the expression, short-circuiting conjunctions and
    /// disjunctions.
    pub fn evaluate(&self, data: &Value) -> Result<bool, FilterError> {
        match self {
            Self::Eq { path, value } => Ok(lookup(data, path).is_some_and(|v| values_equal(v, value))),
            Self::All(terms) => {
                for term in terms {
                    if !term.evaluate(data)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any(terms) => {
                for term in terms {
                    if term.evaluate(data)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => inner.evaluate(data).map(|matched| !matched),
            Self::Custom { name, predicate } => {
                predicate(data).map_err(|reason| FilterError::Predicate {
                    name: name.clone(),
                    reason,
                })
            }
        }
    }
}

impl fmt::Debug for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { path, value } => write!(f, "{path} == {value}"),
            Self::All(terms) => f.debug_tuple("All").field(terms).finish(),
            Self::Any(terms) => f.debug_tuple("Any").field(terms).finish(),
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Self::Custom { name, .. } => write!(f, "Custom({name})"),
        }
    }
}

/// Resolves a dot-separated path inside nested objects.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |current, segment| current.as_object()?.get(segment))
}

/// JSON equality where `1` and `1.0` compare equal.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}
