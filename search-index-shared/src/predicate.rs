//! Structured query predicates.
//!
//! A [`Predicate`] is a boolean tree whose leaves compare one field against a
//! value or a range. It says nothing about the engine; translating it into a
//! query DSL is the job of the repository crate.

use std::fmt;
use std::ops::Bound;

use crate::document::FieldValue;

/// Comparison applied to a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Field equals (or, for analyzed fields, matches) the value.
    Equals(FieldValue),
    /// Field lies within the given bounds.
    Range {
        from: Bound<FieldValue>,
        to: Bound<FieldValue>,
    },
}

/// Boolean predicate tree over schema fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every document.
    All,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Leaf comparing one field.
    Field { field: String, condition: Condition },
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Field {
            field: field.into(),
            condition: Condition::Equals(value.into()),
        }
    }

    pub fn range(
        field: impl Into<String>,
        from: Bound<FieldValue>,
        to: Bound<FieldValue>,
    ) -> Self {
        Self::Field {
            field: field.into(),
            condition: Condition::Range { from, to },
        }
    }

    /// Inclusive lower bound, no upper bound.
    pub fn at_least(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::range(field, Bound::Included(value.into()), Bound::Unbounded)
    }

    /// Exclusive upper bound, no lower bound.
    pub fn before(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::range(field, Bound::Unbounded, Bound::Excluded(value.into()))
    }

    pub fn and(children: impl IntoIterator<Item = Predicate>) -> Self {
        Self::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    pub fn not(child: Predicate) -> Self {
        Self::Not(Box::new(child))
    }
}

fn fmt_bound(f: &mut fmt::Formatter<'_>, bound: &Bound<FieldValue>, lower: bool) -> fmt::Result {
    match (bound, lower) {
        (Bound::Included(v), true) => write!(f, "[{}", v),
        (Bound::Excluded(v), true) => write!(f, "({}", v),
        (Bound::Unbounded, true) => f.write_str("(*"),
        (Bound::Included(v), false) => write!(f, "{}]", v),
        (Bound::Excluded(v), false) => write!(f, "{})", v),
        (Bound::Unbounded, false) => f.write_str("*)"),
    }
}

fn fmt_joined(f: &mut fmt::Formatter<'_>, children: &[Predicate], op: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", op)?;
        }
        write!(f, "{}", child)?;
    }
    f.write_str(")")
}

/// Query-language rendering, e.g. `(project:foo AND status:open)`.
impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::And(children) => fmt_joined(f, children, "AND"),
            Self::Or(children) => fmt_joined(f, children, "OR"),
            Self::Not(child) => write!(f, "-{}", child),
            Self::Field {
                field,
                condition: Condition::Equals(value),
            } => write!(f, "{}:{}", field, value),
            Self::Field {
                field,
                condition: Condition::Range { from, to },
            } => {
                write!(f, "{}:", field)?;
                fmt_bound(f, from, true)?;
                f.write_str("..")?;
                fmt_bound(f, to, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_leaf() {
        assert_eq!(Predicate::eq("project", "foo").to_string(), "project:foo");
    }

    #[test]
    fn test_display_tree() {
        let p = Predicate::and([
            Predicate::eq("project", "foo"),
            Predicate::not(Predicate::eq("status", "merged")),
            Predicate::or([Predicate::eq("owner", 1i64), Predicate::eq("owner", 2i64)]),
        ]);
        assert_eq!(
            p.to_string(),
            "(project:foo AND -status:merged AND (owner:1 OR owner:2))"
        );
    }

    #[test]
    fn test_display_range() {
        let p = Predicate::range(
            "size",
            Bound::Included(FieldValue::Integer(10)),
            Bound::Excluded(FieldValue::Integer(20)),
        );
        assert_eq!(p.to_string(), "size:[10..20)");
        assert_eq!(Predicate::at_least("size", 5i64).to_string(), "size:[5..*)");
    }
}
