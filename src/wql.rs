//! Structured WQL query construction
//!
//! Queries are assembled from typed conditions and rendered in one place,
//! so user-supplied values only ever reach the query text through
//! [`escape::single_quoted`](crate::escape::single_quoted).

use crate::escape;
use std::fmt;

/// A single `WHERE` condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `field = 'value'`
    Equals(String, String),
    /// `field = value` for numeric fields
    EqualsNumber(String, i64),
    /// `field = True|False`
    EqualsBool(String, bool),
    /// `field IS NOT NULL`
    NotNull(String),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(field, value) => write!(f, "{} = {}", field, escape::single_quoted(value)),
            Self::EqualsNumber(field, value) => write!(f, "{} = {}", field, value),
            Self::EqualsBool(field, value) => {
                write!(f, "{} = {}", field, if *value { "True" } else { "False" })
            }
            Self::NotNull(field) => write!(f, "{} IS NOT NULL", field),
        }
    }
}

/// `SELECT * FROM <class> [WHERE ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    class: String,
    conditions: Vec<Condition>,
}

impl Select {
    /// Select every instance of a class
    pub fn from(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            conditions: Vec::new(),
        }
    }

    /// Add a string equality condition
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::Equals(field.into(), value.into()));
        self
    }

    /// Add a numeric equality condition
    pub fn where_number(mut self, field: impl Into<String>, value: i64) -> Self {
        self.conditions
            .push(Condition::EqualsNumber(field.into(), value));
        self
    }

    /// Add a boolean equality condition
    pub fn where_bool(mut self, field: impl Into<String>, value: bool) -> Self {
        self.conditions.push(Condition::EqualsBool(field.into(), value));
        self
    }

    /// Require a field to be present
    pub fn where_not_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition::NotNull(field.into()));
        self
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT * FROM {}", self.class)?;
        for (i, condition) in self.conditions.iter().enumerate() {
            let keyword = if i == 0 { "WHERE" } else { "AND" };
            write!(f, " {} {}", keyword, condition)?;
        }
        Ok(())
    }
}
