// Parameterized WHERE-clause construction.
//
// Only `&'static str` column names and crate-built fragments are ever
// formatted into SQL; every caller-supplied value is bound as a parameter.

use rusqlite::types::Value;

/// Conjunction of SQL predicates with their bound values, in placeholder order
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?`
    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(format!("{} = ?", column));
        self.params.push(value.into());
        self
    }

    /// `column IN (?, ?, ...)`; an empty list matches nothing
    pub fn is_in(mut self, column: &'static str, values: &[String]) -> Self {
        if values.is_empty() {
            self.clauses.push("0".to_string());
            return self;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{} IN ({})", column, placeholders));
        self.params.extend(values.iter().cloned().map(Value::from));
        self
    }

    /// Crate-built fragment whose `?` placeholders line up with `params`
    pub fn fragment(mut self, clause: String, params: Vec<Value>) -> Self {
        self.clauses.push(clause);
        self.params.extend(params);
        self
    }

    /// OR of several conjunctions; no groups adds no restriction
    pub fn any_of(mut self, groups: Vec<Conditions>) -> Self {
        if groups.is_empty() {
            return self;
        }
        let mut parts = Vec::with_capacity(groups.len());
        for group in groups {
            parts.push(format!("({})", group.joined()));
            self.params.extend(group.params);
        }
        self.clauses.push(format!("({})", parts.join(" OR ")));
        self
    }

    fn joined(&self) -> String {
        if self.clauses.is_empty() {
            "1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    /// `WHERE ...` clause, empty when unconstrained
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.joined())
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}
