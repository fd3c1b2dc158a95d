// Equality filters for remote lookups

use crate::record::IndexValue;

/// Equality predicate on a single column
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Column name to match
    pub field: String,
    /// Value the column must equal
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    pub fn username(username: &str) -> Self {
        Self::eq("username", IndexValue::String(username.to_string()))
    }

    pub fn id(id: i64) -> Self {
        Self::eq("id", IndexValue::Int(id))
    }

    /// SQL predicate with a single positional parameter. Field must be validated first.
    pub(crate) fn to_sql(&self) -> String {
        format!("\"{}\" = ?1", self.field)
    }

    /// PostgREST query pair, e.g. ("username", "eq.al")
    pub(crate) fn to_query(&self) -> (String, String) {
        (self.field.clone(), format!("eq.{}", self.value))
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.field, self.value)
    }
}
