// Buyer record model and derived search index

use serde::{Deserialize, Deserializer, Serialize};

/// One buyer row as stored in the remote table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerRecord {
    /// Assigned by the remote store on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub first_purchase: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_purchase: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub interests: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,

    /// Lower-cased "username name interests", never persisted
    #[serde(skip)]
    search_index: String,
}

/// Hosted tables return `null` for empty text columns
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl BuyerRecord {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_purchases(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_purchase = first.into();
        self.last_purchase = last.into();
        self
    }

    pub fn with_interests(mut self, interests: impl Into<String>) -> Self {
        self.interests = interests.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Current search index; empty until the owning cache derives it
    pub fn search_index(&self) -> &str {
        &self.search_index
    }

    /// Recompute the search index from username, name and interests
    pub fn refresh_search_index(&mut self) {
        self.search_index = format!("{} {} {}", self.username, self.name, self.interests).to_lowercase();
    }

    /// Whether this record matches an already lower-cased search term
    pub fn matches(&self, term: &str) -> bool {
        term.is_empty() || self.search_index.contains(term)
    }

    /// Writable columns only: no id, no derived fields
    pub fn fields(&self) -> BuyerFields {
        BuyerFields {
            username: self.username.clone(),
            name: self.name.clone(),
            first_purchase: self.first_purchase.clone(),
            last_purchase: self.last_purchase.clone(),
            interests: self.interests.clone(),
            notes: self.notes.clone(),
        }
    }
}

/// Payload sent to the remote table on insert and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerFields {
    pub username: String,
    pub name: String,
    pub first_purchase: String,
    pub last_purchase: String,
    pub interests: String,
    pub notes: String,
}

impl BuyerFields {
    /// Attach a remote-assigned id, producing a record without a derived index
    pub fn into_record(self, id: i64) -> BuyerRecord {
        BuyerRecord {
            id: Some(id),
            username: self.username,
            name: self.name,
            first_purchase: self.first_purchase,
            last_purchase: self.last_purchase,
            interests: self.interests,
            notes: self.notes,
            search_index: String::new(),
        }
    }
}

/// Value types usable in an equality filter
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{}", s),
            IndexValue::Int(i) => write!(f, "{}", i),
        }
    }
}
