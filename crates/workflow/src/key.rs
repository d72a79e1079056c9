use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a workflow state.
///
/// Legacy order workflows number their states (`0..=4`); designer workflows
/// use string codes. Both forms are accepted. Identity is the canonical text,
/// so `1` and `"1"` name the same state, while serialization keeps whichever
/// form the key was created with.
#[derive(Debug, Clone)]
pub struct StateKey {
    text: String,
    number: Option<u64>,
}

impl StateKey {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            text: code.into(),
            number: None,
        }
    }

    pub fn numeric(id: u64) -> Self {
        Self {
            text: id.to_string(),
            number: Some(id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_numeric(&self) -> bool {
        self.number.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The key as it appears on the wire.
    pub fn to_json(&self) -> serde_json::Value {
        match self.number {
            Some(n) => serde_json::Value::from(n),
            None => serde_json::Value::String(self.text.clone()),
        }
    }
}

impl PartialEq for StateKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for StateKey {}

impl PartialEq<str> for StateKey {
    fn eq(&self, other: &str) -> bool {
        self.text == other
    }
}

impl PartialEq<&str> for StateKey {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl Hash for StateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for StateKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl Borrow<str> for StateKey {
    fn borrow(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for StateKey {
    fn from(code: &str) -> Self {
        StateKey::code(code)
    }
}

impl From<String> for StateKey {
    fn from(code: String) -> Self {
        StateKey::code(code)
    }
}

impl From<u64> for StateKey {
    fn from(id: u64) -> Self {
        StateKey::numeric(id)
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.number {
            Some(n) => serializer.serialize_u64(n),
            None => serializer.serialize_str(&self.text),
        }
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => StateKey::numeric(n),
            Raw::Text(s) => StateKey::code(s),
        })
    }
}
