use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Profile record of the signed-in user.
///
/// The backend owns the shape of this record, so it is kept as a JSON object
/// and only a handful of well-known fields get typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    pub fn email(&self) -> Option<&str> {
        self.str_field("email")
    }

    pub fn role(&self) -> Option<&str> {
        self.str_field("role")
    }

    pub fn status(&self) -> Option<&str> {
        self.str_field("status")
    }

    /// Name for display, falling back to the email address
    pub fn display_name(&self) -> String {
        let first = self.str_field("firstName").unwrap_or_default();
        let last = self.str_field("lastName").unwrap_or_default();
        let full = format!("{} {}", first, last).trim().to_string();
        if full.is_empty() {
            self.email().unwrap_or("Unknown user").to_string()
        } else {
            full
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Shallow merge: top-level keys in `partial` overwrite existing ones.
    pub fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.0.insert(key, value);
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for UserProfile {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
