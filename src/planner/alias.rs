//! Output alias sanitization
//!
//! Display names can hold anything (`tags.Name`, `Cost (USD)`), but both
//! backends need plain identifiers. Every output column is registered here
//! once and addressed by its alias from then on.

use tracing::warn;

use crate::plan::{AliasCollision, OutputColumn};

/// Map a raw column name to an identifier-safe alias
///
/// Characters outside `[A-Za-z0-9_]` become `_`, and a leading digit gets a
/// `_` prefix. Applying it to its own output returns the same string.
pub fn sanitize_alias(raw: &str) -> String {
    let mut alias: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if alias.is_empty() || alias.starts_with(|c: char| c.is_ascii_digit()) {
        alias.insert(0, '_');
    }
    alias
}

/// Outcome of registering a display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// First time this alias is seen
    New(String),
    /// The same display name was registered before
    Existing(String),
    /// Another display name already owns the alias; it keeps it
    Collision(String),
}

impl Registration {
    pub fn new_alias(self) -> Option<String> {
        match self {
            Registration::New(alias) => Some(alias),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct AliasRegistry {
    entries: Vec<OutputColumn>,
    collisions: Vec<AliasCollision>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name; the first name to claim an alias wins
    pub fn register(&mut self, name: &str) -> Registration {
        let alias = sanitize_alias(name);
        match self.entries.iter().find(|e| e.alias == alias) {
            Some(existing) if existing.name == name => Registration::Existing(alias),
            Some(existing) => {
                warn!(
                    alias = %alias,
                    kept = %existing.name,
                    dropped = %name,
                    "output alias collision, keeping first registration"
                );
                self.collisions.push(AliasCollision {
                    alias: alias.clone(),
                    kept: existing.name.clone(),
                    dropped: name.to_string(),
                });
                Registration::Collision(alias)
            }
            None => {
                self.entries.push(OutputColumn {
                    alias: alias.clone(),
                    name: name.to_string(),
                });
                Registration::New(alias)
            }
        }
    }

    pub fn alias_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.alias.as_str())
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.iter().any(|e| e.alias == alias)
    }

    pub fn collisions(&self) -> &[AliasCollision] {
        &self.collisions
    }

    pub fn into_parts(self) -> (Vec<OutputColumn>, Vec<AliasCollision>) {
        (self.entries, self.collisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_alias("provider"), "provider");
        assert_eq!(sanitize_alias("tags.Name"), "tags_Name");
        assert_eq!(sanitize_alias("Cost (USD)"), "Cost__USD_");
        assert_eq!(sanitize_alias("1st"), "_1st");
        assert_eq!(sanitize_alias(""), "_");
    }

    #[test]
    fn test_sanitize_idempotent() {
        for raw in ["tags.Name", "1st", "", "a-b c", "_total_cost"] {
            let once = sanitize_alias(raw);
            assert_eq!(sanitize_alias(&once), once);
            assert_eq!(sanitize_alias(raw), once);
        }
    }

    #[test]
    fn test_first_registration_wins() {
        let mut reg = AliasRegistry::new();
        assert_eq!(reg.register("tags.Name"), Registration::New("tags_Name".into()));
        assert_eq!(reg.register("tags_Name"), Registration::Collision("tags_Name".into()));
        assert_eq!(reg.register("tags.Name"), Registration::Existing("tags_Name".into()));

        assert_eq!(reg.alias_of("tags.Name"), Some("tags_Name"));
        assert_eq!(reg.alias_of("tags_Name"), None);
        assert_eq!(reg.collisions().len(), 1);
        assert_eq!(reg.collisions()[0].kept, "tags.Name");
        assert_eq!(reg.collisions()[0].dropped, "tags_Name");
    }
}
