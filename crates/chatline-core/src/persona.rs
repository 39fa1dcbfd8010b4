use serde::{Deserialize, Serialize};

/// A named system prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub content: String,
}

/// Catalog of personas available to every session
///
/// `""` and `"default"` resolve to the default persona: the configured
/// default when it names a known persona, otherwise the first entry.
#[derive(Debug, Clone, Default)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
    default_name: Option<String>,
}

impl PersonaCatalog {
    pub fn new(personas: Vec<Persona>, default_name: Option<String>) -> Self {
        let default_name = default_name
            .filter(|name| personas.iter().any(|p| &p.name == name))
            .or_else(|| personas.first().map(|p| p.name.clone()));

        Self {
            personas,
            default_name,
        }
    }

    /// System prompt for `name`, or `None` for unknown personas
    pub fn content(&self, name: &str) -> Option<&str> {
        let name = match name {
            "" | "default" => self.default_name.as_deref()?,
            other => other,
        };
        self.personas
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.content.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }
}
