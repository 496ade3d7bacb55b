//! Prompt templates.
//!
//! A template is static text with `{{name}}` substitution slots, rendered
//! fresh for every call.

use crate::error::PromptError;
use std::collections::{BTreeMap, HashMap};

/// Text of the conversation template: prior turns, then the new input.
pub const CONVERSATION_TEMPLATE: &str = "You are a helpful assistant. Here is the conversation so far:
{{history}}
User: {{input}}
Assistant:";

/// Definition of a template variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    /// Description of what this variable is for.
    pub description: String,
    /// Whether this variable is required.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<String>,
}

impl VariableDefinition {
    /// Creates a required variable definition.
    #[must_use]
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional variable definition.
    #[must_use]
    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: false,
            default: None,
        }
    }

    /// Sets a default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Template name, used in errors and logs.
    pub name: String,
    /// Template content with placeholders.
    pub content: String,
    /// Variable definitions (name -> definition).
    pub variables: BTreeMap<String, VariableDefinition>,
}

impl PromptTemplate {
    /// Creates a new prompt template.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            variables: BTreeMap::new(),
        }
    }

    /// The template used for chat turns, with `history` and `input` slots.
    #[must_use]
    pub fn conversation() -> Self {
        Self::new("conversation", CONVERSATION_TEMPLATE)
            .with_variable(
                "history",
                VariableDefinition::optional("Prior turns, one per line").with_default(""),
            )
            .with_variable("input", VariableDefinition::required("The new user message"))
    }

    /// Adds a variable definition.
    #[must_use]
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        definition: VariableDefinition,
    ) -> Self {
        self.variables.insert(name.into(), definition);
        self
    }

    /// Renders the template with the given variables.
    ///
    /// Placeholders are substituted in a single pass, so a value that itself
    /// contains `{{name}}` is inserted verbatim rather than expanded. Slots
    /// with neither a value nor a default are left untouched.
    #[must_use]
    pub fn render(&self, variables: &HashMap<&str, &str>) -> String {
        let mut output = String::with_capacity(self.content.len());
        let mut rest = self.content.as_str();

        while let Some(open) = rest.find("{{") {
            output.push_str(&rest[..open]);
            let after_open = &rest[open + 2..];
            let Some(close) = after_open.find("}}") else {
                output.push_str(&rest[open..]);
                return output;
            };

            let name = after_open[..close].trim();
            match self.lookup(name, variables) {
                Some(value) => output.push_str(value),
                None => output.push_str(&rest[open..open + 2 + close + 2]),
            }
            rest = &after_open[close + 2..];
        }

        output.push_str(rest);
        output
    }

    /// Validates the variables and renders the template.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::MissingVariable`] for the first required
    /// variable that has no value and no default.
    pub fn try_render(&self, variables: &HashMap<&str, &str>) -> Result<String, PromptError> {
        if let Some(missing) = self.missing_variables(variables).into_iter().next() {
            return Err(PromptError::MissingVariable {
                template: self.name.clone(),
                variable: missing,
            });
        }
        Ok(self.render(variables))
    }

    /// Returns the required variables that have neither a value nor a default.
    #[must_use]
    pub fn missing_variables(&self, variables: &HashMap<&str, &str>) -> Vec<String> {
        self.variables
            .iter()
            .filter(|(_, def)| def.required && def.default.is_none())
            .filter(|(name, _)| !variables.contains_key(name.as_str()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn lookup<'a>(&'a self, name: &str, variables: &HashMap<&str, &'a str>) -> Option<&'a str> {
        variables
            .get(name)
            .copied()
            .or_else(|| self.variables.get(name)?.default.as_deref())
    }
}
