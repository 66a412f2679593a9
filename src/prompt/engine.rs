use crate::error::PromptError;
use std::error::Error as _;
use tera::Tera;

/// Tera-backed template engine for building structured prompts.
pub struct TeraEngine {
    tera: Tera,
}

impl TeraEngine {
    /// Create with inline templates (no filesystem).
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
        }
    }

    /// Register a template from a string, replacing any previous one.
    pub fn add_template(&mut self, name: &str, content: &str) -> Result<(), PromptError> {
        self.tera
            .add_raw_template(name, content)
            .map_err(|error| PromptError::Render(describe(&error)))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render a named template with the given context.
    pub fn render(&self, name: &str, context: &tera::Context) -> Result<String, PromptError> {
        if !self.has_template(name) {
            return Err(PromptError::NotFound(name.to_string()));
        }
        self.tera
            .render(name, context)
            .map_err(|error| PromptError::Render(describe(&error)))
    }
}

impl Default for TeraEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Tera keeps the useful part of the message in the source chain.
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
