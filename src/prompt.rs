use std::path::Path;

pub const QUESTION_PLACEHOLDER: &str = "{question}";

pub const DEFAULT_TEMPLATE: &str =
    "You are an expert analyst for power systems and energy markets. Answer the following question: {question}";

/// Prompt template read once at startup.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Reads the template at `path`, falling back to [`DEFAULT_TEMPLATE`]
    /// when the file cannot be read.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(template) => {
                tracing::info!(path = %path.display(), "loaded prompt template");
                if !template.contains(QUESTION_PLACEHOLDER) {
                    tracing::warn!(
                        path = %path.display(),
                        "prompt template has no {{question}} placeholder"
                    );
                }
                Self::new(template)
            }
            Err(err) => {
                tracing::error!(
                    path = %path.display(),
                    error = %err,
                    "could not read prompt file, using default template"
                );
                Self::new(DEFAULT_TEMPLATE)
            }
        }
    }

    /// Substitutes the question. Other braces in the template (JSON examples
    /// for the model, say) are left as written.
    pub fn render(&self, question: &str) -> String {
        self.template.replace(QUESTION_PLACEHOLDER, question)
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}
