// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt templates with `{context}` and `{query}` slots.

use edgerag_core::error::EdgeRagError;

const CONTEXT_SLOT: &str = "{context}";
const QUERY_SLOT: &str = "{query}";

/// A prompt template rendered once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Parses a template. It must contain a `{query}` slot.
    pub fn new(template: impl Into<String>) -> Result<Self, EdgeRagError> {
        let template = template.into();
        if !template.contains(QUERY_SLOT) {
            return Err(EdgeRagError::Config(format!(
                "prompt template has no {QUERY_SLOT} slot"
            )));
        }
        Ok(Self { template })
    }

    /// A template that renders to the query alone.
    pub fn passthrough() -> Self {
        Self {
            template: QUERY_SLOT.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns true if rendering inserts retrieved context.
    pub fn uses_context(&self) -> bool {
        self.template.contains(CONTEXT_SLOT)
    }

    /// Fills both slots. Braces inside `context` or `query` are left alone.
    pub fn render(&self, context: &str, query: &str) -> String {
        fill(&self.template, &[(CONTEXT_SLOT, context), (QUERY_SLOT, query)])
    }
}

/// Renders a translation prompt from a template with `{language}` and `{text}` slots.
pub fn render_translation(template: &str, language: &str, text: &str) -> String {
    fill(template, &[("{language}", language), ("{text}", text)])
}

/// Single left-to-right pass, so substituted text is never rescanned.
fn fill(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (slot, value) in slots {
            if let Some(after) = tail.strip_prefix(slot) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAG: &str = "Here are the things I want to remember: {context} \
                       Use the things I want to remember, answer the following question the user has: {query}";

    #[test]
    fn renders_context_and_query() {
        let template = PromptTemplate::new(RAG).unwrap();
        let prompt = template.render("The fire extinguisher is red.", "Where is it?");
        assert!(prompt.contains("remember: The fire extinguisher is red. Use"));
        assert!(prompt.ends_with("user has: Where is it?"));
    }

    #[test]
    fn query_slot_is_required() {
        let err = PromptTemplate::new("Context: {context}").unwrap_err();
        assert!(err.to_string().contains("{query}"));
    }

    #[test]
    fn passthrough_returns_query_verbatim() {
        let template = PromptTemplate::passthrough();
        assert_eq!(template.render("ignored", "Translate this"), "Translate this");
        assert!(!template.uses_context());
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let template = PromptTemplate::new("[{context}] {query}").unwrap();
        let prompt = template.render("a {query} literal", "q");
        assert_eq!(prompt, "[a {query} literal] q");
    }

    #[test]
    fn unknown_braces_survive() {
        let template = PromptTemplate::new("{json} {query} }{").unwrap();
        assert_eq!(template.render("", "x"), "{json} x }{");
    }

    #[test]
    fn repeated_slots_are_all_filled() {
        let template = PromptTemplate::new("{query} / {query}").unwrap();
        assert_eq!(template.render("", "hi"), "hi / hi");
    }

    #[test]
    fn translation_prompt_fills_language_and_text() {
        let prompt = render_translation(
            "Translate the following text to {language}.\n\nText to translate: \"{text}\"",
            "French",
            "Good morning",
        );
        assert_eq!(
            prompt,
            "Translate the following text to French.\n\nText to translate: \"Good morning\""
        );
    }
}
