//! Prompt templates and context rendering.

use rag_core::ScoredNode;

/// Default question-answering prompt.
pub const DEFAULT_TEXT_QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query_str}\n\
Answer: ";

const CONTEXT_PLACEHOLDER: &str = "{context_str}";
const QUERY_PLACEHOLDER: &str = "{query_str}";

/// Label introducing the image link list in image prompts.
pub const IMAGE_SECTION_LABEL: &str = "Image links:";

/// A prompt with `{context_str}` and `{query_str}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill in the context and query in a single pass; substituted text is
    /// never scanned for placeholders.
    pub fn format(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [(CONTEXT_PLACEHOLDER, context), (QUERY_PLACEHOLDER, query)]
                .into_iter()
                .filter_map(|(placeholder, value)| {
                    rest.find(placeholder).map(|at| (at, placeholder, value))
                })
                .min_by_key(|(at, _, _)| *at);

            match next {
                Some((at, placeholder, value)) => {
                    out.push_str(&rest[..at]);
                    out.push_str(value);
                    rest = &rest[at + placeholder.len()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_QA_TEMPLATE)
    }
}

/// Text node contents (with metadata) separated by blank lines.
pub fn text_context(text_nodes: &[ScoredNode]) -> String {
    text_nodes
        .iter()
        .map(ScoredNode::content_with_metadata)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Append the labeled list of image links to a text context.
pub fn with_image_section(context: &str, image_nodes: &[ScoredNode]) -> String {
    let images = image_nodes
        .iter()
        .filter_map(|n| n.image_url.as_deref())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{} \n\n{}\n\n", context, IMAGE_SECTION_LABEL, images)
}
