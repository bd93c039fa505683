//! Multi-modal answer synthesis.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info};

use rag_core::{
    ImageDocument, MultiModalLlm, NodePostprocessor, RagError, Result, ScoredNode,
    SynthesisConfig, TextLlm, TextStream,
};

use crate::partition::{partition_with, PartitionConfig, Partitioned};
use crate::prompt::{text_context, with_image_section, PromptTemplate};

/// Answer text, complete or as a lazy stream of deltas.
pub enum AnswerBody {
    Text(String),
    Stream(TextStream),
}

impl std::fmt::Debug for AnswerBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A synthesized answer with the nodes it was built from.
#[derive(Debug)]
pub struct Answer {
    pub body: AnswerBody,

    /// All nodes handed to the synthesizer.
    pub source_nodes: Vec<ScoredNode>,

    /// Text context after postprocessing.
    pub text_nodes: Vec<ScoredNode>,

    /// Images attached to the prompt.
    pub image_nodes: Vec<ScoredNode>,
}

impl Answer {
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, AnswerBody::Stream(_))
    }

    /// The full answer, draining the stream if there is one.
    pub async fn into_text(self) -> Result<String> {
        match self.body {
            AnswerBody::Text(text) => Ok(text),
            AnswerBody::Stream(mut stream) => {
                let mut text = String::new();
                while let Some(delta) = stream.next().await {
                    text.push_str(&delta?);
                }
                Ok(text)
            }
        }
    }
}

/// Builds prompts from retrieved nodes and asks the text or multi-modal LLM.
///
/// Both LLMs are optional; a missing one only fails the requests that need it.
pub struct MultiModalSynthesizer {
    llm: Option<Arc<dyn TextLlm>>,
    multi_modal_llm: Option<Arc<dyn MultiModalLlm>>,
    text_qa_template: PromptTemplate,
    image_qa_template: PromptTemplate,
    postprocessors: Vec<Arc<dyn NodePostprocessor>>,
    partition: PartitionConfig,
}

impl Default for MultiModalSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiModalSynthesizer {
    /// Create a synthesizer with default templates and no LLMs.
    pub fn new() -> Self {
        Self {
            llm: None,
            multi_modal_llm: None,
            text_qa_template: PromptTemplate::default(),
            image_qa_template: PromptTemplate::default(),
            postprocessors: Vec::new(),
            partition: PartitionConfig::default(),
        }
    }

    /// Create a synthesizer with templates and limits from configuration.
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let mut synthesizer = Self::new();
        synthesizer.partition = PartitionConfig::from(config);
        if let Some(template) = &config.text_qa_template {
            synthesizer.text_qa_template = PromptTemplate::new(template.clone());
        }
        if let Some(template) = &config.image_qa_template {
            synthesizer.image_qa_template = PromptTemplate::new(template.clone());
        }
        synthesizer
    }

    pub fn with_llm(mut self, llm: Arc<dyn TextLlm>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_multi_modal_llm(mut self, llm: Arc<dyn MultiModalLlm>) -> Self {
        self.multi_modal_llm = Some(llm);
        self
    }

    pub fn with_text_qa_template(mut self, template: PromptTemplate) -> Self {
        self.text_qa_template = template;
        self
    }

    pub fn with_image_qa_template(mut self, template: PromptTemplate) -> Self {
        self.image_qa_template = template;
        self
    }

    /// Add a postprocessor; postprocessors run on text nodes only, in order.
    pub fn with_postprocessor(mut self, postprocessor: Arc<dyn NodePostprocessor>) -> Self {
        self.postprocessors.push(postprocessor);
        self
    }

    pub fn partition_config(&self) -> &PartitionConfig {
        &self.partition
    }

    /// Partition `nodes` and run the postprocessors over the text nodes.
    pub async fn prepare(&self, query: &str, nodes: &[ScoredNode]) -> Result<Partitioned> {
        let mut parts = partition_with(nodes, &self.partition);
        for postprocessor in &self.postprocessors {
            parts.text_nodes = postprocessor.postprocess(query, parts.text_nodes).await?;
        }
        Ok(parts)
    }

    /// Answer `query` from `nodes`.
    ///
    /// `needs_image` selects the multi-modal LLM and adds the image links to
    /// the prompt; `streaming` returns the answer as a lazy stream. Source
    /// nodes are attached immediately in both delivery modes.
    pub async fn synthesize(
        &self,
        query: &str,
        nodes: Vec<ScoredNode>,
        streaming: bool,
        needs_image: bool,
    ) -> Result<Answer> {
        let Partitioned {
            image_nodes,
            text_nodes,
        } = self.prepare(query, &nodes).await?;

        let context = text_context(&text_nodes);

        let body = if needs_image {
            let llm = self.require_multi_modal_llm()?;
            let prompt = self
                .image_qa_template
                .format(&with_image_section(&context, &image_nodes), query);
            let images = image_documents(&image_nodes);

            info!(
                "Synthesizing with multi-modal LLM {} ({} text nodes, {} images, streaming={})",
                llm.model_name(),
                text_nodes.len(),
                images.len(),
                streaming
            );

            if streaming {
                let stream = llm
                    .stream_complete(&prompt, &images)
                    .await
                    .map_err(|e| inference(llm.model_name(), e))?;
                AnswerBody::Stream(attribute_stream(llm.model_name(), stream))
            } else {
                AnswerBody::Text(
                    llm.complete(&prompt, &images)
                        .await
                        .map_err(|e| inference(llm.model_name(), e))?,
                )
            }
        } else {
            let llm = self.require_llm()?;
            let prompt = self.text_qa_template.format(&context, query);

            info!(
                "Synthesizing with LLM {} ({} text nodes, streaming={})",
                llm.model_name(),
                text_nodes.len(),
                streaming
            );

            if streaming {
                let stream = llm
                    .stream_complete(&prompt)
                    .await
                    .map_err(|e| inference(llm.model_name(), e))?;
                AnswerBody::Stream(attribute_stream(llm.model_name(), stream))
            } else {
                AnswerBody::Text(
                    llm.complete(&prompt)
                        .await
                        .map_err(|e| inference(llm.model_name(), e))?,
                )
            }
        };

        Ok(Answer {
            body,
            source_nodes: nodes,
            text_nodes,
            image_nodes,
        })
    }

    /// Answer `prompt` from images alone.
    pub async fn synthesize_images(&self, prompt: &str, image_nodes: Vec<ScoredNode>) -> Result<Answer> {
        let llm = self.require_multi_modal_llm()?;
        let formatted = self
            .image_qa_template
            .format(&with_image_section("", &image_nodes), prompt);
        let images = image_documents(&image_nodes);

        debug!("Image query with {} images", images.len());

        let answer = llm
            .complete(&formatted, &images)
            .await
            .map_err(|e| inference(llm.model_name(), e))?;

        Ok(Answer {
            body: AnswerBody::Text(answer),
            source_nodes: image_nodes.clone(),
            text_nodes: Vec::new(),
            image_nodes,
        })
    }

    fn require_llm(&self) -> Result<&Arc<dyn TextLlm>> {
        self.llm
            .as_ref()
            .ok_or_else(|| RagError::config("No LLM configured for text-only synthesis"))
    }

    fn require_multi_modal_llm(&self) -> Result<&Arc<dyn MultiModalLlm>> {
        self.multi_modal_llm
            .as_ref()
            .ok_or_else(|| RagError::config("No multi-modal LLM configured for image synthesis"))
    }
}

fn image_documents(image_nodes: &[ScoredNode]) -> Vec<ImageDocument> {
    image_nodes.iter().filter_map(ImageDocument::from_node).collect()
}

/// Attribute a failure to the model that raised it.
fn inference(model: &str, err: RagError) -> RagError {
    match err {
        RagError::UpstreamInference { .. } => err,
        other => RagError::upstream_inference(model, other.to_string()),
    }
}

/// Attribute failures yielded mid-stream to the model as well.
fn attribute_stream(model: &str, stream: TextStream) -> TextStream {
    let model = model.to_string();
    stream
        .map(move |delta| delta.map_err(|e| inference(&model, e)))
        .boxed()
}

/// One-shot synthesis with the given clients.
pub async fn synthesize(
    query: &str,
    nodes: Vec<ScoredNode>,
    streaming: bool,
    needs_image: bool,
    llm: Option<Arc<dyn TextLlm>>,
    multi_modal_llm: Option<Arc<dyn MultiModalLlm>>,
) -> Result<Answer> {
    let mut synthesizer = MultiModalSynthesizer::new();
    synthesizer.llm = llm;
    synthesizer.multi_modal_llm = multi_modal_llm;
    synthesizer
        .synthesize(query, nodes, streaming, needs_image)
        .await
}
