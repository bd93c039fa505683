//! Scripted and echoing LLM implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use rag_core::{ImageDocument, MultiModalLlm, RagError, Result, TextLlm, TextStream};

/// A prompt (and attached images) received by a [`ScriptedLlm`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub streaming: bool,
}

/// LLM returning a fixed response, or a fixed failure.
pub struct ScriptedLlm {
    model: String,
    response: std::result::Result<String, String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    /// Create an LLM that always answers `response`.
    pub fn new(model: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response: Ok(response.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create an LLM whose every call fails with `message`.
    pub fn failing(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response: Err(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn answer(&self, prompt: &str, images: &[ImageDocument], streaming: bool) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                image_urls: images.iter().map(|i| i.image_url.clone()).collect(),
                streaming,
            });
        }
        debug!(
            "{} answering prompt of {} chars with {} images",
            self.model,
            prompt.len(),
            images.len()
        );
        self.response
            .clone()
            .map_err(|message| RagError::upstream_inference(&self.model, message))
    }
}

#[async_trait]
impl TextLlm for ScriptedLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.answer(prompt, &[], false)
    }

    async fn stream_complete(&self, prompt: &str) -> Result<TextStream> {
        self.answer(prompt, &[], true).map(into_deltas)
    }
}

#[async_trait]
impl MultiModalLlm for ScriptedLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, images: &[ImageDocument]) -> Result<String> {
        self.answer(prompt, images, false)
    }

    async fn stream_complete(&self, prompt: &str, images: &[ImageDocument]) -> Result<TextStream> {
        self.answer(prompt, images, true).map(into_deltas)
    }
}

/// LLM that answers with the prompt it was given.
#[derive(Debug, Clone, Default)]
pub struct EchoLlm;

impl EchoLlm {
    pub fn new() -> Self {
        Self
    }

    fn echo(prompt: &str, images: &[ImageDocument]) -> String {
        if images.is_empty() {
            return prompt.to_string();
        }
        let urls: Vec<&str> = images.iter().map(|i| i.image_url.as_str()).collect();
        format!("{}\n[attached images: {}]", prompt, urls.join(", "))
    }
}

#[async_trait]
impl TextLlm for EchoLlm {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        Ok(Self::echo(prompt, &[]))
    }

    async fn stream_complete(&self, prompt: &str) -> Result<TextStream> {
        Ok(into_deltas(Self::echo(prompt, &[])))
    }
}

#[async_trait]
impl MultiModalLlm for EchoLlm {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str, images: &[ImageDocument]) -> Result<String> {
        Ok(Self::echo(prompt, images))
    }

    async fn stream_complete(&self, prompt: &str, images: &[ImageDocument]) -> Result<TextStream> {
        Ok(into_deltas(Self::echo(prompt, images)))
    }
}

/// Split a response into word-sized deltas that concatenate back to it.
fn into_deltas(text: String) -> TextStream {
    let deltas: Vec<Result<String>> = text
        .split_inclusive(' ')
        .map(|piece| Ok(piece.to_string()))
        .collect();
    stream::iter(deltas).boxed()
}
