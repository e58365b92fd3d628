//! Ordered generator fallbacks

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::generator::{ContentGenerator, GeneratedReply, GenerationContext, GenerationError};
use crate::domain::CandidatePost;

/// Always answers with a fixed template.
///
/// `{author}` in the template is replaced by the post author's handle.
#[derive(Debug, Clone)]
pub struct StaticReplyGenerator {
    template: String,
}

impl StaticReplyGenerator {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl ContentGenerator for StaticReplyGenerator {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate(
        &self,
        post: &CandidatePost,
        _context: &GenerationContext,
    ) -> Result<GeneratedReply, GenerationError> {
        Ok(GeneratedReply {
            text: self.template.replace("{author}", &post.author_account_ref),
            confidence: 1.0,
        })
    }
}

struct ChainStep {
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

/// Tries generators in order; first acceptable reply wins.
///
/// A reply is acceptable when it is non-empty, fits `context.max_chars`,
/// and has at least `min_confidence`. Timeouts and errors move on to the
/// next generator.
pub struct GenerationChain {
    steps: Vec<ChainStep>,
    min_confidence: f32,
}

impl GenerationChain {
    pub fn new(min_confidence: f32) -> Self {
        Self {
            steps: Vec::new(),
            min_confidence,
        }
    }

    /// Append a generator with its own timeout.
    pub fn then(mut self, generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        self.steps.push(ChainStep { generator, timeout });
        self
    }

    /// Append a static template as the last resort.
    pub fn with_fallback(self, template: impl Into<String>) -> Self {
        let fallback = Arc::new(StaticReplyGenerator::new(template));
        self.then(fallback, Duration::from_secs(1))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn generate(
        &self,
        post: &CandidatePost,
        context: &GenerationContext,
    ) -> Result<GeneratedReply, GenerationError> {
        let mut failures = Vec::new();

        for step in &self.steps {
            let name = step.generator.name();
            let result = match tokio::time::timeout(step.timeout, step.generator.generate(post, context)).await {
                Ok(result) => result.and_then(|reply| self.accept(reply, context)),
                Err(_) => Err(GenerationError::Timeout(step.timeout)),
            };

            match result {
                Ok(reply) => {
                    tracing::debug!(generator = %name, post_ref = %post.post_ref, "Generated reply");
                    return Ok(reply);
                }
                Err(e) => {
                    tracing::warn!(generator = %name, post_ref = %post.post_ref, error = %e, "Generator failed");
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }

        Err(GenerationError::Exhausted(failures))
    }

    fn accept(&self, reply: GeneratedReply, context: &GenerationContext) -> Result<GeneratedReply, GenerationError> {
        let text = reply.text.trim();
        if text.is_empty() {
            return Err(GenerationError::Rejected("empty text".to_string()));
        }
        let chars = text.chars().count();
        if chars > context.max_chars {
            return Err(GenerationError::Rejected(format!(
                "{} chars exceeds limit of {}",
                chars, context.max_chars
            )));
        }
        if reply.confidence < self.min_confidence {
            return Err(GenerationError::Rejected(format!(
                "confidence {:.2} below {:.2}",
                reply.confidence, self.min_confidence
            )));
        }
        Ok(GeneratedReply {
            text: text.to_string(),
            confidence: reply.confidence,
        })
    }
}
