//! Turns raw documents into stored quizzes. Each ingestion produces exactly one question: the
//! document is trimmed to an excerpt, handed to the generation backend, and whatever comes back
//! is coerced into a valid [`QuizItem`](model::QuizItem) before it reaches the store.

mod parse;

pub use parse::FALLBACK_QUESTION;

use crate::{
    error::{self, Error},
    extract::Extract,
    generate::{self, Generate},
};
use core::time::Duration;
use db::QuizStore;
use log::{info, warn};
use model::{Quiz, MAX_OPTIONS, MIN_OPTIONS};
use std::sync::Arc;
use tokio::time;

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Number of characters of the document shown to the backend.
    pub max_chars: usize,
    /// Number of choices every generated question must carry.
    pub option_count: usize,
    /// Upper bound on a single generation call.
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_chars: 1000, option_count: 4, timeout: Duration::from_secs(30) }
    }
}

pub struct Pipeline<S, G, X> {
    store: Arc<S>,
    generator: G,
    extractor: X,
    config: PipelineConfig,
}

impl<S, G, X> Pipeline<S, G, X>
where
    S: QuizStore,
    G: Generate,
    X: Extract,
{
    pub fn new(store: Arc<S>, generator: G, extractor: X, mut config: PipelineConfig) -> Self {
        config.option_count = config.option_count.clamp(MIN_OPTIONS, MAX_OPTIONS);
        config.max_chars = config.max_chars.max(1);
        Self { store, generator, extractor, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extracts text from an uploaded blob before running [`Pipeline::ingest`].
    pub async fn ingest_document(&self, source: &str, blob: &[u8]) -> error::Result<Quiz> {
        let text = self.extractor.extract_named(source, blob)?;
        self.ingest(source, &text).await
    }

    /// Generates a one-question quiz from `text` and stores it under the name derived from
    /// `source`, replacing any quiz already stored under that name. Backend failures never
    /// surface here: they yield the fallback question instead.
    pub async fn ingest(&self, source: &str, text: &str) -> error::Result<Quiz> {
        let name = derive_name(source).ok_or(Error::EmptyInput)?;
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let excerpt = truncate(text.trim(), self.config.max_chars);
        let prompt = wrap_prompt(excerpt, self.config.option_count);
        let item = match self.generate(&prompt).await {
            Ok(candidate) => parse::parse(&candidate, self.config.option_count),
            Err(err) => {
                warn!("generation for quiz {name} failed: {err}");
                parse::fallback(self.config.option_count)
            }
        };

        let quiz = self.store.put(name, vec![item]).await?;
        info!("stored quiz {name} from {source}");
        Ok(quiz)
    }

    async fn generate(&self, prompt: &str) -> Result<String, generate::Error> {
        time::timeout(self.config.timeout, self.generator.generate(prompt))
            .await
            .map_err(|_| generate::Error::Timeout)?
    }
}

/// Quiz name for a document: the file name without its directories and final extension.
pub fn derive_name(source: &str) -> Option<&str> {
    let file = source.trim().rsplit(['/', '\\']).next()?;
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    let stem = stem.trim();
    (!stem.is_empty()).then_some(stem)
}

/// Cuts `text` down to at most `max_chars` characters without splitting a code point.
fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn wrap_prompt(excerpt: &str, option_count: usize) -> String {
    format!(
        "Write one multiple-choice question about the document below. Reply with a JSON object of \
         the form {{\"question\": string, \"options\": [string; {option_count}], \"answer\": index}} \
         and nothing else.\n\nDocument:\n{excerpt}"
    )
}
