//! Text-generation backends. The pipeline only sees the [`Generate`] capability, so any service
//! that maps a prompt to text can stand in for the bundled chat-completions client.

use core::{
    fmt::{self, Display},
    future::Future,
    time::Duration,
};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The backend did not answer in time.
    Timeout,
    /// The backend failed or refused the request.
    Backend,
    /// The backend answered with something other than generated text.
    Malformed,
    /// The client could not be constructed.
    Config,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "generation timed out",
            Self::Backend => "generation backend failed",
            Self::Malformed => "generation backend returned a malformed response",
            Self::Config => "generation client is misconfigured",
        })
    }
}

/// Converts a prompt into generated text. Calls may be slow or fail outright.
pub trait Generate: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, Error>> + Send;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Reply,
}

#[derive(Deserialize)]
struct Reply {
    content: Option<String>,
}

fn classify(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else if err.is_decode() {
        Error::Malformed
    } else {
        log::warn!("generation request failed: {err}");
        Error::Backend
    }
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletions {
    client: Client,
    /// Fully resolved `.../chat/completions` URL.
    endpoint: Url,
    model: Box<str>,
    /// Bearer token, if the backend wants one.
    key: Option<Box<str>>,
}

impl ChatCompletions {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(base_url: &str, model: &str, key: Option<&str>, timeout: Duration) -> Result<Self, Error> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).map_err(|_| Error::Config)?;
        let endpoint = base.join("chat/completions").map_err(|_| Error::Config)?;
        let client = Client::builder().timeout(timeout).build().map_err(|_| Error::Config)?;
        Ok(Self { client, endpoint, model: model.into(), key: key.map(Into::into) })
    }
}

impl Generate for ChatCompletions {
    async fn generate(&self, prompt: &str) -> Result<String, Error> {
        let body = CompletionRequest {
            model: &self.model,
            messages: [Message { role: "user", content: prompt }],
            temperature: 0.7,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = self.key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("generation backend replied with {status}");
            return Err(Error::Backend);
        }

        let CompletionResponse { choices } = response.json().await.map_err(classify)?;
        choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(Error::Malformed)
    }
}
