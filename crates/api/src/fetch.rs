use core::fmt::{self, Display};
use reqwest::{Client, Url};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The URL does not point to a text attachment on the Discord CDN.
    Untrusted,
    /// The attachment exceeds the configured size cap.
    TooLarge,
    /// The download failed.
    Network,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Untrusted => "untrusted attachment URL",
            Self::TooLarge => "attachment exceeds the size cap",
            Self::Network => "attachment download failed",
        })
    }
}

/// Validates whether the URL is "trusted". As long as the URL follows the
/// format `https://cdn.discordapp.com/attachments/{snowflake}/{snowflake}/{filename}`
/// where the file is a `.txt`, `.md` or `.pdf` document, the validation should pass.
pub fn is_allowed_url(url: &Url) -> bool {
    if url.scheme() != "https" {
        return false;
    }

    if url.host_str() != Some("cdn.discordapp.com") {
        return false;
    }

    let Some(rest) = url.path().strip_prefix("/attachments/") else {
        return false;
    };

    let mut comps = rest.split('/');
    if !comps.by_ref().take(2).all(|comp| !comp.is_empty() && comp.bytes().all(|byte| byte.is_ascii_digit())) {
        return false;
    }

    let Some(name) = comps.next() else {
        return false;
    };

    if comps.next().is_some() {
        return false;
    }

    let name = name.to_ascii_lowercase();
    name.rsplit_once('.').is_some_and(|(stem, ext)| !stem.is_empty() && matches!(ext, "txt" | "md" | "pdf"))
}

/// Downloads a trusted attachment, refusing anything past `limit` bytes.
pub async fn download(http: &Client, url: Url, limit: u64) -> Result<Vec<u8>, Error> {
    if !is_allowed_url(&url) {
        return Err(Error::Untrusted);
    }
    fetch(http, url, limit).await
}

async fn fetch(http: &Client, url: Url, limit: u64) -> Result<Vec<u8>, Error> {
    let mut response = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|err| {
            log::warn!("attachment request failed: {err}");
            Error::Network
        })?;

    if response.content_length().is_some_and(|len| len > limit) {
        return Err(Error::TooLarge);
    }

    // The advertised length may be absent or wrong.
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let mut blob = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|_| Error::Network)? {
        if blob.len() + chunk.len() > limit {
            return Err(Error::TooLarge);
        }
        blob.extend_from_slice(&chunk);
    }

    Ok(blob)
}
