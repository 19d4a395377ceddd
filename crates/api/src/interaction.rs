use crate::Bot;
use ed25519_dalek::{Signature, VerifyingKey};
use http_body_util::{BodyExt, Full, Limited};
use hyper::{
    body::{Body, Bytes},
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, Response, StatusCode,
};

/// Interaction payloads are small. Anything larger is rejected before verification.
const MAX_PAYLOAD: usize = 64 * 1024;

/// Checks Discord's Ed25519 signature over `timestamp || body`.
pub struct Verifier(VerifyingKey);

impl Verifier {
    /// Parses the hex-encoded public key from the application's developer portal.
    pub fn from_hex(key: &str) -> Option<Self> {
        let mut bytes = [0; 32];
        hex::decode_to_slice(key.trim(), &mut bytes).ok()?;
        VerifyingKey::from_bytes(&bytes).ok().map(Self)
    }

    pub fn verify(&self, signature: &[u8], timestamp: &[u8], body: &[u8]) -> bool {
        let mut bytes = [0; 64];
        if hex::decode_to_slice(signature, &mut bytes).is_err() {
            return false;
        }

        let signature = Signature::from_bytes(&bytes);
        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp);
        message.extend_from_slice(body);
        self.0.verify_strict(&message, &signature).is_ok()
    }
}

/// Handles one webhook request. Failures become bare status codes.
pub async fn respond<B>(req: Request<B>, verifier: &Verifier, bot: &Bot) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    match try_respond(req, verifier, bot).await {
        Ok(res) => res,
        Err(code) => {
            let mut res = Response::new(Full::default());
            *res.status_mut() = code;
            res
        }
    }
}

async fn try_respond<B>(req: Request<B>, verifier: &Verifier, bot: &Bot) -> Result<Response<Full<Bytes>>, StatusCode>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if req.method() != Method::POST {
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }

    // For now, we only allow requests from the root endpoint.
    if req.uri().path() != "/" {
        return Err(StatusCode::NOT_FOUND);
    }

    // Retrieve security headers
    let (parts, body) = req.into_parts();
    let signature = parts.headers.get("X-Signature-Ed25519").ok_or(StatusCode::UNAUTHORIZED)?;
    let timestamp = parts.headers.get("X-Signature-Timestamp").ok_or(StatusCode::UNAUTHORIZED)?;

    // Validate the challenge
    let payload = Limited::new(body, MAX_PAYLOAD).collect().await.map_err(|_| StatusCode::BAD_REQUEST)?.to_bytes();
    if !verifier.verify(signature.as_bytes(), timestamp.as_bytes(), &payload) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Parse incoming interaction
    let interaction = serde_json::from_slice(&payload).map_err(|_| StatusCode::BAD_REQUEST)?;
    drop(payload);

    // Construct new body
    let reply = bot.on_message(interaction).await;
    let bytes = serde_json::to_vec(&reply).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut res = Response::new(Full::new(Bytes::from(bytes)));
    res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(res)
}
