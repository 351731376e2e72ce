//! Signed line framing for the tick feed.
//!
//! One frame per line: `<json body>|sig:<64 hex>\n`. The signature covers the
//! exact body bytes. The separator is located from the right, so a body that
//! happens to contain the literal `|sig:` substring still decodes.

use crate::models::Tick;
use crate::sig;

/// Separator between body and signature.
pub const SIG_SEP: &str = "|sig:";

/// Sign `body` into a frame without the trailing newline.
pub fn sign_frame(secret: &str, body: &str) -> String {
    let mut frame = String::with_capacity(body.len() + SIG_SEP.len() + 64);
    frame.push_str(body);
    frame.push_str(SIG_SEP);
    frame.push_str(&sig::sign(secret, body));
    frame
}

/// Sign `body` and terminate with exactly one newline.
pub fn encode(secret: &str, body: &str) -> String {
    let mut frame = sign_frame(secret, body);
    frame.push('\n');
    frame
}

/// Why an inbound line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// No `|sig:` separator anywhere in the line.
    MissingSignature,
    /// Signature present but does not verify against the body.
    BadSignature,
    /// Verified body failed to parse as a tick record.
    BadBody(String),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "frame has no signature separator"),
            Self::BadSignature => write!(f, "signature mismatch"),
            Self::BadBody(e) => write!(f, "malformed body: {e}"),
        }
    }
}

impl std::error::Error for WireError {}

/// Decode one wire line into a verified tick.
pub fn decode_line(secret: &str, line: &str) -> Result<Tick, WireError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let pos = line.rfind(SIG_SEP).ok_or(WireError::MissingSignature)?;
    let body = &line[..pos];
    let sig_hex = &line[pos + SIG_SEP.len()..];
    if !sig::verify(secret, body, sig_hex) {
        return Err(WireError::BadSignature);
    }
    serde_json::from_str(body).map_err(|e| WireError::BadBody(e.to_string()))
}
