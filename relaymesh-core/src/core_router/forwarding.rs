//! Envelope construction and the per-hop forwarding decision
//!
//! Confidentiality is end to end: the session key is wrapped for the final
//! destination only, and intermediate hops pass `message`, `key` and
//! `binary` through untouched while the path shrinks by one node per hop.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use crate::core_crypto::{unwrap_session_key, wrap_session_key, RelayKeyPair, SessionKey};
use crate::core_model::{Envelope, Node, Route};
use crate::error::{RelayError, RelayResult};

/// Why an inbound envelope was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    EmptyPath,
    /// The path head names another router
    WrongHop { addressed_to: String },
}

impl Refusal {
    pub fn reason(&self) -> &'static str {
        match self {
            Refusal::EmptyPath => "empty_path",
            Refusal::WrongHop { .. } => "wrong_hop",
        }
    }
}

impl From<Refusal> for RelayError {
    fn from(refusal: Refusal) -> Self {
        match refusal {
            Refusal::EmptyPath => RelayError::Authorization("envelope has an empty path".into()),
            Refusal::WrongHop { addressed_to } => RelayError::Authorization(format!(
                "envelope is addressed to {}",
                addressed_to
            )),
        }
    }
}

/// Outcome of running an inbound envelope through the forwarding checks
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Refuse(Refusal),
    /// This router is the destination
    Deliver(Envelope),
    /// Pass the envelope, path already advanced, to `next_hop`
    Forward { next_hop: Node, envelope: Envelope },
}

/// Decide what `local` does with an inbound envelope
pub fn decide(local: &str, mut envelope: Envelope) -> Decision {
    let head = match envelope.current_hop() {
        Some(head) => head,
        None => return Decision::Refuse(Refusal::EmptyPath),
    };
    if head.name != local {
        return Decision::Refuse(Refusal::WrongHop {
            addressed_to: head.name.clone(),
        });
    }
    if envelope.is_destination(local) {
        return Decision::Deliver(envelope);
    }

    match envelope.advance().cloned() {
        Some(next_hop) => Decision::Forward { next_hop, envelope },
        // Head is local but not the tail, so a second hop exists.
        None => Decision::Refuse(Refusal::EmptyPath),
    }
}

/// Encrypt a message for `route.destination` and address it to the first hop
///
/// A fresh session key is generated for every call. File payloads are base64
/// encoded before encryption.
pub fn seal(route: &Route, message: &str, payload: Option<&[u8]>) -> RelayResult<Envelope> {
    if !route.is_reachable() {
        return Err(RelayError::NoRoute(route.destination.name.clone()));
    }
    let destination = route.path.last().unwrap_or(&route.destination);

    let session_key = SessionKey::generate();
    let message_ct = session_key.encrypt_text(message)?;
    let binary = match payload {
        Some(bytes) => session_key.encrypt_text(&STANDARD.encode(bytes))?,
        None => String::new(),
    };

    let public_key = destination.public_key.as_deref().unwrap_or_default();
    if destination.public_key_pem().is_none() {
        warn!(destination = %destination.name, "Destination public key is empty");
    }
    let key = wrap_session_key(&session_key, public_key)?;

    Ok(Envelope {
        message: message_ct,
        path: route.path[1..].to_vec(),
        key,
        is_file: payload.is_some(),
        binary,
    })
}

/// Plaintext recovered at the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub message: String,
    pub file: Option<Vec<u8>>,
}

/// Unwrap the session key and decrypt everything the envelope carries
pub fn open(envelope: &Envelope, keys: &RelayKeyPair) -> RelayResult<Opened> {
    let session_key = unwrap_session_key(&envelope.key, keys)?;
    let message = session_key.decrypt_text(&envelope.message)?;

    let file = if envelope.is_file {
        let encoded = session_key.decrypt_text(&envelope.binary)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(crate::core_crypto::CryptoError::from)?;
        Some(bytes)
    } else {
        None
    };

    Ok(Opened { message, file })
}
