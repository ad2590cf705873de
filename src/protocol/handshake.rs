//! Namespace/password handshake.
//!
//! The server opens every connection with a `Hello` carrying its namespace and
//! a fresh random nonce. The client answers with the namespace it claims and a
//! credential bound to that nonce:
//!
//! ```text
//! credential = SHA-256("nemoria-auth-v1" || nonce || len(namespace) || namespace || password)
//! ```
//!
//! The password itself never crosses the wire, and a captured credential is
//! useless on any other connection because the nonce changes. The server
//! compares credentials in constant time and rejects with a single
//! `AuthRejected` that does not say which half was wrong.
//!
//! Handshake state is per connection: [`ServerHandshakeState`] lives only as
//! long as the connection task that created it.

use crate::config::{Secret, PROTOCOL_VERSION};
use crate::error::{constants, NemoriaError, Result};
use crate::protocol::message::Message;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use zeroize::Zeroize;

const CREDENTIAL_DOMAIN: &[u8] = b"nemoria-auth-v1";

/// Server-side handshake state - passed through the handshake flow
#[derive(Debug)]
pub struct ServerHandshakeState {
    namespace: String,
    nonce: [u8; 16],
}

impl ServerHandshakeState {
    /// Namespace advertised on this connection
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get reference to server nonce (for testing)
    #[cfg(test)]
    pub fn nonce(&self) -> &[u8; 16] {
        &self.nonce
    }
}

/// Generate a cryptographically secure random nonce
fn generate_nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

/// Derive the credential proving knowledge of `password` for this nonce.
pub fn derive_credential(nonce: &[u8; 16], namespace: &str, password: &Secret) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(CREDENTIAL_DOMAIN);
    hasher.update(nonce);
    // length prefix keeps (namespace, password) pairs unambiguous
    hasher.update((namespace.len() as u64).to_be_bytes());
    hasher.update(namespace.as_bytes());
    hasher.update(password.expose().as_bytes());
    hasher.finalize().into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Server opens the handshake.
///
/// # Returns
/// A tuple of (new `ServerHandshakeState`, `Message::Hello`)
#[instrument(skip(namespace))]
pub fn server_hello(namespace: &str) -> (ServerHandshakeState, Message) {
    let nonce = generate_nonce();
    debug!("Server sending hello");
    (
        ServerHandshakeState {
            namespace: namespace.to_string(),
            nonce,
        },
        Message::Hello {
            version: PROTOCOL_VERSION,
            namespace: namespace.to_string(),
            nonce,
        },
    )
}

/// Client answers a `Hello`.
///
/// `claimed_namespace` overrides the advertised one when the client was
/// configured with an explicit namespace.
///
/// # Errors
/// Returns `ProtocolError`-kind errors if `hello` is not a `Hello` or carries
/// an unsupported protocol version.
#[instrument(skip(hello, password))]
pub fn client_authenticate(
    hello: Message,
    claimed_namespace: Option<&str>,
    password: &Secret,
) -> Result<(String, Message)> {
    let (version, advertised, nonce) = match hello {
        Message::Hello {
            version,
            namespace,
            nonce,
        } => (version, namespace, nonce),
        other => {
            return Err(NemoriaError::UnexpectedMessage(format!(
                "{}, got {}",
                constants::ERR_EXPECTED_HELLO,
                other.name()
            )))
        }
    };

    if version != PROTOCOL_VERSION {
        return Err(NemoriaError::UnsupportedVersion(version));
    }

    let namespace = claimed_namespace.map_or(advertised, str::to_owned);
    let credential = derive_credential(&nonce, &namespace, password);
    debug!(%namespace, "Client answering hello");

    Ok((
        namespace.clone(),
        Message::Authenticate {
            namespace,
            credential,
        },
    ))
}

/// Server checks the client's answer.
///
/// # Errors
/// `AuthenticationFailed` on a namespace or credential mismatch, an
/// `UnexpectedMessage` error if `answer` is not an `Authenticate` frame.
#[instrument(skip(state, password, answer))]
pub fn server_verify(
    state: ServerHandshakeState,
    password: &Secret,
    answer: Message,
) -> Result<()> {
    let (namespace, mut credential) = match answer {
        Message::Authenticate {
            namespace,
            credential,
        } => (namespace, credential),
        other => {
            return Err(NemoriaError::UnexpectedMessage(format!(
                "{}, got {}",
                constants::ERR_EXPECTED_AUTH,
                other.name()
            )))
        }
    };

    let mut expected = derive_credential(&state.nonce, &state.namespace, password);
    let credential_ok = constant_time_eq(&expected, &credential);
    expected.zeroize();
    credential.zeroize();

    // evaluate both checks so timing does not reveal which one failed
    let namespace_ok = namespace == state.namespace;
    if namespace_ok & credential_ok {
        debug!("Client authenticated");
        Ok(())
    } else {
        warn!("Client failed authentication");
        Err(NemoriaError::AuthenticationFailed)
    }
}

/// Client interprets the server's verdict.
pub fn client_finish(verdict: Message) -> Result<()> {
    match verdict {
        Message::AuthAccepted => Ok(()),
        Message::AuthRejected => Err(NemoriaError::AuthenticationFailed),
        other => Err(NemoriaError::UnexpectedMessage(format!(
            "{}, got {}",
            constants::ERR_EXPECTED_AUTH_RESULT,
            other.name()
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn matching_credentials_pass() {
        let password = Secret::new("12345678");
        let (state, hello) = server_hello("TEST");
        let (namespace, answer) = client_authenticate(hello, None, &password).unwrap();
        assert_eq!(namespace, "TEST");
        server_verify(state, &password, answer).unwrap();
    }

    #[test]
    fn wrong_password_fails() {
        let (state, hello) = server_hello("TEST");
        let (_, answer) = client_authenticate(hello, None, &Secret::new("wrong")).unwrap();
        let err = server_verify(state, &Secret::new("12345678"), answer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn wrong_namespace_fails_with_same_error() {
        let password = Secret::new("12345678");
        let (state, hello) = server_hello("TEST");
        let (_, answer) = client_authenticate(hello, Some("OTHER"), &password).unwrap();
        let err = server_verify(state, &password, answer).unwrap_err();
        assert!(matches!(err, NemoriaError::AuthenticationFailed));
    }

    #[test]
    fn credential_is_bound_to_nonce() {
        let password = Secret::new("pw");
        let (state_a, hello_a) = server_hello("NS");
        let (state_b, _) = server_hello("NS");
        assert_ne!(state_a.nonce(), state_b.nonce());

        let (_, answer_a) = client_authenticate(hello_a, None, &password).unwrap();
        // replaying connection A's answer on connection B is rejected
        assert!(server_verify(state_b, &password, answer_a.clone()).is_err());
        assert!(server_verify(state_a, &password, answer_a).is_ok());
    }

    #[test]
    fn out_of_sequence_frames_are_protocol_errors() {
        let password = Secret::new("pw");
        let err = client_authenticate(Message::AuthAccepted, None, &password).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);

        let (state, _) = server_hello("NS");
        let err = server_verify(state, &password, Message::Disconnect).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);

        assert!(client_finish(Message::AuthAccepted).is_ok());
        assert!(matches!(
            client_finish(Message::AuthRejected),
            Err(NemoriaError::AuthenticationFailed)
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let hello = Message::Hello {
            version: PROTOCOL_VERSION + 1,
            namespace: "NS".into(),
            nonce: [0; 16],
        };
        let err = client_authenticate(hello, None, &Secret::new("pw")).unwrap_err();
        assert!(matches!(err, NemoriaError::UnsupportedVersion(_)));
    }
}
