//! PKCE verifier/challenge pairs and CSRF state for the authorization code flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE code verifier and S256 challenge.
#[derive(Debug, Clone)]
pub(crate) struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a PKCE code verifier and S256 challenge.
///
/// The verifier is a random 43-character string using unreserved URI characters.
/// The challenge is the base64url-encoded SHA-256 hash of the verifier.
pub(crate) fn generate_pkce_pair() -> PkcePair {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
    let mut rng = rand::thread_rng();
    let verifier: String = (0..43)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    PkcePair {
        challenge: challenge_for(&verifier),
        verifier,
    }
}

pub(crate) fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a random state parameter for CSRF protection.
pub(crate) fn generate_state() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}
