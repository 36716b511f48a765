//! Identity verification for opening locked contacts.
//!
//! The rest of the crate only sees the `Authenticator` capability. Hardware
//! biometrics live outside this crate; the bundled implementation is a
//! device-credential challenge whose answer is compared against a stored
//! SHA-256 digest.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Text shown on the verification prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub title: String,
    pub subtitle: String,
}

impl Default for AuthRequest {
    fn default() -> Self {
        Self {
            title: "Unlock contact".to_string(),
            subtitle: "Confirm your identity to view this contact".to_string(),
        }
    }
}

/// The result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Succeeded,
    /// Wrong answer or hardware error. The string is shown to the user.
    Failed(String),
    Cancelled,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// False when no verification method is enrolled.
    fn is_available(&self) -> bool;

    /// Run one challenge. Dropping the future cancels it.
    async fn authenticate(&self, request: &AuthRequest) -> AuthOutcome;
}

/// SHA-256 hex digest of the trimmed answer.
pub fn hash_credential(answer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(answer.trim().as_bytes());
    hex::encode(hasher.finalize())
}

fn verify_credential(answer: &str, expected_hash: &str) -> bool {
    hash_credential(answer).eq_ignore_ascii_case(expected_hash.trim())
}

/// Source of the user's answer. Returns `None` when the user cancels.
pub type CredentialPrompt = Arc<dyn Fn(&AuthRequest) -> Option<String> + Send + Sync>;

/// Device-credential check against a configured digest.
pub struct CredentialAuthenticator {
    expected_hash: Option<String>,
    prompt: CredentialPrompt,
}

impl CredentialAuthenticator {
    pub fn new(expected_hash: Option<String>, prompt: CredentialPrompt) -> Self {
        Self {
            expected_hash: expected_hash.filter(|h| !h.trim().is_empty()),
            prompt,
        }
    }

    /// Prompt on the terminal. An empty line or EOF cancels.
    pub fn stdin(expected_hash: Option<String>) -> Self {
        Self::new(expected_hash, Arc::new(read_stdin_answer))
    }
}

fn read_stdin_answer(request: &AuthRequest) -> Option<String> {
    let mut stderr = io::stderr();
    let _ = write!(stderr, "{}\n{}\nCredential: ", request.title, request.subtitle);
    let _ = stderr.flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) if line.trim().is_empty() => None,
        Ok(_) => Some(line),
    }
}

#[async_trait]
impl Authenticator for CredentialAuthenticator {
    fn is_available(&self) -> bool {
        self.expected_hash.is_some()
    }

    async fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        let Some(expected) = self.expected_hash.clone() else {
            return AuthOutcome::Failed("No device credential is configured".to_string());
        };

        let prompt = Arc::clone(&self.prompt);
        let request = request.clone();
        let answer = match tokio::task::spawn_blocking(move || prompt(&request)).await {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Credential prompt task failed: {}", e);
                return AuthOutcome::Failed("Authentication error".to_string());
            }
        };

        match answer {
            None => AuthOutcome::Cancelled,
            Some(answer) if verify_credential(&answer, &expected) => AuthOutcome::Succeeded,
            Some(_) => {
                log::warn!("Credential verification failed");
                AuthOutcome::Failed("Authentication failed".to_string())
            }
        }
    }
}
