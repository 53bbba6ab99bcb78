//! Request orchestrator.
//!
//! One flow per request, advancing through explicit states:
//!
//! ```text
//! AwaitingInput -> ValidatingKeys -> Processing -> Completed
//!                        │               │
//!                        └────────► Failed ◄─────┘
//! ```
//!
//! Key presence is validated before any decoding or cryptographic work
//! (fail fast); any component error is terminal with the originating
//! error surfaced. There are no retries: key and format errors are
//! deterministic. Output is all-or-nothing - the message is buffered in
//! full and discarded wholesale on failure.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sealpost_pgp::{EncryptOptions, RecipientKey, SignerKey, encrypt_and_sign};

use crate::{
    config::{PASSPHRASE_SIGN, PRIVATE_KEY_SIGN, PUBLIC_KEY, SecretsProvider},
    error::ApiError,
};

/// Orchestration states for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Request received, nothing validated yet
    AwaitingInput,
    /// Checking presence of required key material
    ValidatingKeys,
    /// Keys loaded, cryptographic pipeline running
    Processing,
    /// Message assembled and returned
    Completed,
    /// Terminal error; the originating error was surfaced to the caller
    Failed,
}

/// Key material resolved for one request.
struct ResolvedKeys {
    recipient: RecipientKey,
    signer: SignerKey,
}

/// Single-request orchestrator over a secrets provider.
pub struct RequestFlow<'a> {
    provider: &'a dyn SecretsProvider,
    options: EncryptOptions,
    state: FlowState,
}

impl<'a> RequestFlow<'a> {
    /// Start a flow in `AwaitingInput`.
    pub fn new(provider: &'a dyn SecretsProvider, options: EncryptOptions) -> Self {
        Self { provider, options, state: FlowState::AwaitingInput }
    }

    /// Current state (observability and tests).
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Run the flow to completion over the request body.
    ///
    /// `now_secs` is wall-clock seconds since the Unix epoch, stamped into
    /// the signature.
    pub fn run(&mut self, body: &[u8], now_secs: u64) -> Result<Vec<u8>, ApiError> {
        self.state = FlowState::ValidatingKeys;
        let keys = match self.resolve_keys() {
            Ok(keys) => keys,
            Err(err) => {
                self.state = FlowState::Failed;
                return Err(err);
            },
        };

        self.state = FlowState::Processing;
        match Self::process(&keys, body, now_secs, &self.options) {
            Ok(message) => {
                self.state = FlowState::Completed;
                Ok(message)
            },
            Err(err) => {
                self.state = FlowState::Failed;
                Err(err)
            },
        }
    }

    /// Presence checks first (no decoding), then base64 decode, then key
    /// parsing. The error for a missing value names the configuration key.
    fn resolve_keys(&self) -> Result<ResolvedKeys, ApiError> {
        let public_b64 = self
            .provider
            .get(PUBLIC_KEY)
            .ok_or(ApiError::Configuration { name: PUBLIC_KEY })?;
        let private_b64 = self
            .provider
            .get(PRIVATE_KEY_SIGN)
            .ok_or(ApiError::Configuration { name: PRIVATE_KEY_SIGN })?;
        let passphrase = self.provider.get(PASSPHRASE_SIGN);

        let public = STANDARD
            .decode(public_b64.trim())
            .map_err(|source| ApiError::InvalidBase64 { name: PUBLIC_KEY, source })?;
        let private = STANDARD
            .decode(private_b64.trim())
            .map_err(|source| ApiError::InvalidBase64 { name: PRIVATE_KEY_SIGN, source })?;

        let recipient = RecipientKey::from_bytes(&public)?;
        let signer = SignerKey::from_bytes(&private, passphrase.as_deref())?;

        Ok(ResolvedKeys { recipient, signer })
    }

    fn process(
        keys: &ResolvedKeys,
        body: &[u8],
        now_secs: u64,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>, ApiError> {
        let mut message = Vec::new();
        let summary = encrypt_and_sign(
            &mut &body[..],
            &mut message,
            &keys.recipient,
            &keys.signer,
            now_secs,
            options,
        )?;

        tracing::debug!(
            plaintext_len = summary.plaintext_len,
            message_len = summary.message_len,
            recipient = %summary.recipient,
            signer = %summary.signer,
            "message assembled"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticSecrets;

    fn options() -> EncryptOptions {
        EncryptOptions::default()
    }

    #[test]
    fn starts_awaiting_input() {
        let provider = StaticSecrets::new();
        let flow = RequestFlow::new(&provider, options());
        assert_eq!(flow.state(), FlowState::AwaitingInput);
    }

    #[test]
    fn missing_public_key_fails_fast() {
        let provider = StaticSecrets::new();
        let mut flow = RequestFlow::new(&provider, options());

        let err = flow.run(b"payload", 0).unwrap_err();
        assert_eq!(flow.state(), FlowState::Failed);
        assert!(err.to_string().contains("pgp-public-key"));
    }

    #[test]
    fn missing_private_key_fails_fast() {
        let provider = StaticSecrets::new().with(PUBLIC_KEY, "dGVzdA==");
        let mut flow = RequestFlow::new(&provider, options());

        let err = flow.run(b"payload", 0).unwrap_err();
        assert_eq!(flow.state(), FlowState::Failed);
        assert!(err.to_string().contains("pgp-private-key-sign"));
    }

    #[test]
    fn invalid_base64_is_a_client_error() {
        let provider = StaticSecrets::new()
            .with(PUBLIC_KEY, "!!! not base64 !!!")
            .with(PRIVATE_KEY_SIGN, "dGVzdA==");
        let mut flow = RequestFlow::new(&provider, options());

        let err = flow.run(b"payload", 0).unwrap_err();
        assert_eq!(flow.state(), FlowState::Failed);
        assert!(matches!(err, ApiError::InvalidBase64 { name: PUBLIC_KEY, .. }));
    }
}
