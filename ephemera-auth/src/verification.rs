//! Single-use verification codes.
//!
//! A code binds an identity (an email address) and an intent for
//! [`CODE_TTL`]. Each code is `ISSUED` until it is either consumed, which
//! deletes it, or it expires. Neither end state leads back: asking again
//! always produces a new random code.
//!
//! Stored payload format, keyed by the code itself:
//!
//! ```text
//! <code>|<identity>|<intent>     e.g. 0123456789|a@b.com|registration
//! <code>|<identity>              legacy, no intent
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::error::{Result, ValidationError, ValidationKind};
use crate::repository::{truncate_key_for_log, TokenStore};

/// Number of digits in a verification code
pub const CODE_LENGTH: usize = 10;

/// How long an issued code stays usable
pub const CODE_TTL: Duration = Duration::from_secs(30 * 60);

const FIELD_SEPARATOR: char = '|';

/// What a verification code may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeIntent {
    Registration,
    ResetPassword,
}

impl CodeIntent {
    /// The token stored in the payload
    pub fn as_str(self) -> &'static str {
        match self {
            CodeIntent::Registration => "registration",
            CodeIntent::ResetPassword => "reset-password",
        }
    }
}

impl fmt::Display for CodeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload named an intent this crate does not know
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown code intent: {0}")]
pub struct UnknownIntent(pub String);

impl FromStr for CodeIntent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "registration" => Ok(CodeIntent::Registration),
            "reset-password" => Ok(CodeIntent::ResetPassword),
            other => Err(UnknownIntent(other.to_string())),
        }
    }
}

/// The identity and intent a code was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub code: String,
    pub identity: String,
    /// `None` for records written in the legacy two-field format
    pub intent: Option<CodeIntent>,
}

impl VerificationRecord {
    /// Renders the stored payload
    pub fn encode(&self) -> String {
        match self.intent {
            Some(intent) => format!("{}|{}|{}", self.code, self.identity, intent),
            None => format!("{}|{}", self.code, self.identity),
        }
    }

    /// Parses a stored payload
    ///
    /// Returns `None` for anything that is not valid UTF-8, lacks a code or
    /// identity, or carries an unknown intent.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let payload = std::str::from_utf8(payload).ok()?;
        let mut fields = payload.splitn(3, FIELD_SEPARATOR);

        let code = fields.next().filter(|code| !code.is_empty())?;
        let identity = fields.next().filter(|identity| !identity.is_empty())?;
        let intent = match fields.next() {
            Some(token) => Some(token.parse().ok()?),
            None => None,
        };

        Some(Self {
            code: code.to_string(),
            identity: identity.to_string(),
            intent,
        })
    }
}

/// Generates a code of [`CODE_LENGTH`] random ASCII digits
///
/// Existing codes are not consulted; see the collision note in DESIGN.md.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Whether `code` has the shape of an issued code
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Constant-time comparison of two codes.
fn codes_match(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    // Code length is public, so this early return leaks nothing
    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    a_bytes.ct_eq(b_bytes).into()
}

/// Issues and consumes verification codes over a [`TokenStore`].
#[derive(Clone)]
pub struct Verifier {
    tokens: Arc<dyn TokenStore>,
}

impl Verifier {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }

    /// Issues a fresh code bound to `identity` and `intent`
    ///
    /// The code is stored for [`CODE_TTL`]. It is returned once the store
    /// has acknowledged the write. An identity containing `|` could never be
    /// read back from the payload, so it is rejected up front.
    pub async fn issue(&self, identity: &str, intent: CodeIntent) -> Result<String> {
        if identity.is_empty() {
            return Err(ValidationError::new("email", ValidationKind::EmailEmpty).into());
        }
        if identity.contains(FIELD_SEPARATOR) {
            return Err(ValidationError::new("email", ValidationKind::EmailInvalid).into());
        }

        let record = VerificationRecord {
            code: generate_code(),
            identity: identity.to_string(),
            intent: Some(intent),
        };

        self.tokens
            .set(&record.code, record.encode().into_bytes(), CODE_TTL)
            .wait()
            .await?;

        tracing::debug!(
            code = %truncate_key_for_log(&record.code),
            %intent,
            "verification code issued"
        );
        Ok(record.code)
    }

    /// Consumes `code`, returning what it was bound to
    ///
    /// Malformed codes are rejected before the store is touched. A code that
    /// was never issued, has expired, or was already consumed is reported as
    /// [`ValidationKind::InvalidCode`], the same as a mistyped one. The
    /// lookup removes the code, so of any number of concurrent consumers at
    /// most one succeeds.
    pub async fn consume(&self, code: &str) -> Result<VerificationRecord> {
        if !is_well_formed(code) {
            return Err(ValidationError::invalid_code().into());
        }

        let Some(payload) = self.tokens.take(code).wait().await? else {
            tracing::warn!(code = %truncate_key_for_log(code), "unknown or expired code");
            return Err(ValidationError::invalid_code().into());
        };

        match VerificationRecord::decode(&payload) {
            Some(record) if codes_match(&record.code, code) => Ok(record),
            _ => {
                tracing::warn!(code = %truncate_key_for_log(code), "corrupt verification payload");
                Err(ValidationError::invalid_code().into())
            }
        }
    }

    /// Like [`Verifier::consume`], but also rejects a code issued for a
    /// different intent. Legacy records without an intent are accepted.
    pub async fn consume_for(&self, code: &str, intent: CodeIntent) -> Result<VerificationRecord> {
        let record = self.consume(code).await?;
        match record.intent {
            Some(bound) if bound != intent => {
                tracing::warn!(
                    code = %truncate_key_for_log(code),
                    expected = %intent,
                    found = %bound,
                    "code used for the wrong purpose"
                );
                Err(ValidationError::invalid_code().into())
            }
            _ => Ok(record),
        }
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Completion;
    use crate::error::Error;
    use crate::repository::MemoryTokenStore;
    use ephemera_core::{ManualClock, Store, StoreConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every call that reaches the store
    struct CountingTokenStore {
        inner: MemoryTokenStore,
        calls: AtomicUsize,
    }

    impl CountingTokenStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenStore for CountingTokenStore {
        fn find(&self, key: &str) -> Completion<Option<Arc<[u8]>>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find(key)
        }

        fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Completion<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, payload, ttl)
        }

        fn delete(&self, key: &str) -> Completion<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(key)
        }

        fn take(&self, key: &str) -> Completion<Option<Arc<[u8]>>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.take(key)
        }
    }

    struct Fixture {
        verifier: Verifier,
        tokens: Arc<CountingTokenStore>,
        store: Store,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = Store::with_clock(StoreConfig::default(), clock.clone());
        let tokens = Arc::new(CountingTokenStore {
            inner: MemoryTokenStore::new(store.clone()),
            calls: AtomicUsize::new(0),
        });
        Fixture {
            verifier: Verifier::new(tokens.clone()),
            tokens,
            store,
            clock,
        }
    }

    #[test]
    fn test_generated_codes_are_well_formed() {
        for _ in 0..1_000 {
            let code = generate_code();
            assert!(is_well_formed(&code), "bad code {code}");
        }
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed("0123456789"));
        assert!(!is_well_formed("012345678"));
        assert!(!is_well_formed("01234567890"));
        assert!(!is_well_formed("01234a6789"));
        assert!(!is_well_formed("٠١٢٣٤٥٦٧٨٩"));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn test_codes_match() {
        assert!(codes_match("0123456789", "0123456789"));
        assert!(!codes_match("0123456789", "0123456788"));
        assert!(!codes_match("0123456789", "012345678"));
    }

    #[test]
    fn test_record_payload_format() {
        let record = VerificationRecord {
            code: "0123456789".to_string(),
            identity: "a@b.com".to_string(),
            intent: Some(CodeIntent::ResetPassword),
        };
        assert_eq!(record.encode(), "0123456789|a@b.com|reset-password");
        assert_eq!(VerificationRecord::decode(record.encode().as_bytes()), Some(record));
    }

    #[test]
    fn test_decode_accepts_legacy_two_field_form() {
        let record = VerificationRecord::decode(b"0123456789|a@b.com").unwrap();
        assert_eq!(record.identity, "a@b.com");
        assert_eq!(record.intent, None);
        assert_eq!(record.encode(), "0123456789|a@b.com");
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert_eq!(VerificationRecord::decode(b""), None);
        assert_eq!(VerificationRecord::decode(b"0123456789"), None);
        assert_eq!(VerificationRecord::decode(b"0123456789|"), None);
        assert_eq!(VerificationRecord::decode(b"|a@b.com|registration"), None);
        assert_eq!(VerificationRecord::decode(b"0123456789|a@b.com|delete-account"), None);
        assert_eq!(VerificationRecord::decode(&[0xff, 0xfe, b'|', b'a']), None);
    }

    #[test]
    fn test_intent_tokens() {
        assert_eq!("registration".parse(), Ok(CodeIntent::Registration));
        assert_eq!("reset-password".parse(), Ok(CodeIntent::ResetPassword));
        assert_eq!(
            "Registration".parse::<CodeIntent>(),
            Err(UnknownIntent("Registration".to_string()))
        );
    }

    #[tokio::test]
    async fn test_issue_then_consume_once() {
        let fx = fixture();

        let code = fx.verifier.issue("a@b.com", CodeIntent::Registration).await.unwrap();
        assert!(is_well_formed(&code));

        let record = fx.verifier.consume(&code).await.unwrap();
        assert_eq!(record.code, code);
        assert_eq!(record.identity, "a@b.com");
        assert_eq!(record.intent, Some(CodeIntent::Registration));
        assert!(fx.store.is_empty());

        let err = fx.verifier.consume(&code).await.unwrap_err();
        assert!(err.is_invalid_code());
    }

    #[tokio::test]
    async fn test_issue_stores_payload_with_thirty_minute_ttl() {
        let fx = fixture();
        let code = fx.verifier.issue("a@b.com", CodeIntent::ResetPassword).await.unwrap();

        let payload = fx.store.get(&code).unwrap();
        assert_eq!(&*payload, format!("{code}|a@b.com|reset-password").as_bytes());

        fx.clock.advance(CODE_TTL - Duration::from_secs(1));
        assert!(fx.store.contains_key(&code));

        fx.clock.advance(Duration::from_secs(1));
        assert!(!fx.store.contains_key(&code));
    }

    #[tokio::test]
    async fn test_issue_rejects_empty_identity() {
        let fx = fixture();
        let err = fx.verifier.issue("", CodeIntent::Registration).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(fx.tokens.calls(), 0);
    }

    #[tokio::test]
    async fn test_issue_rejects_identity_with_separator() {
        let fx = fixture();
        let err = fx
            .verifier
            .issue("a|b@c.com", CodeIntent::Registration)
            .await
            .unwrap_err();
        match err {
            Error::Validation(err) => {
                assert_eq!(err.field, "email");
                assert_eq!(err.kind, ValidationKind::EmailInvalid);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(fx.tokens.calls(), 0);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_code_is_invalid() {
        let fx = fixture();
        let code = fx.verifier.issue("a@b.com", CodeIntent::Registration).await.unwrap();

        fx.clock.advance(CODE_TTL);

        let err = fx.verifier.consume(&code).await.unwrap_err();
        assert!(err.is_invalid_code());
    }

    #[tokio::test]
    async fn test_malformed_code_never_reaches_store() {
        let fx = fixture();

        for code in ["", "123", "01234567890", "abcdefghij", "01234 6789"] {
            let err = fx.verifier.consume(code).await.unwrap_err();
            assert!(err.is_invalid_code());
        }

        assert_eq!(fx.tokens.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_code_is_invalid() {
        let fx = fixture();
        let err = fx.verifier.consume("0000000000").await.unwrap_err();
        assert!(err.is_invalid_code());
        assert_eq!(fx.tokens.calls(), 1);
    }

    #[tokio::test]
    async fn test_payload_for_other_code_is_rejected_and_removed() {
        let fx = fixture();
        fx.store.set(
            "1111111111",
            b"2222222222|a@b.com|registration".to_vec(),
            CODE_TTL,
        );

        let err = fx.verifier.consume("1111111111").await.unwrap_err();
        assert!(err.is_invalid_code());
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_payload_is_consumable() {
        let fx = fixture();
        fx.store.set("1234567890", b"1234567890|a@b.com".to_vec(), CODE_TTL);

        let record = fx
            .verifier
            .consume_for("1234567890", CodeIntent::ResetPassword)
            .await
            .unwrap();
        assert_eq!(record.identity, "a@b.com");
        assert_eq!(record.intent, None);
    }

    #[tokio::test]
    async fn test_consume_for_rejects_other_intent() {
        let fx = fixture();
        let code = fx.verifier.issue("a@b.com", CodeIntent::Registration).await.unwrap();

        let err = fx
            .verifier
            .consume_for(&code, CodeIntent::ResetPassword)
            .await
            .unwrap_err();
        assert!(err.is_invalid_code());

        // The attempt used the code up
        let err = fx
            .verifier
            .consume_for(&code, CodeIntent::Registration)
            .await
            .unwrap_err();
        assert!(err.is_invalid_code());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_have_one_winner() {
        let fx = fixture();
        let code = fx.verifier.issue("a@b.com", CodeIntent::Registration).await.unwrap();

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let verifier = fx.verifier.clone();
                let code = code.clone();
                tokio::spawn(async move { verifier.consume(&code).await })
            })
            .collect();

        let mut winners = 0;
        for attempt in futures::future::join_all(attempts).await {
            match attempt.unwrap() {
                Ok(record) => {
                    assert_eq!(record.identity, "a@b.com");
                    winners += 1;
                }
                Err(err) => assert!(err.is_invalid_code()),
            }
        }
        assert_eq!(winners, 1);
    }
}
