//! QKD key material interface
//!
//! A QKD link delivers the same random bytes to both ends of a session.
//! Each end may read a session at most once: a second fetch through the same
//! endpoint is [`Error::KeyExhausted`], never a replay of the bytes. Once both
//! ends have read it the material is wiped and the session is retired.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use qumail_crypto::keys::OtpKey;

use crate::error::{Error, Result};

/// Key material for one session, wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct QkdKeyMaterial {
    #[zeroize(skip)]
    session_id: String,
    bytes: Vec<u8>,
}

impl QkdKeyMaterial {
    /// Wrap fetched bytes
    pub fn new(session_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            session_id: session_id.into(),
            bytes,
        }
    }

    /// Session the material belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Material length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the material is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hand the bytes to the one-time pad
    pub fn into_otp_key(mut self) -> OtpKey {
        OtpKey::new(std::mem::take(&mut self.bytes))
    }
}

impl std::fmt::Debug for QkdKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QkdKeyMaterial")
            .field("session_id", &self.session_id)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Source of QKD key material
#[async_trait]
pub trait QkdClient: Send + Sync {
    /// Fetch `length` bytes for `session_id`
    ///
    /// Outcomes: the bytes, [`Error::KeyExhausted`] if this client already
    /// handed them out, or [`Error::QkdUnavailable`].
    async fn fetch_key(&self, session_id: &str, length: usize) -> Result<QkdKeyMaterial>;
}

/// Number of ends that read a session before it is retired
pub const SESSION_PARTIES: usize = 2;

/// Pool state of one QKD session
///
/// Shared by both ends of the link. Material is handed to each party once;
/// when the last party has it, the bytes are wiped and only the retired
/// marker remains so the session id cannot be refilled.
#[derive(Serialize, Deserialize)]
pub struct QkdSession {
    material: Vec<u8>,
    parties: Vec<String>,
    retired: bool,
}

impl QkdSession {
    /// Fresh session of `length` random bytes
    pub fn generate(length: usize) -> Result<Self> {
        let mut material = vec![0u8; length];
        OsRng
            .try_fill_bytes(&mut material)
            .map_err(|e| Error::QkdUnavailable(format!("entropy source failed: {}", e)))?;
        Ok(Self {
            material,
            parties: Vec::new(),
            retired: false,
        })
    }

    /// Hand the material to `party`, retiring the session after the last end
    ///
    /// A length mismatch is [`Error::QkdUnavailable`] and leaves the session
    /// untouched.
    pub fn claim(&mut self, session_id: &str, party: &str, length: usize) -> Result<QkdKeyMaterial> {
        if self.retired || self.has_consumed(party) {
            warn!(party, session_id, "QKD session already consumed");
            return Err(Error::KeyExhausted(session_id.to_string()));
        }
        if self.material.len() != length {
            return Err(Error::QkdUnavailable(format!(
                "session {} holds {} bytes, {} requested",
                session_id,
                self.material.len(),
                length
            )));
        }

        self.parties.push(party.to_string());
        let delivered = QkdKeyMaterial::new(session_id, self.material.clone());
        if self.parties.len() >= SESSION_PARTIES {
            self.material.zeroize();
            self.retired = true;
            info!(session_id, "QKD session retired");
        }
        Ok(delivered)
    }

    /// Whether `party` already read this session
    pub fn has_consumed(&self, party: &str) -> bool {
        self.parties.iter().any(|p| p == party)
    }

    /// Whether every end has read the session
    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

impl Drop for QkdSession {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

impl std::fmt::Debug for QkdSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QkdSession")
            .field("len", &self.material.len())
            .field("parties", &self.parties)
            .field("retired", &self.retired)
            .finish()
    }
}

/// Simulated QKD link shared by several parties
///
/// Material is generated from the OS RNG the first time any party asks for a
/// session and is then served once to each of its two ends.
#[derive(Clone, Default)]
pub struct SimulatedQkdNetwork {
    pool: Arc<DashMap<String, QkdSession>>,
}

impl SimulatedQkdNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint for one party
    pub fn endpoint(&self, party: impl Into<String>) -> SimulatedQkdEndpoint {
        SimulatedQkdEndpoint {
            party: party.into(),
            pool: Arc::clone(&self.pool),
            online: AtomicBool::new(true),
            delay: None,
        }
    }

    /// Number of sessions still holding material
    pub fn session_count(&self) -> usize {
        self.pool.iter().filter(|session| !session.is_retired()).count()
    }

    /// Whether both ends have read `session_id`
    pub fn is_retired(&self, session_id: &str) -> bool {
        self.pool
            .get(session_id)
            .map_or(false, |session| session.is_retired())
    }
}

/// One party's view of a [`SimulatedQkdNetwork`]
pub struct SimulatedQkdEndpoint {
    party: String,
    pool: Arc<DashMap<String, QkdSession>>,
    online: AtomicBool,
    delay: Option<Duration>,
}

impl SimulatedQkdEndpoint {
    /// Delay every fetch, to exercise caller timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Take the endpoint on or off line
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Whether the endpoint serves requests
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether this endpoint has already consumed `session_id`
    pub fn is_consumed(&self, session_id: &str) -> bool {
        self.pool
            .get(session_id)
            .map_or(false, |session| session.has_consumed(&self.party))
    }
}

#[async_trait]
impl QkdClient for SimulatedQkdEndpoint {
    async fn fetch_key(&self, session_id: &str, length: usize) -> Result<QkdKeyMaterial> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.is_online() {
            return Err(Error::QkdUnavailable(format!("{} is offline", self.party)));
        }

        let material = match self.pool.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => entry.get_mut().claim(session_id, &self.party, length)?,
            Entry::Vacant(entry) => {
                let mut session = QkdSession::generate(length)?;
                let material = session.claim(session_id, &self.party, length)?;
                entry.insert(session);
                material
            }
        };

        debug!(party = %self.party, session_id, length, "QKD key delivered");
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[tokio::test]
    async fn test_both_parties_receive_same_bytes_once() {
        let network = SimulatedQkdNetwork::new();
        let alice = network.endpoint("alice");
        let bob = network.endpoint("bob");

        let a = alice.fetch_key("s1", 32).await.unwrap();
        let b = bob.fetch_key("s1", 32).await.unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.session_id(), "s1");

        let again = alice.fetch_key("s1", 32).await.unwrap_err();
        assert_eq!(again.kind(), FailureKind::KeyExhaustedFailure);
        assert!(alice.is_consumed("s1"));
    }

    #[tokio::test]
    async fn test_session_retired_after_both_ends() {
        let network = SimulatedQkdNetwork::new();
        let alice = network.endpoint("alice");
        let bob = network.endpoint("bob");
        let carol = network.endpoint("carol");

        alice.fetch_key("s1", 16).await.unwrap();
        assert_eq!(network.session_count(), 1);
        bob.fetch_key("s1", 16).await.unwrap();

        assert!(network.is_retired("s1"));
        assert_eq!(network.session_count(), 0);

        let err = carol.fetch_key("s1", 16).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyExhaustedFailure);
        let err = network.endpoint("alice").fetch_key("s1", 16).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyExhaustedFailure);
        assert!(!carol.is_consumed("s1"));
    }

    #[test]
    fn test_claim_wipes_material_on_retirement() {
        let mut session = QkdSession::generate(8).unwrap();
        let first = session.claim("s1", "alice", 8).unwrap();
        assert!(!session.is_retired());

        let second = session.claim("s1", "bob", 8).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert!(session.is_retired());
        assert!(session.material.is_empty());

        let debug = format!("{:?}", session);
        assert!(debug.contains("retired: true"));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let network = SimulatedQkdNetwork::new();
        let alice = network.endpoint("alice");

        let a = alice.fetch_key("s1", 16).await.unwrap();
        let b = alice.fetch_key("s2", 16).await.unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_eq!(network.session_count(), 2);
    }

    #[tokio::test]
    async fn test_length_mismatch_is_unavailable_and_not_consumed() {
        let network = SimulatedQkdNetwork::new();
        let alice = network.endpoint("alice");
        let bob = network.endpoint("bob");

        alice.fetch_key("s1", 10).await.unwrap();
        let err = bob.fetch_key("s1", 11).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unavailable);
        assert!(!bob.is_consumed("s1"));
        assert_eq!(bob.fetch_key("s1", 10).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_offline_endpoint() {
        let network = SimulatedQkdNetwork::new();
        let alice = network.endpoint("alice");
        alice.set_online(false);

        let err = alice.fetch_key("s1", 8).await.unwrap_err();
        assert!(matches!(err, Error::QkdUnavailable(_)));

        alice.set_online(true);
        assert!(alice.fetch_key("s1", 8).await.is_ok());
    }

    #[test]
    fn test_material_debug_hides_bytes() {
        let material = QkdKeyMaterial::new("s1", vec![0xAA; 4]);
        let debug = format!("{:?}", material);
        assert!(debug.contains("len: 4"));
        assert!(!debug.contains("170"));
        assert_eq!(material.into_otp_key().len(), 4);
    }
}
