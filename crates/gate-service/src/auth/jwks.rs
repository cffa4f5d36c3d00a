//! Key set client for fetching and holding trusted verification keys.
//!
//! The client fetches the published key set document once at construction
//! (failing fast if it cannot) and keeps the resolved keys as an immutable
//! snapshot. Refreshes build a complete new `KeySet` and swap it in; readers
//! holding the previous `Arc<KeySet>` are unaffected.
//!
//! # Security
//!
//! - Only entries with `use` absent or `"sig"` are trusted
//! - `kid` is unique within a snapshot; the first entry wins
//! - On-demand refreshes triggered by unknown key IDs are rate limited so a
//!   stream of forged `kid`s cannot hammer the key set endpoint

use crate::context::CallContext;
use crate::errors::{AuthError, StartupError};
use crate::observability::metrics;
use common::jwt::{certificate_pem, decode_ed25519_public_key_jwk};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;
use x509_parser::public_key::PublicKey;

/// Default fetch timeout in seconds.
const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Default minimum spacing between on-demand refreshes in seconds.
const DEFAULT_MIN_REFRESH_INTERVAL_SECONDS: u64 = 30;

/// JSON Web Key as published in the key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name ("Ed25519" for OKP keys).
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key value (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// Certificate chain; the first entry carries the key.
    #[serde(default)]
    pub x5c: Option<Vec<String>>,
}

/// Key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Family of a verification key, used to match it against an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ed25519,
}

impl KeyFamily {
    /// The key family an algorithm requires, if it is one this crate verifies.
    pub fn for_algorithm(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(KeyFamily::Rsa),
            Algorithm::EdDSA => Some(KeyFamily::Ed25519),
            _ => None,
        }
    }
}

/// A key set entry with its public key material ready for verification.
pub struct ResolvedKey {
    kid: String,
    family: KeyFamily,
    alg: Option<String>,
    decoding_key: DecodingKey,
}

impl ResolvedKey {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// The `alg` the publisher attached to this key, if any.
    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

/// Resolve the verification key for one key set entry.
///
/// Material is taken from `x5c[0]` first, then RSA `n`/`e`, then an Ed25519
/// `x`. Returns a human-readable reason when the entry cannot be used.
pub fn resolve_key(jwk: &Jwk) -> Result<ResolvedKey, String> {
    let kid = jwk
        .kid
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| "entry has no kid".to_string())?;

    if let Some(key_use) = jwk.key_use.as_deref() {
        if key_use != "sig" {
            return Err(format!("entry use is '{}', not 'sig'", key_use));
        }
    }

    let (family, decoding_key) = if let Some(cert_b64) = jwk.x5c.as_ref().and_then(|c| c.first())
    {
        (KeyFamily::Rsa, rsa_key_from_certificate(cert_b64)?)
    } else {
        match jwk.kty.as_str() {
            "RSA" => {
                let (n, e) = jwk
                    .n
                    .as_deref()
                    .zip(jwk.e.as_deref())
                    .ok_or_else(|| "RSA entry is missing n or e".to_string())?;
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| format!("invalid RSA components: {}", e))?;
                (KeyFamily::Rsa, key)
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(format!("unsupported OKP curve {:?}", jwk.crv));
                }
                let x = jwk
                    .x
                    .as_deref()
                    .ok_or_else(|| "OKP entry is missing x".to_string())?;
                let bytes = decode_ed25519_public_key_jwk(x)
                    .map_err(|e| format!("invalid Ed25519 public key encoding: {}", e))?;
                (KeyFamily::Ed25519, DecodingKey::from_ed_der(&bytes))
            }
            other => return Err(format!("unsupported key type '{}'", other)),
        }
    };

    Ok(ResolvedKey {
        kid,
        family,
        alg: jwk.alg.clone(),
        decoding_key,
    })
}

fn rsa_key_from_certificate(cert_b64: &str) -> Result<DecodingKey, String> {
    let pem_text = certificate_pem(cert_b64);
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem_text.as_bytes())
        .map_err(|e| format!("invalid x5c PEM: {}", e))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| format!("invalid x5c certificate: {}", e))?;

    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data)),
        Ok(_) => Err("x5c certificate does not carry an RSA key".to_string()),
        Err(e) => Err(format!("invalid x5c public key: {}", e)),
    }
}

/// Immutable snapshot of trusted keys, in document order.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<Arc<ResolvedKey>>,
    index: HashMap<String, usize>,
}

impl KeySet {
    /// Build a key set from a fetched document.
    ///
    /// Unusable entries and duplicate key IDs are logged and dropped.
    pub fn from_document(document: &JwksDocument) -> Self {
        let mut key_set = KeySet::default();

        for jwk in &document.keys {
            match resolve_key(jwk) {
                Ok(key) => key_set.insert(key),
                Err(reason) => {
                    tracing::warn!(
                        target: "gate.auth.jwks",
                        kid = ?jwk.kid,
                        kty = %jwk.kty,
                        reason = %reason,
                        "Skipping unusable key set entry"
                    );
                }
            }
        }

        key_set
    }

    /// Build a key set from already resolved keys (first `kid` wins).
    pub fn from_keys(keys: impl IntoIterator<Item = ResolvedKey>) -> Self {
        let mut key_set = KeySet::default();
        for key in keys {
            key_set.insert(key);
        }
        key_set
    }

    fn insert(&mut self, key: ResolvedKey) {
        if self.index.contains_key(&key.kid) {
            tracing::warn!(
                target: "gate.auth.jwks",
                kid = %key.kid,
                "Dropping duplicate key ID in key set"
            );
            return;
        }
        self.index.insert(key.kid.clone(), self.keys.len());
        self.keys.push(Arc::new(key));
    }

    pub fn get(&self, kid: &str) -> Option<Arc<ResolvedKey>> {
        self.index
            .get(kid)
            .and_then(|&i| self.keys.get(i))
            .cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.index.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in document order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.kid())
    }
}

/// Failure to obtain a key set document.
#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("undecodable key set document: {0}")]
    Decode(String),

    #[error("refresh timed out")]
    Timeout,
}

/// Tunables for the key set client.
#[derive(Debug, Clone)]
pub struct JwksOptions {
    /// Timeout for a single fetch.
    pub fetch_timeout: Duration,

    /// Minimum spacing between on-demand refreshes.
    pub min_refresh_interval: Duration,
}

impl Default for JwksOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
            min_refresh_interval: Duration::from_secs(DEFAULT_MIN_REFRESH_INTERVAL_SECONDS),
        }
    }
}

/// Key set client for fetching and holding public keys.
///
/// Thread-safe; share it behind an `Arc`.
pub struct JwksClient {
    /// URL to the key set endpoint.
    jwks_url: String,

    /// HTTP client for fetching the key set.
    http_client: reqwest::Client,

    /// Current snapshot. Replaced wholesale, never mutated.
    snapshot: RwLock<Arc<KeySet>>,

    /// When the last on-demand refresh was attempted.
    last_on_demand: Mutex<Option<Instant>>,

    min_refresh_interval: Duration,
}

impl JwksClient {
    /// Fetch the key set and build a client around it.
    ///
    /// # Errors
    ///
    /// Returns `StartupError::KeySetFetch` if the document cannot be fetched
    /// or decoded, or yields no usable keys. The caller must not serve
    /// authenticated traffic.
    #[instrument(skip(options), name = "gate.auth.jwks.connect")]
    pub async fn connect(jwks_url: String, options: JwksOptions) -> Result<Self, StartupError> {
        let http_client = reqwest::Client::builder()
            .timeout(options.fetch_timeout)
            .build()
            .map_err(|e| StartupError::KeySetFetch {
                url: jwks_url.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        let client = Self {
            jwks_url,
            http_client,
            snapshot: RwLock::new(Arc::new(KeySet::default())),
            last_on_demand: Mutex::new(None),
            min_refresh_interval: options.min_refresh_interval,
        };

        let key_set = client.fetch().await.map_err(|e| {
            metrics::record_jwks_refresh(false);
            StartupError::KeySetFetch {
                url: client.jwks_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if key_set.is_empty() {
            metrics::record_jwks_refresh(false);
            return Err(StartupError::KeySetFetch {
                url: client.jwks_url.clone(),
                reason: "key set contains no usable keys".to_string(),
            });
        }
        metrics::record_jwks_refresh(true);

        tracing::info!(
            target: "gate.auth.jwks",
            key_count = key_set.len(),
            "Initial key set loaded"
        );
        *client.snapshot.write().await = Arc::new(key_set);

        Ok(client)
    }

    /// Build a client around an existing key set without fetching.
    ///
    /// Refreshes still go to `jwks_url`.
    pub fn from_key_set(jwks_url: String, key_set: KeySet, options: JwksOptions) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(options.fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gate.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            snapshot: RwLock::new(Arc::new(key_set)),
            last_on_demand: Mutex::new(None),
            min_refresh_interval: options.min_refresh_interval,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// The current snapshot.
    pub async fn current(&self) -> Arc<KeySet> {
        self.snapshot.read().await.clone()
    }

    /// Fetch and decode the key set document once. Does not touch the snapshot.
    #[instrument(skip(self), name = "gate.auth.jwks.fetch")]
    pub async fn fetch(&self) -> Result<KeySet, KeySourceError> {
        tracing::debug!(target: "gate.auth.jwks", url = %self.jwks_url, "Fetching key set");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KeySourceError::Timeout
                } else {
                    KeySourceError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(KeySourceError::Status(response.status().as_u16()));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| KeySourceError::Decode(e.to_string()))?;

        Ok(KeySet::from_document(&document))
    }

    /// Fetch a fresh key set and swap it in.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize, KeySourceError> {
        match self.fetch().await {
            Ok(key_set) => {
                let key_count = key_set.len();
                *self.snapshot.write().await = Arc::new(key_set);
                metrics::record_jwks_refresh(true);
                tracing::info!(target: "gate.auth.jwks", key_count, "Key set refreshed");
                Ok(key_count)
            }
            Err(e) => {
                metrics::record_jwks_refresh(false);
                tracing::warn!(target: "gate.auth.jwks", error = %e, "Key set refresh failed, keeping previous keys");
                Err(e)
            }
        }
    }

    /// Look up a key by ID.
    ///
    /// An unknown ID triggers at most one rate-limited refresh. Waiting for
    /// it, including queueing behind another caller's refresh, is bounded by
    /// the call's deadline and aborted by its cancellation token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKeyId` if the key is absent after any refresh.
    #[instrument(skip(self, ctx), fields(kid = %kid, call_id = %ctx.call_id()))]
    pub async fn get_key(
        &self,
        kid: &str,
        ctx: &CallContext,
    ) -> Result<Arc<ResolvedKey>, AuthError> {
        if let Some(key) = self.current().await.get(kid) {
            return Ok(key);
        }

        let deadline = ctx.deadline();
        let refresh = self.refresh_on_demand(kid, deadline);
        let bounded = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, refresh).await.ok(),
                None => Some(refresh.await),
            }
        };

        let refreshed = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                tracing::debug!(target: "gate.auth.jwks", kid = %kid, "Key lookup cancelled");
                false
            }
            outcome = bounded => outcome.unwrap_or_else(|| {
                tracing::warn!(target: "gate.auth.jwks", kid = %kid, "On-demand refresh hit the call deadline");
                false
            }),
        };

        if refreshed {
            if let Some(key) = self.current().await.get(kid) {
                return Ok(key);
            }
        }

        tracing::debug!(target: "gate.auth.jwks", kid = %kid, "Key ID not found in key set");
        Err(AuthError::InvalidKeyId)
    }

    /// Returns true if a refresh ran (successfully or not) or another caller
    /// already brought the key in while we waited.
    ///
    /// The rate-limit slot is taken only when a fetch is about to start.
    async fn refresh_on_demand(&self, kid: &str, deadline: Option<Instant>) -> bool {
        let mut last = self.last_on_demand.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if self.current().await.contains(kid) {
            return true;
        }

        let now = Instant::now();
        if deadline.is_some_and(|deadline| deadline <= now) {
            tracing::debug!(target: "gate.auth.jwks", kid = %kid, "Call deadline passed, skipping on-demand refresh");
            return false;
        }
        if let Some(previous) = *last {
            if now.duration_since(previous) < self.min_refresh_interval {
                tracing::debug!(target: "gate.auth.jwks", kid = %kid, "On-demand refresh suppressed by rate limit");
                return false;
            }
        }
        *last = Some(now);

        tracing::debug!(target: "gate.auth.jwks", kid = %kid, "Unknown key ID, refreshing key set");
        // Failures are logged by refresh and keep the previous snapshot.
        let _ = self.refresh().await;
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Ed25519 public key of RFC 8032 test vector 1.
    const ED25519_X: &str = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";

    fn okp(kid: &str) -> Jwk {
        serde_json::from_value(serde_json::json!({
            "kty": "OKP",
            "kid": kid,
            "crv": "Ed25519",
            "x": ED25519_X,
            "use": "sig"
        }))
        .unwrap()
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "RSA"}"#).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert!(jwk.kid.is_none());
        assert!(jwk.key_use.is_none());
        assert!(jwk.x5c.is_none());
    }

    #[test]
    fn test_jwks_document_deserialization() {
        let json = r#"{
            "keys": [
                {"kty": "RSA", "kid": "key-1", "use": "sig", "n": "AQAB", "e": "AQAB"},
                {"kty": "OKP", "kid": "key-2", "crv": "Ed25519", "x": "abc"}
            ]
        }"#;

        let document: JwksDocument = serde_json::from_str(json).unwrap();

        assert_eq!(document.keys.len(), 2);
        assert_eq!(document.keys.first().unwrap().kid.as_deref(), Some("key-1"));
        assert_eq!(
            document.keys.first().unwrap().key_use.as_deref(),
            Some("sig")
        );
    }

    #[test]
    fn test_resolve_ed25519_key() {
        let key = resolve_key(&okp("ed-1")).unwrap();
        assert_eq!(key.kid(), "ed-1");
        assert_eq!(key.family(), KeyFamily::Ed25519);
    }

    #[test]
    fn test_resolve_rejects_encryption_key() {
        let mut jwk = okp("enc-1");
        jwk.key_use = Some("enc".to_string());

        let err = resolve_key(&jwk).unwrap_err();
        assert!(err.contains("not 'sig'"));
    }

    #[test]
    fn test_resolve_rejects_missing_kid() {
        let mut jwk = okp("");
        assert!(resolve_key(&jwk).is_err());
        jwk.kid = None;
        assert!(resolve_key(&jwk).is_err());
    }

    #[test]
    fn test_resolve_rejects_unknown_kty() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "EC", "kid": "ec-1"}"#).unwrap();
        let err = resolve_key(&jwk).unwrap_err();
        assert!(err.contains("unsupported key type"));
    }

    #[test]
    fn test_resolve_rejects_rsa_without_components() {
        let jwk: Jwk =
            serde_json::from_str(r#"{"kty": "RSA", "kid": "rsa-1", "n": "AQAB"}"#).unwrap();
        let err = resolve_key(&jwk).unwrap_err();
        assert!(err.contains("missing n or e"));
    }

    #[test]
    fn test_resolve_rejects_garbage_certificate() {
        let jwk: Jwk = serde_json::from_str(
            r#"{"kty": "RSA", "kid": "rsa-1", "x5c": ["bm90LWEtY2VydGlmaWNhdGU="]}"#,
        )
        .unwrap();
        assert!(resolve_key(&jwk).is_err());
    }

    #[test]
    fn test_key_set_skips_bad_entries_and_keeps_order() {
        let document = JwksDocument {
            keys: vec![
                okp("a"),
                serde_json::from_str(r#"{"kty": "EC", "kid": "bad"}"#).unwrap(),
                okp("b"),
            ],
        };

        let key_set = KeySet::from_document(&document);

        assert_eq!(key_set.len(), 2);
        assert_eq!(key_set.kids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(key_set.get("bad").is_none());
    }

    #[test]
    fn test_key_set_first_duplicate_wins() {
        let mut second = okp("dup");
        second.alg = Some("second".to_string());
        let mut first = okp("dup");
        first.alg = Some("first".to_string());

        let key_set = KeySet::from_document(&JwksDocument {
            keys: vec![first, second],
        });

        assert_eq!(key_set.len(), 1);
        assert_eq!(key_set.get("dup").unwrap().alg(), Some("first"));
    }

    #[test]
    fn test_key_family_for_algorithm() {
        assert_eq!(KeyFamily::for_algorithm(Algorithm::RS256), Some(KeyFamily::Rsa));
        assert_eq!(KeyFamily::for_algorithm(Algorithm::PS512), Some(KeyFamily::Rsa));
        assert_eq!(
            KeyFamily::for_algorithm(Algorithm::EdDSA),
            Some(KeyFamily::Ed25519)
        );
        assert_eq!(KeyFamily::for_algorithm(Algorithm::HS256), None);
    }

    #[test]
    fn test_resolved_key_debug_omits_material() {
        let key = resolve_key(&okp("ed-1")).unwrap();
        let debug_str = format!("{:?}", key);
        assert!(debug_str.contains("ed-1"));
        assert!(!debug_str.contains(ED25519_X));
    }

    #[tokio::test]
    async fn test_get_key_from_snapshot() {
        let client = JwksClient::from_key_set(
            "http://127.0.0.1:9/jwks.json".to_string(),
            KeySet::from_keys([resolve_key(&okp("ed-1")).unwrap()]),
            JwksOptions::default(),
        );

        let key = client.get_key("ed-1", &CallContext::new()).await.unwrap();
        assert_eq!(key.kid(), "ed-1");
    }

    #[tokio::test]
    async fn test_get_key_unknown_is_invalid_key_id() {
        // Port 9 (discard) is not listening; the on-demand refresh fails fast
        // and the previous snapshot is kept.
        let client = JwksClient::from_key_set(
            "http://127.0.0.1:9/jwks.json".to_string(),
            KeySet::from_keys([resolve_key(&okp("ed-1")).unwrap()]),
            JwksOptions {
                fetch_timeout: Duration::from_secs(1),
                min_refresh_interval: Duration::from_secs(60),
            },
        );

        let result = client.get_key("nope", &CallContext::new()).await;
        assert_eq!(result.unwrap_err(), AuthError::InvalidKeyId);
        assert!(client.current().await.contains("ed-1"));
    }

    fn rate_limited_client() -> JwksClient {
        JwksClient::from_key_set(
            "http://127.0.0.1:9/jwks.json".to_string(),
            KeySet::from_keys([resolve_key(&okp("ed-1")).unwrap()]),
            JwksOptions {
                fetch_timeout: Duration::from_secs(1),
                min_refresh_interval: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn test_expired_deadline_does_not_take_refresh_slot() {
        let client = rate_limited_client();
        let ctx = CallContext::new().with_deadline(Instant::now());

        let result = client.get_key("nope", &ctx).await;

        assert_eq!(result.unwrap_err(), AuthError::InvalidKeyId);
        assert!(client.last_on_demand.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_call_does_not_take_refresh_slot() {
        let client = rate_limited_client();
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let ctx = CallContext::new().with_cancellation(cancel);

        let result = client.get_key("nope", &ctx).await;

        assert_eq!(result.unwrap_err(), AuthError::InvalidKeyId);
        assert!(client.last_on_demand.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_slot_taken_when_fetch_starts() {
        let client = rate_limited_client();

        let result = client.get_key("nope", &CallContext::new()).await;

        assert_eq!(result.unwrap_err(), AuthError::InvalidKeyId);
        assert!(client.last_on_demand.lock().await.is_some());
    }
}
