//! Periodic key set refresh.
//!
//! Refreshes the key set on a fixed interval so rotated keys are picked up
//! before tokens signed with them arrive. A failed refresh keeps the previous
//! snapshot. Unknown key IDs between ticks are handled by the client's
//! on-demand refresh.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled.

use crate::auth::JwksClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the refresh loop until `cancel_token` fires.
///
/// The first refresh happens one `interval` after start; the initial key set
/// is loaded by `JwksClient::connect`.
pub async fn start_jwks_refresher(
    client: Arc<JwksClient>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "gate.tasks.jwks_refresher",
        interval_seconds = interval.as_secs(),
        url = %client.jwks_url(),
        "Starting key set refresher"
    );

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = client.refresh().await {
                    warn!(
                        target: "gate.tasks.jwks_refresher",
                        error = %e,
                        "Scheduled key set refresh failed"
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "gate.tasks.jwks_refresher",
                    "Key set refresher received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{JwksOptions, KeySet};
    use gate_test_utils::{jwks_document, MockJwks, RsaSigner};

    #[tokio::test]
    async fn test_refresher_exits_on_cancel() {
        let client = Arc::new(JwksClient::from_key_set(
            "http://127.0.0.1:9/jwks.json".to_string(),
            KeySet::default(),
            JwksOptions::default(),
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_jwks_refresher(
            client,
            Duration::from_secs(3600),
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("refresher should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresher_picks_up_new_keys() {
        let jwks = MockJwks::start(jwks_document(vec![RsaSigner::One.jwk_x5c()])).await;
        let client = Arc::new(
            JwksClient::connect(jwks.url(), JwksOptions::default())
                .await
                .unwrap(),
        );
        assert!(!client.current().await.contains(RsaSigner::Two.kid()));

        jwks.set_document(jwks_document(vec![
            RsaSigner::One.jwk_x5c(),
            RsaSigner::Two.jwk_x5c(),
        ]))
        .await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_jwks_refresher(
            Arc::clone(&client),
            Duration::from_millis(50),
            cancel.clone(),
        ));

        let mut found = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if client.current().await.contains(RsaSigner::Two.kid()) {
                found = true;
                break;
            }
        }
        cancel.cancel();
        handle.await.unwrap();

        assert!(found, "refresher should have loaded the rotated key");
    }

    #[tokio::test]
    async fn test_refresher_keeps_keys_when_endpoint_fails() {
        let jwks = MockJwks::start(jwks_document(vec![RsaSigner::One.jwk_x5c()])).await;
        let client = Arc::new(
            JwksClient::connect(jwks.url(), JwksOptions::default())
                .await
                .unwrap(),
        );
        drop(jwks);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_jwks_refresher(
            Arc::clone(&client),
            Duration::from_millis(20),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(client.current().await.contains(RsaSigner::One.kid()));
    }
}
