//! Outbound user intents. The backend answers through the feed, never
//! through these responses.

use gloo_net::http::Request;
use serde::Serialize;
use thiserror::Error;

use tilewall_shared::{ClaimIntent, ScoreIntent};

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("intent request failed: {0}")]
    Network(#[from] gloo_net::Error),
    #[error("intent rejected with status {0}")]
    Rejected(u16),
}

/// `{base}/{kind}` with exactly one slash between them.
pub fn endpoint(base: &str, kind: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), kind)
}

async fn post<T: Serialize>(url: &str, body: &T) -> Result<(), IntentError> {
    let response = Request::post(url).json(body)?.send().await?;
    if !response.ok() {
        return Err(IntentError::Rejected(response.status()));
    }
    Ok(())
}

pub async fn send_claim(base: &str, intent: &ClaimIntent) -> Result<(), IntentError> {
    let url = endpoint(base, "claim");
    tracing::debug!(block = intent.block_id.0, video = %intent.video_id, "sending claim");
    post(&url, intent).await
}

pub async fn send_score(base: &str, intent: &ScoreIntent) -> Result<(), IntentError> {
    let url = endpoint(base, "score");
    post(&url, intent).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilewall_shared::{BlockId, Platform, ScoreDelta};

    #[test]
    fn endpoints_join_cleanly() {
        assert_eq!(endpoint("/api/intents", "claim"), "/api/intents/claim");
        assert_eq!(endpoint("/api/intents/", "score"), "/api/intents/score");
    }

    #[test]
    fn intent_bodies_match_the_backend_shape() {
        let claim = ClaimIntent {
            block_id: BlockId(42),
            video_id: "dQw4w9WgXcQ".to_string(),
            platform: Platform::YouTube,
        };
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["block_id"], 42);
        assert_eq!(json["video_id"], "dQw4w9WgXcQ");

        let score = ScoreIntent {
            block_id: BlockId(42),
            delta: ScoreDelta::Undislike,
        };
        assert_eq!(serde_json::to_value(score).unwrap()["delta"], "undislike");
    }
}
