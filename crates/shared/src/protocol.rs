use serde::{Deserialize, Serialize};

use crate::domain::{PairId, SessionId, VoteRecord};

/// One persisted row of the vote log, in the store's column order:
/// `user_id, pair_id, winner, timestamp`. Cells are plain strings; the
/// timestamp is second-precision wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRow {
    pub user_id: String,
    pub pair_id: String,
    pub winner: String,
    pub timestamp: String,
}

impl From<&VoteRecord> for VoteRow {
    fn from(record: &VoteRecord) -> Self {
        Self {
            user_id: record.session_id.0.clone(),
            pair_id: record.pair_id.0.clone(),
            winner: record.winner.as_str().to_string(),
            timestamp: record.timestamp_cell(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Free-text participant id; a random id is generated when absent or blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitVoteRequest {
    pub pair_id: PairId,
    /// An option image name, or the literal `"neither"`.
    pub winner: String,
}

/// The pair the participant should currently be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPair {
    pub pair_id: PairId,
    /// Exactly two entries, in fixed first/second display order.
    pub image_urls: Vec<String>,
}

/// Everything the rendering layer needs about one session, in one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub complete: bool,
    /// Zero-based position in the pair sequence; equals `total_pairs` once
    /// the session is complete.
    pub position: usize,
    pub total_pairs: usize,
    pub progress: f64,
    /// Buffered vote records not yet persisted to the remote store.
    pub pending_votes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentPair>,
    /// Most recent flush failure, cleared by a successful flush.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_warning: Option<String>,
}
