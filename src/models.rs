// Data models for the 8Ball Markets settlement service

use serde::{Deserialize, Serialize};

/// Current unix timestamp in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// User account. Wallet balance is intentionally absent: it is always
/// derived from the ledger, never stored on the user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: u64,
}

/// Bet lifecycle status
///
/// PENDING -> ACTIVE (accept) | CANCELED/EXPIRED (cancel_or_expire)
/// ACTIVE  -> DISPUTED (dispute) | RESOLVED (resolve)
/// DISPUTED -> RESOLVED (resolve)
/// RESOLVED, CANCELED, EXPIRED are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BetStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "RESOLVED")]
    Resolved,
    #[serde(rename = "DISPUTED")]
    Disputed,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl BetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BetStatus::Resolved | BetStatus::Canceled | BetStatus::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "PENDING",
            BetStatus::Active => "ACTIVE",
            BetStatus::Resolved => "RESOLVED",
            BetStatus::Disputed => "DISPUTED",
            BetStatus::Canceled => "CANCELED",
            BetStatus::Expired => "EXPIRED",
        }
    }
}

/// Resolution outcome, set exactly once when a bet reaches RESOLVED
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BetOutcome {
    #[serde(rename = "PROPOSER_WIN")]
    ProposerWin,
    #[serde(rename = "ACCEPTOR_WIN")]
    AcceptorWin,
    #[serde(rename = "VOID")]
    Void,
}

impl BetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetOutcome::ProposerWin => "PROPOSER_WIN",
            BetOutcome::AcceptorWin => "ACCEPTOR_WIN",
            BetOutcome::Void => "VOID",
        }
    }
}

/// The wager aggregate (the `direct_bets` row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: i64,

    // Parties
    pub proposer_id: i64,
    pub acceptor_id: Option<i64>,
    /// Set for direct/private bets; None for marketplace bets
    pub target_user_id: Option<i64>,
    /// Optional third-party resolver
    pub arbiter_id: Option<i64>,

    // Terms. Stakes are integer minor units (cents).
    pub event_description: String,
    pub stake_proposer_cents: i64,
    pub stake_acceptor_cents: Option<i64>,
    pub odds_format: String,
    pub odds_proposer: Option<f64>,
    pub odds_acceptor: Option<f64>,
    pub currency: String,
    pub payout_model: String,
    pub fee_bps: u32,

    // Lifecycle
    pub status: BetStatus,
    pub outcome: Option<BetOutcome>,
    pub dispute_notes: Option<String>,
    pub outcome_notes: Option<String>,
    pub created_at: u64,
    pub accepted_at: Option<u64>,
    pub resolved_at: Option<u64>,
}

impl Bet {
    /// Proposer or acceptor
    pub fn is_party(&self, user_id: i64) -> bool {
        self.proposer_id == user_id || self.acceptor_id == Some(user_id)
    }

    /// Total escrowed pot once both stakes are held
    pub fn pot_cents(&self) -> i64 {
        self.stake_proposer_cents + self.stake_acceptor_cents.unwrap_or(0)
    }
}

// ===== BET THREADS =====

/// Discussion thread scoped 1:1 to a bet, created lazily on first access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetThread {
    pub thread_id: i64,
    pub bet_id: i64,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetMessage {
    pub message_id: i64,
    pub thread_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub created_at: u64,
}

// ===== REQUEST PAYLOADS =====

#[derive(Debug, Clone, Deserialize)]
pub struct ProposeBetRequest {
    pub proposer_id: i64,
    pub event_description: String,
    pub stake_proposer_cents: i64,

    #[serde(default)]
    pub arbiter_id: Option<i64>,
    #[serde(default)]
    pub target_user_id: Option<i64>,

    #[serde(default)]
    pub odds_format: Option<String>,
    #[serde(default)]
    pub odds_proposer: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payout_model: Option<String>,
    #[serde(default)]
    pub fee_bps: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptBetRequest {
    pub acceptor_id: i64,
    pub stake_acceptor_cents: i64,
    #[serde(default)]
    pub odds_acceptor: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveBetRequest {
    pub actor_id: i64,
    pub outcome: BetOutcome,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeBetRequest {
    pub actor_id: i64,
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelBetRequest {
    pub actor_id: i64,
    pub new_status: BetStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageRequest {
    pub sender_id: i64,
    pub body: String,
}

// ===== RESPONSES =====

/// Returned from every mutating engine operation so callers never have to
/// re-read state after a delay: the bet snapshot and the actor's balance
/// are authoritative as of the commit.
#[derive(Debug, Clone, Serialize)]
pub struct BetReceipt {
    pub bet: Bet,
    pub ledger_tx_id: Option<String>,
    pub actor_balance_cents: i64,
}

/// One leaderboard row, aggregated from resolved bets only
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub user_id: i64,
    pub username: String,
    pub wins: u64,
    pub losses: u64,
    pub voids: u64,
    pub net_winnings_cents: i64,
    pub balance_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_uses_uppercase_wire_names() {
        let s = serde_json::to_string(&BetStatus::Pending).unwrap();
        assert_eq!(s, "\"PENDING\"");
        let back: BetStatus = serde_json::from_str("\"DISPUTED\"").unwrap();
        assert_eq!(back, BetStatus::Disputed);

        let o = serde_json::to_string(&BetOutcome::ProposerWin).unwrap();
        assert_eq!(o, "\"PROPOSER_WIN\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BetStatus::Resolved.is_terminal());
        assert!(BetStatus::Canceled.is_terminal());
        assert!(BetStatus::Expired.is_terminal());
        assert!(!BetStatus::Pending.is_terminal());
        assert!(!BetStatus::Active.is_terminal());
        assert!(!BetStatus::Disputed.is_terminal());
    }
}
