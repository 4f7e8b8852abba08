// Application state management

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::ledger::{EntryKind, Ledger, Posting};
use crate::models::{unix_now, Bet, BetMessage, BetThread, User};
use crate::settlement::EngineError;

pub type SharedState = Arc<Mutex<AppState>>;

/// Every new account starts with 1000.00 in play money, minted against the
/// house account so the ledger still sums to zero.
pub const STARTING_BALANCE_CENTS: i64 = 100_000;

const DEFAULT_STATE_FILE: &str = "data/state.json";
const ACTIVITY_CAP: usize = 1_000;

/// All mutable state behind one lock. The lock is the storage layer's
/// serialization point: engine operations validate and commit inside a
/// single critical section, which is what gives them all-or-nothing,
/// serialized-transaction semantics.
pub struct AppState {
    pub users: HashMap<i64, User>,
    pub bets: HashMap<i64, Bet>,
    pub ledger: Ledger,
    /// Bet threads keyed by bet id (1:1, created lazily)
    pub threads: HashMap<i64, BetThread>,
    pub messages: Vec<BetMessage>,
    /// Human-readable settlement activity feed, bounded
    pub activity: Vec<String>,
    pub state_file: String,

    next_user_id: i64,
    next_bet_id: i64,
    next_thread_id: i64,
    next_message_id: i64,
}

/// Snapshot shape written to disk; balances are never stored, only the
/// ledger they derive from.
#[derive(Serialize, Deserialize)]
struct PersistedState {
    users: HashMap<i64, User>,
    bets: HashMap<i64, Bet>,
    ledger: Ledger,
    threads: HashMap<i64, BetThread>,
    messages: Vec<BetMessage>,
    next_user_id: i64,
    next_bet_id: i64,
    next_thread_id: i64,
    next_message_id: i64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            bets: HashMap::new(),
            ledger: Ledger::new(),
            threads: HashMap::new(),
            messages: Vec::new(),
            activity: Vec::new(),
            state_file: DEFAULT_STATE_FILE.to_string(),
            next_user_id: 1,
            next_bet_id: 1,
            next_thread_id: 1,
            next_message_id: 1,
        }
    }

    /// Boot path: restore the snapshot if one exists, otherwise start fresh
    pub fn load_or_new(state_file: &str) -> Self {
        match Self::load_from_disk(state_file) {
            Ok(state) => {
                tracing::info!(
                    users = state.users.len(),
                    bets = state.bets.len(),
                    ledger_entries = state.ledger.len(),
                    "restored state from {}",
                    state_file
                );
                state
            }
            Err(e) => {
                tracing::info!("no persisted state loaded ({}), starting fresh", e);
                let mut state = Self::new();
                state.state_file = state_file.to_string();
                state
            }
        }
    }

    pub fn save_to_disk(&self) -> Result<(), String> {
        let snapshot = PersistedState {
            users: self.users.clone(),
            bets: self.bets.clone(),
            ledger: self.ledger.clone(),
            threads: self.threads.clone(),
            messages: self.messages.clone(),
            next_user_id: self.next_user_id,
            next_bet_id: self.next_bet_id,
            next_thread_id: self.next_thread_id,
            next_message_id: self.next_message_id,
        };

        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;

        if let Some(dir) = std::path::Path::new(&self.state_file).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| format!("Failed to create state directory: {}", e))?;
            }
        }
        std::fs::write(&self.state_file, json)
            .map_err(|e| format!("Failed to write state file: {}", e))?;
        Ok(())
    }

    fn load_from_disk(state_file: &str) -> Result<Self, String> {
        let json = std::fs::read_to_string(state_file).map_err(|_| "no state file found".to_string())?;
        let snapshot: PersistedState =
            serde_json::from_str(&json).map_err(|e| format!("Failed to deserialize state: {}", e))?;

        Ok(Self {
            users: snapshot.users,
            bets: snapshot.bets,
            ledger: snapshot.ledger,
            threads: snapshot.threads,
            messages: snapshot.messages,
            activity: Vec::new(),
            state_file: state_file.to_string(),
            next_user_id: snapshot.next_user_id,
            next_bet_id: snapshot.next_bet_id,
            next_thread_id: snapshot.next_thread_id,
            next_message_id: snapshot.next_message_id,
        })
    }

    // ===== USER REGISTRY =====

    /// Create a user and grant the starting balance through the ledger
    pub fn create_user(&mut self, username: &str, password_hash: &str) -> Result<User, EngineError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(EngineError::InvalidInput("Username must not be empty".to_string()));
        }
        if self.users.values().any(|u| u.username.eq_ignore_ascii_case(username)) {
            return Err(EngineError::InvalidInput(format!("Username '{}' is taken", username)));
        }

        let user_id = self.next_user_id;
        self.next_user_id += 1;

        self.ledger
            .append(
                EntryKind::SignupGrant,
                None,
                vec![
                    Posting::house(-STARTING_BALANCE_CENTS),
                    Posting::cash(user_id, STARTING_BALANCE_CENTS),
                ],
                format!("Signup grant for {}", username),
            )
            .map_err(|e| EngineError::StorageConflict(e.to_string()))?;

        let user = User {
            user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_admin: false,
            is_active: true,
            created_at: unix_now(),
        };
        self.users.insert(user_id, user.clone());

        tracing::info!(user_id, username, "user created");
        self.log_activity("👤", "SIGNUP", &format!("{} joined with {} cents", username, STARTING_BALANCE_CENTS));
        Ok(user)
    }

    pub fn find_user_by_name(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username.eq_ignore_ascii_case(username.trim()))
    }

    // ===== ID ALLOCATION =====

    pub fn alloc_bet_id(&mut self) -> i64 {
        let id = self.next_bet_id;
        self.next_bet_id += 1;
        id
    }

    pub fn alloc_thread_id(&mut self) -> i64 {
        let id = self.next_thread_id;
        self.next_thread_id += 1;
        id
    }

    pub fn alloc_message_id(&mut self) -> i64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    // ===== ACTIVITY FEED =====

    pub fn log_activity(&mut self, emoji: &str, action: &str, details: &str) {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let entry = format!("[{}] {} {} | {}", timestamp, emoji, action, details);
        self.activity.push(entry);
        if self.activity.len() > ACTIVITY_CAP {
            self.activity.remove(0);
        }
    }

    pub fn recent_activity(&self, limit: usize) -> Vec<String> {
        self.activity.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_grants_starting_balance() {
        let mut state = AppState::new();
        let user = state.create_user("alice", "hash").unwrap();

        assert_eq!(state.ledger.available_balance(user.user_id), STARTING_BALANCE_CENTS);
        assert!(!user.is_admin);
        assert!(user.is_active);

        // Grant entry sums to zero against the house
        let total: i64 = state
            .ledger
            .entries()
            .iter()
            .flat_map(|e| e.postings.iter())
            .map(|p| p.amount_cents)
            .sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let mut state = AppState::new();
        state.create_user("alice", "hash").unwrap();
        let err = state.create_user("ALICE", "hash2").unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(state.users.len(), 1);
    }

    #[test]
    fn test_activity_feed_is_bounded() {
        let mut state = AppState::new();
        for i in 0..1_100 {
            state.log_activity("📝", "TEST", &format!("line {}", i));
        }
        assert_eq!(state.activity.len(), ACTIVITY_CAP);
        let recent = state.recent_activity(5);
        assert_eq!(recent.len(), 5);
        assert!(recent[0].contains("line 1099"));
    }
}
