//! Ledger Store for 8Ball Markets
//!
//! Append-only double-entry postings in integer cents. This is the sole
//! owner of balance truth: a user's spendable balance is always the sum of
//! their cash postings, and escrow holds show up the moment they commit.
//! Every entry must sum to zero across its postings; `append` rejects
//! anything unbalanced, so money can be moved but never created or
//! destroyed outside the house mint used for signup grants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::unix_now;

/// Account a posting touches
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountRef {
    /// A user's spendable cash
    UserCash(i64),
    /// Escrow bucket for one bet
    BetEscrow(i64),
    /// House account: mints signup grants, collects fees
    House,
}

/// A single money movement. Postings into escrow carry the `party` whose
/// funds are held so the projector can attribute held amounts per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub account: AccountRef,
    pub amount_cents: i64,
    pub party: Option<i64>,
}

impl Posting {
    pub fn cash(user_id: i64, amount_cents: i64) -> Self {
        Self { account: AccountRef::UserCash(user_id), amount_cents, party: Some(user_id) }
    }

    pub fn escrow(bet_id: i64, amount_cents: i64, party: i64) -> Self {
        Self { account: AccountRef::BetEscrow(bet_id), amount_cents, party: Some(party) }
    }

    pub fn house(amount_cents: i64) -> Self {
        Self { account: AccountRef::House, amount_cents, party: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryKind {
    SignupGrant,
    StakeHold,
    StakeRefund,
    Payout,
    VoidRefund,
}

/// One atomic group of postings. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tx_id: String,
    pub kind: EntryKind,
    pub bet_id: Option<i64>,
    pub postings: Vec<Posting>,
    pub timestamp: u64,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    Unbalanced { sum_cents: i64 },
    EmptyEntry,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Unbalanced { sum_cents } => {
                write!(f, "Entry postings sum to {} cents, expected 0", sum_cents)
            }
            LedgerError::EmptyEntry => write!(f, "Entry has no postings"),
        }
    }
}

/// Balance view for API responses
#[derive(Debug, Clone, Serialize)]
pub struct BalanceBreakdown {
    pub user_id: i64,
    pub available_cents: i64,
    pub held_cents: i64,
    pub total_cents: i64,
}

/// The append-only ledger
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a transaction. All postings commit together or the entry is
    /// rejected whole; on success returns the transaction id.
    pub fn append(
        &mut self,
        kind: EntryKind,
        bet_id: Option<i64>,
        postings: Vec<Posting>,
        memo: impl Into<String>,
    ) -> Result<String, LedgerError> {
        if postings.is_empty() {
            return Err(LedgerError::EmptyEntry);
        }
        let sum: i64 = postings.iter().map(|p| p.amount_cents).sum();
        if sum != 0 {
            return Err(LedgerError::Unbalanced { sum_cents: sum });
        }

        let tx_id = Uuid::new_v4().to_string();
        self.entries.push(LedgerEntry {
            tx_id: tx_id.clone(),
            kind,
            bet_id,
            postings,
            timestamp: unix_now(),
            memo: memo.into(),
        });
        Ok(tx_id)
    }

    /// Spendable balance: sum of all cash postings for the user. Escrow
    /// holds debit cash directly, so holds are reflected immediately.
    pub fn available_balance(&self, user_id: i64) -> i64 {
        self.entries
            .iter()
            .flat_map(|e| e.postings.iter())
            .filter(|p| p.account == AccountRef::UserCash(user_id))
            .map(|p| p.amount_cents)
            .sum()
    }

    /// Funds currently held in escrow on behalf of the user
    pub fn held_balance(&self, user_id: i64) -> i64 {
        self.entries
            .iter()
            .flat_map(|e| e.postings.iter())
            .filter(|p| matches!(p.account, AccountRef::BetEscrow(_)) && p.party == Some(user_id))
            .map(|p| p.amount_cents)
            .sum()
    }

    /// Remaining escrow for one bet (zero once released)
    pub fn escrow_balance(&self, bet_id: i64) -> i64 {
        self.entries
            .iter()
            .flat_map(|e| e.postings.iter())
            .filter(|p| p.account == AccountRef::BetEscrow(bet_id))
            .map(|p| p.amount_cents)
            .sum()
    }

    pub fn balance_breakdown(&self, user_id: i64) -> BalanceBreakdown {
        let available = self.available_balance(user_id);
        let held = self.held_balance(user_id);
        BalanceBreakdown {
            user_id,
            available_cents: available,
            held_cents: held,
            total_cents: available + held,
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn entries_for_user(&self, user_id: i64) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.postings.iter().any(|p| p.party == Some(user_id)))
            .collect()
    }

    pub fn entries_for_bet(&self, bet_id: i64) -> Vec<&LedgerEntry> {
        self.entries.iter().filter(|e| e.bet_id == Some(bet_id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_rejects_unbalanced_entry() {
        let mut ledger = Ledger::new();
        let err = ledger
            .append(
                EntryKind::StakeHold,
                Some(1),
                vec![Posting::cash(1, -500), Posting::escrow(1, 400, 1)],
                "bad hold",
            )
            .unwrap_err();
        assert_eq!(err, LedgerError::Unbalanced { sum_cents: -100 });
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_append_rejects_empty_entry() {
        let mut ledger = Ledger::new();
        let err = ledger.append(EntryKind::Payout, None, vec![], "nothing").unwrap_err();
        assert_eq!(err, LedgerError::EmptyEntry);
    }

    #[test]
    fn test_hold_moves_cash_into_escrow() {
        let mut ledger = Ledger::new();
        ledger
            .append(
                EntryKind::SignupGrant,
                None,
                vec![Posting::house(-100_000), Posting::cash(7, 100_000)],
                "signup",
            )
            .unwrap();
        ledger
            .append(
                EntryKind::StakeHold,
                Some(3),
                vec![Posting::cash(7, -1_000), Posting::escrow(3, 1_000, 7)],
                "hold",
            )
            .unwrap();

        assert_eq!(ledger.available_balance(7), 99_000);
        assert_eq!(ledger.held_balance(7), 1_000);
        assert_eq!(ledger.escrow_balance(3), 1_000);

        let breakdown = ledger.balance_breakdown(7);
        assert_eq!(breakdown.available_cents, 99_000);
        assert_eq!(breakdown.held_cents, 1_000);
        assert_eq!(breakdown.total_cents, 100_000);
    }

    #[test]
    fn test_release_zeroes_escrow() {
        let mut ledger = Ledger::new();
        ledger
            .append(
                EntryKind::SignupGrant,
                None,
                vec![Posting::house(-100_000), Posting::cash(7, 100_000)],
                "signup",
            )
            .unwrap();
        ledger
            .append(
                EntryKind::StakeHold,
                Some(3),
                vec![Posting::cash(7, -1_000), Posting::escrow(3, 1_000, 7)],
                "hold",
            )
            .unwrap();
        ledger
            .append(
                EntryKind::StakeRefund,
                Some(3),
                vec![Posting::escrow(3, -1_000, 7), Posting::cash(7, 1_000)],
                "refund",
            )
            .unwrap();

        assert_eq!(ledger.available_balance(7), 100_000);
        assert_eq!(ledger.held_balance(7), 0);
        assert_eq!(ledger.escrow_balance(3), 0);
        assert_eq!(ledger.entries_for_bet(3).len(), 2);
    }

    #[test]
    fn test_all_entries_always_sum_to_zero() {
        let mut ledger = Ledger::new();
        ledger
            .append(
                EntryKind::SignupGrant,
                None,
                vec![Posting::house(-100_000), Posting::cash(1, 100_000)],
                "signup",
            )
            .unwrap();
        ledger
            .append(
                EntryKind::Payout,
                Some(9),
                vec![
                    Posting::escrow(9, -2_000, 1),
                    Posting::cash(1, 1_900),
                    Posting::house(100),
                ],
                "payout with fee",
            )
            .unwrap();

        let grand_total: i64 = ledger
            .entries()
            .iter()
            .flat_map(|e| e.postings.iter())
            .map(|p| p.amount_cents)
            .sum();
        assert_eq!(grand_total, 0);
    }
}
