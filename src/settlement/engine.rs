// Escrow/Settlement Engine
//
// The five atomic bet operations. Each call runs under the shared state
// lock: every precondition is validated before anything mutates, so a
// failed call leaves no partial postings and no half-updated bet. Status
// transitions are checked and set inside the same critical section, which
// is what makes two racing accepts (or resolve racing dispute) serialize
// into exactly one winner and one state-conflict error.

use crate::app_state::AppState;
use crate::ledger::{BalanceBreakdown, EntryKind, Posting};
use crate::models::*;
use crate::settlement::access;

pub const MAX_FEE_BPS: u32 = 10_000;

/// Error taxonomy for every engine operation. All variants are
/// deterministic and side-effect-free: nothing is committed on failure.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    InvalidInput(String),
    InsufficientFunds { available_cents: i64, requested_cents: i64 },
    NotTargeted(String),
    InvalidState(String),
    AlreadyAccepted(String),
    AlreadyResolved(String),
    Forbidden(String),
    NotFound(String),
    /// Storage-layer conflict; the only kind a caller may retry as-is
    StorageConflict(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::NotTargeted(_) => "NOT_TARGETED",
            EngineError::InvalidState(_) => "INVALID_STATE",
            EngineError::AlreadyAccepted(_) => "ALREADY_ACCEPTED",
            EngineError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::StorageConflict(_) => "STORAGE_CONFLICT",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            EngineError::InsufficientFunds { available_cents, requested_cents } => {
                write!(
                    f,
                    "Insufficient funds: have {} cents, need {} cents",
                    available_cents, requested_cents
                )
            }
            EngineError::NotTargeted(msg) => write!(f, "Not targeted: {}", msg),
            EngineError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            EngineError::AlreadyAccepted(msg) => write!(f, "Already accepted: {}", msg),
            EngineError::AlreadyResolved(msg) => write!(f, "Already resolved: {}", msg),
            EngineError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            EngineError::NotFound(msg) => write!(f, "Not found: {}", msg),
            EngineError::StorageConflict(msg) => write!(f, "Storage conflict: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl AppState {
    // ===== MUTATING OPERATIONS =====

    /// Create a bet in PENDING and hold the proposer's stake in escrow.
    pub fn bet_propose(&mut self, req: ProposeBetRequest) -> Result<BetReceipt, EngineError> {
        let actor = access::resolve_actor(&self.users, req.proposer_id)?;

        let description = req.event_description.trim().to_string();
        if description.is_empty() {
            return Err(EngineError::InvalidInput(
                "Event description must not be empty".to_string(),
            ));
        }
        let stake = req.stake_proposer_cents;
        if stake <= 0 {
            return Err(EngineError::InvalidInput(
                "Stake must be a positive amount in cents".to_string(),
            ));
        }
        let fee_bps = req.fee_bps.unwrap_or(0);
        if fee_bps > MAX_FEE_BPS {
            return Err(EngineError::InvalidInput(format!(
                "fee_bps {} exceeds {}",
                fee_bps, MAX_FEE_BPS
            )));
        }
        if let Some(target) = req.target_user_id {
            if target == actor.user_id {
                return Err(EngineError::InvalidInput(
                    "Cannot target a bet at yourself".to_string(),
                ));
            }
            if !self.users.contains_key(&target) {
                return Err(EngineError::NotFound(format!("Target user {} not found", target)));
            }
        }
        if let Some(arbiter) = req.arbiter_id {
            if !self.users.contains_key(&arbiter) {
                return Err(EngineError::NotFound(format!("Arbiter {} not found", arbiter)));
            }
        }

        // Balance check and hold commit inside the same critical section;
        // there is no window for a stale read to authorize the hold.
        let available = self.ledger.available_balance(actor.user_id);
        if available < stake {
            return Err(EngineError::InsufficientFunds {
                available_cents: available,
                requested_cents: stake,
            });
        }

        let bet_id = self.alloc_bet_id();
        let tx_id = self
            .ledger
            .append(
                EntryKind::StakeHold,
                Some(bet_id),
                vec![
                    Posting::cash(actor.user_id, -stake),
                    Posting::escrow(bet_id, stake, actor.user_id),
                ],
                format!("Proposer stake hold for bet {}", bet_id),
            )
            .map_err(|e| EngineError::StorageConflict(e.to_string()))?;

        let bet = Bet {
            bet_id,
            proposer_id: actor.user_id,
            acceptor_id: None,
            target_user_id: req.target_user_id,
            arbiter_id: req.arbiter_id,
            event_description: description,
            stake_proposer_cents: stake,
            stake_acceptor_cents: None,
            odds_format: req.odds_format.unwrap_or_else(|| "DECIMAL".to_string()),
            odds_proposer: req.odds_proposer,
            odds_acceptor: None,
            currency: req.currency.unwrap_or_else(|| "USD".to_string()),
            payout_model: req.payout_model.unwrap_or_else(|| "EVENS".to_string()),
            fee_bps,
            status: BetStatus::Pending,
            outcome: None,
            dispute_notes: None,
            outcome_notes: None,
            created_at: unix_now(),
            accepted_at: None,
            resolved_at: None,
        };
        self.bets.insert(bet_id, bet.clone());

        tracing::info!(bet_id, proposer = actor.user_id, stake_cents = stake, "bet proposed");
        self.log_activity(
            "🎯",
            "PROPOSE",
            &format!("user {} staked {} cents on bet {}", actor.user_id, stake, bet_id),
        );

        Ok(BetReceipt {
            bet,
            ledger_tx_id: Some(tx_id),
            actor_balance_cents: self.ledger.available_balance(actor.user_id),
        })
    }

    /// Accept a PENDING bet: hold the acceptor's stake and flip the bet to
    /// ACTIVE. At most one accept can ever succeed per bet; a second call
    /// finds the status already ACTIVE and gets `AlreadyAccepted`.
    pub fn bet_accept(&mut self, bet_id: i64, req: AcceptBetRequest) -> Result<BetReceipt, EngineError> {
        let actor = access::resolve_actor(&self.users, req.acceptor_id)?;

        let stake = req.stake_acceptor_cents;
        if stake <= 0 {
            return Err(EngineError::InvalidInput(
                "Stake must be a positive amount in cents".to_string(),
            ));
        }

        {
            let bet = self
                .bets
                .get(&bet_id)
                .ok_or_else(|| EngineError::NotFound(format!("Bet {} not found", bet_id)))?;
            match bet.status {
                BetStatus::Pending => {}
                BetStatus::Active => {
                    return Err(EngineError::AlreadyAccepted(format!(
                        "Bet {} was already accepted",
                        bet_id
                    )))
                }
                other => {
                    return Err(EngineError::InvalidState(format!(
                        "Bet {} is {}, not PENDING",
                        bet_id,
                        other.as_str()
                    )))
                }
            }
            if bet.proposer_id == actor.user_id {
                return Err(EngineError::InvalidInput(
                    "Proposer cannot accept their own bet".to_string(),
                ));
            }
            if let Some(target) = bet.target_user_id {
                if target != actor.user_id {
                    return Err(EngineError::NotTargeted(format!(
                        "Bet {} is reserved for user {}",
                        bet_id, target
                    )));
                }
            }
        }

        let available = self.ledger.available_balance(actor.user_id);
        if available < stake {
            return Err(EngineError::InsufficientFunds {
                available_cents: available,
                requested_cents: stake,
            });
        }

        let tx_id = self
            .ledger
            .append(
                EntryKind::StakeHold,
                Some(bet_id),
                vec![
                    Posting::cash(actor.user_id, -stake),
                    Posting::escrow(bet_id, stake, actor.user_id),
                ],
                format!("Acceptor stake hold for bet {}", bet_id),
            )
            .map_err(|e| EngineError::StorageConflict(e.to_string()))?;

        let snapshot = {
            let bet = self
                .bets
                .get_mut(&bet_id)
                .ok_or_else(|| EngineError::StorageConflict("Bet vanished mid-operation".to_string()))?;
            bet.acceptor_id = Some(actor.user_id);
            bet.stake_acceptor_cents = Some(stake);
            bet.odds_acceptor = req.odds_acceptor;
            bet.accepted_at = Some(unix_now());
            bet.status = BetStatus::Active;
            bet.clone()
        };

        tracing::info!(bet_id, acceptor = actor.user_id, stake_cents = stake, "bet accepted");
        self.log_activity(
            "🤝",
            "ACCEPT",
            &format!("user {} matched bet {} with {} cents", actor.user_id, bet_id, stake),
        );

        Ok(BetReceipt {
            bet: snapshot,
            ledger_tx_id: Some(tx_id),
            actor_balance_cents: self.ledger.available_balance(actor.user_id),
        })
    }

    /// Resolve an ACTIVE or DISPUTED bet exactly once. Releases both
    /// escrowed stakes: VOID refunds each party their own stake; a decided
    /// outcome pays the winner the pot minus the configured fee. A repeat
    /// call fails with `AlreadyResolved` and moves no money.
    pub fn bet_resolve(&mut self, bet_id: i64, req: ResolveBetRequest) -> Result<BetReceipt, EngineError> {
        let actor = access::resolve_actor(&self.users, req.actor_id)?;

        let (proposer_id, acceptor_id, stake_proposer, stake_acceptor, fee_bps) = {
            let bet = self
                .bets
                .get(&bet_id)
                .ok_or_else(|| EngineError::NotFound(format!("Bet {} not found", bet_id)))?;
            match bet.status {
                BetStatus::Active | BetStatus::Disputed => {}
                BetStatus::Resolved => {
                    return Err(EngineError::AlreadyResolved(format!(
                        "Bet {} was already resolved as {}",
                        bet_id,
                        bet.outcome.map(|o| o.as_str()).unwrap_or("?")
                    )))
                }
                other => {
                    return Err(EngineError::InvalidState(format!(
                        "Bet {} is {}, not ACTIVE or DISPUTED",
                        bet_id,
                        other.as_str()
                    )))
                }
            }
            access::ensure_can_resolve(&actor, bet)?;

            let acceptor_id = bet.acceptor_id.ok_or_else(|| {
                EngineError::InvalidState(format!("Bet {} has no acceptor on record", bet_id))
            })?;
            let stake_acceptor = bet.stake_acceptor_cents.ok_or_else(|| {
                EngineError::InvalidState(format!("Bet {} has no acceptor stake on record", bet_id))
            })?;
            (bet.proposer_id, acceptor_id, bet.stake_proposer_cents, stake_acceptor, bet.fee_bps)
        };

        let pot = stake_proposer + stake_acceptor;
        let (kind, postings, memo) = match req.outcome {
            BetOutcome::Void => (
                EntryKind::VoidRefund,
                vec![
                    Posting::escrow(bet_id, -stake_proposer, proposer_id),
                    Posting::escrow(bet_id, -stake_acceptor, acceptor_id),
                    Posting::cash(proposer_id, stake_proposer),
                    Posting::cash(acceptor_id, stake_acceptor),
                ],
                format!("Void refund for bet {}", bet_id),
            ),
            BetOutcome::ProposerWin | BetOutcome::AcceptorWin => {
                let winner_id = if req.outcome == BetOutcome::ProposerWin {
                    proposer_id
                } else {
                    acceptor_id
                };
                let fee = pot * fee_bps as i64 / MAX_FEE_BPS as i64;
                let mut postings = vec![
                    Posting::escrow(bet_id, -stake_proposer, proposer_id),
                    Posting::escrow(bet_id, -stake_acceptor, acceptor_id),
                    Posting::cash(winner_id, pot - fee),
                ];
                if fee > 0 {
                    postings.push(Posting::house(fee));
                }
                (
                    EntryKind::Payout,
                    postings,
                    format!("Payout of bet {} to user {}", bet_id, winner_id),
                )
            }
        };

        let tx_id = self
            .ledger
            .append(kind, Some(bet_id), postings, memo)
            .map_err(|e| EngineError::StorageConflict(e.to_string()))?;

        let snapshot = {
            let bet = self
                .bets
                .get_mut(&bet_id)
                .ok_or_else(|| EngineError::StorageConflict("Bet vanished mid-operation".to_string()))?;
            bet.status = BetStatus::Resolved;
            bet.outcome = Some(req.outcome);
            bet.outcome_notes = req.notes.clone();
            bet.resolved_at = Some(unix_now());
            bet.clone()
        };

        tracing::info!(
            bet_id,
            resolver = actor.user_id,
            outcome = req.outcome.as_str(),
            pot_cents = pot,
            "bet resolved"
        );
        self.log_activity(
            "✅",
            "RESOLVE",
            &format!("bet {} resolved {} by user {}", bet_id, req.outcome.as_str(), actor.user_id),
        );

        Ok(BetReceipt {
            bet: snapshot,
            ledger_tx_id: Some(tx_id),
            actor_balance_cents: self.ledger.available_balance(actor.user_id),
        })
    }

    /// Flag an ACTIVE bet as DISPUTED. Only a party may dispute; no funds
    /// move; escrow stays held until an arbiter or admin resolves.
    pub fn bet_dispute(&mut self, bet_id: i64, req: DisputeBetRequest) -> Result<BetReceipt, EngineError> {
        let actor = access::resolve_actor(&self.users, req.actor_id)?;

        let notes = req.notes.trim().to_string();
        if notes.is_empty() {
            return Err(EngineError::InvalidInput("Dispute notes must not be empty".to_string()));
        }

        {
            let bet = self
                .bets
                .get(&bet_id)
                .ok_or_else(|| EngineError::NotFound(format!("Bet {} not found", bet_id)))?;
            if bet.status != BetStatus::Active {
                return Err(EngineError::InvalidState(format!(
                    "Bet {} is {}, only ACTIVE bets can be disputed",
                    bet_id,
                    bet.status.as_str()
                )));
            }
            access::ensure_party(&actor, bet)?;
        }

        let snapshot = {
            let bet = self
                .bets
                .get_mut(&bet_id)
                .ok_or_else(|| EngineError::StorageConflict("Bet vanished mid-operation".to_string()))?;
            bet.status = BetStatus::Disputed;
            bet.dispute_notes = Some(notes);
            bet.clone()
        };

        tracing::info!(bet_id, disputant = actor.user_id, "bet disputed");
        self.log_activity(
            "⚠️",
            "DISPUTE",
            &format!("user {} disputed bet {}", actor.user_id, bet_id),
        );

        Ok(BetReceipt {
            bet: snapshot,
            ledger_tx_id: None,
            actor_balance_cents: self.ledger.available_balance(actor.user_id),
        })
    }

    /// Cancel or expire a PENDING bet, reversing the propose-time hold so
    /// the proposer's available balance returns to its pre-propose value.
    pub fn bet_cancel_or_expire(
        &mut self,
        bet_id: i64,
        req: CancelBetRequest,
    ) -> Result<BetReceipt, EngineError> {
        let actor = access::resolve_actor(&self.users, req.actor_id)?;

        if !matches!(req.new_status, BetStatus::Canceled | BetStatus::Expired) {
            return Err(EngineError::InvalidInput(format!(
                "new_status must be CANCELED or EXPIRED, got {}",
                req.new_status.as_str()
            )));
        }

        let (proposer_id, stake_proposer) = {
            let bet = self
                .bets
                .get(&bet_id)
                .ok_or_else(|| EngineError::NotFound(format!("Bet {} not found", bet_id)))?;
            if bet.status != BetStatus::Pending {
                return Err(EngineError::InvalidState(format!(
                    "Only PENDING bets can be canceled or expired; bet {} is {}",
                    bet_id,
                    bet.status.as_str()
                )));
            }
            access::ensure_can_cancel(&actor, bet, req.new_status)?;
            (bet.proposer_id, bet.stake_proposer_cents)
        };

        let tx_id = self
            .ledger
            .append(
                EntryKind::StakeRefund,
                Some(bet_id),
                vec![
                    Posting::escrow(bet_id, -stake_proposer, proposer_id),
                    Posting::cash(proposer_id, stake_proposer),
                ],
                format!("Stake refund on {} of bet {}", req.new_status.as_str(), bet_id),
            )
            .map_err(|e| EngineError::StorageConflict(e.to_string()))?;

        let snapshot = {
            let bet = self
                .bets
                .get_mut(&bet_id)
                .ok_or_else(|| EngineError::StorageConflict("Bet vanished mid-operation".to_string()))?;
            bet.status = req.new_status;
            bet.clone()
        };

        tracing::info!(bet_id, actor = actor.user_id, new_status = req.new_status.as_str(), "bet closed");
        self.log_activity(
            "↩️",
            req.new_status.as_str(),
            &format!("bet {} closed, {} cents returned to user {}", bet_id, stake_proposer, proposer_id),
        );

        Ok(BetReceipt {
            bet: snapshot,
            ledger_tx_id: Some(tx_id),
            actor_balance_cents: self.ledger.available_balance(actor.user_id),
        })
    }

    // ===== READ VIEWS =====

    pub fn get_balance(&self, user_id: i64) -> Result<BalanceBreakdown, EngineError> {
        if !self.users.contains_key(&user_id) {
            return Err(EngineError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(self.ledger.balance_breakdown(user_id))
    }

    /// Bets the user is involved in as proposer, acceptor, or target
    pub fn list_bets_for_user(&self, user_id: i64, status_filter: Option<BetStatus>) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self
            .bets
            .values()
            .filter(|b| b.is_party(user_id) || b.target_user_id == Some(user_id))
            .filter(|b| status_filter.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        bets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.bet_id.cmp(&a.bet_id)));
        bets
    }

    /// Bets awaiting this arbiter's decision
    pub fn list_bets_for_arbiter(&self, arbiter_id: i64) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self
            .bets
            .values()
            .filter(|b| b.arbiter_id == Some(arbiter_id))
            .filter(|b| matches!(b.status, BetStatus::Active | BetStatus::Disputed))
            .cloned()
            .collect();
        bets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.bet_id.cmp(&b.bet_id)));
        bets
    }

    /// Complete resolved-bet feed, regardless of caller scope; this is the
    /// leaderboard's only input.
    pub fn list_resolved_bets(&self) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self
            .bets
            .values()
            .filter(|b| b.status == BetStatus::Resolved)
            .cloned()
            .collect();
        bets.sort_by(|a, b| b.resolved_at.cmp(&a.resolved_at).then(b.bet_id.cmp(&a.bet_id)));
        bets
    }

    /// Open public bets anyone may accept
    pub fn marketplace_bets(&self, exclude_user: Option<i64>) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self
            .bets
            .values()
            .filter(|b| b.status == BetStatus::Pending && b.target_user_id.is_none())
            .filter(|b| exclude_user.map_or(true, |u| b.proposer_id != u))
            .cloned()
            .collect();
        bets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.bet_id.cmp(&a.bet_id)));
        bets
    }

    /// Wins/losses/net per user, derived solely from resolved bets
    pub fn leaderboard(&self) -> Vec<LeaderboardRow> {
        let mut rows: std::collections::HashMap<i64, LeaderboardRow> = self
            .users
            .values()
            .map(|u| {
                (
                    u.user_id,
                    LeaderboardRow {
                        user_id: u.user_id,
                        username: u.username.clone(),
                        wins: 0,
                        losses: 0,
                        voids: 0,
                        net_winnings_cents: 0,
                        balance_cents: self.ledger.available_balance(u.user_id),
                    },
                )
            })
            .collect();

        for bet in self.bets.values().filter(|b| b.status == BetStatus::Resolved) {
            let (Some(outcome), Some(acceptor_id), Some(stake_acceptor)) =
                (bet.outcome, bet.acceptor_id, bet.stake_acceptor_cents)
            else {
                continue;
            };
            let fee = bet.pot_cents() * bet.fee_bps as i64 / MAX_FEE_BPS as i64;
            match outcome {
                BetOutcome::Void => {
                    for id in [bet.proposer_id, acceptor_id] {
                        if let Some(row) = rows.get_mut(&id) {
                            row.voids += 1;
                        }
                    }
                }
                BetOutcome::ProposerWin | BetOutcome::AcceptorWin => {
                    let (winner, loser, loser_stake) = if outcome == BetOutcome::ProposerWin {
                        (bet.proposer_id, acceptor_id, stake_acceptor)
                    } else {
                        (acceptor_id, bet.proposer_id, bet.stake_proposer_cents)
                    };
                    if let Some(row) = rows.get_mut(&winner) {
                        row.wins += 1;
                        row.net_winnings_cents += loser_stake - fee;
                    }
                    if let Some(row) = rows.get_mut(&loser) {
                        row.losses += 1;
                        row.net_winnings_cents -= loser_stake;
                    }
                }
            }
        }

        let mut rows: Vec<LeaderboardRow> = rows.into_values().collect();
        rows.sort_by(|a, b| {
            b.net_winnings_cents
                .cmp(&a.net_winnings_cents)
                .then(b.balance_cents.cmp(&a.balance_cents))
                .then(a.user_id.cmp(&b.user_id))
        });
        rows
    }

    // ===== BET THREADS =====

    /// Fetch the bet's discussion thread, creating it on first access.
    /// Only parties, the target, the arbiter, and admins may see it.
    pub fn open_or_create_thread(
        &mut self,
        bet_id: i64,
        actor_id: i64,
    ) -> Result<(BetThread, Vec<BetMessage>), EngineError> {
        let actor = access::resolve_actor(&self.users, actor_id)?;
        {
            let bet = self
                .bets
                .get(&bet_id)
                .ok_or_else(|| EngineError::NotFound(format!("Bet {} not found", bet_id)))?;
            access::ensure_thread_access(&actor, bet)?;
        }

        if !self.threads.contains_key(&bet_id) {
            let thread = BetThread {
                thread_id: self.alloc_thread_id(),
                bet_id,
                created_at: unix_now(),
            };
            tracing::debug!(bet_id, thread_id = thread.thread_id, "thread created");
            self.threads.insert(bet_id, thread);
        }
        let thread = self.threads[&bet_id].clone();
        let messages = self
            .messages
            .iter()
            .filter(|m| m.thread_id == thread.thread_id)
            .cloned()
            .collect();
        Ok((thread, messages))
    }

    pub fn post_thread_message(
        &mut self,
        bet_id: i64,
        req: PostMessageRequest,
    ) -> Result<BetMessage, EngineError> {
        let body = req.body.trim().to_string();
        if body.is_empty() {
            return Err(EngineError::InvalidInput("Message body must not be empty".to_string()));
        }
        let (thread, _) = self.open_or_create_thread(bet_id, req.sender_id)?;
        let message = BetMessage {
            message_id: self.alloc_message_id(),
            thread_id: thread.thread_id,
            sender_id: req.sender_id,
            body,
            created_at: unix_now(),
        };
        self.messages.push(message.clone());
        Ok(message)
    }
}
