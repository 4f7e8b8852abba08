// Access guard: who may do what to a bet.
//
// Role flags are re-read from the user registry on every call, so the
// request-supplied actor id is never trusted for privilege. This check is
// a security boundary and must hold regardless of what any client hides
// in its UI.

use std::collections::HashMap;

use crate::models::{Bet, BetStatus, User};
use crate::settlement::engine::EngineError;

/// Effective identity for one operation
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i64,
    pub is_admin: bool,
}

/// Look up the acting user and re-validate role and active flags
pub fn resolve_actor(users: &HashMap<i64, User>, user_id: i64) -> Result<Actor, EngineError> {
    let user = users
        .get(&user_id)
        .ok_or_else(|| EngineError::Forbidden(format!("Unknown actor {}", user_id)))?;
    if !user.is_active {
        return Err(EngineError::Forbidden(format!(
            "Account {} is deactivated",
            user.username
        )));
    }
    Ok(Actor { user_id: user.user_id, is_admin: user.is_admin })
}

/// Proposer or acceptor may dispute their own bet
pub fn ensure_party(actor: &Actor, bet: &Bet) -> Result<(), EngineError> {
    if bet.is_party(actor.user_id) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "User {} is not a party to bet {}",
            actor.user_id, bet.bet_id
        )))
    }
}

/// The assigned arbiter may resolve; an admin may resolve any bet,
/// overriding the assigned arbiter.
pub fn ensure_can_resolve(actor: &Actor, bet: &Bet) -> Result<(), EngineError> {
    if actor.is_admin || bet.arbiter_id == Some(actor.user_id) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "User {} is neither the arbiter nor an admin for bet {}",
            actor.user_id, bet.bet_id
        )))
    }
}

/// CANCELED: proposer withdraws, or the targeted recipient rejects, or an
/// admin intervenes. EXPIRED: admin/system only.
pub fn ensure_can_cancel(actor: &Actor, bet: &Bet, new_status: BetStatus) -> Result<(), EngineError> {
    if actor.is_admin {
        return Ok(());
    }
    match new_status {
        BetStatus::Canceled => {
            if bet.proposer_id == actor.user_id || bet.target_user_id == Some(actor.user_id) {
                Ok(())
            } else {
                Err(EngineError::Forbidden(format!(
                    "User {} may not cancel bet {}",
                    actor.user_id, bet.bet_id
                )))
            }
        }
        BetStatus::Expired => Err(EngineError::Forbidden(
            "Only an admin may expire a bet".to_string(),
        )),
        _ => Err(EngineError::InvalidInput(format!(
            "{} is not a cancellation status",
            new_status.as_str()
        ))),
    }
}

/// Thread access: parties, the assigned arbiter, and admins
pub fn ensure_thread_access(actor: &Actor, bet: &Bet) -> Result<(), EngineError> {
    if actor.is_admin
        || bet.is_party(actor.user_id)
        || bet.arbiter_id == Some(actor.user_id)
        || bet.target_user_id == Some(actor.user_id)
    {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "User {} may not view the thread for bet {}",
            actor.user_id, bet.bet_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::unix_now;

    fn user(id: i64, admin: bool, active: bool) -> User {
        User {
            user_id: id,
            username: format!("user{}", id),
            password_hash: String::new(),
            is_admin: admin,
            is_active: active,
            created_at: unix_now(),
        }
    }

    fn bet(proposer: i64, acceptor: Option<i64>, arbiter: Option<i64>, target: Option<i64>) -> Bet {
        Bet {
            bet_id: 1,
            proposer_id: proposer,
            acceptor_id: acceptor,
            target_user_id: target,
            arbiter_id: arbiter,
            event_description: "test".to_string(),
            stake_proposer_cents: 1_000,
            stake_acceptor_cents: acceptor.map(|_| 1_000),
            odds_format: "DECIMAL".to_string(),
            odds_proposer: Some(2.0),
            odds_acceptor: None,
            currency: "USD".to_string(),
            payout_model: "EVENS".to_string(),
            fee_bps: 0,
            status: BetStatus::Active,
            outcome: None,
            dispute_notes: None,
            outcome_notes: None,
            created_at: unix_now(),
            accepted_at: None,
            resolved_at: None,
        }
    }

    #[test]
    fn test_resolve_actor_rejects_unknown_and_inactive() {
        let mut users = HashMap::new();
        users.insert(1, user(1, false, true));
        users.insert(2, user(2, false, false));

        assert!(resolve_actor(&users, 1).is_ok());
        assert!(matches!(resolve_actor(&users, 2), Err(EngineError::Forbidden(_))));
        assert!(matches!(resolve_actor(&users, 99), Err(EngineError::Forbidden(_))));
    }

    #[test]
    fn test_only_arbiter_or_admin_may_resolve() {
        let b = bet(1, Some(2), Some(3), None);
        let proposer = Actor { user_id: 1, is_admin: false };
        let arbiter = Actor { user_id: 3, is_admin: false };
        let admin = Actor { user_id: 9, is_admin: true };
        let stranger = Actor { user_id: 8, is_admin: false };

        assert!(ensure_can_resolve(&proposer, &b).is_err());
        assert!(ensure_can_resolve(&stranger, &b).is_err());
        assert!(ensure_can_resolve(&arbiter, &b).is_ok());
        assert!(ensure_can_resolve(&admin, &b).is_ok());
    }

    #[test]
    fn test_cancel_permissions() {
        let b = bet(1, None, None, Some(4));
        let proposer = Actor { user_id: 1, is_admin: false };
        let target = Actor { user_id: 4, is_admin: false };
        let stranger = Actor { user_id: 8, is_admin: false };
        let admin = Actor { user_id: 9, is_admin: true };

        assert!(ensure_can_cancel(&proposer, &b, BetStatus::Canceled).is_ok());
        assert!(ensure_can_cancel(&target, &b, BetStatus::Canceled).is_ok());
        assert!(ensure_can_cancel(&stranger, &b, BetStatus::Canceled).is_err());
        assert!(ensure_can_cancel(&proposer, &b, BetStatus::Expired).is_err());
        assert!(ensure_can_cancel(&admin, &b, BetStatus::Expired).is_ok());
    }
}
