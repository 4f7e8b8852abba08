/// 8Ball Markets - peer-to-peer wager settlement service
/// Exports all modules for use as a library crate

pub mod app_state;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod settlement;

pub use app_state::{AppState, SharedState, STARTING_BALANCE_CENTS};
pub use ledger::{
    AccountRef, BalanceBreakdown, EntryKind, Ledger, LedgerEntry, LedgerError, Posting,
};
pub use models::{
    AcceptBetRequest, Bet, BetMessage, BetOutcome, BetReceipt, BetStatus, BetThread,
    CancelBetRequest, DisputeBetRequest, LeaderboardRow, PostMessageRequest, ProposeBetRequest,
    ResolveBetRequest, User,
};
pub use settlement::{Actor, EngineError, MAX_FEE_BPS};
