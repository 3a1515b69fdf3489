//! Missions: code verification, eligibility, and redemption.
//!
//! The verification and redemption logic only sees the repository traits
//! below; `RedisStore` is the production implementation.

#![allow(async_fn_in_trait)]

mod eligibility;
mod redeem;
mod store;
mod verifier;

#[cfg(test)]
pub(crate) mod memory;

pub use eligibility::check_eligibility;
pub use redeem::redeem;
pub use store::{CompletionPage, HistoryPage, RedisStore};
pub use verifier::{normalize_static_code, verify_mission_code};

use questline_common::{
    Completion, CompletionStats, Identity, Mission, MissionCode, QuestlineError,
};

/// Lookup of the codes a submission may match.
pub trait CodeLookup: Send + Sync {
    /// Active, unexpired codes for a mission, oldest first
    async fn live_codes(&self, mission_id: u64, now: i64)
    -> Result<Vec<MissionCode>, QuestlineError>;
}

/// Mission state consumed by the redemption flow.
pub trait MissionRepository: CodeLookup {
    async fn mission(&self, mission_id: u64) -> Result<Option<Mission>, QuestlineError>;

    async fn completion_stats(
        &self,
        mission_id: u64,
        identity: &Identity,
    ) -> Result<CompletionStats, QuestlineError>;

    /// Record a completion and credit the reward in one write.
    async fn record_completion(
        &self,
        mission: &Mission,
        identity: &Identity,
        code: &MissionCode,
        now: i64,
    ) -> Result<RecordedCompletion, QuestlineError>;
}

/// Result of a successful completion write
#[derive(Debug, Clone)]
pub struct RecordedCompletion {
    pub completion: Completion,
    /// Balance after the reward was credited
    pub new_balance: i64,
}
