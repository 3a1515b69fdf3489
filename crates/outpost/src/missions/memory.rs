//! In-memory repository used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use questline_common::{
    Completion, CompletionStats, Identity, Mission, MissionCode, QuestlineError,
};

use super::{CodeLookup, MissionRepository, RecordedCompletion};

#[derive(Default)]
struct Inner {
    missions: HashMap<u64, Mission>,
    codes: Vec<MissionCode>,
    completions: Vec<Completion>,
    balances: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mission(&self, mission: Mission) {
        self.inner.lock().unwrap().missions.insert(mission.id, mission);
    }

    pub fn insert_code(&self, code: MissionCode) {
        self.inner.lock().unwrap().codes.push(code);
    }

    pub fn completions(&self) -> Vec<Completion> {
        self.inner.lock().unwrap().completions.clone()
    }

    pub fn balance(&self, identity: &Identity) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .balances
            .get(&identity.storage_key())
            .copied()
            .unwrap_or(0)
    }
}

impl CodeLookup for MemoryStore {
    async fn live_codes(
        &self,
        mission_id: u64,
        now: i64,
    ) -> Result<Vec<MissionCode>, QuestlineError> {
        let inner = self.inner.lock().unwrap();
        let mut codes: Vec<_> = inner
            .codes
            .iter()
            .filter(|c| c.mission_id == mission_id && c.is_live(now))
            .cloned()
            .collect();
        codes.sort_by_key(|c| c.id);
        Ok(codes)
    }
}

impl MissionRepository for MemoryStore {
    async fn mission(&self, mission_id: u64) -> Result<Option<Mission>, QuestlineError> {
        Ok(self.inner.lock().unwrap().missions.get(&mission_id).cloned())
    }

    async fn completion_stats(
        &self,
        mission_id: u64,
        identity: &Identity,
    ) -> Result<CompletionStats, QuestlineError> {
        let inner = self.inner.lock().unwrap();
        let key = identity.storage_key();
        let mut stats = CompletionStats::default();

        for completion in inner.completions.iter().filter(|c| c.mission_id == mission_id) {
            stats.total_completions += 1;
            if completion.identity == key {
                stats.identity_completions += 1;
                stats.last_completed_at = stats.last_completed_at.max(Some(completion.completed_at));
            }
        }
        Ok(stats)
    }

    async fn record_completion(
        &self,
        mission: &Mission,
        identity: &Identity,
        code: &MissionCode,
        now: i64,
    ) -> Result<RecordedCompletion, QuestlineError> {
        let mut inner = self.inner.lock().unwrap();
        let completion = Completion {
            id: inner.completions.len() as u64 + 1,
            mission_id: mission.id,
            identity: identity.storage_key(),
            code_id: code.id,
            code_used: code.code.clone(),
            credits_earned: mission.reward_credits,
            completed_at: now,
        };
        inner.completions.push(completion.clone());

        let balance = inner.balances.entry(identity.storage_key()).or_insert(0);
        *balance += i64::from(mission.reward_credits);
        let new_balance = *balance;

        Ok(RecordedCompletion {
            completion,
            new_balance,
        })
    }
}
