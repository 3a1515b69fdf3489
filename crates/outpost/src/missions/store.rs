//! Mission, code, and completion storage with Redis backend.
//!
//! Key layout:
//! ```text
//! mission:{id}                  JSON mission record
//! missions                      set of mission ids
//! mission_key:{key}             mission id (uniqueness guard)
//! mission:{id}:codes            set of code ids
//! code:{id}                     JSON code record (includes the secret)
//! mission:{id}:completions      completion counter
//! mission:{id}:completers       set of identity keys
//! mission:{id}:by:{identity}    hash {count, last_completed_at}
//! mission:{id}:log              list of JSON completions, newest first
//! history:{identity}            list of JSON completions, newest first
//! ```

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;

use questline_common::constants::redis_keys;
use questline_common::totp::generate_secret;
use questline_common::{
    Completion, CompletionStats, CreditTransaction, Identity, Mission, MissionCode,
    MissionUpdate, NewMission, QuestlineError, TransactionKind, normalize_mission_key,
};

use super::{CodeLookup, MissionRepository, RecordedCompletion, normalize_static_code};
use crate::credits::CreditLedger;

fn mission_key(id: u64) -> String {
    format!("{}{}", redis_keys::MISSION_PREFIX, id)
}

fn mission_slug_key(slug: &str) -> String {
    format!("{}{}", redis_keys::MISSION_KEY_PREFIX, slug)
}

fn codes_key(mission_id: u64) -> String {
    format!("{}{}:codes", redis_keys::MISSION_PREFIX, mission_id)
}

fn code_key(code_id: u64) -> String {
    format!("{}{}", redis_keys::CODE_PREFIX, code_id)
}

fn completions_key(mission_id: u64) -> String {
    format!("{}{}:completions", redis_keys::MISSION_PREFIX, mission_id)
}

fn completers_key(mission_id: u64) -> String {
    format!("{}{}:completers", redis_keys::MISSION_PREFIX, mission_id)
}

fn completed_by_key(mission_id: u64, identity: &str) -> String {
    format!("{}{}:by:{}", redis_keys::MISSION_PREFIX, mission_id, identity)
}

fn completion_log_key(mission_id: u64) -> String {
    format!("{}{}:log", redis_keys::MISSION_PREFIX, mission_id)
}

fn history_key(identity: &str) -> String {
    format!("{}{}", redis_keys::HISTORY_PREFIX, identity)
}

fn store_err(e: redis::RedisError) -> QuestlineError {
    QuestlineError::Store(e.to_string())
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, QuestlineError> {
    serde_json::from_str(raw).map_err(|e| QuestlineError::Internal(format!("corrupt record: {}", e)))
}

fn encode<T: Serialize>(value: &T) -> Result<String, QuestlineError> {
    serde_json::to_string(value).map_err(|e| QuestlineError::Internal(format!("encode record: {}", e)))
}

/// One entry of an identity's completion history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub completion: Completion,
    /// `None` once the mission has been deleted
    pub mission_title: Option<String>,
}

/// A page of completion history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// A page of one mission's completions
#[derive(Debug, Clone, Serialize)]
pub struct CompletionPage {
    pub mission_id: u64,
    pub entries: Vec<Completion>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// Inclusive LRANGE bounds for a 1-based page
fn page_bounds(page: u32, per_page: u32) -> (isize, isize) {
    let per_page = per_page.max(1) as isize;
    let start = (page.max(1) as isize - 1) * per_page;
    (start, start + per_page - 1)
}

/// Every write that removes a mission and what hangs off it.
///
/// `logged` holds the raw entries of the mission's completion log; each one
/// is also removed from its completer's history list.
fn delete_pipeline(
    mission: &Mission,
    code_ids: &[u64],
    completers: &[String],
    logged: &[String],
) -> redis::Pipeline {
    let id = mission.id;
    let mut pipe = redis::pipe();
    pipe.atomic()
        .del(mission_key(id))
        .ignore()
        .srem(redis_keys::MISSION_INDEX, id)
        .ignore()
        .del(mission_slug_key(&mission.mission_key))
        .ignore()
        .del(codes_key(id))
        .ignore()
        .del(completions_key(id))
        .ignore()
        .del(completers_key(id))
        .ignore()
        .del(completion_log_key(id))
        .ignore();
    for code_id in code_ids {
        pipe.del(code_key(*code_id)).ignore();
    }
    for identity in completers {
        pipe.del(completed_by_key(id, identity)).ignore();
    }
    for raw in logged {
        match decode::<Completion>(raw) {
            Ok(completion) => {
                pipe.lrem(history_key(&completion.identity), 0, raw).ignore();
            }
            Err(e) => tracing::warn!(mission_id = id, error = %e, "Skipping corrupt log entry"),
        }
    }
    pipe
}

/// Redis-backed mission repository
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    // === Missions ===

    /// Create a mission. Fails if the (normalized) key is taken.
    pub async fn create_mission(
        &self,
        new: NewMission,
        now: i64,
    ) -> Result<Mission, QuestlineError> {
        if new.title.trim().is_empty() {
            return Err(QuestlineError::InvalidInput(
                "Mission title is required.".to_string(),
            ));
        }

        let mut conn = self.redis.clone();
        let id: u64 = conn
            .incr(redis_keys::MISSION_SEQ, 1)
            .await
            .map_err(store_err)?;
        let mission = new.into_mission(id, now);

        let claimed: bool = conn
            .set_nx(mission_slug_key(&mission.mission_key), id)
            .await
            .map_err(store_err)?;
        if !claimed {
            return Err(QuestlineError::InvalidInput(format!(
                "Mission key '{}' already exists.",
                mission.mission_key
            )));
        }

        let record = encode(&mission)?;
        let _: () = redis::pipe()
            .atomic()
            .set(mission_key(id), record)
            .ignore()
            .sadd(redis_keys::MISSION_INDEX, id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        tracing::info!(mission_id = id, key = %mission.mission_key, "Mission created");
        Ok(mission)
    }

    pub async fn update_mission(
        &self,
        id: u64,
        update: MissionUpdate,
        now: i64,
    ) -> Result<Mission, QuestlineError> {
        let mut mission = self
            .get_mission(id)
            .await?
            .ok_or_else(|| QuestlineError::NotFound("Mission not found.".to_string()))?;

        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(QuestlineError::InvalidInput(
                "Mission title is required.".to_string(),
            ));
        }
        update.apply(&mut mission, now);

        let mut conn = self.redis.clone();
        let _: () = conn
            .set(mission_key(id), encode(&mission)?)
            .await
            .map_err(store_err)?;

        tracing::info!(mission_id = id, "Mission updated");
        Ok(mission)
    }

    /// Delete a mission with its codes, counters, and completions.
    ///
    /// Completions are also removed from each completer's history.
    pub async fn delete_mission(&self, id: u64) -> Result<(), QuestlineError> {
        let mission = self
            .get_mission(id)
            .await?
            .ok_or_else(|| QuestlineError::NotFound("Mission not found.".to_string()))?;

        let mut conn = self.redis.clone();
        let (code_ids, completers, logged): (Vec<u64>, Vec<String>, Vec<String>) = redis::pipe()
            .smembers(codes_key(id))
            .smembers(completers_key(id))
            .lrange(completion_log_key(id), 0, -1)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let _: () = delete_pipeline(&mission, &code_ids, &completers, &logged)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        tracing::info!(
            mission_id = id,
            codes = code_ids.len(),
            completers = completers.len(),
            completions = logged.len(),
            "Mission deleted"
        );
        Ok(())
    }

    pub async fn get_mission(&self, id: u64) -> Result<Option<Mission>, QuestlineError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(mission_key(id)).await.map_err(store_err)?;
        raw.as_deref().map(decode).transpose()
    }

    /// Look a mission up by its slug
    pub async fn get_mission_by_key(&self, key: &str) -> Result<Option<Mission>, QuestlineError> {
        let slug = normalize_mission_key(key);
        if slug.is_empty() {
            return Ok(None);
        }

        let mut conn = self.redis.clone();
        let id: Option<u64> = conn.get(mission_slug_key(&slug)).await.map_err(store_err)?;
        match id {
            Some(id) => self.get_mission(id).await,
            None => Ok(None),
        }
    }

    /// All missions, newest first
    pub async fn all_missions(&self) -> Result<Vec<Mission>, QuestlineError> {
        let mut conn = self.redis.clone();
        let ids: Vec<u64> = conn
            .smembers(redis_keys::MISSION_INDEX)
            .await
            .map_err(store_err)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| mission_key(*id)).collect();
        let raw: Vec<Option<String>> = conn.mget(keys).await.map_err(store_err)?;

        let mut missions = raw
            .iter()
            .flatten()
            .map(|r| decode::<Mission>(r))
            .collect::<Result<Vec<_>, _>>()?;
        missions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(missions)
    }

    /// Active missions, newest first
    pub async fn active_missions(&self) -> Result<Vec<Mission>, QuestlineError> {
        let mut missions = self.all_missions().await?;
        missions.retain(|m| m.is_active);
        Ok(missions)
    }

    // === Codes ===

    /// Issue a new static code with a fresh secret
    pub async fn add_code(
        &self,
        mission_id: u64,
        code: &str,
        expires_at: Option<i64>,
        secret_length: usize,
        now: i64,
    ) -> Result<MissionCode, QuestlineError> {
        if self.get_mission(mission_id).await?.is_none() {
            return Err(QuestlineError::NotFound("Mission not found.".to_string()));
        }

        let code = normalize_static_code(code)?;
        if expires_at.is_some_and(|expires| expires <= now) {
            return Err(QuestlineError::InvalidInput(
                "Expiry must be in the future.".to_string(),
            ));
        }

        let existing = self.codes(mission_id).await?;
        if existing.iter().any(|c| c.code == code) {
            return Err(QuestlineError::InvalidInput(format!(
                "Code '{}' already exists for this mission.",
                code
            )));
        }

        let mut conn = self.redis.clone();
        let id: u64 = conn
            .incr(redis_keys::CODE_SEQ, 1)
            .await
            .map_err(store_err)?;

        let record = MissionCode {
            id,
            mission_id,
            code,
            secret: generate_secret(secret_length),
            is_active: true,
            created_at: now,
            expires_at,
        };

        let _: () = redis::pipe()
            .atomic()
            .set(code_key(id), encode(&record)?)
            .ignore()
            .sadd(codes_key(mission_id), id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        tracing::info!(mission_id, code_id = id, code = %record.code, "Mission code issued");
        Ok(record)
    }

    /// All codes of a mission, oldest first
    pub async fn codes(&self, mission_id: u64) -> Result<Vec<MissionCode>, QuestlineError> {
        let mut conn = self.redis.clone();
        let ids: Vec<u64> = conn
            .smembers(codes_key(mission_id))
            .await
            .map_err(store_err)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| code_key(*id)).collect();
        let raw: Vec<Option<String>> = conn.mget(keys).await.map_err(store_err)?;

        let mut codes = raw
            .iter()
            .flatten()
            .map(|r| decode::<MissionCode>(r))
            .collect::<Result<Vec<_>, _>>()?;
        codes.sort_by_key(|c| c.id);
        Ok(codes)
    }

    pub async fn code(&self, code_id: u64) -> Result<Option<MissionCode>, QuestlineError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(code_key(code_id)).await.map_err(store_err)?;
        raw.as_deref().map(decode).transpose()
    }

    pub async fn set_code_active(
        &self,
        code_id: u64,
        is_active: bool,
    ) -> Result<MissionCode, QuestlineError> {
        let mut record = self
            .code(code_id)
            .await?
            .ok_or_else(|| QuestlineError::NotFound("Code not found.".to_string()))?;
        record.is_active = is_active;

        let mut conn = self.redis.clone();
        let _: () = conn
            .set(code_key(code_id), encode(&record)?)
            .await
            .map_err(store_err)?;

        tracing::info!(code_id, is_active, "Mission code toggled");
        Ok(record)
    }

    pub async fn delete_code(&self, code_id: u64) -> Result<(), QuestlineError> {
        let record = self
            .code(code_id)
            .await?
            .ok_or_else(|| QuestlineError::NotFound("Code not found.".to_string()))?;

        let mut conn = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(code_key(code_id))
            .ignore()
            .srem(codes_key(record.mission_id), code_id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        tracing::info!(mission_id = record.mission_id, code_id, "Mission code deleted");
        Ok(())
    }

    // === Completions ===

    pub async fn completion_count(&self, mission_id: u64) -> Result<u64, QuestlineError> {
        let mut conn = self.redis.clone();
        let count: Option<u64> = conn
            .get(completions_key(mission_id))
            .await
            .map_err(store_err)?;
        Ok(count.unwrap_or(0))
    }

    /// Completion history for an identity, newest first
    pub async fn history(
        &self,
        identity: &Identity,
        page: u32,
        per_page: u32,
    ) -> Result<HistoryPage, QuestlineError> {
        let key = history_key(&identity.storage_key());
        let (start, stop) = page_bounds(page, per_page);

        let mut conn = self.redis.clone();
        let (total, raw): (u64, Vec<String>) = redis::pipe()
            .llen(&key)
            .lrange(&key, start, stop)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let mut entries = Vec::with_capacity(raw.len());
        for r in &raw {
            let completion: Completion = decode(r)?;
            let mission_title = self
                .get_mission(completion.mission_id)
                .await?
                .map(|m| m.title);
            entries.push(HistoryEntry {
                completion,
                mission_title,
            });
        }

        Ok(HistoryPage {
            entries,
            page,
            per_page,
            total,
        })
    }

    /// Completions of one mission, newest first
    pub async fn mission_completions(
        &self,
        mission_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<CompletionPage, QuestlineError> {
        if self.get_mission(mission_id).await?.is_none() {
            return Err(QuestlineError::NotFound("Mission not found.".to_string()));
        }

        let key = completion_log_key(mission_id);
        let (start, stop) = page_bounds(page, per_page);

        let mut conn = self.redis.clone();
        let (total, raw): (u64, Vec<String>) = redis::pipe()
            .llen(&key)
            .lrange(&key, start, stop)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let entries = raw
            .iter()
            .map(|r| decode::<Completion>(r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompletionPage {
            mission_id,
            entries,
            page,
            per_page,
            total,
        })
    }
}

impl CodeLookup for RedisStore {
    async fn live_codes(
        &self,
        mission_id: u64,
        now: i64,
    ) -> Result<Vec<MissionCode>, QuestlineError> {
        let mut codes = self.codes(mission_id).await?;
        codes.retain(|c| c.is_live(now));
        Ok(codes)
    }
}

impl MissionRepository for RedisStore {
    async fn mission(&self, mission_id: u64) -> Result<Option<Mission>, QuestlineError> {
        self.get_mission(mission_id).await
    }

    async fn completion_stats(
        &self,
        mission_id: u64,
        identity: &Identity,
    ) -> Result<CompletionStats, QuestlineError> {
        let by_key = completed_by_key(mission_id, &identity.storage_key());

        let mut conn = self.redis.clone();
        let (total, mine, last): (Option<u64>, Option<u64>, Option<i64>) = redis::pipe()
            .get(completions_key(mission_id))
            .hget(&by_key, "count")
            .hget(&by_key, "last_completed_at")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(CompletionStats {
            total_completions: total.unwrap_or(0),
            identity_completions: mine.unwrap_or(0),
            last_completed_at: last,
        })
    }

    async fn record_completion(
        &self,
        mission: &Mission,
        identity: &Identity,
        code: &MissionCode,
        now: i64,
    ) -> Result<RecordedCompletion, QuestlineError> {
        let identity_key = identity.storage_key();

        let mut conn = self.redis.clone();
        let (completion_id, tx_id): (u64, u64) = redis::pipe()
            .incr(redis_keys::COMPLETION_SEQ, 1)
            .incr(redis_keys::TRANSACTION_SEQ, 1)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let completion = Completion {
            id: completion_id,
            mission_id: mission.id,
            identity: identity_key.clone(),
            code_id: code.id,
            code_used: code.code.clone(),
            credits_earned: mission.reward_credits,
            completed_at: now,
        };

        let reward = CreditTransaction {
            id: tx_id,
            identity: identity_key.clone(),
            kind: TransactionKind::MissionReward,
            amount: i64::from(mission.reward_credits),
            description: format!("Mission: {}", mission.title),
            reference_id: Some(completion_id),
            created_at: now,
        };

        let by_key = completed_by_key(mission.id, &identity_key);
        let entry = encode(&completion)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .incr(completions_key(mission.id), 1)
            .ignore()
            .sadd(completers_key(mission.id), &identity_key)
            .ignore()
            .hincr(&by_key, "count", 1)
            .ignore()
            .hset(&by_key, "last_completed_at", now)
            .ignore()
            .lpush(completion_log_key(mission.id), &entry)
            .ignore()
            .lpush(history_key(&identity_key), &entry)
            .ignore();
        CreditLedger::stage_credit(&mut pipe, &reward)?;

        let (new_balance,): (i64,) = pipe.query_async(&mut conn).await.map_err(store_err)?;

        Ok(RecordedCompletion {
            completion,
            new_balance,
        })
    }
}
