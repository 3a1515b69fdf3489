//! Core types shared across Questline components.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::totp::Secret;

/// How a mission is completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    /// Visit a partner page and copy the live code
    #[default]
    CodeCollect,
    SocialShare,
    DailyLogin,
}

/// A mission visitors complete for credits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: u64,

    /// Unique slug
    pub mission_key: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Credits awarded per completion
    pub reward_credits: u32,

    #[serde(default)]
    pub mission_type: MissionType,

    /// Partner page where the code is displayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,

    /// Where to look for the code on the partner page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hint: Option<String>,

    pub is_active: bool,

    /// Global completion cap (0 = unlimited)
    #[serde(default)]
    pub max_completions: u32,

    /// Hours between completions by one identity (0 = once per identity)
    #[serde(default)]
    pub cooldown_hours: u32,

    /// Unix epoch seconds
    pub created_at: i64,
    pub updated_at: i64,
}

/// Payload for creating a mission
#[derive(Debug, Clone, Deserialize)]
pub struct NewMission {
    /// Generated when absent
    #[serde(default)]
    pub mission_key: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reward_credits: u32,
    #[serde(default)]
    pub mission_type: MissionType,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub code_hint: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub max_completions: u32,
    #[serde(default)]
    pub cooldown_hours: u32,
}

fn default_true() -> bool {
    true
}

// Missions start active whether built in code or parsed from JSON
impl Default for NewMission {
    fn default() -> Self {
        Self {
            mission_key: None,
            title: String::new(),
            description: String::new(),
            reward_credits: 0,
            mission_type: MissionType::default(),
            target_url: None,
            code_hint: None,
            is_active: default_true(),
            max_completions: 0,
            cooldown_hours: 0,
        }
    }
}

impl NewMission {
    /// Build the stored record. The key is normalized, or generated if empty.
    pub fn into_mission(self, id: u64, now: i64) -> Mission {
        let mission_key = self
            .mission_key
            .as_deref()
            .map(normalize_mission_key)
            .filter(|k| !k.is_empty())
            .unwrap_or_else(generate_mission_key);

        Mission {
            id,
            mission_key,
            title: self.title.trim().to_string(),
            description: self.description,
            reward_credits: self.reward_credits,
            mission_type: self.mission_type,
            target_url: non_empty(self.target_url),
            code_hint: non_empty(self.code_hint),
            is_active: self.is_active,
            max_completions: self.max_completions,
            cooldown_hours: self.cooldown_hours,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial mission update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub reward_credits: Option<u32>,
    pub mission_type: Option<MissionType>,
    pub target_url: Option<String>,
    pub code_hint: Option<String>,
    pub is_active: Option<bool>,
    pub max_completions: Option<u32>,
    pub cooldown_hours: Option<u32>,
}

impl MissionUpdate {
    pub fn apply(self, mission: &mut Mission, now: i64) {
        if let Some(title) = self.title {
            mission.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            mission.description = description;
        }
        if let Some(reward) = self.reward_credits {
            mission.reward_credits = reward;
        }
        if let Some(mission_type) = self.mission_type {
            mission.mission_type = mission_type;
        }
        if let Some(url) = self.target_url {
            mission.target_url = non_empty(Some(url));
        }
        if let Some(hint) = self.code_hint {
            mission.code_hint = non_empty(Some(hint));
        }
        if let Some(active) = self.is_active {
            mission.is_active = active;
        }
        if let Some(max) = self.max_completions {
            mission.max_completions = max;
        }
        if let Some(cooldown) = self.cooldown_hours {
            mission.cooldown_hours = cooldown;
        }
        mission.updated_at = now;
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Lowercase slug of ASCII alphanumerics, `_` and `-`
pub fn normalize_mission_key(key: &str) -> String {
    key.trim()
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || c == '_' || c == '-').then_some(c)
        })
        .collect()
}

fn generate_mission_key() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    format!("mission_{:032x}", rng.random::<u128>())
}

/// A static code attached to a mission, with its TOTP secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionCode {
    pub id: u64,
    pub mission_id: u64,

    /// Static part, stored uppercase
    pub code: String,

    /// Server-side only; never returned to visitors
    pub secret: Secret,

    pub is_active: bool,

    pub created_at: i64,

    /// Optional hard expiry (Unix epoch seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl MissionCode {
    /// Active and not past its expiry
    pub fn is_live(&self, now: i64) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires| expires > now)
    }

    /// The combined code a visitor types: `STATIC-TOTP`
    pub fn full_code(&self, totp: &str) -> String {
        format!("{}{}{}", self.code, crate::constants::CODE_SEPARATOR, totp)
    }
}

/// Who is attempting a mission or holding credits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Identity {
    /// Logged-in user
    User(u64),
    /// Guest, keyed by a fingerprint of the client IP
    Guest(String),
}

impl Identity {
    /// Guest identity for a client IP. The raw address is never stored.
    pub fn guest(ip: &str) -> Self {
        let digest = Sha256::digest(ip.trim().as_bytes());
        Self::Guest(URL_SAFE_NO_PAD.encode(&digest[..18]))
    }

    /// Stable key fragment for storage
    pub fn storage_key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{}", id),
            Self::Guest(fingerprint) => format!("guest:{}", fingerprint),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Completion counts feeding the eligibility policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionStats {
    /// Completions of the mission by anyone
    pub total_completions: u64,
    /// Completions of the mission by this identity
    pub identity_completions: u64,
    /// Most recent completion by this identity (Unix epoch seconds)
    pub last_completed_at: Option<i64>,
}

/// Eligibility verdict for one identity and mission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    /// Empty when eligible
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available: Option<DateTime<Utc>>,
}

impl Eligibility {
    pub fn allowed() -> Self {
        Self {
            eligible: true,
            reason: String::new(),
            next_available: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: reason.into(),
            next_available: None,
        }
    }
}

/// A recorded mission completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub id: u64,
    pub mission_id: u64,
    /// `Identity::storage_key()` of the completer
    pub identity: String,
    pub code_id: u64,
    /// Static part of the code used (the TOTP part is not kept)
    pub code_used: String,
    pub credits_earned: u32,
    pub completed_at: i64,
}

/// Credit ledger entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    MissionReward,
    /// Credits bought by the holder
    Purchase,
    /// Credits used up; amount is negative
    Spend,
    /// Credits returned after a failed spend
    Refund,
    Adjustment,
}

/// Append-only credit ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: u64,
    pub identity: String,
    pub kind: TransactionKind,
    /// Signed credit delta
    pub amount: i64,
    pub description: String,
    /// Id of the record that caused this entry (completion id for rewards)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<u64>,
    pub created_at: i64,
}

/// Why a submitted mission code was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeRejection {
    /// Not `STATIC-DIGITS`
    Malformed,
    /// Mission has no live codes at all
    NoActiveCodes,
    /// No live code has this static part
    UnknownCode,
    /// Static part matched but the TOTP part is outside the window
    Expired,
}

impl CodeRejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed_code",
            Self::NoActiveCodes => "no_active_codes",
            Self::UnknownCode => "invalid_code",
            Self::Expired => "code_expired",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Malformed => "Invalid code format. Please use format: CODE-123456",
            Self::NoActiveCodes => "No active codes for this mission.",
            Self::UnknownCode => "Invalid code. Please check and try again.",
            Self::Expired => "Verification code has expired. Please get a new code.",
        }
    }
}

impl fmt::Display for CodeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
