//! Shared constants for Questline components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default Outpost HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8899";

/// TOTP step length (15 minutes)
pub const DEFAULT_TIME_STEP_SECS: u64 = 900;

/// Adjacent steps accepted on each side of the current one
pub const DEFAULT_WINDOW: u32 = 1;

/// Widest window accepted from configuration
pub const MAX_WINDOW: u32 = 10;

/// Digits in a one-time code
pub const DEFAULT_DIGITS: u32 = 6;

/// Largest supported code length (truncated HMAC is 31 bits)
pub const MAX_DIGITS: u32 = 10;

/// Base32 symbols in a freshly generated secret
pub const DEFAULT_SECRET_LENGTH: usize = 16;

/// Separator between the static part and the TOTP part of a mission code
pub const CODE_SEPARATOR: char = '-';

/// Longest static part accepted when issuing a code
pub const MAX_STATIC_CODE_LEN: usize = 50;

/// Live code display requests allowed per client per minute
pub const DISPLAY_REQUESTS_PER_MINUTE: u32 = 60;

/// Mission history page size
pub const DEFAULT_HISTORY_PER_PAGE: u32 = 20;

/// Mission history page size ceiling
pub const MAX_HISTORY_PER_PAGE: u32 = 50;

/// Admin completion listing page size
pub const COMPLETIONS_PER_PAGE: u32 = 50;

/// Credit transactions returned with a balance
pub const RECENT_TRANSACTIONS: u32 = 20;

/// Redis key prefixes
pub mod redis_keys {
    /// Mission id sequence
    pub const MISSION_SEQ: &str = "questline:seq:mission";

    /// Mission code id sequence
    pub const CODE_SEQ: &str = "questline:seq:code";

    /// Completion id sequence
    pub const COMPLETION_SEQ: &str = "questline:seq:completion";

    /// Credit transaction id sequence
    pub const TRANSACTION_SEQ: &str = "questline:seq:transaction";

    /// Set of all mission ids
    pub const MISSION_INDEX: &str = "missions";

    /// Mission record: mission:{mission_id}
    pub const MISSION_PREFIX: &str = "mission:";

    /// Mission key to id: mission_key:{key}
    pub const MISSION_KEY_PREFIX: &str = "mission_key:";

    /// Mission code record: code:{code_id}
    pub const CODE_PREFIX: &str = "code:";

    /// Completion history list: history:{identity}
    pub const HISTORY_PREFIX: &str = "history:";

    /// Credit balance: credits:{identity}
    pub const CREDITS_PREFIX: &str = "credits:";

    /// Rate limit counters: ratelimit:{scope}:{client}
    pub const RATELIMIT_PREFIX: &str = "ratelimit:";
}

/// HTTP header names
pub mod headers {
    /// Authenticated user id (set by the upstream auth proxy)
    pub const X_USER_ID: &str = "X-User-Id";

    /// Client address chain from the reverse proxy
    pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";

    /// Admin API token
    pub const X_ADMIN_TOKEN: &str = "X-Admin-Token";
}
