//! Mission eligibility policy (cooldowns and completion caps).

use chrono::{DateTime, Utc};
use questline_common::{CompletionStats, Eligibility, Mission};

/// Decide whether an identity may attempt `mission` at `now`.
///
/// Order: inactive, global cap, then the per-identity rule. A zero cooldown
/// means the mission can be completed once per identity.
pub fn check_eligibility(mission: &Mission, stats: &CompletionStats, now: i64) -> Eligibility {
    if !mission.is_active {
        return Eligibility::denied("This mission is no longer active.");
    }

    if mission.max_completions > 0 && stats.total_completions >= u64::from(mission.max_completions)
    {
        return Eligibility::denied("This mission has reached maximum completions.");
    }

    if mission.cooldown_hours == 0 {
        if stats.identity_completions > 0 {
            return Eligibility::denied("You have already completed this mission.");
        }
        return Eligibility::allowed();
    }

    if let Some(last) = stats.last_completed_at {
        let next_available = last + i64::from(mission.cooldown_hours) * 3600;
        if now < next_available {
            return Eligibility {
                eligible: false,
                reason: format!(
                    "You can do this mission again in {}.",
                    format_duration((next_available - now) as u64)
                ),
                next_available: DateTime::<Utc>::from_timestamp(next_available, 0),
            };
        }
    }

    Eligibility::allowed()
}

/// Human-readable duration in its largest whole unit ("3 hours").
pub fn format_duration(secs: u64) -> String {
    let (value, unit) = match secs {
        0..60 => (secs, "second"),
        60..3600 => (secs / 60, "minute"),
        3600..86400 => (secs / 3600, "hour"),
        _ => (secs / 86400, "day"),
    };

    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}
