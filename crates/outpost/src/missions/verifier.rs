//! Combined mission code verification (`STATIC-TOTP`).

use questline_common::constants::{CODE_SEPARATOR, MAX_STATIC_CODE_LEN};
use questline_common::totp::{self, TotpParams};
use questline_common::{CodeRejection, MissionCode, QuestlineError};

use super::CodeLookup;

/// Split a submission into its uppercase static part and its TOTP part.
///
/// Exactly one separator with non-empty sides is required, and the TOTP part
/// must have the configured number of digits.
pub fn parse_combined_code(input: &str, digits: u32) -> Result<(String, String), CodeRejection> {
    let normalized = input.trim().to_uppercase();
    let mut parts = normalized.split(CODE_SEPARATOR);

    let (Some(static_part), Some(totp_part), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(CodeRejection::Malformed);
    };

    let static_part = static_part.trim();
    let totp_part = totp_part.trim();

    if static_part.is_empty() || !totp::is_well_formed(totp_part, digits) {
        return Err(CodeRejection::Malformed);
    }

    Ok((static_part.to_string(), totp_part.to_string()))
}

/// Verify a submission against the mission's live codes.
///
/// Returns the matched code record. The first record whose static part
/// matches decides the outcome: a failed TOTP check there is reported as
/// expired and no further records are tried.
pub async fn verify_mission_code<L>(
    lookup: &L,
    params: &TotpParams,
    mission_id: u64,
    input: &str,
    now: i64,
) -> Result<MissionCode, QuestlineError>
where
    L: CodeLookup + ?Sized,
{
    let (static_part, totp_part) =
        parse_combined_code(input, params.digits).map_err(QuestlineError::CodeRejected)?;

    let codes = lookup.live_codes(mission_id, now).await?;
    if codes.is_empty() {
        return Err(QuestlineError::CodeRejected(CodeRejection::NoActiveCodes));
    }

    let Some(record) = codes
        .into_iter()
        .find(|c| c.code.eq_ignore_ascii_case(&static_part))
    else {
        tracing::debug!(mission_id, "No live code matches static part");
        return Err(QuestlineError::CodeRejected(CodeRejection::UnknownCode));
    };

    match params.try_validate_at(record.secret.as_str(), &totp_part, now) {
        Ok(true) => Ok(record),
        Ok(false) => {
            tracing::debug!(mission_id, code_id = record.id, "TOTP outside window");
            Err(QuestlineError::CodeRejected(CodeRejection::Expired))
        }
        Err(e) if e.is_corrupt_secret() => {
            tracing::error!(
                mission_id,
                code_id = record.id,
                error = %e,
                "Stored TOTP secret is unusable"
            );
            Err(QuestlineError::CodeRejected(CodeRejection::Expired))
        }
        // Bad step settings are not the visitor's fault
        Err(e) => Err(QuestlineError::Otp(e)),
    }
}

/// Normalize a static code for issuance: trimmed, uppercase, ASCII
/// alphanumerics only, and never containing the separator.
pub fn normalize_static_code(code: &str) -> Result<String, QuestlineError> {
    let code = code.trim().to_ascii_uppercase();

    if code.is_empty() {
        return Err(QuestlineError::InvalidInput("Code must not be empty.".to_string()));
    }
    if code.len() > MAX_STATIC_CODE_LEN {
        return Err(QuestlineError::InvalidInput(format!(
            "Code must be at most {} characters.",
            MAX_STATIC_CODE_LEN
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(QuestlineError::InvalidInput(
            "Code may only contain letters and digits.".to_string(),
        ));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missions::memory::MemoryStore;
    use questline_common::{OtpError, Secret};

    const SECRET: &str = "JBSWY3DPEHPK3PXP";
    const NOW: i64 = 1_700_000_000;
    /// Code for SECRET at NOW
    const LIVE_TOTP: &str = "718010";

    fn store_with_code() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_code(MissionCode {
            id: 10,
            mission_id: 1,
            code: "ABC123".to_string(),
            secret: Secret::new(SECRET),
            is_active: true,
            created_at: 0,
            expires_at: None,
        });
        store
    }

    fn rejection(result: Result<MissionCode, QuestlineError>) -> CodeRejection {
        match result {
            Err(QuestlineError::CodeRejected(r)) => r,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_combined_code() {
        assert_eq!(
            parse_combined_code("  abc123-718010 ", 6),
            Ok(("ABC123".to_string(), "718010".to_string()))
        );
        assert_eq!(
            parse_combined_code("abc123 - 718010", 6),
            Ok(("ABC123".to_string(), "718010".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for input in [
            "NOSEPARATORHERE",
            "ABC-123-456789",
            "-718010",
            "ABC123-",
            "ABC123-71801",
            "ABC123-71801A",
            "",
        ] {
            assert_eq!(parse_combined_code(input, 6), Err(CodeRejection::Malformed), "{input}");
        }
    }

    #[tokio::test]
    async fn test_verify_accepts_live_code() {
        let store = store_with_code();
        let params = TotpParams::default();

        let matched = verify_mission_code(&store, &params, 1, "abc123-718010", NOW)
            .await
            .unwrap();
        assert_eq!(matched.id, 10);
    }

    #[tokio::test]
    async fn test_verify_accepts_previous_step() {
        let store = store_with_code();
        let params = TotpParams::default();

        // One step later the old code is still inside the window
        let result = verify_mission_code(&store, &params, 1, "ABC123-718010", NOW + 900).await;
        assert!(result.is_ok());

        let result = verify_mission_code(&store, &params, 1, "ABC123-718010", NOW + 1800).await;
        assert_eq!(rejection(result), CodeRejection::Expired);
    }

    #[tokio::test]
    async fn test_missing_separator_is_format_error() {
        let store = store_with_code();
        let result =
            verify_mission_code(&store, &TotpParams::default(), 1, "NOSEPARATORHERE", NOW).await;
        assert_eq!(rejection(result), CodeRejection::Malformed);
    }

    #[tokio::test]
    async fn test_stale_totp_with_known_static_part_reports_expiry() {
        let store = store_with_code();
        let result =
            verify_mission_code(&store, &TotpParams::default(), 1, "ABC123-999999", NOW).await;
        assert_eq!(rejection(result), CodeRejection::Expired);
    }

    #[tokio::test]
    async fn test_unknown_static_part_is_invalid_code() {
        let store = store_with_code();
        let result =
            verify_mission_code(&store, &TotpParams::default(), 1, "ZZZ999-718010", NOW).await;
        assert_eq!(rejection(result), CodeRejection::UnknownCode);
    }

    #[tokio::test]
    async fn test_mission_without_live_codes() {
        let store = store_with_code();
        let result =
            verify_mission_code(&store, &TotpParams::default(), 2, "ABC123-718010", NOW).await;
        assert_eq!(rejection(result), CodeRejection::NoActiveCodes);
    }

    #[tokio::test]
    async fn test_inactive_and_expired_codes_are_skipped() {
        let store = MemoryStore::new();
        store.insert_code(MissionCode {
            id: 1,
            mission_id: 1,
            code: "OLD".to_string(),
            secret: Secret::new(SECRET),
            is_active: false,
            created_at: 0,
            expires_at: None,
        });
        store.insert_code(MissionCode {
            id: 2,
            mission_id: 1,
            code: "GONE".to_string(),
            secret: Secret::new(SECRET),
            is_active: true,
            created_at: 0,
            expires_at: Some(NOW - 1),
        });
        store.insert_code(MissionCode {
            id: 3,
            mission_id: 1,
            code: "LIVE".to_string(),
            secret: Secret::new(SECRET),
            is_active: true,
            created_at: 0,
            expires_at: Some(NOW + 3600),
        });

        let params = TotpParams::default();
        let old = verify_mission_code(&store, &params, 1, &format!("OLD-{LIVE_TOTP}"), NOW).await;
        assert_eq!(rejection(old), CodeRejection::UnknownCode);

        let gone = verify_mission_code(&store, &params, 1, &format!("GONE-{LIVE_TOTP}"), NOW).await;
        assert_eq!(rejection(gone), CodeRejection::UnknownCode);

        let live = verify_mission_code(&store, &params, 1, &format!("live-{LIVE_TOTP}"), NOW).await;
        assert_eq!(live.unwrap().id, 3);
    }

    #[tokio::test]
    async fn test_corrupt_secret_is_rejected_not_fatal() {
        let store = MemoryStore::new();
        store.insert_code(MissionCode {
            id: 5,
            mission_id: 1,
            code: "BROKEN".to_string(),
            secret: Secret::new("not base32!"),
            is_active: true,
            created_at: 0,
            expires_at: None,
        });

        let result =
            verify_mission_code(&store, &TotpParams::default(), 1, "BROKEN-123456", NOW).await;
        assert_eq!(rejection(result), CodeRejection::Expired);
    }

    #[tokio::test]
    async fn test_unusable_settings_are_internal_errors() {
        let store = store_with_code();
        let params = TotpParams {
            time_step: 0,
            ..TotpParams::default()
        };

        let result = verify_mission_code(&store, &params, 1, "ABC123-718010", NOW).await;
        let err = result.unwrap_err();
        assert!(matches!(err, QuestlineError::Otp(OtpError::InvalidTimeStep)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_normalize_static_code() {
        assert_eq!(normalize_static_code(" abc123 ").unwrap(), "ABC123");
        assert!(normalize_static_code("").is_err());
        assert!(normalize_static_code("ABC-123").is_err());
        assert!(normalize_static_code("ABC 123").is_err());
        assert!(normalize_static_code(&"A".repeat(51)).is_err());
    }
}
