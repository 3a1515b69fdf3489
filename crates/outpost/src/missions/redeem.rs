//! Mission redemption: eligibility, code verification, and reward.

use serde::Serialize;

use questline_common::totp::TotpParams;
use questline_common::{Identity, QuestlineError};

use super::{MissionRepository, check_eligibility, verify_mission_code};

/// Successful redemption result
#[derive(Debug, Clone, Serialize)]
pub struct Redemption {
    pub mission_id: u64,
    pub completion_id: u64,
    pub credits_earned: u32,
    pub new_balance: i64,
    pub message: String,
}

/// Redeem a submitted code for `mission_id` on behalf of `identity`.
///
/// Eligibility is checked before the code so an ineligible visitor learns
/// nothing about code validity. Nothing is written unless every check passes.
pub async fn redeem<R>(
    repo: &R,
    params: &TotpParams,
    mission_id: u64,
    identity: &Identity,
    input: &str,
    now: i64,
) -> Result<Redemption, QuestlineError>
where
    R: MissionRepository + ?Sized,
{
    if input.trim().is_empty() {
        return Err(QuestlineError::InvalidInput("Please enter a code.".to_string()));
    }

    let mission = repo
        .mission(mission_id)
        .await?
        .ok_or_else(|| QuestlineError::NotFound("Mission not found.".to_string()))?;

    let stats = repo.completion_stats(mission_id, identity).await?;
    let verdict = check_eligibility(&mission, &stats, now);
    if !verdict.eligible {
        return Err(QuestlineError::NotEligible {
            reason: verdict.reason,
            next_available: verdict.next_available,
        });
    }

    let code = verify_mission_code(repo, params, mission_id, input, now).await?;

    let recorded = repo.record_completion(&mission, identity, &code, now).await?;

    tracing::info!(
        mission_id,
        code_id = code.id,
        identity = %identity,
        credits = mission.reward_credits,
        "Mission completed"
    );

    Ok(Redemption {
        mission_id,
        completion_id: recorded.completion.id,
        credits_earned: mission.reward_credits,
        new_balance: recorded.new_balance,
        message: format!(
            "Congratulations! You earned {} credits!",
            mission.reward_credits
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missions::memory::MemoryStore;
    use questline_common::{CodeRejection, MissionCode, NewMission, Secret};

    const NOW: i64 = 1_700_000_000;
    const CODE: &str = "PARTNER1-718010";

    fn store(max_completions: u32, cooldown_hours: u32) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_mission(
            NewMission {
                mission_key: Some("partner".to_string()),
                title: "Visit partner".to_string(),
                reward_credits: 25,
                max_completions,
                cooldown_hours,
                ..Default::default()
            }
            .into_mission(1, 0),
        );
        store.insert_code(MissionCode {
            id: 3,
            mission_id: 1,
            code: "PARTNER1".to_string(),
            secret: Secret::new("JBSWY3DPEHPK3PXP"),
            is_active: true,
            created_at: 0,
            expires_at: None,
        });
        store
    }

    #[tokio::test]
    async fn test_redeem_credits_reward() {
        let store = store(0, 24);
        let user = Identity::User(42);

        let redemption = redeem(&store, &TotpParams::default(), 1, &user, CODE, NOW)
            .await
            .unwrap();

        assert_eq!(redemption.credits_earned, 25);
        assert_eq!(redemption.new_balance, 25);
        assert_eq!(redemption.message, "Congratulations! You earned 25 credits!");
        assert_eq!(store.balance(&user), 25);

        let completions = store.completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].code_id, 3);
        assert_eq!(completions[0].code_used, "PARTNER1");
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_redemption() {
        let store = store(0, 24);
        let user = Identity::User(42);
        let params = TotpParams::default();

        redeem(&store, &params, 1, &user, CODE, NOW).await.unwrap();

        match redeem(&store, &params, 1, &user, CODE, NOW + 60).await {
            Err(QuestlineError::NotEligible { reason, next_available }) => {
                assert!(reason.starts_with("You can do this mission again in"));
                assert_eq!(next_available.map(|t| t.timestamp()), Some(NOW + 24 * 3600));
            }
            other => panic!("expected NotEligible, got {:?}", other),
        }
        assert_eq!(store.completions().len(), 1);

        // A different identity is unaffected
        let other = Identity::guest("198.51.100.4");
        assert!(redeem(&store, &params, 1, &other, CODE, NOW + 60).await.is_ok());
    }

    #[tokio::test]
    async fn test_ineligible_checked_before_code() {
        let store = store(0, 0);
        let user = Identity::User(1);
        let params = TotpParams::default();

        redeem(&store, &params, 1, &user, CODE, NOW).await.unwrap();

        // Wrong code, but eligibility wins
        let result = redeem(&store, &params, 1, &user, "PARTNER1-000000", NOW).await;
        assert!(matches!(result, Err(QuestlineError::NotEligible { .. })));
    }

    #[tokio::test]
    async fn test_rejected_code_writes_nothing() {
        let store = store(0, 24);
        let user = Identity::User(7);

        let result = redeem(
            &store,
            &TotpParams::default(),
            1,
            &user,
            "PARTNER1-718010",
            NOW + 1800,
        )
        .await;

        assert!(matches!(
            result,
            Err(QuestlineError::CodeRejected(CodeRejection::Expired))
        ));
        assert!(store.completions().is_empty());
        assert_eq!(store.balance(&user), 0);
    }

    #[tokio::test]
    async fn test_empty_input_and_unknown_mission() {
        let store = store(0, 24);
        let user = Identity::User(7);
        let params = TotpParams::default();

        assert!(matches!(
            redeem(&store, &params, 1, &user, "   ", NOW).await,
            Err(QuestlineError::InvalidInput(_))
        ));
        assert!(matches!(
            redeem(&store, &params, 99, &user, CODE, NOW).await,
            Err(QuestlineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_global_cap() {
        let store = store(1, 24);
        let params = TotpParams::default();

        redeem(&store, &params, 1, &Identity::User(1), CODE, NOW)
            .await
            .unwrap();

        match redeem(&store, &params, 1, &Identity::User(2), CODE, NOW).await {
            Err(QuestlineError::NotEligible { reason, .. }) => {
                assert_eq!(reason, "This mission has reached maximum completions.");
            }
            other => panic!("expected NotEligible, got {:?}", other),
        }
    }
}
