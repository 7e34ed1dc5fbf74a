//! Integration tests for the league engine
//!
//! These tests drive the full engine over the in-process store: XP accrual
//! through the verification gate, ranking, season rollover with promotions,
//! retries on storage failure, and the HTTP surface.

use chrono::{Duration, Utc};
use charter_league::database::{InMemoryStore, LeagueStore};
use charter_league::league::{
    ComplianceStatus, CredentialsStatus, KycStatus, LeagueTier, RecordOutcome, RolloverOutcome,
    RolloverStage, Season, SeasonSettings, SeasonStatus, TierChange, VerificationStatus,
    XpEventType,
};
use charter_league::{LeagueEngine, RetryPolicy};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

/// Engine over a fresh store with a current season already open
async fn create_test_engine() -> (Arc<InMemoryStore>, Arc<LeagueEngine>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(LeagueEngine::new(
        store.clone(),
        SeasonSettings::default(),
        fast_retry(),
    ));
    engine.bootstrap(Utc::now()).await.unwrap();
    (store, engine)
}

fn users(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("member_{:02}", i)).collect()
}

/// Walk a prior season through a hand-driven rollover so that `users` start
/// the returned (current) season at `tier`.
async fn season_with_tiers(store: &Arc<InMemoryStore>, users: &[String], tier: LeagueTier) -> Season {
    let now = Utc::now();
    let prior = Season::new(now - Duration::days(14), Duration::days(7));
    store.insert_season(&prior).await.unwrap();
    for user in users {
        store.ensure_membership(user, prior.id).await.unwrap();
    }

    store.claim_rollover(prior.id, None, now).await.unwrap();
    store
        .advance_rollover(prior.id, RolloverStage::Started, RolloverStage::Ranked)
        .await
        .unwrap();
    let changes: Vec<TierChange> = users
        .iter()
        .map(|u| TierChange {
            user_id: u.clone(),
            from: LeagueTier::Bronze,
            to: tier,
        })
        .collect();
    assert!(store.apply_tier_changes(prior.id, &changes).await.unwrap());

    let next = Season::new(now, Duration::days(7));
    store.open_next_season(prior.id, &next).await.unwrap();
    store.seed_memberships(prior.id, next.id).await.unwrap();
    store
        .advance_rollover(prior.id, RolloverStage::Opened, RolloverStage::Completed)
        .await
        .unwrap();
    next
}

/// Give `user` `count` rfq_posted events (5 points each)
async fn award_rfqs(engine: &LeagueEngine, user: &str, count: usize) {
    for _ in 0..count {
        let outcome = engine
            .record_xp_event(user, "rfq_posted", serde_json::Value::Null, None)
            .await;
        assert!(outcome.recorded(), "unexpected outcome {:?}", outcome);
    }
}

// ============================================================================
// Verification Gate
// ============================================================================

mod verification_gate {
    use super::*;

    #[tokio::test]
    async fn test_ineligible_user_earns_nothing() {
        let (_, engine) = create_test_engine().await;
        let unverified = VerificationStatus {
            is_verified: false,
            kyc_status: KycStatus::Pending,
            credentials_status: CredentialsStatus::Valid,
            compliance_status: ComplianceStatus::Clean,
        };

        let outcome = engine
            .record_xp_event(
                "operator_1",
                "deal_completed_on_time",
                serde_json::Value::Null,
                Some(&unverified),
            )
            .await;
        assert!(matches!(outcome, RecordOutcome::Ineligible { .. }));

        let stats = engine.get_user_league_stats("operator_1").await.unwrap();
        assert_eq!(stats.points, 0);
        assert_eq!(stats.rank, None);
        assert!(engine
            .get_user_xp_events("operator_1", None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_expired_credentials_block_credentials_event() {
        let (_, engine) = create_test_engine().await;
        let mut status = VerificationStatus::verified();
        status.credentials_status = CredentialsStatus::Expired;

        let blocked = engine
            .record_xp_event(
                "operator_2",
                "credentials_up_to_date",
                serde_json::Value::Null,
                Some(&status),
            )
            .await;
        assert!(matches!(blocked, RecordOutcome::Ineligible { .. }));
    }

    #[tokio::test]
    async fn test_flagged_compliance_blocks_everything() {
        let (_, engine) = create_test_engine().await;
        let mut status = VerificationStatus::verified();
        status.compliance_status = ComplianceStatus::Flagged;

        let outcome = engine
            .record_xp_event("operator_3", "rfq_posted", serde_json::Value::Null, Some(&status))
            .await;
        assert!(!outcome.recorded());
    }
}

// ============================================================================
// XP Ledger
// ============================================================================

mod xp_ledger {
    use super::*;

    #[tokio::test]
    async fn test_single_event_adds_rule_points() {
        let (store, engine) = create_test_engine().await;
        let verified = VerificationStatus::verified();

        let outcome = engine
            .record_xp_event(
                "broker_1",
                "fallthrough_recovered",
                serde_json::json!({"deal_id": "d-42"}),
                Some(&verified),
            )
            .await;
        let RecordOutcome::Recorded { event, membership } = outcome else {
            panic!("expected recorded outcome");
        };
        assert_eq!(event.points, 30);
        assert_eq!(event.event_type, XpEventType::FallthroughRecovered);
        assert_eq!(membership.points, 30);

        let season = engine.current_season().await.unwrap();
        let events = engine.get_user_xp_events("broker_1", None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].meta["deal_id"], "d-42");
        assert_eq!(store.sum_xp_points("broker_1", season.id).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_unknown_event_and_empty_user_are_noops() {
        let (_, engine) = create_test_engine().await;

        let unknown = engine
            .record_xp_event("broker_1", "liked_a_post", serde_json::Value::Null, None)
            .await;
        assert!(matches!(unknown, RecordOutcome::UnknownEventType { .. }));

        let invalid = engine
            .record_xp_event("  ", "rfq_posted", serde_json::Value::Null, None)
            .await;
        assert!(matches!(invalid, RecordOutcome::Invalid { .. }));

        assert!(engine.get_current_leaderboard(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_with_lost_reply_counts_once() {
        let (store, engine) = create_test_engine().await;
        let season = engine.current_season().await.unwrap();

        store.inject_lost_replies(1);
        let outcome = engine
            .record_xp_event("broker_4", "quote_accepted", serde_json::Value::Null, None)
            .await;
        let RecordOutcome::Recorded { membership, .. } = outcome else {
            panic!("expected the committed award to be reported as recorded");
        };
        assert_eq!(membership.points, 25);
        assert_eq!(store.sum_xp_points("broker_4", season.id).await.unwrap(), 25);
        assert_eq!(engine.get_user_xp_events("broker_4", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (store, engine) = create_test_engine().await;

        store.inject_failures(2);
        let outcome = engine
            .record_xp_event("broker_2", "quote_accepted", serde_json::Value::Null, None)
            .await;
        assert!(outcome.recorded());

        let stats = engine.get_user_league_stats("broker_2").await.unwrap();
        assert_eq!(stats.points, 25);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_reported_not_raised() {
        let (store, engine) = create_test_engine().await;

        store.inject_failures(100);
        let outcome = engine
            .record_xp_event("broker_3", "quote_accepted", serde_json::Value::Null, None)
            .await;
        assert!(matches!(outcome, RecordOutcome::Failed { .. }));

        store.inject_failures(0);
        let stats = engine.get_user_league_stats("broker_3").await.unwrap();
        assert_eq!(stats.points, 0);
    }

    #[tokio::test]
    async fn test_stale_season_handle_is_retargeted() {
        let (_, engine) = create_test_engine().await;
        let old = engine.current_season().await.unwrap();

        let closed = engine.close_season(old.id).await.unwrap();
        assert!(matches!(closed, RolloverOutcome::Rolled(_)));
        let current = engine.current_season().await.unwrap();

        let outcome = engine
            .record_xp_event_in(&old, "carrier_9", "rfq_posted", serde_json::Value::Null, None)
            .await;
        let RecordOutcome::Recorded { event, .. } = outcome else {
            panic!("expected the event to land in the new season");
        };
        assert_eq!(event.season_id, current.id);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording_keeps_totals_consistent() {
        let (store, engine) = create_test_engine().await;
        let season = engine.current_season().await.unwrap();
        let members = users(4);

        let mut handles = Vec::new();
        for task in 0..8 {
            let engine = engine.clone();
            let user = members[task % members.len()].clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let outcome = engine
                        .record_xp_event(&user, "quote_submitted_fast", serde_json::Value::Null, None)
                        .await;
                    assert!(outcome.recorded());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for user in &members {
            let membership = store.get_membership(user, season.id).await.unwrap().unwrap();
            let ledger_total = store.sum_xp_points(user, season.id).await.unwrap();
            // 2 tasks per user, 25 events each, 15 points per event
            assert_eq!(membership.points, 2 * 25 * 15);
            assert_eq!(membership.points, ledger_total);
        }
    }
}

// ============================================================================
// Ranking
// ============================================================================

mod ranking {
    use super::*;

    #[tokio::test]
    async fn test_ten_users_ranked_by_points() {
        let (_, engine) = create_test_engine().await;
        let members = users(10);
        for (i, user) in members.iter().enumerate() {
            award_rfqs(&engine, user, 10 - i).await;
        }

        let board = engine.get_current_leaderboard(None).await.unwrap();
        assert_eq!(board.len(), 10);
        for (i, entry) in board.iter().enumerate() {
            assert_eq!(entry.user_id, members[i]);
            assert_eq!(entry.rank, i as u32 + 1);
            assert_eq!(entry.points, 5 * (10 - i as i64));
        }
    }

    #[tokio::test]
    async fn test_leaderboard_limit_is_clamped() {
        let (_, engine) = create_test_engine().await;
        for user in users(3) {
            award_rfqs(&engine, &user, 1).await;
        }
        assert_eq!(engine.get_current_leaderboard(Some(0)).await.unwrap().len(), 1);
        assert_eq!(engine.get_current_leaderboard(Some(2)).await.unwrap().len(), 2);
    }
}

// ============================================================================
// Season Rollover
// ============================================================================

mod season_rollover {
    use super::*;

    #[tokio::test]
    async fn test_ten_users_two_up_two_down() {
        let store = Arc::new(InMemoryStore::new());
        let members = users(10);
        let season = season_with_tiers(&store, &members, LeagueTier::Gold).await;
        let engine = LeagueEngine::new(store.clone(), SeasonSettings::default(), fast_retry());

        for (i, user) in members.iter().enumerate() {
            award_rfqs(&engine, user, 10 - i).await;
        }

        let RolloverOutcome::Rolled(report) = engine.close_season(season.id).await.unwrap() else {
            panic!("expected rollover");
        };
        let promotions = report.promotions.expect("promotions ran");
        assert_eq!(promotions.promoted, vec!["member_00", "member_01"]);
        assert_eq!(promotions.demoted, vec!["member_08", "member_09"]);
        assert_eq!(report.seeded_memberships, 10);

        let next = report.next_season.id;
        for (i, user) in members.iter().enumerate() {
            let m = store.get_membership(user, next).await.unwrap().unwrap();
            let expected = match i {
                0 | 1 => LeagueTier::Platinum,
                8 | 9 => LeagueTier::Silver,
                _ => LeagueTier::Gold,
            };
            assert_eq!(m.league_tier, expected, "{}", user);
            assert_eq!(m.points, 0);
        }
    }

    #[tokio::test]
    async fn test_diamond_stays_diamond() {
        let store = Arc::new(InMemoryStore::new());
        let members = users(5);
        let season = season_with_tiers(&store, &members, LeagueTier::Diamond).await;
        let engine = LeagueEngine::new(store.clone(), SeasonSettings::default(), fast_retry());
        for (i, user) in members.iter().enumerate() {
            award_rfqs(&engine, user, 5 - i).await;
        }

        let RolloverOutcome::Rolled(report) = engine.close_season(season.id).await.unwrap() else {
            panic!("expected rollover");
        };
        let promotions = report.promotions.expect("promotions ran");
        assert!(promotions.promoted.is_empty());
        assert!(promotions.unchanged_at_cap.contains(&"member_00".to_string()));
        assert_eq!(promotions.demoted, vec!["member_04"]);

        let top = store
            .get_membership("member_00", report.next_season.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(top.league_tier, LeagueTier::Diamond);
    }

    #[tokio::test]
    async fn test_empty_season_closes_and_opens_next() {
        let (_, engine) = create_test_engine().await;
        let season = engine.current_season().await.unwrap();

        let RolloverOutcome::Rolled(report) = engine.close_season(season.id).await.unwrap() else {
            panic!("expected rollover");
        };
        assert_eq!(report.seeded_memberships, 0);
        assert_eq!(report.promotions.unwrap_or_default().promoted.len(), 0);

        let current = engine.current_season().await.unwrap();
        assert_eq!(current.id, report.next_season.id);
        assert_eq!(current.status, SeasonStatus::Active);

        let closed = engine.seasons().get_season(season.id).await.unwrap().unwrap();
        assert_eq!(closed.status, SeasonStatus::Ended);
        assert_eq!(closed.next_season_id, Some(current.id));
    }

    #[tokio::test]
    async fn test_second_close_is_noop() {
        let (_, engine) = create_test_engine().await;
        let season = engine.current_season().await.unwrap();
        engine.close_season(season.id).await.unwrap();
        let current = engine.current_season().await.unwrap();

        let again = engine.close_season(season.id).await.unwrap();
        assert_eq!(
            again,
            RolloverOutcome::AlreadyClosed {
                season_id: season.id,
                next_season_id: Some(current.id),
            }
        );
        assert_eq!(engine.current_season().await.unwrap().id, current.id);
    }

    #[tokio::test]
    async fn test_scheduled_close_waits_for_season_end() {
        let (_, engine) = create_test_engine().await;
        let outcome = engine.close_season_and_roll().await.unwrap();
        assert!(matches!(outcome, RolloverOutcome::NotDue { .. }));
    }

    #[tokio::test]
    async fn test_due_season_successor_is_contiguous() {
        let store = Arc::new(InMemoryStore::new());
        let season = Season::new(Utc::now() - Duration::days(8), Duration::days(7));
        store.insert_season(&season).await.unwrap();
        let engine = LeagueEngine::new(store.clone(), SeasonSettings::default(), fast_retry());

        let RolloverOutcome::Rolled(report) = engine.close_season_and_roll().await.unwrap() else {
            panic!("expected rollover");
        };
        assert_eq!(report.next_season.starts_at, season.ends_at);
        assert_eq!(report.next_season.ends_at - report.next_season.starts_at, Duration::days(7));
    }
}

// ============================================================================
// HTTP API
// ============================================================================

mod http_api {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use charter_league::{create_app, LeagueApiState, SecurityState};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_and_security_headers() {
        let (_, engine) = create_test_engine().await;
        let app = create_app(LeagueApiState { engine }, SecurityState::default());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_admin_close_disabled_without_key() {
        let (_, engine) = create_test_engine().await;
        let app = create_app(LeagueApiState { engine }, SecurityState::default());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/league/seasons/close")
                    .header("x-api-key", "anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_leaderboard_endpoint() {
        let (_, engine) = create_test_engine().await;
        award_rfqs(&engine, "pilot_1", 2).await;
        let app = create_app(LeagueApiState { engine }, SecurityState::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/league/leaderboard?limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["entries"][0]["user_id"], "pilot_1");
        assert_eq!(body["entries"][0]["points"], 10);
        assert_eq!(body["entries"][0]["rank"], 1);
    }
}
