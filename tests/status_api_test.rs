// ==========================================
// StatusApi / AppState 端到端测试
// ==========================================
// 测试目标: 从应用装配到批处理写回的完整链路
// ==========================================

mod test_helpers;

use member_care::app::AppState;
use member_care::config::config_keys;
use member_care::domain::{MemberStatus, NewMember, StatusReason};
use member_care::engine::start_status_scheduler;
use test_helpers::{create_test_db, utc};
use tokio_util::sync::CancellationToken;

fn new_member(name: &str, join_date: &str) -> NewMember {
    NewMember {
        name: name.to_string(),
        email: Some(format!("{}@example.org", name.to_lowercase())),
        join_date: Some(join_date.to_string()),
        attendance_history: Some(vec![]),
        ..NewMember::default()
    }
}

#[tokio::test]
async fn test_run_classification_end_to_end() {
    let (_tmp, db_path) = create_test_db().expect("Failed to create test db");
    let state = AppState::new(db_path).await.expect("AppState 初始化失败");
    let created = utc(2024, 6, 1, 9, 0);

    let newcomer = state
        .member_api
        .create_member_at(new_member("Lydia", "2024-06-01"), created)
        .unwrap();
    let regular = state
        .member_api
        .create_member_at(new_member("Jason", "2021-09-12"), created)
        .unwrap();
    let absent = state
        .member_api
        .create_member_at(new_member("Demas", "2021-09-12"), created)
        .unwrap();

    state
        .member_api
        .record_attendance(&regular.member_id, "2024-06-09", true)
        .unwrap();
    state
        .member_api
        .record_attendance(&absent.member_id, "2024-06-09", false)
        .unwrap();

    let now = utc(2024, 6, 10, 9, 0);
    let preview = state.status_api.preview_classification(Some(now)).await.unwrap();
    assert_eq!(preview.len(), 3);
    let absent_decision = preview
        .iter()
        .find(|d| d.member_id == absent.member_id)
        .unwrap();
    assert_eq!(absent_decision.reason, StatusReason::MissedLastSunday);

    // 预览不写回
    assert_eq!(
        state.member_api.get_member(&regular.member_id).unwrap().status,
        MemberStatus::New
    );

    let report = state.status_api.run_classification(Some(now)).await.unwrap();
    assert_eq!(report.updated_count, 3);
    assert!(report.is_complete());

    let status = |id: &str| state.member_api.get_member(id).unwrap().status;
    assert_eq!(status(&newcomer.member_id), MemberStatus::New);
    assert_eq!(status(&regular.member_id), MemberStatus::Active);
    assert_eq!(status(&absent.member_id), MemberStatus::NeedsFollowUp);

    let listing = state.member_api.list_members().unwrap();
    assert_eq!(listing.follow_up_count, 1);
    assert_eq!(listing.present_count, 1);
}

#[tokio::test]
async fn test_preview_classification_leaves_stored_status_unchanged() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).await.unwrap();

    let member = state
        .member_api
        .create_member_at(new_member("Gaius", "2020-01-01"), utc(2024, 6, 1, 9, 0))
        .unwrap();

    let now = utc(2024, 6, 10, 9, 0);
    let preview = state.status_api.preview_classification(Some(now)).await.unwrap();

    assert_eq!(preview.len(), 1);
    assert_eq!(preview[0].member_id, member.member_id);
    assert_eq!(preview[0].previous_status, MemberStatus::New);
    assert_eq!(preview[0].status, MemberStatus::NeedsFollowUp);
    assert!(preview[0].changed());

    // 重复预览结果一致，且不写回
    let again = state.status_api.preview_classification(Some(now)).await.unwrap();
    assert_eq!(again, preview);
    assert_eq!(
        state.member_api.get_member(&member.member_id).unwrap().status,
        MemberStatus::New
    );
}

#[tokio::test]
async fn test_app_state_reads_preserve_inactive_from_config() {
    let (_tmp, db_path) = create_test_db().unwrap();

    {
        let state = AppState::new(db_path.clone()).await.unwrap();
        state
            .config_manager
            .set_global_config_value(config_keys::PRESERVE_INACTIVE, "true")
            .unwrap();
    }

    let state = AppState::new(db_path).await.unwrap();
    let member = state
        .member_api
        .create_member_at(new_member("Onesimus", "2020-01-01"), utc(2024, 6, 1, 9, 0))
        .unwrap();
    state
        .member_api
        .update_member(
            &member.member_id,
            member_care::MemberPatch {
                status: Some(MemberStatus::Inactive),
                ..Default::default()
            },
        )
        .unwrap();

    let report = state
        .status_api
        .run_classification(Some(utc(2024, 6, 10, 9, 0)))
        .await
        .unwrap();

    assert_eq!(report.changed_count, 0);
    assert_eq!(
        state.member_api.get_member(&member.member_id).unwrap().status,
        MemberStatus::Inactive
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_rejects_invalid_cron() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).await.unwrap();

    let result = start_status_scheduler(
        state.status_api.runner(),
        "every sunday please",
        CancellationToken::new(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_starts_and_shuts_down() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).await.unwrap();

    let shutdown = CancellationToken::new();
    let mut scheduler =
        start_status_scheduler(state.status_api.runner(), "0 0 6 * * *", shutdown.clone())
            .await
            .expect("定时任务应启动");

    shutdown.cancel();
    scheduler.shutdown().await.expect("定时任务应正常停止");
}
