// ==========================================
// ClassificationRunner 集成测试
// ==========================================
// 测试目标:
// - 单个会友写入失败不阻断批处理
// - 有界重试 / NotFound 不重试
// - 读取失败整批失败
// - 取消/超时后停止调度新的写入
// - SQLite 端到端写回
// ==========================================

mod helpers;
mod test_helpers;

use helpers::MockMemberStore;
use member_care::domain::MemberStatus;
use member_care::engine::{ClassificationRunner, ClassifierPolicy, RunnerError, RunnerOptions};
use member_care::repository::MemberRepository;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{create_test_db, utc, MemberBuilder};
use tokio_util::sync::CancellationToken;

fn monday() -> chrono::DateTime<chrono::Utc> {
    utc(2024, 6, 10, 9, 0)
}

fn fast_options() -> RunnerOptions {
    RunnerOptions {
        max_concurrency: 4,
        max_write_retries: 2,
        retry_backoff: Duration::from_millis(1),
        batch_timeout: None,
    }
}

fn sample_members() -> Vec<member_care::Member> {
    vec![
        MemberBuilder::new("a").joined("2024-06-01").build(),
        MemberBuilder::new("b")
            .joined("2020-01-01")
            .attended("2024-06-09")
            .build(),
        MemberBuilder::new("c").joined("2020-01-01").build(),
        MemberBuilder::new("d")
            .joined("2020-01-01")
            .status(MemberStatus::NeedsFollowUp)
            .build(),
    ]
}

fn runner_for(
    store: Arc<MockMemberStore>,
    options: RunnerOptions,
) -> ClassificationRunner<MockMemberStore> {
    ClassificationRunner::new(store, ClassifierPolicy::default(), options)
}

// ==========================================
// 正常批处理
// ==========================================

#[tokio::test]
async fn test_run_writes_every_member() {
    let store = Arc::new(MockMemberStore::new(sample_members()));
    let runner = runner_for(store.clone(), fast_options());

    let report = runner
        .run(monday(), &CancellationToken::new())
        .await
        .expect("批处理应成功");

    assert_eq!(report.total, 4);
    assert_eq!(report.updated_count, 4);
    assert!(report.is_complete());
    assert!(report.failures.is_empty());
    assert!(!report.cancelled);

    // a: New → New, b: New → Active, c: New → NeedsFollowUp, d 未变化
    assert_eq!(report.changed_count, 2);
    assert_eq!(report.status_counts.get(&MemberStatus::New), Some(&1));
    assert_eq!(report.status_counts.get(&MemberStatus::Active), Some(&1));
    assert_eq!(report.status_counts.get(&MemberStatus::NeedsFollowUp), Some(&2));

    assert_eq!(store.status_of("a"), Some(MemberStatus::New));
    assert_eq!(store.status_of("b"), Some(MemberStatus::Active));
    assert_eq!(store.status_of("c"), Some(MemberStatus::NeedsFollowUp));
    assert_eq!(store.status_of("d"), Some(MemberStatus::NeedsFollowUp));
}

#[tokio::test]
async fn test_run_with_no_members() {
    let store = Arc::new(MockMemberStore::new(vec![]));
    let runner = runner_for(store, fast_options());

    let report = runner.run(monday(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(report.updated_count, 0);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let store = Arc::new(MockMemberStore::new(sample_members()));
    let runner = runner_for(store.clone(), fast_options());

    runner.run(monday(), &CancellationToken::new()).await.unwrap();
    let second = runner.run(monday(), &CancellationToken::new()).await.unwrap();

    assert_eq!(second.updated_count, 4);
    assert_eq!(second.changed_count, 0);
}

// ==========================================
// 失败处理
// ==========================================

#[tokio::test]
async fn test_write_failure_does_not_stop_batch() {
    let store = Arc::new(MockMemberStore::new(sample_members()).failing("c"));
    let runner = runner_for(store.clone(), fast_options());

    let report = runner.run(monday(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.updated_count, 3);
    assert_eq!(report.failed_count(), 1);
    assert!(!report.is_complete());

    let failure = &report.failures[0];
    assert_eq!(failure.member_id, "c");
    assert_eq!(failure.status, MemberStatus::NeedsFollowUp);
    assert_eq!(failure.attempts, 3);
    assert_eq!(store.attempts_for("c"), 3);

    // 其余会友照常写回
    assert_eq!(store.status_of("b"), Some(MemberStatus::Active));
    assert_eq!(store.status_of("c"), Some(MemberStatus::New));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let store = Arc::new(MockMemberStore::new(sample_members()).flaky("b", 2));
    let runner = runner_for(store.clone(), fast_options());

    let report = runner.run(monday(), &CancellationToken::new()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(store.attempts_for("b"), 3);
    assert_eq!(store.status_of("b"), Some(MemberStatus::Active));
}

#[tokio::test]
async fn test_zero_retries_fails_on_first_error() {
    let store = Arc::new(MockMemberStore::new(sample_members()).flaky("b", 1));
    let options = RunnerOptions {
        max_write_retries: 0,
        ..fast_options()
    };
    let runner = runner_for(store.clone(), options);

    let report = runner.run(monday(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failures[0].attempts, 1);
    assert_eq!(store.attempts_for("b"), 1);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let store = Arc::new(MockMemberStore::new(sample_members()).deleted("d"));
    let runner = runner_for(store.clone(), fast_options());

    let report = runner.run(monday(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.updated_count, 3);
    assert_eq!(report.failures[0].member_id, "d");
    assert_eq!(report.failures[0].attempts, 1);
    assert_eq!(store.attempts_for("d"), 1);
}

#[tokio::test]
async fn test_fetch_failure_is_fatal() {
    let store = Arc::new(MockMemberStore::new(sample_members()).fetch_fails());
    let runner = runner_for(store.clone(), fast_options());

    let result = runner.run(monday(), &CancellationToken::new()).await;

    assert!(matches!(result, Err(RunnerError::FetchFailed(_))));
    assert_eq!(store.total_attempts(), 0);
}

// ==========================================
// 并发与取消
// ==========================================

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let members = (0..12)
        .map(|i| MemberBuilder::new(&format!("m{}", i)).build())
        .collect();
    let store = Arc::new(
        MockMemberStore::new(members).with_write_delay(Duration::from_millis(10)),
    );
    let options = RunnerOptions {
        max_concurrency: 3,
        ..fast_options()
    };
    let runner = runner_for(store.clone(), options);

    let report = runner.run(monday(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.updated_count, 12);
    assert!(store.max_in_flight() <= 3);
}

#[tokio::test]
async fn test_cancelled_before_start_skips_all_writes() {
    let store = Arc::new(MockMemberStore::new(sample_members()));
    let runner = runner_for(store.clone(), fast_options());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = runner.run(monday(), &cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.total, 4);
    assert_eq!(report.updated_count, 0);
    assert_eq!(report.skipped_count, 4);
    assert_eq!(store.total_attempts(), 0);
    assert_eq!(store.status_of("b"), Some(MemberStatus::New));
}

#[tokio::test]
async fn test_cancel_mid_run_lets_in_flight_writes_finish() {
    let members = (0..6)
        .map(|i| MemberBuilder::new(&format!("m{}", i)).build())
        .collect();
    let store = Arc::new(
        MockMemberStore::new(members).with_write_delay(Duration::from_millis(100)),
    );
    let options = RunnerOptions {
        max_concurrency: 1,
        ..fast_options()
    };
    let runner = runner_for(store.clone(), options);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let report = runner.run(monday(), &cancel).await.unwrap();

    assert!(report.cancelled);
    assert!(report.updated_count >= 1);
    assert!(report.skipped_count >= 1);
    assert!(report.failures.is_empty());
    assert_eq!(report.updated_count + report.skipped_count, 6);
    // 已开始的写入全部完成
    assert_eq!(store.total_attempts() as usize, report.updated_count);
}

#[tokio::test]
async fn test_batch_timeout_stops_scheduling_without_cancelling_caller() {
    let members = (0..6)
        .map(|i| MemberBuilder::new(&format!("m{}", i)).build())
        .collect();
    let store = Arc::new(
        MockMemberStore::new(members).with_write_delay(Duration::from_millis(100)),
    );
    let options = RunnerOptions {
        max_concurrency: 1,
        batch_timeout: Some(Duration::from_millis(150)),
        ..fast_options()
    };
    let runner = runner_for(store, options);

    let caller = CancellationToken::new();
    let report = runner.run(monday(), &caller).await.unwrap();

    assert!(report.cancelled);
    assert!(report.skipped_count >= 1);
    assert!(!caller.is_cancelled());
}

// ==========================================
// SQLite 端到端
// ==========================================

#[tokio::test]
async fn test_run_against_sqlite_repository() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let repo = Arc::new(MemberRepository::new(&db_path).expect("Failed to create repo"));
    repo.insert_many(&sample_members()).unwrap();

    let runner = ClassificationRunner::new(repo.clone(), ClassifierPolicy::default(), fast_options());
    let report = runner.run(monday(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.updated_count, 4);
    assert!(report.is_complete());

    let stored = |id: &str| repo.find_by_id(id).unwrap().unwrap().status;
    assert_eq!(stored("a"), MemberStatus::New);
    assert_eq!(stored("b"), MemberStatus::Active);
    assert_eq!(stored("c"), MemberStatus::NeedsFollowUp);
    assert_eq!(stored("d"), MemberStatus::NeedsFollowUp);
}
