// ==========================================
// 会友关怀系统 - 会友状态定时任务
// ==========================================
// 职责: 按 cron 触发批处理，不含任何派生/持久化逻辑
//
// 调度器 (cron, 缺省每日 06:00)
//   └─► ClassificationRunner::run(Utc::now())
//         ├─► fetch_all_members()
//         ├─► StatusClassifier::decide_all()
//         └─► update_member_status() × N (有界并发)
// ==========================================

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::engine::classification_runner::ClassificationRunner;
use crate::repository::member_store::MemberStore;

/// 启动会友状态定时重算任务
///
/// 每次运行都传入 `shutdown`；取消后正在进行的批次不再发起新的写入。
pub async fn start_status_scheduler<S>(
    runner: Arc<ClassificationRunner<S>>,
    cron: &str,
    shutdown: CancellationToken,
) -> Result<JobScheduler>
where
    S: MemberStore + ?Sized + 'static,
{
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let runner = runner.clone();
        let shutdown = shutdown.clone();
        Box::pin(async move {
            if shutdown.is_cancelled() {
                tracing::info!("定时任务正在停止，跳过本次运行");
                return;
            }
            match runner.run(Utc::now(), &shutdown).await {
                Ok(report) if report.failed_count() > 0 => {
                    tracing::warn!(
                        updated = report.updated_count,
                        failed = report.failed_count(),
                        "定时状态重算完成，部分会友写入失败"
                    );
                }
                Ok(report) => {
                    tracing::info!(
                        updated = report.updated_count,
                        changed = report.changed_count,
                        "定时状态重算完成"
                    );
                }
                Err(e) => {
                    tracing::error!("定时状态重算失败: {}", e);
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(cron, "会友状态定时任务已启动");
    Ok(scheduler)
}
