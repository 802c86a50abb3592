// ==========================================
// 会友关怀系统 - 状态批处理执行器
// ==========================================
// 职责: 读取全部会友 → 纯函数派生 → 逐个写回状态
// 红线: 单个会友写入失败不阻断批处理；读取失败整批失败
// 并发: 写入按会友独立扇出，受 max_concurrency 限制，无跨会友事务
// 取消: 取消/超时后不再调度新的写入，已在途的写入执行完毕
// ==========================================

use crate::config::{ClassifierConfigReader, ConfigError};
use crate::domain::types::MemberStatus;
use crate::engine::status_classifier::{
    ClassifierPolicy, ReferenceDates, StatusClassifier, StatusDecision,
};
use crate::repository::error::RepositoryError;
use crate::repository::member_store::MemberStore;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ==========================================
// RunnerError
// ==========================================
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("读取会友列表失败: {0}")]
    FetchFailed(#[source] RepositoryError),

    #[error("读取批处理配置失败: {0}")]
    ConfigError(String),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

// ==========================================
// RunnerOptions - 执行参数
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerOptions {
    pub max_concurrency: usize,          // 并发写入上限: 4
    pub max_write_retries: u32,          // 单会友重试次数: 2
    pub retry_backoff: Duration,         // 初始退避: 200ms（指数增长）
    pub batch_timeout: Option<Duration>, // 批处理超时: 不限
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_write_retries: 2,
            retry_backoff: Duration::from_millis(200),
            batch_timeout: None,
        }
    }
}

impl RunnerOptions {
    /// 从配置读取执行参数
    pub async fn from_config(config: &dyn ClassifierConfigReader) -> Result<Self, ConfigError> {
        let timeout_secs = config.get_runner_batch_timeout_secs().await?;
        Ok(Self {
            max_concurrency: config.get_runner_max_concurrency().await?.max(1),
            max_write_retries: config.get_runner_max_write_retries().await?,
            retry_backoff: Duration::from_millis(config.get_runner_retry_backoff_ms().await?),
            batch_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        })
    }
}

// ==========================================
// ClassificationReport - 批处理报告
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberWriteFailure {
    pub member_id: String,
    pub status: MemberStatus,
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub reference: ReferenceDates,
    pub total: usize,         // 读取到的会友数
    pub updated_count: usize, // 成功写回数
    pub changed_count: usize, // 成功写回且状态发生变化
    pub skipped_count: usize, // 因取消/超时未调度
    pub failures: Vec<MemberWriteFailure>,
    pub status_counts: BTreeMap<MemberStatus, usize>, // 派生结果分布
    pub cancelled: bool,
    pub elapsed_ms: i64,
}

impl ClassificationReport {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// 全部会友都已成功写回
    pub fn is_complete(&self) -> bool {
        self.updated_count == self.total
    }
}

// 单个会友的写回结果（内部使用）
enum WriteOutcome {
    Written { changed: bool },
    Failed(MemberWriteFailure),
    Skipped,
}

// ==========================================
// ClassificationRunner
// ==========================================
pub struct ClassificationRunner<S: MemberStore + ?Sized> {
    store: Arc<S>,
    classifier: StatusClassifier,
    options: RunnerOptions,
}

impl<S: MemberStore + ?Sized> ClassificationRunner<S> {
    pub fn new(store: Arc<S>, policy: ClassifierPolicy, options: RunnerOptions) -> Self {
        Self {
            store,
            classifier: StatusClassifier::new(policy),
            options,
        }
    }

    /// 按配置构建执行器
    pub async fn from_config(
        store: Arc<S>,
        config: &dyn ClassifierConfigReader,
    ) -> RunnerResult<Self> {
        let policy = ClassifierPolicy::from_config(config)
            .await
            .map_err(|e| RunnerError::ConfigError(e.to_string()))?;
        let options = RunnerOptions::from_config(config)
            .await
            .map_err(|e| RunnerError::ConfigError(e.to_string()))?;
        Ok(Self::new(store, policy, options))
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// 执行一次完整批处理
    ///
    /// # 参数
    /// - now: 参考时刻（生产环境为当前时间，测试可注入）
    /// - cancel: 取消令牌；超时时内部也会触发取消
    ///
    /// # 返回
    /// - Ok(ClassificationReport): 批处理完成（可能部分失败/部分跳过）
    /// - Err(RunnerError::FetchFailed): 无法读取会友列表，未派生任何状态
    pub async fn run(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> RunnerResult<ClassificationReport> {
        let started = Instant::now();
        let reference = self.classifier.reference_dates(now);

        info!(
            today = %reference.today,
            last_sunday = %reference.last_sunday,
            follow_up_cutoff = %reference.follow_up_cutoff,
            "开始会友状态批处理"
        );

        // === 步骤 1: 读取快照 ===
        let members = self
            .store
            .fetch_all_members()
            .await
            .map_err(RunnerError::FetchFailed)?;

        // === 步骤 2: 纯函数派生 ===
        let decisions = self.classifier.decide_all(now, &members);
        drop(members);

        let mut status_counts: BTreeMap<MemberStatus, usize> = BTreeMap::new();
        for d in &decisions {
            *status_counts.entry(d.status).or_insert(0) += 1;
        }

        // === 步骤 3: 扇出写回 ===
        // 子令牌: 超时只取消本次批处理，不影响调用方的令牌
        let batch_cancel = cancel.child_token();
        let timeout_guard = self.options.batch_timeout.map(|timeout| {
            let token = batch_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_ms = timeout.as_millis() as u64, "批处理超时，停止调度新的写入");
                token.cancel();
            })
        });

        let total = decisions.len();
        let outcomes: Vec<WriteOutcome> = stream::iter(decisions)
            .map(|decision| self.write_one(decision, &batch_cancel))
            .buffer_unordered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        if let Some(handle) = timeout_guard {
            handle.abort();
        }

        // === 步骤 4: 汇总 ===
        let mut updated_count = 0;
        let mut changed_count = 0;
        let mut skipped_count = 0;
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                WriteOutcome::Written { changed } => {
                    updated_count += 1;
                    if changed {
                        changed_count += 1;
                    }
                }
                WriteOutcome::Failed(f) => failures.push(f),
                WriteOutcome::Skipped => skipped_count += 1,
            }
        }

        let report = ClassificationReport {
            reference,
            total,
            updated_count,
            changed_count,
            skipped_count,
            failures,
            status_counts,
            cancelled: batch_cancel.is_cancelled(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        };

        info!(
            total = report.total,
            updated = report.updated_count,
            changed = report.changed_count,
            failed = report.failed_count(),
            skipped = report.skipped_count,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "会友状态批处理完成"
        );

        Ok(report)
    }

    /// 写回单个会友（带重试）
    async fn write_one(&self, decision: StatusDecision, cancel: &CancellationToken) -> WriteOutcome {
        if cancel.is_cancelled() {
            debug!(member_id = %decision.member_id, "批处理已取消，跳过写入");
            return WriteOutcome::Skipped;
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self
                .store
                .update_member_status(&decision.member_id, decision.status)
                .await
            {
                Ok(()) => {
                    debug!(
                        member_id = %decision.member_id,
                        status = %decision.status,
                        reason = %decision.reason,
                        changed = decision.changed(),
                        "会友状态已写回"
                    );
                    return WriteOutcome::Written {
                        changed: decision.changed(),
                    };
                }
                // 记录已被删除: 重试无意义
                Err(e @ RepositoryError::NotFound { .. }) => {
                    return self.record_failure(decision, e, attempts);
                }
                Err(e) if attempts > self.options.max_write_retries => {
                    return self.record_failure(decision, e, attempts);
                }
                Err(e) => {
                    let backoff = self
                        .options
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempts - 1));
                    warn!(
                        member_id = %decision.member_id,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "会友状态写入失败，准备重试"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn record_failure(
        &self,
        decision: StatusDecision,
        err: RepositoryError,
        attempts: u32,
    ) -> WriteOutcome {
        error!(
            member_id = %decision.member_id,
            status = %decision.status,
            attempts,
            error = %err,
            "会友状态写入失败，继续处理其余会友"
        );
        WriteOutcome::Failed(MemberWriteFailure {
            member_id: decision.member_id,
            status: decision.status,
            error: err.to_string(),
            attempts,
        })
    }
}
