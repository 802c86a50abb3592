// ==========================================
// 会友关怀系统 - 状态批处理 API
// ==========================================
// 职责: 对外暴露“重新计算全部会友状态”操作（按需触发/定时任务共用）
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::api::error::ApiResult;
use crate::engine::classification_runner::{ClassificationReport, ClassificationRunner};
use crate::engine::status_classifier::StatusDecision;
use crate::repository::member_store::MemberStore;

pub struct StatusApi {
    store: Arc<dyn MemberStore>,
    runner: Arc<ClassificationRunner<dyn MemberStore>>,
}

impl StatusApi {
    pub fn new(
        store: Arc<dyn MemberStore>,
        runner: Arc<ClassificationRunner<dyn MemberStore>>,
    ) -> Self {
        Self { store, runner }
    }

    pub fn runner(&self) -> Arc<ClassificationRunner<dyn MemberStore>> {
        self.runner.clone()
    }

    /// 重新计算并写回全部会友状态
    ///
    /// # 参数
    /// - now: 参考时刻覆盖（None 表示当前时间）
    ///
    /// # 返回
    /// - Ok(report): report.updated_count 为成功处理的会友数；
    ///   单个会友写入失败记录在 report.failures 中
    /// - Err(ApiError::ClassificationFailed): 无法读取会友列表
    pub async fn run_classification(
        &self,
        now: Option<DateTime<Utc>>,
    ) -> ApiResult<ClassificationReport> {
        self.run_classification_with_cancel(now, &CancellationToken::new())
            .await
    }

    /// 同上，可由调用方取消
    pub async fn run_classification_with_cancel(
        &self,
        now: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> ApiResult<ClassificationReport> {
        let now = now.unwrap_or_else(Utc::now);
        Ok(self.runner.run(now, cancel).await?)
    }

    /// 仅预览派生结果，不写回
    pub async fn preview_classification(
        &self,
        now: Option<DateTime<Utc>>,
    ) -> ApiResult<Vec<StatusDecision>> {
        let now = now.unwrap_or_else(Utc::now);
        let members = self.store.fetch_all_members().await?;
        Ok(self.runner.classifier().decide_all(now, &members))
    }
}
