// ==========================================
// 会友关怀系统 - 会友存储 Trait
// ==========================================
// 职责: 定义批处理执行器所需的最小持久化接口
// 实现者: MemberRepository（SQLite）、测试中的内存实现
// ==========================================

use crate::domain::member::Member;
use crate::domain::types::MemberStatus;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

#[async_trait]
pub trait MemberStore: Send + Sync {
    /// 读取全部会友（批处理快照）
    async fn fetch_all_members(&self) -> RepositoryResult<Vec<Member>>;

    /// 按 id 更新单个会友的状态
    ///
    /// # 返回
    /// - Err(RepositoryError::NotFound): 会友不存在
    async fn update_member_status(
        &self,
        member_id: &str,
        status: MemberStatus,
    ) -> RepositoryResult<()>;
}
