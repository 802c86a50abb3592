// ==========================================
// Mock 会友存储 - 用于批处理执行器测试
// ==========================================
// 支持: 固定失败 / 前 N 次失败 / 写入时已删除 / 读取失败 / 写入延迟
// ==========================================

use async_trait::async_trait;
use member_care::domain::{Member, MemberStatus};
use member_care::repository::{MemberStore, RepositoryError, RepositoryResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockMemberStore {
    members: Mutex<Vec<Member>>,
    always_fail: Vec<String>,
    flaky: Mutex<HashMap<String, u32>>, // 剩余失败次数
    deleted: Vec<String>,
    fetch_fails: bool,
    write_delay: Option<Duration>,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockMemberStore {
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            members: Mutex::new(members),
            ..Self::default()
        }
    }

    pub fn failing(mut self, member_id: &str) -> Self {
        self.always_fail.push(member_id.to_string());
        self
    }

    pub fn flaky(self, member_id: &str, failures: u32) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(member_id.to_string(), failures);
        self
    }

    pub fn deleted(mut self, member_id: &str) -> Self {
        self.deleted.push(member_id.to_string());
        self
    }

    pub fn fetch_fails(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn status_of(&self, member_id: &str) -> Option<MemberStatus> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.member_id == member_id)
            .map(|m| m.status)
    }

    pub fn attempts_for(&self, member_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(member_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemberStore for MockMemberStore {
    async fn fetch_all_members(&self) -> RepositoryResult<Vec<Member>> {
        if self.fetch_fails {
            return Err(RepositoryError::DatabaseConnectionError(
                "database is unavailable".to_string(),
            ));
        }
        Ok(self.members.lock().unwrap().clone())
    }

    async fn update_member_status(
        &self,
        member_id: &str,
        status: MemberStatus,
    ) -> RepositoryResult<()> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(member_id.to_string())
            .or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.deleted.iter().any(|id| id == member_id) {
            return Err(RepositoryError::NotFound {
                entity: "Member".to_string(),
                id: member_id.to_string(),
            });
        }
        if self.always_fail.iter().any(|id| id == member_id) {
            return Err(RepositoryError::DatabaseQueryError(format!(
                "write rejected for {}",
                member_id
            )));
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(member_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RepositoryError::DatabaseQueryError(
                        "database is locked".to_string(),
                    ));
                }
            }
        }

        let mut members = self.members.lock().unwrap();
        match members.iter_mut().find(|m| m.member_id == member_id) {
            Some(member) => {
                member.status = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: "Member".to_string(),
                id: member_id.to_string(),
            }),
        }
    }
}
