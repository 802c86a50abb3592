// ==========================================
// 会友关怀系统 - 会友管理 API
// ==========================================
// 职责: 会友查询、新建、修改、删除，出席/跟进登记，驾驶舱统计
// 说明: 本层不派生状态；status 仅由批处理或人工修改写入
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::member::{
    normalize_email, parse_iso_date, AttendanceRecord, FollowUpNote, Member, MemberPatch,
    NewMember,
};
use crate::domain::types::MemberStatus;
use crate::repository::member_repo::MemberRepository;

// ==========================================
// 响应 DTO
// ==========================================

/// 会友列表 + 驾驶舱统计
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberListResponse {
    pub members: Vec<Member>,
    pub count: usize,
    pub present_count: usize,   // 最近一次聚会出席人数
    pub follow_up_count: usize, // 状态为 Needs Follow-up 的人数
    pub latest_attendance_date: Option<NaiveDate>,
}

/// 会友详情
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetail {
    pub member: Member,
    pub attendance_rate: u32, // 出席率（%）
}

// ==========================================
// MemberApi - 会友管理 API
// ==========================================
pub struct MemberApi {
    member_repo: Arc<MemberRepository>,
    reference_offset: FixedOffset,
}

impl MemberApi {
    /// 创建新的MemberApi实例（参考时区: UTC）
    pub fn new(member_repo: Arc<MemberRepository>) -> Self {
        Self {
            member_repo,
            reference_offset: Utc.fix(),
        }
    }

    /// 指定计算“今天”所用的参考时区
    pub fn with_reference_offset(mut self, offset: FixedOffset) -> Self {
        self.reference_offset = offset;
        self
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.reference_offset).date_naive()
    }

    fn load(&self, member_id: &str) -> ApiResult<Member> {
        if member_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("会友ID不能为空".to_string()));
        }
        self.member_repo
            .find_by_id(member_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Member(id={})不存在", member_id)))
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 查询全部会友及驾驶舱统计
    ///
    /// - latest_attendance_date: 所有会友出席记录中最晚的日期
    /// - present_count: 在该日期出席的会友数
    pub fn list_members(&self) -> ApiResult<MemberListResponse> {
        let members = self.member_repo.list_all()?;
        let offset = self.reference_offset;

        let latest_attendance_date = members
            .iter()
            .flat_map(|m| m.attendance_history.iter())
            .filter_map(|a| parse_iso_date(&a.date, offset))
            .max();

        let present_count = match latest_attendance_date {
            Some(latest) => members
                .iter()
                .filter(|m| {
                    m.attendance_history
                        .iter()
                        .any(|a| a.present && parse_iso_date(&a.date, offset) == Some(latest))
                })
                .count(),
            None => 0,
        };

        let follow_up_count = members
            .iter()
            .filter(|m| m.status == MemberStatus::NeedsFollowUp)
            .count();

        Ok(MemberListResponse {
            count: members.len(),
            present_count,
            follow_up_count,
            latest_attendance_date,
            members,
        })
    }

    /// 查询单个会友
    pub fn get_member(&self, member_id: &str) -> ApiResult<Member> {
        self.load(member_id)
    }

    /// 查询会友详情（含出席率）
    pub fn get_member_detail(&self, member_id: &str) -> ApiResult<MemberDetail> {
        let member = self.load(member_id)?;
        Ok(MemberDetail {
            attendance_rate: member.attendance_rate(),
            member,
        })
    }

    // ==========================================
    // 新建
    // ==========================================

    /// 新建会友
    pub fn create_member(&self, request: NewMember) -> ApiResult<Member> {
        self.create_member_at(request, Utc::now())
    }

    /// 新建会友（指定当前时刻）
    ///
    /// 缺省值:
    /// - join_date = 今天
    /// - last_attendance = 今天
    /// - status = New
    /// - attendance_history = [{ date: last_attendance, present: true }]
    pub fn create_member_at(&self, request: NewMember, now: DateTime<Utc>) -> ApiResult<Member> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("姓名不能为空".to_string()));
        }
        let email = request
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ApiError::InvalidInput("邮箱不能为空".to_string()))?;

        let today = self.today(now).to_string();
        let join_date = request.join_date.unwrap_or_else(|| today.clone());
        let last_attendance = request.last_attendance.unwrap_or(today);
        let attendance_history = request
            .attendance_history
            .unwrap_or_else(|| vec![AttendanceRecord::new(last_attendance.clone(), true)]);

        let member = Member {
            member_id: Uuid::new_v4().to_string(),
            name,
            email: Some(email),
            phone: request.phone,
            address: request.address,
            assigned_to: request.assigned_to,
            join_date: Some(join_date),
            last_attendance: Some(last_attendance),
            last_contact: None,
            status: request.status.unwrap_or(MemberStatus::New),
            notes: request.notes.unwrap_or_default(),
            attendance_history,
            created_at: now,
            updated_at: now,
        };

        self.member_repo.insert(&member)?;
        tracing::info!(member_id = %member.member_id, "新建会友");
        Ok(member)
    }

    // ==========================================
    // 修改 / 删除
    // ==========================================

    /// 部分更新会友
    pub fn update_member(&self, member_id: &str, patch: MemberPatch) -> ApiResult<Member> {
        if matches!(patch.name.as_deref(), Some(n) if n.trim().is_empty()) {
            return Err(ApiError::InvalidInput("姓名不能为空".to_string()));
        }

        let mut member = self.load(member_id)?;
        patch.apply_to(&mut member);
        member.updated_at = Utc::now();

        self.member_repo.update(&member)?;
        Ok(member)
    }

    /// 删除会友
    ///
    /// # 返回
    /// - Ok(true): 已删除
    /// - Ok(false): 会友不存在（幂等）
    pub fn delete_member(&self, member_id: &str) -> ApiResult<bool> {
        if member_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("会友ID不能为空".to_string()));
        }
        let deleted = self.member_repo.delete(member_id)?;
        if deleted {
            tracing::info!(member_id, "删除会友");
        }
        Ok(deleted)
    }

    // ==========================================
    // 出席 / 跟进登记
    // ==========================================

    /// 登记出席（同一日期覆盖旧记录）
    ///
    /// 出席时同步 last_attendance（只前移，不回退）
    pub fn record_attendance(
        &self,
        member_id: &str,
        date: &str,
        present: bool,
    ) -> ApiResult<Member> {
        let offset = self.reference_offset;
        let day = parse_iso_date(date, offset)
            .ok_or_else(|| ApiError::InvalidInput(format!("日期格式错误: {}", date)))?;
        let day_str = day.to_string();

        let mut member = self.load(member_id)?;
        member
            .attendance_history
            .retain(|a| parse_iso_date(&a.date, offset) != Some(day));
        member
            .attendance_history
            .push(AttendanceRecord::new(day_str.clone(), present));

        if present {
            let current = member
                .last_attendance
                .as_deref()
                .and_then(|d| parse_iso_date(d, offset));
            if current.map_or(true, |c| day > c) {
                member.last_attendance = Some(day_str);
            }
        }

        member.updated_at = Utc::now();
        self.member_repo.update(&member)?;
        Ok(member)
    }

    /// 新增跟进记录
    ///
    /// date 缺省为当前时刻（RFC 3339）；同步 last_contact
    pub fn add_note(
        &self,
        member_id: &str,
        content: &str,
        date: Option<&str>,
    ) -> ApiResult<Member> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::InvalidInput("跟进内容不能为空".to_string()));
        }

        let now = Utc::now();
        let date = match date {
            Some(d) => {
                if parse_iso_date(d, self.reference_offset).is_none() {
                    return Err(ApiError::InvalidInput(format!("日期格式错误: {}", d)));
                }
                d.trim().to_string()
            }
            None => now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let mut member = self.load(member_id)?;
        member.notes.push(FollowUpNote::new(date.clone(), content));
        member.last_contact = Some(date);
        member.updated_at = now;

        self.member_repo.update(&member)?;
        Ok(member)
    }
}
