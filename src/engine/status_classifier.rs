// ==========================================
// 会友关怀系统 - 会友状态派生引擎
// ==========================================
// 职责: 从出席记录 + 跟进记录 + 加入日期派生会友状态
// 红线: 纯函数，不访问数据库；不读取旧状态（PreservedInactive 除外）
// 红线: 引擎只输出 New / Active / NeedsFollowUp，每个结果必须带原因
// ==========================================
//
// 判定顺序（先命中先返回）:
//   1. 加入未满宽限期             → New
//   2. 上个主日未出席             → NeedsFollowUp
//   3. 最近互动缺失或早于跟进窗口 → NeedsFollowUp
//   4. 其他                       → Active

use crate::config::{ClassifierConfigReader, ConfigError};
use crate::domain::member::{parse_iso_date, Member};
use crate::domain::types::{MemberStatus, StatusReason};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ClassifierPolicy - 派生规则参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierPolicy {
    pub new_member_window_days: i64,  // 新朋友宽限期: 31 天
    pub follow_up_window_months: u32, // 跟进窗口: 1 个自然月
    pub reference_offset: FixedOffset, // 参考时区: UTC
    pub preserve_inactive: bool,      // 是否保留人工 Inactive: false
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            new_member_window_days: 31,
            follow_up_window_months: 1,
            reference_offset: utc_offset(),
            preserve_inactive: false,
        }
    }
}

impl ClassifierPolicy {
    /// 从配置读取派生规则参数
    pub async fn from_config(config: &dyn ClassifierConfigReader) -> Result<Self, ConfigError> {
        let offset_minutes = config.get_reference_utc_offset_minutes().await?;
        let reference_offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(utc_offset);

        Ok(Self {
            new_member_window_days: config.get_new_member_window_days().await?,
            follow_up_window_months: config.get_follow_up_window_months().await?,
            reference_offset,
            preserve_inactive: config.get_preserve_inactive().await?,
        })
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

// ==========================================
// ReferenceDates - 本次批处理的参考日期
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDates {
    pub today: NaiveDate,            // 参考日（参考时区下的 now）
    pub last_sunday: NaiveDate,      // 不晚于 today 的最近一个主日
    pub follow_up_cutoff: NaiveDate, // today 往前一个跟进窗口
}

impl ReferenceDates {
    /// 由参考时刻计算参考日期
    ///
    /// 主日当天的 last_sunday 即当天；月份回退时日号按短月截断（3/31 → 2/29）
    pub fn compute(now: DateTime<Utc>, policy: &ClassifierPolicy) -> Self {
        let today = now.with_timezone(&policy.reference_offset).date_naive();
        let days_since_sunday = i64::from(today.weekday().num_days_from_sunday());
        let last_sunday = today - Duration::days(days_since_sunday);
        let follow_up_cutoff = today
            .checked_sub_months(Months::new(policy.follow_up_window_months))
            .unwrap_or(NaiveDate::MIN);

        Self {
            today,
            last_sunday,
            follow_up_cutoff,
        }
    }
}

// ==========================================
// ActivityFacts - 单个会友的派生事实
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFacts {
    pub is_new: bool,
    pub last_attendance_date: Option<NaiveDate>, // 不区分 present
    pub last_follow_up_date: Option<NaiveDate>,
    pub attended_last_sunday: bool,
    pub last_action: Option<NaiveDate>, // max(出席, 跟进)
}

// ==========================================
// StatusDecision - 派生结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDecision {
    pub member_id: String,
    pub previous_status: MemberStatus,
    pub status: MemberStatus,
    pub reason: StatusReason,
    pub facts: ActivityFacts,
}

impl StatusDecision {
    pub fn changed(&self) -> bool {
        self.previous_status != self.status
    }
}

// ==========================================
// StatusClassifier
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    policy: ClassifierPolicy,
}

impl StatusClassifier {
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    pub fn reference_dates(&self, now: DateTime<Utc>) -> ReferenceDates {
        ReferenceDates::compute(now, &self.policy)
    }

    /// 计算单个会友的派生事实
    ///
    /// 无法解析的日期视为缺失
    pub fn collect_facts(&self, member: &Member, reference: &ReferenceDates) -> ActivityFacts {
        let offset = self.policy.reference_offset;

        let is_new = member
            .join_date
            .as_deref()
            .and_then(|raw| parse_iso_date(raw, offset))
            .map(|join| (reference.today - join).num_days() <= self.policy.new_member_window_days)
            .unwrap_or(false);

        let last_attendance_date = member
            .attendance_history
            .iter()
            .filter_map(|a| parse_iso_date(&a.date, offset))
            .max();

        let last_follow_up_date = member
            .notes
            .iter()
            .filter_map(|n| parse_iso_date(&n.date, offset))
            .max();

        let attended_last_sunday = member.attendance_history.iter().any(|a| {
            a.present && parse_iso_date(&a.date, offset) == Some(reference.last_sunday)
        });

        // Option 的 max: None < Some
        let last_action = last_attendance_date.max(last_follow_up_date);

        ActivityFacts {
            is_new,
            last_attendance_date,
            last_follow_up_date,
            attended_last_sunday,
            last_action,
        }
    }

    /// 派生单个会友的状态（主入口）
    pub fn derive(&self, member: &Member, reference: &ReferenceDates) -> StatusDecision {
        let facts = self.collect_facts(member, reference);

        let (status, reason) =
            if self.policy.preserve_inactive && member.status == MemberStatus::Inactive {
                (MemberStatus::Inactive, StatusReason::PreservedInactive)
            } else {
                Self::apply_rules(&facts, reference)
            };

        StatusDecision {
            member_id: member.member_id.clone(),
            previous_status: member.status,
            status,
            reason,
            facts,
        }
    }

    fn apply_rules(facts: &ActivityFacts, reference: &ReferenceDates) -> (MemberStatus, StatusReason) {
        if facts.is_new {
            return (MemberStatus::New, StatusReason::NewMemberGracePeriod);
        }

        if !facts.attended_last_sunday {
            return (MemberStatus::NeedsFollowUp, StatusReason::MissedLastSunday);
        }

        match facts.last_action {
            Some(last) if last >= reference.follow_up_cutoff => {
                (MemberStatus::Active, StatusReason::RecentlyEngaged)
            }
            _ => (MemberStatus::NeedsFollowUp, StatusReason::NoRecentAction),
        }
    }

    /// 批量派生（不修改输入）
    pub fn decide_all(&self, now: DateTime<Utc>, members: &[Member]) -> Vec<StatusDecision> {
        let reference = self.reference_dates(now);
        members.iter().map(|m| self.derive(m, &reference)).collect()
    }

    /// 返回带新状态的会友列表（持久化由调用方负责）
    pub fn classify(&self, now: DateTime<Utc>, members: Vec<Member>) -> Vec<Member> {
        let reference = self.reference_dates(now);
        members
            .into_iter()
            .map(|mut member| {
                member.status = self.derive(&member, &reference).status;
                member
            })
            .collect()
    }
}

/// 使用默认规则参数（UTC、31 天、1 个月）的批量派生
pub fn classify(now: DateTime<Utc>, members: Vec<Member>) -> Vec<Member> {
    StatusClassifier::default().classify(now, members)
}
