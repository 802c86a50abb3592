// ==========================================
// 会友关怀系统 - 领域类型定义
// ==========================================
// 状态是派生字段: 由出席/跟进历史 + 参考日期计算得出
// 序列化格式与存储一致: "New" / "Active" / "Needs Follow-up" / "Inactive"
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 会友状态 (Member Status)
// ==========================================
// 红线: 派生引擎只会输出 New / Active / NeedsFollowUp,
//       Inactive 只能由人工设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    #[serde(rename = "New")]
    New, // 新朋友（宽限期内）
    #[serde(rename = "Active")]
    Active, // 稳定参与
    #[serde(rename = "Needs Follow-up")]
    NeedsFollowUp, // 需要跟进
    #[serde(rename = "Inactive")]
    Inactive, // 人工标记为不活跃
}

impl MemberStatus {
    /// 全部状态（用于统计输出）
    pub const ALL: [MemberStatus; 4] = [
        MemberStatus::New,
        MemberStatus::Active,
        MemberStatus::NeedsFollowUp,
        MemberStatus::Inactive,
    ];

    /// 从存储字符串解析状态，未知值返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "New" => Some(MemberStatus::New),
            "Active" => Some(MemberStatus::Active),
            "Needs Follow-up" => Some(MemberStatus::NeedsFollowUp),
            "Inactive" => Some(MemberStatus::Inactive),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MemberStatus::New => "New",
            MemberStatus::Active => "Active",
            MemberStatus::NeedsFollowUp => "Needs Follow-up",
            MemberStatus::Inactive => "Inactive",
        }
    }
}

impl Default for MemberStatus {
    fn default() -> Self {
        MemberStatus::New
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 状态判定原因 (Status Reason)
// ==========================================
// 每个派生结果都必须带原因，便于日志与报告解释
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusReason {
    NewMemberGracePeriod, // 加入未满宽限期
    MissedLastSunday,     // 上个主日未出席
    NoRecentAction,       // 近一个月无出席/跟进记录
    RecentlyEngaged,      // 主日出席且近期有互动
    PreservedInactive,    // 配置保留人工 Inactive
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReason::NewMemberGracePeriod => write!(f, "NEW_MEMBER_GRACE_PERIOD"),
            StatusReason::MissedLastSunday => write!(f, "MISSED_LAST_SUNDAY"),
            StatusReason::NoRecentAction => write!(f, "NO_RECENT_ACTION"),
            StatusReason::RecentlyEngaged => write!(f, "RECENTLY_ENGAGED"),
            StatusReason::PreservedInactive => write!(f, "PRESERVED_INACTIVE"),
        }
    }
}
