// ==========================================
// 会友关怀系统 - 会友领域模型
// ==========================================
// 对齐: member 表 (db.rs)
// 说明: 日期字段保留原始字符串，解析失败视为缺失，不阻断批处理
// ==========================================

use crate::domain::types::MemberStatus;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// AttendanceRecord - 出席记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: String,  // ISO-8601 日期
    pub present: bool, // 是否出席
}

impl AttendanceRecord {
    pub fn new(date: impl Into<String>, present: bool) -> Self {
        Self {
            date: date.into(),
            present,
        }
    }
}

// ==========================================
// FollowUpNote - 跟进记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpNote {
    pub date: String,    // ISO-8601 日期或时间戳
    pub content: String, // 跟进内容
}

impl FollowUpNote {
    pub fn new(date: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            content: content.into(),
        }
    }
}

// ==========================================
// Member - 会友
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    // ===== 主键 =====
    #[serde(rename = "id")]
    pub member_id: String,

    // ===== 基本资料 =====
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>, // 负责跟进的同工

    // ===== 日期快照（原始字符串）=====
    #[serde(default)]
    pub join_date: Option<String>,
    #[serde(default)]
    pub last_attendance: Option<String>,
    #[serde(default)]
    pub last_contact: Option<String>,

    // ===== 派生状态 =====
    #[serde(default)]
    pub status: MemberStatus,

    // ===== 历史 =====
    #[serde(default)]
    pub notes: Vec<FollowUpNote>,
    #[serde(default)]
    pub attendance_history: Vec<AttendanceRecord>,

    // ===== 审计 =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// 出席率（百分比，四舍五入；无记录时为 0）
    pub fn attendance_rate(&self) -> u32 {
        if self.attendance_history.is_empty() {
            return 0;
        }
        let present = self.attendance_history.iter().filter(|a| a.present).count();
        ((present as f64 / self.attendance_history.len() as f64) * 100.0).round() as u32
    }
}

// ==========================================
// NewMember - 新建会友请求
// ==========================================
// 缺省字段由 MemberApi::create_member 填充
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub assigned_to: Option<String>,
    pub join_date: Option<String>,
    pub last_attendance: Option<String>,
    pub status: Option<MemberStatus>,
    pub notes: Option<Vec<FollowUpNote>>,
    pub attendance_history: Option<Vec<AttendanceRecord>>,
}

// ==========================================
// MemberPatch - 部分更新
// ==========================================
// None 表示不修改该字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub assigned_to: Option<String>,
    pub join_date: Option<String>,
    pub last_attendance: Option<String>,
    pub last_contact: Option<String>,
    pub status: Option<MemberStatus>,
    pub notes: Option<Vec<FollowUpNote>>,
    pub attendance_history: Option<Vec<AttendanceRecord>>,
}

impl MemberPatch {
    /// 将补丁应用到会友记录（不修改 updated_at）
    pub fn apply_to(self, member: &mut Member) {
        if let Some(v) = self.name {
            member.name = v;
        }
        if let Some(v) = self.email {
            member.email = Some(normalize_email(&v));
        }
        if let Some(v) = self.phone {
            member.phone = Some(v);
        }
        if let Some(v) = self.address {
            member.address = Some(v);
        }
        if let Some(v) = self.assigned_to {
            member.assigned_to = Some(v);
        }
        if let Some(v) = self.join_date {
            member.join_date = Some(v);
        }
        if let Some(v) = self.last_attendance {
            member.last_attendance = Some(v);
        }
        if let Some(v) = self.last_contact {
            member.last_contact = Some(v);
        }
        if let Some(v) = self.status {
            member.status = v;
        }
        if let Some(v) = self.notes {
            member.notes = v;
        }
        if let Some(v) = self.attendance_history {
            member.attendance_history = v;
        }
    }
}

/// 邮箱标准化（TRIM + 小写）
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ==========================================
// 日期解析
// ==========================================

/// 将边界上的日期字符串解析为参考时区下的日历日
///
/// 支持:
/// - `YYYY-MM-DD`
/// - RFC 3339 时间戳（按 `offset` 换算到当地日期）
/// - 无时区的 `YYYY-MM-DDTHH:MM:SS[.fff]`（直接取日期部分）
///
/// 无法解析返回 None（调用方视为缺失）
pub fn parse_iso_date(raw: &str, offset: FixedOffset) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&offset).date_naive());
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_parse_plain_date() {
        assert_eq!(
            parse_iso_date("2024-06-09", utc()),
            NaiveDate::from_ymd_opt(2024, 6, 9)
        );
    }

    #[test]
    fn test_parse_timestamp_uses_reference_offset() {
        // UTC 23:30 在 +08:00 已是次日
        let raw = "2024-06-09T23:30:00.000Z";
        assert_eq!(parse_iso_date(raw, utc()), NaiveDate::from_ymd_opt(2024, 6, 9));

        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(parse_iso_date(raw, cst), NaiveDate::from_ymd_opt(2024, 6, 10));
    }

    #[test]
    fn test_parse_malformed_is_none() {
        assert_eq!(parse_iso_date("", utc()), None);
        assert_eq!(parse_iso_date("last sunday", utc()), None);
        assert_eq!(parse_iso_date("2024-13-40", utc()), None);
    }

    #[test]
    fn test_member_deserialize_missing_history_defaults_to_empty() {
        let json = r#"{
            "id": "m1",
            "name": "Ruth",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }"#;
        let member: Member = serde_json::from_str(json).unwrap();
        assert!(member.notes.is_empty());
        assert!(member.attendance_history.is_empty());
        assert_eq!(member.status, MemberStatus::New);
        assert_eq!(member.attendance_rate(), 0);
    }
}
