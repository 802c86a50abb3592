// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据构造等功能
// ==========================================

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use member_care::db::open_and_migrate;
use member_care::domain::{AttendanceRecord, FollowUpNote, Member, MemberStatus};
use rusqlite::Connection;
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    open_and_migrate(&db_path)?;

    Ok((temp_file, db_path))
}

/// 打开测试数据库连接
pub fn open_test_connection(db_path: &str) -> Result<Connection, Box<dyn Error>> {
    Ok(open_and_migrate(db_path)?)
}

/// UTC 时刻
pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ==========================================
// MemberBuilder - 测试会友构造器
// ==========================================
#[derive(Clone)]
pub struct MemberBuilder {
    member: Member,
}

impl MemberBuilder {
    pub fn new(member_id: &str) -> Self {
        let created = utc(2020, 1, 1, 0, 0);
        Self {
            member: Member {
                member_id: member_id.to_string(),
                name: format!("会友 {}", member_id),
                email: Some(format!("{}@example.org", member_id)),
                phone: None,
                address: None,
                assigned_to: None,
                join_date: Some("2020-01-01".to_string()),
                last_attendance: None,
                last_contact: None,
                status: MemberStatus::New,
                notes: vec![],
                attendance_history: vec![],
                created_at: created,
                updated_at: created,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.member.name = name.to_string();
        self
    }

    pub fn joined(mut self, date: &str) -> Self {
        self.member.join_date = Some(date.to_string());
        self
    }

    pub fn no_join_date(mut self) -> Self {
        self.member.join_date = None;
        self
    }

    pub fn status(mut self, status: MemberStatus) -> Self {
        self.member.status = status;
        self
    }

    pub fn attended(mut self, date: &str) -> Self {
        self.member
            .attendance_history
            .push(AttendanceRecord::new(date, true));
        self.member.last_attendance = Some(date.to_string());
        self
    }

    pub fn absent(mut self, date: &str) -> Self {
        self.member
            .attendance_history
            .push(AttendanceRecord::new(date, false));
        self
    }

    pub fn note(mut self, date: &str, content: &str) -> Self {
        self.member.notes.push(FollowUpNote::new(date, content));
        self.member.last_contact = Some(date.to_string());
        self
    }

    pub fn build(self) -> Member {
        self.member
    }
}
