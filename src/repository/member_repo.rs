// ==========================================
// 会友关怀系统 - 会友数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 所有查询使用参数化
// ==========================================

use crate::db::{configure_sqlite_connection, open_and_migrate};
use crate::domain::member::{AttendanceRecord, FollowUpNote, Member};
use crate::domain::types::MemberStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::member_store::MemberStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};

const MEMBER_COLUMNS: &str = r#"
    member_id, name, email, phone, address,
    join_date, last_attendance, last_contact, assigned_to,
    status, notes_json, attendance_history_json,
    created_at, updated_at
"#;

// ==========================================
// MemberRow - 数据库行（未解码 JSON）
// ==========================================
struct MemberRow {
    member_id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    join_date: Option<String>,
    last_attendance: Option<String>,
    last_contact: Option<String>,
    assigned_to: Option<String>,
    status: String,
    notes_json: String,
    attendance_history_json: String,
    created_at: String,
    updated_at: String,
}

impl MemberRow {
    fn from_row(row: &Row<'_>) -> SqliteResult<Self> {
        Ok(Self {
            member_id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            address: row.get(4)?,
            join_date: row.get(5)?,
            last_attendance: row.get(6)?,
            last_contact: row.get(7)?,
            assigned_to: row.get(8)?,
            status: row.get(9)?,
            notes_json: row.get(10)?,
            attendance_history_json: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    /// 解码为领域实体
    ///
    /// 历史 JSON 损坏时按空序列处理，状态值非法时回退为 New（均告警，不中断读取）
    fn into_member(self) -> Member {
        let status = MemberStatus::parse(&self.status).unwrap_or_else(|| {
            tracing::warn!(member_id = %self.member_id, raw_status = %self.status, "未知状态值，按 New 读取");
            MemberStatus::New
        });

        let notes: Vec<FollowUpNote> = decode_json_list(&self.member_id, "notes_json", &self.notes_json);
        let attendance_history: Vec<AttendanceRecord> = decode_json_list(
            &self.member_id,
            "attendance_history_json",
            &self.attendance_history_json,
        );

        Member {
            member_id: self.member_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            assigned_to: self.assigned_to,
            join_date: self.join_date,
            last_attendance: self.last_attendance,
            last_contact: self.last_contact,
            status,
            notes,
            attendance_history,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

fn decode_json_list<T: DeserializeOwned>(member_id: &str, field: &str, raw: &str) -> Vec<T> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(member_id, field, error = %e, "历史记录 JSON 解码失败，按空序列处理");
        Vec::new()
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn encode_json<T: serde::Serialize>(field: &str, value: &T) -> RepositoryResult<String> {
    serde_json::to_string(value).map_err(|e| RepositoryError::SerializationError {
        field: field.to_string(),
        message: e.to_string(),
    })
}

// ==========================================
// MemberRepository - 会友仓储
// ==========================================
/// 会友仓储
/// 职责: 管理 member 表的 CRUD 操作
pub struct MemberRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MemberRepository {
    /// 打开数据库（必要时建表）并创建仓储实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_and_migrate(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn insert_with(conn: &Connection, member: &Member) -> RepositoryResult<()> {
        let notes_json = encode_json("notes", &member.notes)?;
        let attendance_json = encode_json("attendance_history", &member.attendance_history)?;

        conn.execute(
            r#"
            INSERT INTO member (
                member_id, name, email, phone, address,
                join_date, last_attendance, last_contact, assigned_to,
                status, notes_json, attendance_history_json,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                member.member_id,
                member.name,
                member.email,
                member.phone,
                member.address,
                member.join_date,
                member.last_attendance,
                member.last_contact,
                member.assigned_to,
                member.status.to_db_str(),
                notes_json,
                attendance_json,
                member.created_at.to_rfc3339(),
                member.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 新建会友
    pub fn insert(&self, member: &Member) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_with(&conn, member)
    }

    /// 批量新建（单事务，全部成功或全部回滚）
    ///
    /// # 返回
    /// - Ok(usize): 插入条数
    pub fn insert_many(&self, members: &[Member]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for member in members {
            Self::insert_with(&tx, member)?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(members.len())
    }

    /// 按主键查询
    ///
    /// # 返回
    /// - Ok(Some(Member)): 找到会友
    /// - Ok(None): 未找到
    pub fn find_by_id(&self, member_id: &str) -> RepositoryResult<Option<Member>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM member WHERE member_id = ?1", MEMBER_COLUMNS);
        let row = conn
            .query_row(&sql, params![member_id], MemberRow::from_row)
            .optional()?;
        Ok(row.map(MemberRow::into_member))
    }

    /// 查询全部会友（按创建时间）
    pub fn list_all(&self) -> RepositoryResult<Vec<Member>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM member ORDER BY created_at ASC, member_id ASC",
            MEMBER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], MemberRow::from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(rows.into_iter().map(MemberRow::into_member).collect())
    }

    /// 整行覆写（不存在时返回 NotFound）
    pub fn update(&self, member: &Member) -> RepositoryResult<()> {
        let notes_json = encode_json("notes", &member.notes)?;
        let attendance_json = encode_json("attendance_history", &member.attendance_history)?;

        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE member SET
                name = ?2, email = ?3, phone = ?4, address = ?5,
                join_date = ?6, last_attendance = ?7, last_contact = ?8, assigned_to = ?9,
                status = ?10, notes_json = ?11, attendance_history_json = ?12,
                updated_at = ?13
            WHERE member_id = ?1
            "#,
            params![
                member.member_id,
                member.name,
                member.email,
                member.phone,
                member.address,
                member.join_date,
                member.last_attendance,
                member.last_contact,
                member.assigned_to,
                member.status.to_db_str(),
                notes_json,
                attendance_json,
                member.updated_at.to_rfc3339(),
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Member".to_string(),
                id: member.member_id.clone(),
            });
        }
        Ok(())
    }

    /// 仅更新状态字段
    pub fn update_status(&self, member_id: &str, status: MemberStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE member SET status = ?2, updated_at = ?3 WHERE member_id = ?1",
            params![member_id, status.to_db_str(), Utc::now().to_rfc3339()],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Member".to_string(),
                id: member_id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除会友
    ///
    /// # 返回
    /// - Ok(true): 已删除
    /// - Ok(false): 记录不存在
    pub fn delete(&self, member_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM member WHERE member_id = ?1", params![member_id])?;
        Ok(affected > 0)
    }

    /// 会友总数
    pub fn count(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM member", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

// ==========================================
// MemberStore Trait 实现
// ==========================================
#[async_trait]
impl MemberStore for MemberRepository {
    async fn fetch_all_members(&self) -> RepositoryResult<Vec<Member>> {
        self.list_all()
    }

    async fn update_member_status(
        &self,
        member_id: &str,
        status: MemberStatus,
    ) -> RepositoryResult<()> {
        self.update_status(member_id, status)
    }
}
