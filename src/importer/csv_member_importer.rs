// ==========================================
// 会友关怀系统 - CSV 会友批量导入
// ==========================================
// 规则:
// - 表头不区分大小写，值两端去空白，跳过空行
// - name 与 phone 均非空的行才导入，其余行计入 skipped_rows
// - 导入的会友状态为 Active，不带加入日期/最近出席
// - 单事务写入: 全部成功或全部回滚
// ==========================================

use crate::domain::member::{normalize_email, Member};
use crate::domain::types::MemberStatus;
use crate::importer::error::ImportError;
use crate::repository::member_repo::MemberRepository;
use chrono::Utc;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// ==========================================
// ImportSummary - 导入结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created_count: usize,
    pub skipped_rows: usize,
}

// ==========================================
// CsvMemberImporter
// ==========================================
pub struct CsvMemberImporter {
    member_repo: Arc<MemberRepository>,
}

impl CsvMemberImporter {
    pub fn new(member_repo: Arc<MemberRepository>) -> Self {
        Self { member_repo }
    }

    /// 从 CSV 文件导入
    pub fn import_file(&self, file_path: &Path) -> Result<ImportSummary, ImportError> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        if let Some(ext) = file_path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let file = std::fs::File::open(file_path)?;
        self.import_reader(file)
    }

    /// 从任意读取源导入（上传内容等）
    pub fn import_reader<R: Read>(&self, reader: R) -> Result<ImportSummary, ImportError> {
        let rows = parse_rows(reader)?;
        let total_rows = rows.len();

        let now = Utc::now();
        let members: Vec<Member> = rows
            .into_iter()
            .filter_map(|row| row_to_member(&row, now))
            .collect();

        let skipped_rows = total_rows - members.len();
        if members.is_empty() {
            info!(skipped_rows, "CSV 中没有可导入的会友");
            return Ok(ImportSummary {
                created_count: 0,
                skipped_rows,
            });
        }

        let created_count = self.member_repo.insert_many(&members)?;
        info!(created_count, skipped_rows, "CSV 会友导入完成");

        Ok(ImportSummary {
            created_count,
            skipped_rows,
        })
    }
}

/// 解析 CSV 为 表头(小写) → 值 的行列表
fn parse_rows<R: Read>(reader: R) -> Result<Vec<HashMap<String, String>>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = HashMap::new();
        for (idx, value) in record.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                row.insert(header.clone(), value.trim().to_string());
            }
        }

        // 跳过完全空白的行
        if row.values().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(row);
    }

    Ok(rows)
}

fn non_empty(row: &HashMap<String, String>, key: &str) -> Option<String> {
    row.get(key).filter(|v| !v.is_empty()).cloned()
}

fn row_to_member(row: &HashMap<String, String>, now: chrono::DateTime<Utc>) -> Option<Member> {
    let name = non_empty(row, "name")?;
    let phone = non_empty(row, "phone")?;

    Some(Member {
        member_id: Uuid::new_v4().to_string(),
        name,
        email: non_empty(row, "email").map(|e| normalize_email(&e)),
        phone: Some(phone),
        address: non_empty(row, "address"),
        assigned_to: None,
        join_date: None,
        last_attendance: None,
        last_contact: None,
        status: MemberStatus::Active,
        notes: Vec::new(),
        attendance_history: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}
