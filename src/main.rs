// ==========================================
// 会友关怀系统 - 命令行入口
// ==========================================
// 用法:
//   member-care classify [db_path] [YYYY-MM-DD]   立即重新计算全部会友状态
//   member-care import <csv_path> [db_path]       从 CSV 导入会友
//   member-care summary [db_path]                 输出驾驶舱统计
//   member-care schedule [db_path]                按 cron 配置定时重新计算（Ctrl+C 退出）
//
// db_path 缺省时使用 MEMBER_CARE_DB_PATH 或用户数据目录
// ==========================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use member_care::app::{get_default_db_path, AppState};
use member_care::config::ClassifierConfigReader;
use member_care::engine::start_status_scheduler;
use member_care::{logging, MemberStatus};

const USAGE: &str = "用法: member-care <classify|import|summary|schedule> [参数]";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let command = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let rest: Vec<String> = args.collect();

    // 定时任务常驻运行，日志输出为 JSON 行便于采集
    if command == "schedule" {
        logging::init_json();
    } else {
        logging::init();
    }

    tracing::info!("{} v{}", member_care::APP_NAME, member_care::VERSION);

    match command.as_str() {
        "classify" => {
            let state = open_state(rest.first()).await?;
            let now = match rest.get(1) {
                Some(raw) => Some(reference_instant(&state, raw).await?),
                None => None,
            };
            let report = state
                .status_api
                .run_classification(now)
                .await
                .context("会友状态批处理失败")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.failures.is_empty() {
                bail!("{} 位会友状态写入失败", report.failed_count());
            }
        }
        "import" => {
            let csv_path = rest.first().ok_or_else(|| anyhow!("缺少 CSV 文件路径\n{}", USAGE))?;
            let state = open_state(rest.get(1)).await?;
            let summary = state
                .importer
                .import_file(Path::new(csv_path))
                .with_context(|| format!("导入失败: {}", csv_path))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "summary" => {
            let state = open_state(rest.first()).await?;
            let listing = state.member_api.list_members()?;

            let mut by_status: BTreeMap<MemberStatus, usize> =
                MemberStatus::ALL.iter().map(|s| (*s, 0)).collect();
            for member in &listing.members {
                *by_status.entry(member.status).or_insert(0) += 1;
            }

            let by_status: BTreeMap<String, usize> = by_status
                .into_iter()
                .map(|(s, n)| (s.to_string(), n))
                .collect();
            let output = serde_json::json!({
                "count": listing.count,
                "presentCount": listing.present_count,
                "followUpCount": listing.follow_up_count,
                "latestAttendanceDate": listing.latest_attendance_date,
                "byStatus": by_status,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "schedule" => {
            let state = open_state(rest.first()).await?;
            let cron = state
                .config_manager
                .get_schedule_cron()
                .await
                .map_err(|e| anyhow!("读取定时配置失败: {}", e))?;

            let shutdown = CancellationToken::new();
            let mut scheduler =
                start_status_scheduler(state.status_api.runner(), &cron, shutdown.clone()).await?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("收到退出信号，停止定时任务");
            shutdown.cancel();
            scheduler.shutdown().await?;
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}

async fn open_state(db_path: Option<&String>) -> Result<AppState> {
    let db_path = db_path.cloned().unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);
    AppState::new(db_path).await.map_err(|e| anyhow!(e))
}

/// 将命令行日期换算为参考时区当天中午
async fn reference_instant(state: &AppState, raw: &str) -> Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("日期格式错误（应为 YYYY-MM-DD）: {}", raw))?;
    let minutes = state
        .config_manager
        .get_reference_utc_offset_minutes()
        .await
        .map_err(|e| anyhow!("读取参考时区失败: {}", e))?;
    let offset = FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| anyhow!("参考时区偏移非法: {} 分钟", minutes))?;
    let noon = day
        .and_hms_opt(12, 0, 0)
        .ok_or_else(|| anyhow!("无法构造参考时刻: {}", raw))?;

    offset
        .from_local_datetime(&noon)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("无法构造参考时刻: {}", raw))
}
