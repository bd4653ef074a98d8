//! 보고서 출력 (표 / JSON)

use crate::error::{ExtractorError, Result};
use crate::timeline::BinlogReport;
use chrono::{Local, TimeZone, Utc};
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Cell, CellAlignment, Table};
use serde::Serialize;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SIZE_UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];

/// 시각 표시 기준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZoneMode {
    #[default]
    Local,
    Utc,
}

/// 출력 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// 출력 설정
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub time_zone: TimeZoneMode,
    pub newest_first: bool,
}

/// 1024 단위로 사람이 읽기 쉬운 크기 문자열 (소수점 둘째 자리)
pub fn format_bytes(size: u64) -> String {
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, SIZE_UNITS[unit])
}

/// 초를 HH:MM:SS 로 (시간은 24로 나누지 않음)
pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

pub fn format_timestamp(timestamp: u32, time_zone: TimeZoneMode) -> Result<String> {
    let utc = Utc
        .timestamp_opt(timestamp as i64, 0)
        .single()
        .ok_or_else(|| ExtractorError::FormatError(format!("Invalid timestamp {}", timestamp)))?;

    Ok(match time_zone {
        TimeZoneMode::Utc => utc.format(TIME_FORMAT).to_string(),
        TimeZoneMode::Local => utc.with_timezone(&Local).format(TIME_FORMAT).to_string(),
    })
}

/// 출력용으로 문자열화한 한 행
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub report: BinlogReport,
    pub file_size: String,
    pub start_time_text: Option<String>,
    pub end_time_text: Option<String>,
    pub duration_text: Option<String>,
}

impl ReportRow {
    pub fn from_report(report: &BinlogReport, time_zone: TimeZoneMode) -> Result<Self> {
        let start_time_text = report
            .start_time
            .map(|ts| format_timestamp(ts, time_zone))
            .transpose()?;
        let end_time_text = report
            .end_time
            .map(|ts| format_timestamp(ts, time_zone))
            .transpose()?;

        Ok(ReportRow {
            file_size: format!("{} ({})", report.size_bytes, format_bytes(report.size_bytes)),
            start_time_text,
            end_time_text,
            duration_text: report.duration.map(format_duration),
            report: report.clone(),
        })
    }
}

fn build_rows(reports: &[BinlogReport], options: &RenderOptions) -> Result<Vec<ReportRow>> {
    let mut rows = reports
        .iter()
        .map(|r| ReportRow::from_report(r, options.time_zone))
        .collect::<Result<Vec<_>>>()?;
    if options.newest_first {
        rows.reverse();
    }
    Ok(rows)
}

pub fn render_table(reports: &[BinlogReport], options: &RenderOptions) -> Result<String> {
    let rows = build_rows(reports, options)?;

    let mut table = Table::new();
    table.load_preset(ASCII_FULL).set_header(vec![
        "Log_name",
        "File_size",
        "Start_time",
        "End_time",
        "Duration",
        "GTID",
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.report.name),
            Cell::new(&row.file_size).set_alignment(CellAlignment::Right),
            Cell::new(row.start_time_text.unwrap_or_default()),
            Cell::new(row.end_time_text.unwrap_or_default()),
            Cell::new(row.duration_text.unwrap_or_default()),
            Cell::new(&row.report.gtid_delta),
        ]);
    }

    Ok(table.to_string())
}

pub fn render_json(reports: &[BinlogReport], options: &RenderOptions) -> Result<String> {
    let rows = build_rows(reports, options)?;
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// 설정된 형식으로 출력 문자열 생성
pub fn render(reports: &[BinlogReport], options: &RenderOptions) -> Result<String> {
    match options.format {
        OutputFormat::Table => render_table(reports, options),
        OutputFormat::Json => render_json(reports, options),
    }
}
