//! 프로브 결과를 시간축으로 이어 붙입니다.
//!
//! 파일 N의 종료 시각은 파일 N+1의 시작 시각이고, 파일 N에 기록된 트랜잭션은
//! (N+1의 Previous-GTIDs) - (N의 Previous-GTIDs) 입니다.

use crate::connection::BinlogFile;
use crate::dispatcher::ProbeResult;
use crate::error::{ExtractorError, Result};
use crate::gtid;
use serde::Serialize;
use tracing::debug;

/// 파일 하나의 재구성 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinlogReport {
    pub name: String,
    pub size_bytes: u64,
    pub start_time: Option<u32>,
    /// 가장 최신 파일은 아직 쓰는 중이므로 없음
    pub end_time: Option<u32>,
    /// 초 단위
    pub duration: Option<u32>,
    pub gtid_delta: String,
}

/// 오래된 순으로 정렬된 보고서 행을 만듭니다.
pub fn reconstruct(files: &[BinlogFile], results: &[ProbeResult]) -> Result<Vec<BinlogReport>> {
    if files.len() != results.len() {
        return Err(ExtractorError::TaskError(format!(
            "{} probe results for {} binlog files",
            results.len(),
            files.len()
        )));
    }
    if let Some((i, r)) = results.iter().enumerate().find(|(i, r)| r.index != *i) {
        return Err(ExtractorError::TaskError(format!(
            "probe result at slot {} belongs to file #{}",
            i, r.index
        )));
    }

    let mut next_start_time: Option<u32> = None;
    let mut next_previous_gtids = String::new();
    let mut rows = Vec::with_capacity(files.len());

    // 최신 파일부터 거꾸로
    for (file, result) in files.iter().zip(results).rev() {
        let end_time = next_start_time;
        let duration = match (result.start_time, end_time) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        };

        let delta = gtid::gtid_subtract(&next_previous_gtids, &result.previous_gtids)
            .map_err(|e| match e {
                ExtractorError::GtidParseError(msg) => {
                    ExtractorError::GtidParseError(format!("{}: {}", file.name, msg))
                }
                other => other,
            })?;

        debug!("{}: end={:?}, delta={:?}", file.name, end_time, delta);

        rows.push(BinlogReport {
            name: file.name.clone(),
            size_bytes: file.size_bytes,
            start_time: result.start_time,
            end_time,
            duration,
            gtid_delta: gtid::extract_interval_suffix(&delta),
        });

        next_start_time = result.start_time;
        next_previous_gtids = result.previous_gtids.clone();
    }

    rows.reverse();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, start_time: Option<u32>, previous_gtids: &str) -> ProbeResult {
        ProbeResult {
            index,
            start_time,
            previous_gtids: previous_gtids.to_string(),
        }
    }

    fn scenario() -> (Vec<BinlogFile>, Vec<ProbeResult>) {
        let files = vec![
            BinlogFile::new("mysql-bin.1", 1000),
            BinlogFile::new("mysql-bin.2", 2000),
            BinlogFile::new("mysql-bin.3", 500),
        ];
        let results = vec![
            result(0, Some(1000), ""),
            result(1, Some(2000), "s1:1-10"),
            result(2, Some(3000), "s1:1-25"),
        ];
        (files, results)
    }

    #[test]
    fn test_reconstruct_three_files() {
        let (files, results) = scenario();
        let rows = reconstruct(&files, &results).unwrap();

        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].name, "mysql-bin.1");
        assert_eq!(rows[0].end_time, Some(2000));
        assert_eq!(rows[0].duration, Some(1000));
        assert_eq!(rows[0].gtid_delta, "1-10");

        assert_eq!(rows[1].end_time, Some(3000));
        assert_eq!(rows[1].duration, Some(1000));
        assert_eq!(rows[1].gtid_delta, "11-25");

        assert_eq!(rows[2].size_bytes, 500);
        assert_eq!(rows[2].end_time, None);
        assert_eq!(rows[2].duration, None);
        assert_eq!(rows[2].gtid_delta, "");
    }

    #[test]
    fn test_end_time_chains_adjacent_files() {
        let files: Vec<BinlogFile> =
            (0..5).map(|i| BinlogFile::new(format!("b.{}", i), 1)).collect();
        let results: Vec<ProbeResult> = (0..5)
            .map(|i| ProbeResult {
                index: i,
                start_time: Some(100 + 37 * i as u32),
                previous_gtids: String::new(),
            })
            .collect();

        let rows = reconstruct(&files, &results).unwrap();
        for pair in rows.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
        assert_eq!(rows.last().unwrap().end_time, None);
    }

    #[test]
    fn test_multi_source_delta_keeps_full_text() {
        let files = vec![BinlogFile::new("a", 1), BinlogFile::new("b", 1)];
        let results = vec![
            result(0, Some(10), "s1:1-5,s2:1-3"),
            result(1, Some(20), "s1:1-9,s2:1-7"),
        ];

        let rows = reconstruct(&files, &results).unwrap();
        assert_eq!(rows[0].gtid_delta, "s1:6-9,s2:4-7");
    }

    #[test]
    fn test_missing_previous_gtids_uses_successor_set() {
        let files = vec![BinlogFile::new("a", 1), BinlogFile::new("b", 1)];
        let results = vec![
            result(0, Some(10), ""),
            result(1, Some(20), "s1:1-4:8-9"),
        ];

        let rows = reconstruct(&files, &results).unwrap();
        assert_eq!(rows[0].gtid_delta, "s1:1-4:8-9");
    }

    #[test]
    fn test_missing_start_time_has_no_duration() {
        let files = vec![BinlogFile::new("a", 1), BinlogFile::new("b", 1)];
        let results = vec![
            result(0, None, ""),
            result(1, Some(20), ""),
        ];

        let rows = reconstruct(&files, &results).unwrap();
        assert_eq!(rows[0].end_time, Some(20));
        assert_eq!(rows[0].duration, None);
    }

    #[test]
    fn test_malformed_gtid_is_an_error() {
        let files = vec![BinlogFile::new("a", 1), BinlogFile::new("b", 1)];
        let results = vec![
            result(0, Some(1), "s1:x"),
            result(1, Some(2), "s1:1-3"),
        ];

        let err = reconstruct(&files, &results).unwrap_err();
        assert!(matches!(err, ExtractorError::GtidParseError(ref msg) if msg.starts_with("a:")));
    }

    #[test]
    fn test_result_count_mismatch() {
        let (files, mut results) = scenario();
        results.pop();
        assert!(reconstruct(&files, &results).is_err());
    }
}
