//! GTID (Global Transaction ID) 집합 연산
//!
//! GTID 형식: UUID:sequence-number
//! 여러 서버의 GTID 집합 텍스트: "uuid1:1-100:200,uuid2:1-50"
//!
//! 한 binlog 파일에 기록된 트랜잭션은 다음 파일의 Previous-GTIDs 집합에서
//! 해당 파일의 Previous-GTIDs 집합을 뺀 것과 같습니다.

use crate::error::{ExtractorError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 구간 토큰: "7" 또는 "1-100"
static INTERVAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").expect("valid interval regex"));

/// GTID 범위 (양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GtidRange {
    pub start: u64,
    pub end: u64,
}

impl GtidRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start == 0 {
            return Err(ExtractorError::GtidParseError(
                "GTID sequence numbers start at 1".to_string(),
            ));
        }
        if start > end {
            return Err(ExtractorError::GtidParseError(format!(
                "Invalid range: {} > {}",
                start, end
            )));
        }
        Ok(GtidRange { start, end })
    }

    /// 겹치거나 연접한 범위 병합
    pub fn merge(&self, other: &GtidRange) -> Option<GtidRange> {
        if self.end.saturating_add(1) >= other.start && other.end.saturating_add(1) >= self.start {
            Some(GtidRange {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            })
        } else {
            None
        }
    }

    /// self에서 other를 뺀 나머지 (0~2개)
    fn minus(&self, other: &GtidRange) -> Vec<GtidRange> {
        if other.end < self.start || other.start > self.end {
            return vec![*self];
        }

        let mut rest = Vec::with_capacity(2);
        if self.start < other.start {
            rest.push(GtidRange {
                start: self.start,
                end: other.start - 1,
            });
        }
        if self.end > other.end {
            rest.push(GtidRange {
                start: other.end + 1,
                end: self.end,
            });
        }
        rest
    }
}

impl fmt::Display for GtidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for GtidRange {
    type Err = ExtractorError;

    fn from_str(token: &str) -> Result<Self> {
        let caps = INTERVAL_PATTERN
            .captures(token)
            .ok_or_else(|| ExtractorError::GtidParseError(format!("Invalid interval: {}", token)))?;

        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| ExtractorError::GtidParseError(format!("Invalid sequence: {}", s)))
        };

        let start = parse(&caps[1])?;
        let end = match caps.get(2) {
            Some(m) => parse(m.as_str())?,
            None => start,
        };
        GtidRange::new(start, end)
    }
}

/// UUID별 GTID 범위들 (정렬 및 병합된 상태 유지)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UUIDGtidSet {
    pub uuid: String,
    pub ranges: Vec<GtidRange>,
}

impl UUIDGtidSet {
    pub fn new(uuid: String) -> Self {
        UUIDGtidSet {
            uuid,
            ranges: Vec::new(),
        }
    }

    pub fn add_range(&mut self, range: GtidRange) {
        self.ranges.push(range);
        self.ranges.sort();

        let mut merged: Vec<GtidRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) => match last.merge(&r) {
                    Some(m) => *last = m,
                    None => merged.push(r),
                },
                None => merged.push(r),
            }
        }
        self.ranges = merged;
    }

    fn subtract(&self, other: &UUIDGtidSet) -> UUIDGtidSet {
        let mut ranges = self.ranges.clone();
        for cut in &other.ranges {
            ranges = ranges.iter().flat_map(|r| r.minus(cut)).collect();
        }
        UUIDGtidSet {
            uuid: self.uuid.clone(),
            ranges,
        }
    }
}

impl fmt::Display for UUIDGtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)?;
        for range in &self.ranges {
            write!(f, ":{}", range)?;
        }
        Ok(())
    }
}

/// 전체 GTID 집합 (여러 UUID)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtidSet {
    pub sets: BTreeMap<String, UUIDGtidSet>,
}

impl GtidSet {
    pub fn new() -> Self {
        GtidSet {
            sets: BTreeMap::new(),
        }
    }

    /// GTID 문자열 파싱 (format: "uuid1:1-100:200,uuid2:1-50")
    ///
    /// 서버가 돌려주는 텍스트처럼 ',' 뒤의 줄바꿈/공백은 무시합니다.
    pub fn parse(gtid_str: &str) -> Result<Self> {
        let mut gtid_set = GtidSet::new();

        let gtid_str = gtid_str.trim();
        if gtid_str.is_empty() || gtid_str == "NULL" {
            return Ok(gtid_set);
        }

        for segment in gtid_str.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let mut parts = segment.split(':');
            let uuid = parts.next().unwrap_or_default().trim();
            if uuid.is_empty() {
                return Err(ExtractorError::GtidParseError(format!(
                    "Missing source UUID in: {}",
                    segment
                )));
            }

            let mut seen_interval = false;
            for token in parts {
                let range: GtidRange = token.trim().parse()?;
                gtid_set.add_range(uuid, range);
                seen_interval = true;
            }

            if !seen_interval {
                return Err(ExtractorError::GtidParseError(format!(
                    "Missing interval in: {}",
                    segment
                )));
            }
        }

        Ok(gtid_set)
    }

    pub fn add_range(&mut self, uuid: &str, range: GtidRange) {
        let uuid = uuid.to_ascii_lowercase();
        self.sets
            .entry(uuid.clone())
            .or_insert_with(|| UUIDGtidSet::new(uuid))
            .add_range(range);
    }

    /// self - other (UUID별 구간 차집합)
    pub fn subtract(&self, other: &GtidSet) -> GtidSet {
        let mut result = GtidSet::new();

        for (uuid, set) in &self.sets {
            let remaining = match other.sets.get(uuid) {
                Some(cut) => set.subtract(cut),
                None => set.clone(),
            };
            if !remaining.ranges.is_empty() {
                result.sets.insert(uuid.clone(), remaining);
            }
        }

        result
    }

    pub fn union(&self, other: &GtidSet) -> GtidSet {
        let mut result = self.clone();
        for (uuid, set) in &other.sets {
            for range in &set.ranges {
                result.add_range(uuid, *range);
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(|set| set.ranges.is_empty())
    }
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for set in self.sets.values().filter(|s| !s.ranges.is_empty()) {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", set)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for GtidSet {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self> {
        GtidSet::parse(s)
    }
}

/// `later - earlier`를 계산해 텍스트로 돌려줍니다.
pub fn gtid_subtract(later: &str, earlier: &str) -> Result<String> {
    let later = GtidSet::parse(later)?;
    let earlier = GtidSet::parse(earlier)?;
    Ok(later.subtract(&earlier).to_string())
}

/// 단일 UUID의 단일 구간이면 ':' 뒤 구간만 남깁니다.
///
/// "uuid:51-80" -> "51-80", 그 외("uuid:1-5:7-9", 여러 UUID)는 그대로.
pub fn extract_interval_suffix(gtid_str: &str) -> String {
    if !gtid_str.contains(',') {
        let parts: Vec<&str> = gtid_str.split(':').collect();
        if parts.len() == 2 {
            return parts[1].to_string();
        }
    }
    gtid_str.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID_A: &str = "550e8400-e29b-41d4-a716-446655440000";
    const UUID_B: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562";

    #[test]
    fn test_gtid_parse() {
        let gtid_set = GtidSet::parse(&format!("{}:1-100:200:300-400", UUID_A)).unwrap();
        let ranges = &gtid_set.sets[UUID_A].ranges;
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[1], GtidRange { start: 200, end: 200 });
    }

    #[test]
    fn test_gtid_parse_multi_source_with_newlines() {
        let text = format!("{}:1-5,\n{}:1-3", UUID_A, UUID_B);
        let gtid_set = GtidSet::parse(&text).unwrap();
        assert_eq!(gtid_set.sets.len(), 2);
        // BTreeMap 정렬 순서로 렌더링
        assert_eq!(gtid_set.to_string(), format!("{}:1-3,{}:1-5", UUID_B, UUID_A));
    }

    #[test]
    fn test_gtid_parse_empty() {
        assert!(GtidSet::parse("").unwrap().is_empty());
        assert!(GtidSet::parse("  ").unwrap().is_empty());
        assert!(GtidSet::parse("NULL").unwrap().is_empty());
        assert_eq!(GtidSet::parse("").unwrap().to_string(), "");
    }

    #[test]
    fn test_gtid_parse_errors() {
        assert!(GtidSet::parse("uuid").is_err());
        assert!(GtidSet::parse(":1-5").is_err());
        assert!(GtidSet::parse("uuid:5-1").is_err());
        assert!(GtidSet::parse("uuid:0-3").is_err());
        assert!(GtidSet::parse("uuid:abc").is_err());
    }

    #[test]
    fn test_gtid_parse_merges_adjacent_ranges() {
        let gtid_set = GtidSet::parse("s1:1-5:6-10:12,s1:11").unwrap();
        assert_eq!(gtid_set.to_string(), "s1:1-12");
    }

    #[test]
    fn test_subtract_single_source() {
        let delta =
            gtid_subtract(&format!("{}:1-80", UUID_A), &format!("{}:1-50", UUID_A)).unwrap();
        assert_eq!(delta, format!("{}:51-80", UUID_A));
        assert_eq!(extract_interval_suffix(&delta), "51-80");
    }

    #[test]
    fn test_subtract_splits_ranges() {
        let later = GtidSet::parse("s1:1-100").unwrap();
        let earlier = GtidSet::parse("s1:10-20:50").unwrap();
        assert_eq!(later.subtract(&earlier).to_string(), "s1:1-9:21-49:51-100");
    }

    #[test]
    fn test_subtract_against_empty() {
        assert_eq!(gtid_subtract("s1:1-25", "").unwrap(), "s1:1-25");
        assert_eq!(gtid_subtract("", "s1:1-25").unwrap(), "");
    }

    #[test]
    fn test_subtract_then_union_recombines() {
        let superset =
            GtidSet::parse(&format!("{}:1-100:150-200,{}:1-40", UUID_A, UUID_B)).unwrap();
        let subset = GtidSet::parse(&format!("{}:1-60,{}:1-40", UUID_A, UUID_B)).unwrap();

        let delta = superset.subtract(&subset);
        let reparsed = GtidSet::parse(&delta.to_string()).unwrap();
        assert_eq!(reparsed.union(&subset), superset);
    }

    #[test]
    fn test_extract_interval_suffix_keeps_multi_source() {
        let multi = format!("{}:1-3,{}:4-9", UUID_B, UUID_A);
        assert_eq!(extract_interval_suffix(&multi), multi);

        let gapped = format!("{}:1-3:7-9", UUID_A);
        assert_eq!(extract_interval_suffix(&gapped), gapped);

        assert_eq!(extract_interval_suffix(""), "");
    }
}
