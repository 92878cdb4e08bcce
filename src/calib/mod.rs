//! The calibration-file registry seam.
//!
//! The facility registry is an external SQL-backed service; the core only
//! depends on this trait. `MemoryRegistry` implements the same best-match
//! semantics in memory for tests and standalone reductions: closest record by
//! date whose type, level, object, and content bits satisfy the query, with
//! an optional maximum-age window.

use crate::error::DrpError;
use crate::types::DataLevel;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A lookup request for the single best-matching calibration product.
#[derive(Debug, Clone)]
pub struct CalQuery {
    pub obs_date: NaiveDate,
    pub level: DataLevel,
    pub caltype: String,
    /// Target object constraint, if any (e.g. `autocal-etalon-all`).
    pub object: Option<String>,
    /// Every bit set here must be set in the record's content bits.
    pub content_bitmask: u32,
    /// Rejects matches whose validity end predates `obs_date` by more than
    /// this window.
    pub max_age: Option<Duration>,
}

/// One registry row describing a registered calibration product.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalRecord {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub level: DataLevel,
    pub caltype: String,
    pub object: String,
    pub content_bits: u32,
    pub n_frames: u32,
    pub min_mjd: f64,
    pub max_mjd: f64,
    pub info_bits: u32,
    pub filename: String,
    pub checksum: String,
    /// Zero means enabled; non-zero records are ignored by lookups.
    pub status: i32,
    pub created_by: String,
    pub created: NaiveDateTime,
    pub comment: String,
}

impl CalRecord {
    /// Distance in days between the query date and this record's validity
    /// range; zero when the date falls inside the range.
    fn date_distance(&self, obs_date: NaiveDate) -> i64 {
        if obs_date < self.start_date {
            (self.start_date - obs_date).num_days()
        } else if obs_date > self.end_date {
            (obs_date - self.end_date).num_days()
        } else {
            0
        }
    }

    fn matches(&self, query: &CalQuery) -> bool {
        if self.status != 0 || self.level != query.level || self.caltype != query.caltype {
            return false;
        }
        if let Some(object) = &query.object {
            if &self.object != object {
                return false;
            }
        }
        if self.content_bits & query.content_bitmask != query.content_bitmask {
            return false;
        }
        if let Some(max_age) = query.max_age {
            if self.date_distance(query.obs_date) > max_age.num_days() {
                return false;
            }
        }
        true
    }
}

/// Read-mostly registry interface used by primitives needing a best-matching
/// calibration frame.
pub trait CalibrationRegistry: Send + Sync {
    /// Returns the single best-matching calibration product, by date
    /// proximity within the query constraints, or `CalibrationNotFound`.
    fn get_cal_file(&self, query: &CalQuery) -> Result<CalRecord, DrpError>;

    /// Registers a calibration product. Registration happens out-of-band of
    /// reduction runs; no write contention is assumed from within a run.
    fn register_cal_file(&mut self, record: CalRecord) -> Result<(), DrpError>;
}

/// In-memory registry with the reference matching semantics.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Vec<CalRecord>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CalibrationRegistry for MemoryRegistry {
    fn get_cal_file(&self, query: &CalQuery) -> Result<CalRecord, DrpError> {
        self.records
            .iter()
            .filter(|r| r.matches(query))
            .min_by_key(|r| r.date_distance(query.obs_date))
            .cloned()
            .ok_or_else(|| {
                DrpError::CalibrationNotFound(format!(
                    "caltype='{}' level={} date={} bitmask={:#x} max_age={:?}",
                    query.caltype,
                    query.level,
                    query.obs_date,
                    query.content_bitmask,
                    query.max_age.map(|d| d.num_days()),
                ))
            })
    }

    fn register_cal_file(&mut self, record: CalRecord) -> Result<(), DrpError> {
        if record.end_date < record.start_date {
            return Err(DrpError::Configuration(format!(
                "calibration '{}' has end_date before start_date",
                record.filename
            )));
        }
        self.records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bias_record(start: NaiveDate, end: NaiveDate, filename: &str) -> CalRecord {
        CalRecord {
            start_date: start,
            end_date: end,
            level: DataLevel::L0,
            caltype: "bias".into(),
            object: "autocal-bias".into(),
            content_bits: 0b11,
            n_frames: 10,
            min_mjd: 59990.0,
            max_mjd: 59991.0,
            info_bits: 0,
            filename: filename.into(),
            checksum: "d41d8cd9".into(),
            status: 0,
            created_by: "masters_drp".into(),
            created: start.and_hms_opt(12, 0, 0).unwrap(),
            comment: String::new(),
        }
    }

    fn query(obs: NaiveDate, max_age_days: Option<i64>) -> CalQuery {
        CalQuery {
            obs_date: obs,
            level: DataLevel::L0,
            caltype: "bias".into(),
            object: None,
            content_bitmask: 0b01,
            max_age: max_age_days.map(Duration::days),
        }
    }

    #[test]
    fn test_stale_record_outside_max_age_is_not_found() {
        // Registry holds only a 10-day-old bias; a 5-day window must miss.
        let mut registry = MemoryRegistry::new();
        registry
            .register_cal_file(bias_record(date(2023, 2, 10), date(2023, 2, 11), "bias_a"))
            .unwrap();

        let result = registry.get_cal_file(&query(date(2023, 2, 21), Some(5)));
        assert!(matches!(result, Err(DrpError::CalibrationNotFound(_))));

        // Without the window the same record is the best match.
        let found = registry.get_cal_file(&query(date(2023, 2, 21), None)).unwrap();
        assert_eq!(found.filename, "bias_a");
    }

    #[test]
    fn test_best_match_is_closest_by_date() {
        let mut registry = MemoryRegistry::new();
        registry
            .register_cal_file(bias_record(date(2023, 2, 1), date(2023, 2, 2), "far"))
            .unwrap();
        registry
            .register_cal_file(bias_record(date(2023, 2, 19), date(2023, 2, 20), "near"))
            .unwrap();

        let found = registry.get_cal_file(&query(date(2023, 2, 21), None)).unwrap();
        assert_eq!(found.filename, "near");
    }

    #[test]
    fn test_content_bitmask_must_be_covered() {
        let mut registry = MemoryRegistry::new();
        registry
            .register_cal_file(bias_record(date(2023, 2, 20), date(2023, 2, 21), "bias_a"))
            .unwrap();

        let mut q = query(date(2023, 2, 21), None);
        q.content_bitmask = 0b100; // not present in record's 0b11
        assert!(matches!(
            registry.get_cal_file(&q),
            Err(DrpError::CalibrationNotFound(_))
        ));
    }

    #[test]
    fn test_disabled_and_wrong_type_records_are_skipped() {
        let mut registry = MemoryRegistry::new();
        let mut disabled = bias_record(date(2023, 2, 20), date(2023, 2, 21), "disabled");
        disabled.status = 1;
        registry.register_cal_file(disabled).unwrap();

        let mut flat = bias_record(date(2023, 2, 20), date(2023, 2, 21), "flat");
        flat.caltype = "flat".into();
        registry.register_cal_file(flat).unwrap();

        assert!(matches!(
            registry.get_cal_file(&query(date(2023, 2, 21), None)),
            Err(DrpError::CalibrationNotFound(_))
        ));
    }

    #[test]
    fn test_inverted_validity_range_is_rejected() {
        let mut registry = MemoryRegistry::new();
        let record = bias_record(date(2023, 2, 21), date(2023, 2, 10), "inverted");
        assert!(matches!(
            registry.register_cal_file(record),
            Err(DrpError::Configuration(_))
        ));
    }
}
