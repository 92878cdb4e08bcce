//! Header metadata cards and the provenance receipt carried by every
//! container.
//!
//! The header is an ordered map of typed cards (observation date, exposure
//! parameters, channel bookkeeping). The provenance receipt is the ordered
//! list of primitives, with their resolved parameters, that derived the
//! container. Provenance deliberately carries no wall-clock data: re-running
//! an identical recipe must yield byte-identical persisted products.

use crate::error::DrpError;
use crate::types::ParamValue;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The header card carrying the observation date, ISO `YYYY-MM-DD`.
pub const CARD_DATE_OBS: &str = "DATE-OBS";

/// A single typed header card value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}
impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}
impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Ordered, typed header metadata for a container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Header {
    cards: BTreeMap<String, HeaderValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<HeaderValue>) {
        self.cards.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.cards.get(key) {
            Some(HeaderValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.cards.get(key) {
            Some(HeaderValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.cards.get(key) {
            Some(HeaderValue::Float(v)) => Some(*v),
            Some(HeaderValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Parses the observation date card. Calibration lookups require it.
    pub fn obs_date(&self) -> Result<NaiveDate, DrpError> {
        let raw = self.get_str(CARD_DATE_OBS).ok_or_else(|| {
            DrpError::MalformedProduct(format!("header is missing the {} card", CARD_DATE_OBS))
        })?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
            DrpError::MalformedProduct(format!("invalid {} card '{}': {}", CARD_DATE_OBS, raw, e))
        })
    }
}

/// One entry of the provenance receipt: a primitive that was applied, with
/// the parameters it resolved to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProvenanceEntry {
    pub primitive: String,
    pub params: BTreeMap<String, ParamValue>,
}

impl ProvenanceEntry {
    pub fn new(primitive: &str, params: BTreeMap<String, ParamValue>) -> Self {
        Self {
            primitive: primitive.to_string(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut h = Header::new();
        h.set("EXPTIME", 30.0);
        h.set("NFRAMES", 4i64);
        h.set("OBJECT", "HD 10700");
        assert_eq!(h.get_f64("EXPTIME"), Some(30.0));
        assert_eq!(h.get_i64("NFRAMES"), Some(4));
        assert_eq!(h.get_str("OBJECT"), Some("HD 10700"));
        assert_eq!(h.get_str("EXPTIME"), None);
        // Int cards are readable as floats.
        assert_eq!(h.get_f64("NFRAMES"), Some(4.0));
    }

    #[test]
    fn test_obs_date_parsing() {
        let mut h = Header::new();
        h.set(CARD_DATE_OBS, "2023-02-21");
        assert_eq!(
            h.obs_date().unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 21).unwrap()
        );

        let mut bad = Header::new();
        bad.set(CARD_DATE_OBS, "21/02/2023");
        assert!(matches!(bad.obs_date(), Err(DrpError::MalformedProduct(_))));
        assert!(matches!(
            Header::new().obs_date(),
            Err(DrpError::MalformedProduct(_))
        ));
    }

    #[test]
    fn test_header_json_is_ordered() {
        let mut h = Header::new();
        h.set("ZCARD", 1i64);
        h.set("ACARD", 2i64);
        let json = serde_json::to_string(&h).unwrap();
        // BTreeMap keeps serialization canonical regardless of insert order.
        assert!(json.find("ACARD").unwrap() < json.find("ZCARD").unwrap());
    }
}
