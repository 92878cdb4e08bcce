//! Ingestion and calibration-lookup primitives.
//!
//! `read_level0` / `read_level1` bring persisted products into the context;
//! `lookup_calibration` asks the registry for the best-matching calibration
//! frame for the input exposure's observation date and loads it.

use crate::calib::CalQuery;
use crate::context::ExecutionContext;
use crate::error::DrpError;
use crate::models::{DataProduct, Level0, Level1, ProductFile};
use crate::primitives::{ParamKind, ParamSchema, ParamSpec, Primitive, ResolvedParams};
use crate::types::{DataLevel, ParamValue};
use chrono::Duration;
use std::path::{Path, PathBuf};

/// Resolves a possibly-relative product path against a configured data root.
fn resolve_path(path: &str, root: &Option<PathBuf>) -> PathBuf {
    let p = Path::new(path);
    match (p.is_relative(), root) {
        (true, Some(root)) => root.join(p),
        _ => p.to_path_buf(),
    }
}

//==================================================================================
// read_level0 / read_level1
//==================================================================================

pub struct ReadLevel0;

impl Primitive for ReadLevel0 {
    fn name(&self) -> &'static str {
        "read_level0"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L0
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec {
            name: "path",
            kind: ParamKind::Str,
            default: None,
            help: "persisted L0 product to ingest; relative paths resolve against data_dirs.raw",
        }])
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        _inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let path = resolve_path(params.get_str("path")?, &ctx.config.data_dirs.raw);
        let file = ProductFile::read_from(&path)?;
        Ok(DataProduct::from(Level0::from_product_file(file)?))
    }
}

pub struct ReadLevel1;

impl Primitive for ReadLevel1 {
    fn name(&self) -> &'static str {
        "read_level1"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L1
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec {
            name: "path",
            kind: ParamKind::Str,
            default: None,
            help: "persisted L1 checkpoint; relative paths resolve against data_dirs.intermediate",
        }])
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        _inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let path = resolve_path(params.get_str("path")?, &ctx.config.data_dirs.intermediate);
        let file = ProductFile::read_from(&path)?;
        Ok(DataProduct::from(Level1::from_product_file(file)?))
    }
}

//==================================================================================
// lookup_calibration
//==================================================================================

/// Fetches the best-matching calibration frame for the input exposure.
///
/// The observation date comes from the input header; the registry applies
/// date proximity, content-bitmask coverage, and the optional maximum-age
/// window. A miss surfaces as `CalibrationNotFound`; a recipe that can
/// tolerate it marks the step optional and handles the unset binding.
pub struct LookupCalibration;

impl Primitive for LookupCalibration {
    fn name(&self) -> &'static str {
        "lookup_calibration"
    }

    fn input_levels(&self) -> &'static [DataLevel] {
        &[DataLevel::L0]
    }

    fn output_level(&self) -> DataLevel {
        DataLevel::L0
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec {
                name: "caltype",
                kind: ParamKind::Str,
                default: None,
                help: "calibration product type, e.g. 'bias' or 'flat'",
            },
            ParamSpec {
                name: "object",
                kind: ParamKind::Str,
                default: Some(ParamValue::Str(String::new())),
                help: "object constraint; empty matches any object",
            },
            ParamSpec {
                name: "content_bitmask",
                kind: ParamKind::Int,
                default: Some(ParamValue::Int(0)),
                help: "required content bits; every set bit must be present in the record",
            },
            ParamSpec {
                name: "max_age_days",
                kind: ParamKind::Int,
                default: Some(ParamValue::Int(0)),
                help: "reject matches older than this many days; 0 disables the window",
            },
        ])
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        inputs: &[&DataProduct],
        params: &ResolvedParams,
    ) -> Result<DataProduct, DrpError> {
        let obs_date = inputs[0].header().obs_date()?;
        let object = params.get_str("object")?;
        let max_age_days = params.get_i64("max_age_days")?;

        let query = CalQuery {
            obs_date,
            level: DataLevel::L0,
            caltype: params.get_str("caltype")?.to_string(),
            object: (!object.is_empty()).then(|| object.to_string()),
            content_bitmask: params.get_i64("content_bitmask")? as u32,
            max_age: (max_age_days > 0).then(|| Duration::days(max_age_days)),
        };

        let record = ctx.calibrations()?.get_cal_file(&query)?;
        let path = resolve_path(&record.filename, &ctx.config.data_dirs.reference);
        let file = ProductFile::read_from(&path)?;
        Ok(DataProduct::from(Level0::from_product_file(file)?))
    }
}
