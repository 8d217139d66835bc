//! Listener config loader (strict parsing).

pub mod schema;

use std::fs;

use reqmeter_core::error::{Result, ReqMeterError};

pub use schema::{MethodConfig, MetricsSection, ReqMeterConfig, ResourceConfig, ServerSection};

pub fn load_from_file(path: &str) -> Result<ReqMeterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ReqMeterError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ReqMeterConfig> {
    let cfg: ReqMeterConfig = serde_yaml::from_str(s)
        .map_err(|e| ReqMeterError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
