use std::net::SocketAddr;

use serde::Deserialize;
use reqmeter_core::error::{Result, ReqMeterError};
use reqmeter_core::{AnnotationCatalog, Timed, DEFAULT_METRIC_NAME};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReqMeterConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl ReqMeterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ReqMeterError::UnsupportedVersion);
        }

        self.server.validate()?;
        self.metrics.validate()?;

        for (i, r) in self.resources.iter().enumerate() {
            if r.type_name.trim().is_empty() {
                return Err(ReqMeterError::BadRequest(format!(
                    "resources[{i}].type must not be empty"
                )));
            }
            if r.methods.iter().any(|m| m.name.trim().is_empty()) {
                return Err(ReqMeterError::BadRequest(format!(
                    "resources[{i}].methods[].name must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Annotation catalog declared under `resources`.
    pub fn catalog(&self) -> AnnotationCatalog {
        let mut catalog = AnnotationCatalog::new();
        for r in &self.resources {
            catalog.annotate_type(r.type_name.clone(), r.timed.iter().cloned());
            if let Some(parent) = &r.extends {
                catalog.extend_type(r.type_name.clone(), parent.clone());
            }
            for m in &r.methods {
                catalog.annotate_method(
                    r.type_name.clone(),
                    m.name.clone(),
                    m.timed.iter().cloned(),
                );
            }
        }
        catalog
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|_| {
            ReqMeterError::BadRequest("server.listen must be a valid SocketAddr".into())
        })?;
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_metric_name")]
    pub metric_name: String,

    /// Time matched routes that carry no `Timed` at all.
    #[serde(default)]
    pub auto_time_requests: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            metric_name: default_metric_name(),
            auto_time_requests: false,
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if self.metric_name.trim().is_empty() {
            return Err(ReqMeterError::BadRequest(
                "metrics.metric_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_metric_name() -> String {
    DEFAULT_METRIC_NAME.into()
}

/// One resource type and its `Timed` declarations.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub type_name: String,

    /// Parent type whose type-level `Timed` is inherited.
    #[serde(default)]
    pub extends: Option<String>,

    #[serde(default)]
    pub timed: Vec<Timed>,

    #[serde(default)]
    pub methods: Vec<MethodConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodConfig {
    pub name: String,
    #[serde(default)]
    pub timed: Vec<Timed>,
}
