//! Environment properties attached to every outgoing record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::telemetry::{Fields, SinkError, TelemetryRecord, TelemetrySink};

/// Version details the host application reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub version: Option<String>,
    pub product: Option<String>,
    pub language: Option<String>,
}

/// Builds the property set describing this machine, user and host.
pub fn environment_properties(host: &HostInfo) -> Fields {
    let machine = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string());

    let mut properties = Fields::new();
    properties.push("machineName", machine);
    properties.push("userName", user);
    properties.push("operatingSystem", std::env::consts::OS);
    properties.push("hostVersion", host.version.clone());
    properties.push("hostProduct", host.product.clone());
    properties.push("hostLanguage", host.language.clone());
    properties
}

/// Sink decorator appending a fixed property set to each record.
pub struct EnrichedSink {
    inner: Arc<dyn TelemetrySink>,
    properties: Fields,
}

impl EnrichedSink {
    pub fn new(inner: Arc<dyn TelemetrySink>, properties: Fields) -> Self {
        Self { inner, properties }
    }

    /// Enriches with [`environment_properties`] for the given host.
    pub fn for_host(inner: Arc<dyn TelemetrySink>, host: &HostInfo) -> Self {
        Self::new(inner, environment_properties(host))
    }
}

impl TelemetrySink for EnrichedSink {
    fn emit(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let mut enriched = record.clone();
        enriched.fields.extend(&self.properties);
        self.inner.emit(&enriched)
    }
}
