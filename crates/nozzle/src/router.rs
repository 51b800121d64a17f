//! Event routing: allow-list filtering, ownership enrichment, and the
//! hand-off to the destination sink.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use metadata::{MetadataCache, Ownership};
use nozzle_core::{Envelope, Error, EventKind, Result, Sink};
use serde_json::json;
use telemetry::metrics;
use tracing::debug;

use crate::fields::event_fields;

/// Ownership metadata fields that can be attached to routed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipField {
    WorkloadName,
    OrgName,
    OrgId,
    SpaceName,
    SpaceId,
}

impl OwnershipField {
    fn field_name(&self) -> &'static str {
        match self {
            Self::WorkloadName => "workload_name",
            Self::OrgName => "org_name",
            Self::OrgId => "org_id",
            Self::SpaceName => "space_name",
            Self::SpaceId => "space_id",
        }
    }

    fn value<'a>(&self, ownership: &'a Ownership) -> &'a str {
        match self {
            Self::WorkloadName => &ownership.workload_name,
            Self::OrgName => &ownership.org_name,
            Self::OrgId => &ownership.org_id,
            Self::SpaceName => &ownership.space_name,
            Self::SpaceId => &ownership.space_id,
        }
    }
}

impl FromStr for OwnershipField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "WorkloadName" => Ok(Self::WorkloadName),
            "OrgName" => Ok(Self::OrgName),
            "OrgId" => Ok(Self::OrgId),
            "SpaceName" => Ok(Self::SpaceName),
            "SpaceId" => Ok(Self::SpaceId),
            other => Err(Error::config(format!("unknown ownership field: {other}"))),
        }
    }
}

/// Parses a comma-separated ownership field list. Empty input disables
/// enrichment.
pub fn parse_ownership_fields(spec: &str) -> Result<Vec<OwnershipField>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(OwnershipField::from_str)
        .collect()
}

/// Parses static extra fields shaped `name:value,name2:value2`.
pub fn parse_extra_fields(spec: &str) -> Result<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    for pair in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match pair.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                fields.insert(name.trim().to_string(), value.trim().to_string());
            }
            _ => {
                return Err(Error::config(format!(
                    "extra field must be name:value, got: {pair}"
                )))
            }
        }
    }
    Ok(fields)
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Event kinds forwarded; everything else is discarded.
    pub wanted_kinds: Vec<EventKind>,
    /// Ownership fields attached to records; empty disables enrichment.
    pub ownership_fields: Vec<OwnershipField>,
    /// Discard envelopes whose workload cannot be resolved.
    pub ignore_missing_workloads: bool,
    /// Static fields attached to every record.
    pub extra_fields: BTreeMap<String, String>,
}

/// Routing contract the dispatcher workers call.
#[async_trait]
pub trait Route: Send + Sync {
    async fn route(&self, envelope: Envelope) -> Result<()>;
}

/// Filters envelopes, enriches them with ownership metadata, and hands
/// routed records to the sink.
pub struct Router {
    wanted: HashSet<EventKind>,
    ownership_fields: Vec<OwnershipField>,
    ignore_missing_workloads: bool,
    extra_fields: BTreeMap<String, String>,
    cache: Arc<MetadataCache>,
    sink: Arc<dyn Sink>,
}

impl Router {
    pub fn new(config: RouterConfig, cache: Arc<MetadataCache>, sink: Arc<dyn Sink>) -> Self {
        Self {
            wanted: config.wanted_kinds.into_iter().collect(),
            ownership_fields: config.ownership_fields,
            ignore_missing_workloads: config.ignore_missing_workloads,
            extra_fields: config.extra_fields,
            cache,
            sink,
        }
    }
}

#[async_trait]
impl Route for Router {
    async fn route(&self, envelope: Envelope) -> Result<()> {
        if !self.wanted.contains(&envelope.kind()) {
            metrics().events_filtered.inc();
            return Ok(());
        }

        let mut ownership = None;
        if !self.ownership_fields.is_empty() {
            ownership = self.cache.resolve(&envelope.source_id).await;
            if ownership.is_none() {
                if self.ignore_missing_workloads {
                    metrics().events_unresolved_dropped.inc();
                    debug!(
                        source_id = %envelope.source_id,
                        "Discarding envelope for unresolved workload"
                    );
                    return Ok(());
                }
                // Forward anyway, just without ownership fields.
            }
        }

        let (mut fields, message) = event_fields(&envelope);
        if let Some(ownership) = &ownership {
            for field in &self.ownership_fields {
                fields.insert(field.field_name().into(), json!(field.value(ownership)));
            }
        }
        for (name, value) in &self.extra_fields {
            fields.insert(name.clone(), json!(value));
        }

        self.sink.write(fields, &message).await?;
        metrics().events_routed.inc();
        Ok(())
    }
}
