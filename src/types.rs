use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Placeholder title for pages whose title property is blank.
pub const UNTITLED_FALLBACK: &str = "(Untitled)";

/// Display label for the unlabeled grouping bucket. Presentation-boundary
/// only; internal grouping uses [`GroupKey`].
pub const UNSPECIFIED_LABEL: &str = "Unspecified";

/// One task derived from a Notion database row. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// Never empty — blank source titles become [`UNTITLED_FALLBACK`].
    pub title: String,
    /// Raw priority label, pre-normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pillar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// ISO-8601 date or datetime string, start of range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    /// Deep link back to the source page, used only by presentation surfaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Grouping key for pillar/project histograms.
///
/// Kept as a variant internally so a real label that happens to be named
/// "Unspecified" can't collide with the unlabeled bucket. The derived `Ord`
/// sorts labeled keys alphabetically with `Unlabeled` last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Labeled(String),
    Unlabeled,
}

impl GroupKey {
    /// Blank or absent labels fold into the shared unlabeled bucket.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(l) if !l.is_empty() => GroupKey::Labeled(l.to_string()),
            _ => GroupKey::Unlabeled,
        }
    }

    pub fn display_label(&self) -> &str {
        match self {
            GroupKey::Labeled(l) => l,
            GroupKey::Unlabeled => UNSPECIFIED_LABEL,
        }
    }
}

impl Serialize for GroupKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_label())
    }
}

/// Metric identifiers a dial can cycle through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricId {
    Total,
    Active,
    Completed,
    Pillar,
    Project,
    Meeting,
}

impl MetricId {
    /// Canonical full set, in default cycling order.
    pub const ALL: [MetricId; 6] = [
        MetricId::Total,
        MetricId::Active,
        MetricId::Completed,
        MetricId::Pillar,
        MetricId::Project,
        MetricId::Meeting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::Total => "total",
            MetricId::Active => "active",
            MetricId::Completed => "completed",
            MetricId::Pillar => "pillar",
            MetricId::Project => "project",
            MetricId::Meeting => "meeting",
        }
    }

    /// Case-insensitive parse; unknown identifiers yield `None`.
    pub fn parse(value: &str) -> Option<MetricId> {
        match value.trim().to_lowercase().as_str() {
            "total" => Some(MetricId::Total),
            "active" => Some(MetricId::Active),
            "completed" => Some(MetricId::Completed),
            "pillar" => Some(MetricId::Pillar),
            "project" => Some(MetricId::Project),
            "meeting" => Some(MetricId::Meeting),
            _ => None,
        }
    }
}

/// One aggregation snapshot over a fetch's worth of tasks.
///
/// Invariants: `total == completed + active`; pillar and project counts each
/// sum to `active`; `active_tasks` carries the canonical ordering that
/// position-indexed surfaces rely on. `generated_at` is diagnostic only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub active_tasks: Vec<Task>,
    pub by_pillar: BTreeMap<GroupKey, usize>,
    pub by_project: BTreeMap<GroupKey, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_meeting: Option<Task>,
    pub meeting_priority: String,
    pub metrics_order: Vec<MetricId>,
    pub generated_at: String,
}

/// What subscriber surfaces receive after each aggregation pass.
///
/// `summary == None && error == None` is the "setup" state (no valid
/// configuration yet). A present `error` is the uniform "is there an error,
/// and what does it say" check — failures never cross this boundary as
/// panics or typed errors.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TaskSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SummaryUpdate {
    pub fn setup() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            summary: None,
            error: Some(message.into()),
        }
    }
}

/// Metrics order as delivered by the settings UI: either an actual list or
/// a comma-delimited string. Sanitized inside summary aggregation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MetricsOrderInput {
    List(Vec<String>),
    Csv(String),
}

impl Default for MetricsOrderInput {
    fn default() -> Self {
        MetricsOrderInput::List(Vec::new())
    }
}

/// Raw per-surface settings as the host's property inspector delivers them.
/// Every field is optional; [`PluginSettings::normalize`] applies defaults
/// and reports what's missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginSettings {
    pub token: Option<String>,
    pub database_id: Option<String>,
    pub status_property: Option<String>,
    pub done_value: Option<String>,
    pub date_property: Option<String>,
    pub priority_property: Option<String>,
    pub pillar_property: Option<String>,
    pub project_property: Option<String>,
    pub meeting_priority: Option<String>,
    pub metrics_order: MetricsOrderInput,
}

impl PluginSettings {
    /// True when nothing identifying a workspace has been entered yet —
    /// the "setup" state, distinct from a misconfigured one.
    pub fn is_blank(&self) -> bool {
        blank(&self.token) && blank(&self.database_id)
    }

    /// Apply defaults and produce the effective query configuration.
    /// Fails with a descriptive message before any network call happens.
    pub fn normalize(&self) -> Result<QueryConfig, String> {
        let token = required(&self.token, "Notion token not configured")?;
        let database_id = required(&self.database_id, "Notion database id not configured")?;

        Ok(QueryConfig {
            token,
            database_id,
            status_property: or_default(&self.status_property, "Status"),
            done_value: or_default(&self.done_value, "Done"),
            date_property: or_default(&self.date_property, "Due"),
            priority_property: or_default(&self.priority_property, "Priority"),
            pillar_property: or_default(&self.pillar_property, "Pillar"),
            project_property: or_default(&self.project_property, "Project"),
            meeting_priority: or_default(&self.meeting_priority, "Meetings"),
            metrics_order: self.metrics_order.clone(),
        })
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

fn required(value: &Option<String>, message: &str) -> Result<String, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(message.to_string()),
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// The effective query configuration — the tuple that uniquely determines
/// what a fetch returns.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub token: String,
    pub database_id: String,
    pub status_property: String,
    pub done_value: String,
    pub date_property: String,
    pub priority_property: String,
    pub pillar_property: String,
    pub project_property: String,
    pub meeting_priority: String,
    pub metrics_order: MetricsOrderInput,
}

impl QueryConfig {
    /// Cache/dedup key: a fingerprint over every field that affects what a
    /// fetch returns. Metrics order is presentation-only and excluded.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            &self.token,
            &self.database_id,
            &self.status_property,
            &self.done_value,
            &self.date_property,
            &self.priority_property,
            &self.pillar_property,
            &self.project_property,
            &self.meeting_priority,
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(&hasher.finalize()[..16])
    }
}
