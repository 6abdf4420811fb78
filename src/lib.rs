//! Core engine for a Stream Deck Notion task dashboard: fetches today's
//! tasks from a Notion database, reduces them to per-key display summaries,
//! and coordinates caching across every key pointed at the same database.

pub mod coordinator;
pub mod notion;
pub mod ranking;
pub mod summary;
pub mod types;

pub use coordinator::{SubscriptionToken, TaskCoordinator, TaskSource};
pub use notion::client::NotionClient;
pub use notion::NotionError;
pub use types::{
    GroupKey, MetricId, MetricsOrderInput, PluginSettings, QueryConfig, SummaryUpdate, Task,
    TaskSummary,
};
