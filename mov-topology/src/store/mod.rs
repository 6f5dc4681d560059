//! Connection store port.
//!
//! The store persists connection documents and owns every state
//! transition, expressed as atomic single-document operations so that
//! concurrent transitions on the same connection are serialized by the
//! persisted state. Soft-deleted records are excluded from every
//! operation except direct lookup by id.

mod memory;

pub use memory::MemoryConnectionStore;

use crate::{
    connection::{ConnectionRecord, Notification, TopologyAction},
    query::{FieldPattern, OrderKey},
};
use async_trait::async_trait;
use mov_core::{ChannelName, ComponentId, ConnectionId, Node, Result};

/// Filter over live connection records. Absent fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFilter {
    /// Filter on the source component id.
    pub source_component_id: Option<FieldPattern>,
    /// Filter on the source channel name.
    pub source_channel_name: Option<FieldPattern>,
    /// Filter on the target component id.
    pub target_component_id: Option<FieldPattern>,
    /// Filter on the target channel name.
    pub target_channel_name: Option<FieldPattern>,
}

impl ConnectionFilter {
    /// Whether a record satisfies every present field.
    #[must_use]
    pub fn matches(&self, record: &ConnectionRecord) -> bool {
        let field = |pattern: &Option<FieldPattern>, value: &str| {
            pattern.as_ref().map_or(true, |pattern| pattern.matches(value))
        };
        field(&self.source_component_id, &record.source.component_id.to_string())
            && field(&self.source_channel_name, record.source.channel_name.as_str())
            && field(&self.target_component_id, &record.target.component_id.to_string())
            && field(&self.target_channel_name, record.target.channel_name.as_str())
    }
}

/// One page of a connection query.
#[derive(Debug, Clone)]
pub struct ConnectionPage {
    /// Total records matching the filter, before paging.
    pub total: u64,
    /// The records of this page, in query order.
    pub connections: Vec<ConnectionRecord>,
}

/// Port onto the connection document store.
///
/// Implementations must provide atomic single-document updates; no
/// operation ever spans two documents.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Create a connection, enforcing `(source, target)` uniqueness among
    /// live records. Implemented as an upsert keyed by
    /// `(source, target, not-deleted)` so a retried create cannot produce
    /// a duplicate document.
    ///
    /// # Errors
    /// Returns a validation error if a live connection with the same pair
    /// already exists; the store is left unchanged.
    async fn create(&self, source: Node, target: Node, enabled: bool) -> Result<ConnectionRecord>;

    /// Fetch a record by id, deleted or not.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    async fn get(&self, id: ConnectionId) -> Result<Option<ConnectionRecord>>;

    /// Find the live record with the given endpoint pair, if any.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    async fn find_live_pair(&self, source: &Node, target: &Node)
        -> Result<Option<ConnectionRecord>>;

    /// Apply a lifecycle action as a conditional update: the action only
    /// succeeds if the current persisted state admits it.
    ///
    /// # Errors
    /// Returns a validation error if the connection does not exist, is
    /// already deleted, `Enable` targets an enabled connection, or
    /// `Disable` targets a disabled one. `Remove` succeeds regardless of
    /// the enabled flag.
    async fn transition(&self, id: ConnectionId, action: TopologyAction)
        -> Result<ConnectionRecord>;

    /// Insert or replace a notification, keyed by its node. `enabled` and
    /// `converter_code` are always taken from the new value.
    ///
    /// # Errors
    /// Returns a validation error if the connection does not exist or is
    /// deleted.
    async fn upsert_notification(
        &self,
        id: ConnectionId,
        notification: Notification,
    ) -> Result<ConnectionRecord>;

    /// Enable, disable or remove the notification with the given node key.
    ///
    /// # Errors
    /// Returns a validation error if the connection does not exist, is
    /// deleted, or no notification carries the node key ("target not
    /// found" — the caller expected the change to mean something).
    async fn change_notification(
        &self,
        id: ConnectionId,
        node: &Node,
        action: TopologyAction,
    ) -> Result<ConnectionRecord>;

    /// Query live records with filtering, ordering and paging.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    async fn query(
        &self,
        filter: &ConnectionFilter,
        order: &[OrderKey],
        offset: usize,
        limit: usize,
    ) -> Result<ConnectionPage>;

    /// All live records whose primary endpoints or notifications
    /// reference the given component.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    async fn list_referencing(&self, component_id: ComponentId) -> Result<Vec<ConnectionRecord>>;

    /// All live, enabled records.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    async fn list_enabled(&self) -> Result<Vec<ConnectionRecord>>;

    /// All live, enabled records whose source channel is `channel`. The
    /// forward loop consults this per message so several connections can
    /// share one routed source.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    async fn list_enabled_by_source(&self, channel: &ChannelName)
        -> Result<Vec<ConnectionRecord>>;
}
