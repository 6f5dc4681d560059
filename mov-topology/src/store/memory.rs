//! In-memory connection store backend.
//!
//! Used by the test suites and embedded deployments. A single
//! `parking_lot` write lock per operation gives the atomic
//! single-document update semantics the port requires; the lock is never
//! held across an await point.

use crate::{
    connection::{ConnectionRecord, Notification, TopologyAction},
    query::{sort_records, OrderKey},
    store::{ConnectionFilter, ConnectionPage, ConnectionStore},
};
use async_trait::async_trait;
use chrono::Utc;
use mov_core::{ChannelName, ComponentId, ConnectionId, Error, Node, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory connection store.
#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    records: RwLock<HashMap<ConnectionId, ConnectionRecord>>,
}

impl MemoryConnectionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, deleted included. Test inspection only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn create(&self, source: Node, target: Node, enabled: bool) -> Result<ConnectionRecord> {
        let mut records = self.records.write();
        let duplicate = records
            .values()
            .any(|record| !record.is_deleted() && record.source == source && record.target == target);
        if duplicate {
            return Err(Error::validation(format!(
                "a connection from {source} to {target} already exists"
            )));
        }
        let record = ConnectionRecord::new(source, target, enabled);
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: ConnectionId) -> Result<Option<ConnectionRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn find_live_pair(
        &self,
        source: &Node,
        target: &Node,
    ) -> Result<Option<ConnectionRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|record| {
                !record.is_deleted() && &record.source == source && &record.target == target
            })
            .cloned())
    }

    async fn transition(
        &self,
        id: ConnectionId,
        action: TopologyAction,
    ) -> Result<ConnectionRecord> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::validation(format!("connection {id} does not exist")))?;
        if record.is_deleted() {
            return Err(Error::validation(format!("connection {id} is deleted")));
        }

        let now = Utc::now();
        match action {
            TopologyAction::Enable => {
                if record.enabled {
                    return Err(Error::validation(format!("connection {id} is already enabled")));
                }
                record.enabled = true;
            },
            TopologyAction::Disable => {
                if !record.enabled {
                    return Err(Error::validation(format!("connection {id} is already disabled")));
                }
                record.enabled = false;
            },
            TopologyAction::Remove => {
                record.enabled = false;
                record.deleted_timestamp = Some(now);
            },
        }
        record.update_timestamp = now;
        Ok(record.clone())
    }

    async fn upsert_notification(
        &self,
        id: ConnectionId,
        notification: Notification,
    ) -> Result<ConnectionRecord> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::validation(format!("connection {id} does not exist")))?;
        if record.is_deleted() {
            return Err(Error::validation(format!("connection {id} is deleted")));
        }

        match record
            .notifications
            .iter_mut()
            .find(|existing| existing.node == notification.node)
        {
            Some(existing) => *existing = notification,
            None => record.notifications.push(notification),
        }
        record.update_timestamp = Utc::now();
        Ok(record.clone())
    }

    async fn change_notification(
        &self,
        id: ConnectionId,
        node: &Node,
        action: TopologyAction,
    ) -> Result<ConnectionRecord> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::validation(format!("connection {id} does not exist")))?;
        if record.is_deleted() {
            return Err(Error::validation(format!("connection {id} is deleted")));
        }

        let position = record
            .notifications
            .iter()
            .position(|notification| &notification.node == node)
            .ok_or_else(|| {
                Error::validation(format!("notification target {node} not found on {id}"))
            })?;
        match action {
            TopologyAction::Enable => record.notifications[position].enabled = true,
            TopologyAction::Disable => record.notifications[position].enabled = false,
            TopologyAction::Remove => {
                record.notifications.remove(position);
            },
        }
        record.update_timestamp = Utc::now();
        Ok(record.clone())
    }

    async fn query(
        &self,
        filter: &ConnectionFilter,
        order: &[OrderKey],
        offset: usize,
        limit: usize,
    ) -> Result<ConnectionPage> {
        let mut matching: Vec<ConnectionRecord> = self
            .records
            .read()
            .values()
            .filter(|record| !record.is_deleted() && filter.matches(record))
            .cloned()
            .collect();
        sort_records(&mut matching, order);

        let total = matching.len() as u64;
        let connections = matching.into_iter().skip(offset).take(limit).collect();
        Ok(ConnectionPage { total, connections })
    }

    async fn list_referencing(&self, component_id: ComponentId) -> Result<Vec<ConnectionRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| !record.is_deleted() && record.references_component(component_id))
            .cloned()
            .collect())
    }

    async fn list_enabled(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| !record.is_deleted() && record.enabled)
            .cloned()
            .collect())
    }

    async fn list_enabled_by_source(
        &self,
        channel: &ChannelName,
    ) -> Result<Vec<ConnectionRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| {
                !record.is_deleted() && record.enabled && &record.source.channel_name == channel
            })
            .cloned()
            .collect())
    }
}
