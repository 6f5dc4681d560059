//! Field patterns, ordering and paging for connection queries.
//!
//! Every filter field of a connection query accepts either an exact value
//! or a `/regex/[flags]` pattern. Ordering is a comma-separated list of
//! field names with an optional `+`/`-` prefix.

use crate::connection::ConnectionRecord;
use mov_core::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;

/// An exact value or a regular expression over one filter field.
#[derive(Debug, Clone)]
pub enum FieldPattern {
    /// Match the field verbatim.
    Exact(String),
    /// Match the field against a compiled regular expression.
    Pattern(Regex),
}

impl FieldPattern {
    /// Parse a raw filter value.
    ///
    /// Values of the form `/body/flags` compile to a regular expression;
    /// supported flags are `i` (case-insensitive), `m` (multi-line) and
    /// `s` (dot matches newline). Anything else is an exact value.
    ///
    /// # Errors
    /// Returns a validation error for an invalid expression or an
    /// unsupported flag.
    pub fn parse(raw: &str) -> Result<Self> {
        let Some(stripped) = raw.strip_prefix('/') else {
            return Ok(Self::Exact(raw.to_string()));
        };
        let Some(end) = stripped.rfind('/') else {
            return Ok(Self::Exact(raw.to_string()));
        };
        let body = &stripped[..end];
        let flags = &stripped[end + 1..];

        if let Some(flag) = flags.chars().find(|flag| !matches!(flag, 'i' | 'm' | 's')) {
            return Err(Error::validation(format!(
                "unsupported flag '{flag}' in pattern '{raw}'"
            )));
        }
        let expression =
            if flags.is_empty() { body.to_string() } else { format!("(?{flags}){body}") };
        let regex = Regex::new(&expression)
            .map_err(|err| Error::validation(format!("invalid pattern '{raw}': {err}")))?;
        Ok(Self::Pattern(regex))
    }

    /// Whether the given value satisfies the pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Pattern(regex) => regex.is_match(value),
        }
    }
}

/// Sortable fields of a connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    /// Connection id.
    Id,
    /// Enabled flag (disabled sorts first ascending).
    Enabled,
    /// Creation timestamp.
    CreateTimestamp,
    /// Last update timestamp.
    UpdateTimestamp,
    /// Source component id.
    SourceComponentId,
    /// Source channel name.
    SourceChannelName,
    /// Target component id.
    TargetComponentId,
    /// Target channel name.
    TargetChannelName,
}

/// One sort key with direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    /// The field to sort by.
    pub field: OrderField,
    /// Ascending when true.
    pub ascending: bool,
}

impl OrderKey {
    fn compare(&self, a: &ConnectionRecord, b: &ConnectionRecord) -> Ordering {
        let ordering = match self.field {
            OrderField::Id => a.id.as_uuid().cmp(b.id.as_uuid()),
            OrderField::Enabled => a.enabled.cmp(&b.enabled),
            OrderField::CreateTimestamp => a.create_timestamp.cmp(&b.create_timestamp),
            OrderField::UpdateTimestamp => a.update_timestamp.cmp(&b.update_timestamp),
            OrderField::SourceComponentId => {
                a.source.component_id.as_uuid().cmp(b.source.component_id.as_uuid())
            },
            OrderField::SourceChannelName => a.source.channel_name.cmp(&b.source.channel_name),
            OrderField::TargetComponentId => {
                a.target.component_id.as_uuid().cmp(b.target.component_id.as_uuid())
            },
            OrderField::TargetChannelName => a.target.channel_name.cmp(&b.target.channel_name),
        };
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Parse a comma-separated order expression like
/// `-updateTimestamp,+sourceChannelName`.
///
/// An empty expression yields the default order (ascending creation
/// timestamp).
///
/// # Errors
/// Returns a validation error for an unknown field name.
pub fn parse_order(raw: &str) -> Result<Vec<OrderKey>> {
    if raw.trim().is_empty() {
        return Ok(vec![OrderKey { field: OrderField::CreateTimestamp, ascending: true }]);
    }

    raw.split(',')
        .map(|part| {
            let part = part.trim();
            let (ascending, name) = match part.strip_prefix('-') {
                Some(name) => (false, name),
                None => (true, part.strip_prefix('+').unwrap_or(part)),
            };
            let field = match name {
                "id" => OrderField::Id,
                "enabled" => OrderField::Enabled,
                "createTimestamp" => OrderField::CreateTimestamp,
                "updateTimestamp" => OrderField::UpdateTimestamp,
                "sourceComponentId" => OrderField::SourceComponentId,
                "sourceChannelName" => OrderField::SourceChannelName,
                "targetComponentId" => OrderField::TargetComponentId,
                "targetChannelName" => OrderField::TargetChannelName,
                _ => {
                    return Err(Error::validation(format!("unknown order field '{name}'")));
                },
            };
            Ok(OrderKey { field, ascending })
        })
        .collect()
}

/// Sort records in place by the given keys, later keys breaking ties.
pub fn sort_records(records: &mut [ConnectionRecord], keys: &[OrderKey]) {
    records.sort_by(|a, b| {
        for key in keys {
            match key.compare(a, b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    });
}
