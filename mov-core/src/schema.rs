//! Payload schema model and the structural compatibility matcher.
//!
//! Every channel declares the shape of the payloads it publishes or
//! subscribes to as a [`PayloadSchema`] tree. The matcher decides whether
//! a publisher's declared shape is compatible with a subscriber's; it is
//! used both to gate manual connection creation and to drive automatic
//! wiring when components register.
//!
//! `REF` nodes are back-references to previously-seen nodes within the
//! same document. They are resolved to concrete nodes during import,
//! before schemas reach the matcher, so [`PayloadSchema::matches`]
//! compares them by identifier only and never dereferences.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Primitive payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BasicFormat {
    /// Whole number.
    Integer,
    /// Floating point number.
    Number,
    /// Boolean value.
    Boolean,
    /// UTF-8 string.
    String,
}

/// The declared shape of a channel payload.
///
/// Serialized as a tagged union with an explicit `type` discriminator,
/// matching the wire form produced by the AsyncAPI importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PayloadSchema {
    /// A primitive value.
    #[serde(rename = "BASIC")]
    Basic {
        /// The primitive format.
        format: BasicFormat,
    },

    /// A closed set of string values.
    #[serde(rename = "ENUM")]
    Enum {
        /// The allowed values.
        values: BTreeSet<String>,
    },

    /// An object with named properties.
    #[serde(rename = "OBJECT")]
    Object {
        /// Property name to schema of its value.
        properties: BTreeMap<String, PayloadSchema>,
    },

    /// A homogeneous array.
    #[serde(rename = "ARRAY")]
    Array {
        /// Schema of every element.
        items: Box<PayloadSchema>,
    },

    /// A constant string value, possibly null.
    #[serde(rename = "CONST")]
    Const {
        /// The constant value.
        value: Option<String>,
    },

    /// Back-reference to a previously-seen schema node in the same
    /// document. Never independently owned.
    #[serde(rename = "REF")]
    Ref {
        /// Identifier of the referenced node.
        identifier: u64,
    },

    /// Conjunction of sub-schemas.
    #[serde(rename = "ALL_OF")]
    AllOf {
        /// The composed sub-schemas.
        items: Vec<PayloadSchema>,
    },

    /// Non-exclusive disjunction of sub-schemas.
    #[serde(rename = "ANY_OF")]
    AnyOf {
        /// The composed sub-schemas.
        items: Vec<PayloadSchema>,
    },

    /// Exclusive disjunction of sub-schemas.
    #[serde(rename = "ONE_OF")]
    OneOf {
        /// The composed sub-schemas.
        items: Vec<PayloadSchema>,
    },
}

impl PayloadSchema {
    /// Shorthand for a primitive schema.
    #[must_use]
    pub const fn basic(format: BasicFormat) -> Self {
        Self::Basic { format }
    }

    /// Shorthand for an object schema.
    #[must_use]
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, PayloadSchema)>,
        K: Into<String>,
    {
        Self::Object {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// The combinator item list, if this schema is a combinator.
    fn combinator_items(&self) -> Option<&[PayloadSchema]> {
        match self {
            Self::AllOf { items } | Self::AnyOf { items } | Self::OneOf { items } => Some(items),
            _ => None,
        }
    }

    /// Whether two combinator schemas are of the same kind.
    fn same_combinator_kind(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::AllOf { .. }, Self::AllOf { .. })
                | (Self::AnyOf { .. }, Self::AnyOf { .. })
                | (Self::OneOf { .. }, Self::OneOf { .. })
        )
    }

    /// Decide whether this schema is structurally compatible with `other`.
    ///
    /// Pure and deterministic, no I/O. Compatibility by variant pair:
    ///
    /// - `CONST`: equal iff both values are null or both are string-equal.
    /// - `REF`: equal iff the identifiers are equal (refs are resolved
    ///   upstream; no dereferencing happens here).
    /// - `BASIC`: equal iff the formats are equal.
    /// - `ENUM`: equal iff the value sets are equal.
    /// - `ARRAY`: element schemas must match recursively.
    /// - `OBJECT`: property-name sets must be identical (not a subset)
    ///   and every property schema must match recursively; order is
    ///   irrelevant.
    /// - Combinators of the same kind: singleton lists degrade to a plain
    ///   recursive check; otherwise a first-fit multiset match is run, and
    ///   compatibility is declared when either item list is fully
    ///   consumed. One-sided exhaustion is intentional: a superset
    ///   combinator satisfies a subset.
    /// - Any other pairing is not a match.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Const { value: a }, Self::Const { value: b }) => a == b,
            (Self::Ref { identifier: a }, Self::Ref { identifier: b }) => a == b,
            (Self::Basic { format: a }, Self::Basic { format: b }) => a == b,
            (Self::Enum { values: a }, Self::Enum { values: b }) => a == b,
            (Self::Array { items: a }, Self::Array { items: b }) => a.matches(b),
            (Self::Object { properties: a }, Self::Object { properties: b }) => {
                a.len() == b.len()
                    && a.iter().all(|(name, schema)| {
                        b.get(name).is_some_and(|other| schema.matches(other))
                    })
            },
            _ if self.same_combinator_kind(other) => {
                // Guarded by same_combinator_kind, both sides are combinators.
                let (Some(a), Some(b)) = (self.combinator_items(), other.combinator_items())
                else {
                    return false;
                };
                combinator_match(a, b)
            },
            _ => false,
        }
    }
}

/// First-fit multiset match over two combinator item lists.
///
/// Singleton lists on both sides degrade to a plain recursive check. The
/// general case repeatedly pairs an unconsumed left item with the first
/// unconsumed right item it matches; success is one-sided exhaustion of
/// either list once no more pairs can be removed.
fn combinator_match(left: &[PayloadSchema], right: &[PayloadSchema]) -> bool {
    if left.len() == 1 && right.len() == 1 {
        return left[0].matches(&right[0]);
    }

    let mut left_consumed = vec![false; left.len()];
    let mut right_consumed = vec![false; right.len()];
    for (i, candidate) in left.iter().enumerate() {
        for (j, item) in right.iter().enumerate() {
            if !right_consumed[j] && candidate.matches(item) {
                left_consumed[i] = true;
                right_consumed[j] = true;
                break;
            }
        }
    }

    left_consumed.iter().all(|consumed| *consumed)
        || right_consumed.iter().all(|consumed| *consumed)
}
