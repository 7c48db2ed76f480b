// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Session record encoding.
//!
//! Converts a [`SessionRecord`] to and from the [`FieldMap`] stored at its
//! cache path. The metadata block is written only when it is dirty, so a
//! touch that only bumps the version and timestamp stays small.
//!
//! # Field Layout
//!
//! | Field | Written when | Content |
//! |-------|--------------|---------|
//! | `version` | always | unsigned integer |
//! | `timestamp` | present | last access, epoch millis |
//! | `metadata` | dirty + present | tagged metadata object |
//! | `protocol_metadata` | dirty + present | protocol sub-fields of the metadata |
//! | `attributes` | present | all attributes (`session`), empty object (`attribute`) |
//! | `attr:<name>` | present, `attribute` granularity | one attribute |
//!
//! Under `attribute` granularity the empty `attributes` object only marks the
//! set as present, so an empty set decodes the same in both layouts.
//!
//! The protocol sub-fields live in their own field so peers that only care
//! about the generic metadata never have to parse them; decode merges them
//! back into [`SessionMetadata::protocol`].

use crate::config::ReplicationGranularity;
use crate::error::{ReplicationError, Result};
use crate::keys::EntityKind;
use crate::tree_cache::FieldMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const VERSION_KEY: &str = "version";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const METADATA_KEY: &str = "metadata";
pub const PROTOCOL_METADATA_KEY: &str = "protocol_metadata";
pub const ATTRIBUTES_KEY: &str = "attributes";
pub const ATTRIBUTE_PREFIX: &str = "attr:";

/// Free-form session attributes.
pub type Attributes = BTreeMap<String, Value>;

/// Protocol-specific metadata sub-fields.
pub type ProtocolMetadata = BTreeMap<String, Value>;

/// Generic session metadata shared by both entity kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFields {
    pub id: String,
    pub creation_time: i64,
    pub max_inactive_interval_secs: i64,
    #[serde(default)]
    pub new: bool,
    #[serde(default = "default_true")]
    pub valid: bool,
    /// Stored under `protocol_metadata`, not inside the metadata object.
    #[serde(skip)]
    pub protocol: ProtocolMetadata,
}

fn default_true() -> bool {
    true
}

impl MetadataFields {
    pub fn new(id: impl Into<String>, creation_time: i64) -> Self {
        Self {
            id: id.into(),
            creation_time,
            max_inactive_interval_secs: 0,
            new: true,
            valid: true,
            protocol: ProtocolMetadata::new(),
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolMetadata) -> Self {
        self.protocol = protocol;
        self
    }
}

/// Metadata tagged with the entity kind it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionMetadata {
    ApplicationSession(MetadataFields),
    Session(MetadataFields),
}

impl SessionMetadata {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::ApplicationSession(_) => EntityKind::ApplicationSession,
            Self::Session(_) => EntityKind::Session,
        }
    }

    pub fn fields(&self) -> &MetadataFields {
        match self {
            Self::ApplicationSession(fields) | Self::Session(fields) => fields,
        }
    }

    pub fn fields_mut(&mut self) -> &mut MetadataFields {
        match self {
            Self::ApplicationSession(fields) | Self::Session(fields) => fields,
        }
    }

    /// Protocol-specific sub-fields.
    pub fn protocol(&self) -> &ProtocolMetadata {
        &self.fields().protocol
    }
}

/// Replicated state of one application or protocol session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionRecord {
    /// Monotonically increasing per writer.
    pub version: u64,
    pub metadata: Option<SessionMetadata>,
    /// Set when `metadata` changed since it was last stored.
    pub metadata_dirty: bool,
    /// Last access, epoch millis.
    pub timestamp: Option<i64>,
    pub attributes: Option<Attributes>,
}

impl SessionRecord {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// Attach metadata and mark it dirty.
    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = Some(metadata);
        self.metadata_dirty = true;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// A field mapping that is not a valid record of the expected kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CorruptRecord(pub String);

/// Encode a record into the fields to write at its path.
pub fn encode(record: &SessionRecord, granularity: ReplicationGranularity) -> Result<FieldMap> {
    let mut fields = FieldMap::new();
    fields.insert(VERSION_KEY.to_string(), Value::from(record.version));

    if record.metadata_dirty {
        if let Some(metadata) = &record.metadata {
            let encoded = serde_json::to_value(metadata)
                .map_err(|e| ReplicationError::Encode(e.to_string()))?;
            fields.insert(METADATA_KEY.to_string(), encoded);
            let protocol = metadata
                .protocol()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<serde_json::Map<_, _>>();
            fields.insert(PROTOCOL_METADATA_KEY.to_string(), Value::Object(protocol));
        }
    }

    if let Some(timestamp) = record.timestamp {
        fields.insert(TIMESTAMP_KEY.to_string(), Value::from(timestamp));
    }

    if let Some(attributes) = &record.attributes {
        match granularity {
            ReplicationGranularity::Session => {
                let all = attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<serde_json::Map<_, _>>();
                fields.insert(ATTRIBUTES_KEY.to_string(), Value::Object(all));
            }
            ReplicationGranularity::Attribute => {
                // Empty blob marks the set as present, even with no attributes
                fields.insert(ATTRIBUTES_KEY.to_string(), Value::Object(serde_json::Map::new()));
                for (name, value) in attributes {
                    fields.insert(format!("{}{}", ATTRIBUTE_PREFIX, name), value.clone());
                }
            }
        }
    }

    Ok(fields)
}

/// Per-attribute fields in `existing` that storing `record` would leave
/// behind.
///
/// Writes merge fields, so an `attr:<name>` field whose attribute is no
/// longer in the record has to be removed explicitly. Under `session`
/// granularity every `attr:` field is stale. A record without an attribute
/// set leaves the stored one alone.
pub fn stale_attribute_fields(
    existing: &FieldMap,
    record: &SessionRecord,
    granularity: ReplicationGranularity,
) -> Vec<String> {
    let Some(attributes) = &record.attributes else {
        return Vec::new();
    };
    existing
        .keys()
        .filter(|key| match key.strip_prefix(ATTRIBUTE_PREFIX) {
            Some(name) => {
                granularity == ReplicationGranularity::Session || !attributes.contains_key(name)
            }
            None => false,
        })
        .cloned()
        .collect()
}

/// Decode the fields read from a path.
///
/// With `include_attributes = false` the attribute set is left out entirely,
/// whichever layout it was stored in.
pub fn decode(
    fields: &FieldMap,
    kind: EntityKind,
    include_attributes: bool,
) -> std::result::Result<SessionRecord, CorruptRecord> {
    let version = match fields.get(VERSION_KEY) {
        Some(value) => value
            .as_u64()
            .ok_or_else(|| CorruptRecord(format!("version is not an unsigned integer: {}", value)))?,
        None => return Err(CorruptRecord("missing version".to_string())),
    };

    let timestamp = match fields.get(TIMESTAMP_KEY) {
        Some(value) => Some(
            value
                .as_i64()
                .ok_or_else(|| CorruptRecord(format!("timestamp is not an integer: {}", value)))?,
        ),
        None => None,
    };

    let metadata = match fields.get(METADATA_KEY) {
        Some(value) => Some(decode_metadata(value, fields.get(PROTOCOL_METADATA_KEY), kind)?),
        None => None,
    };

    let attributes = if include_attributes {
        decode_attributes(fields)?
    } else {
        None
    };

    Ok(SessionRecord {
        version,
        metadata,
        metadata_dirty: false,
        timestamp,
        attributes,
    })
}

fn decode_metadata(
    value: &Value,
    protocol: Option<&Value>,
    kind: EntityKind,
) -> std::result::Result<SessionMetadata, CorruptRecord> {
    if !value.is_object() {
        return Err(CorruptRecord("metadata is not an object".to_string()));
    }
    let mut metadata: SessionMetadata = serde_json::from_value(value.clone())
        .map_err(|e| CorruptRecord(format!("unreadable metadata: {}", e)))?;
    if metadata.kind() != kind {
        return Err(CorruptRecord(format!(
            "expected {} metadata, found {}",
            kind,
            metadata.kind()
        )));
    }

    match protocol {
        Some(Value::Object(map)) => {
            metadata.fields_mut().protocol = map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        Some(_) => return Err(CorruptRecord("protocol metadata is not an object".to_string())),
        None => {}
    }
    Ok(metadata)
}

fn decode_attributes(fields: &FieldMap) -> std::result::Result<Option<Attributes>, CorruptRecord> {
    let mut found = false;
    let mut attributes = Attributes::new();

    if let Some(value) = fields.get(ATTRIBUTES_KEY) {
        let map = value
            .as_object()
            .ok_or_else(|| CorruptRecord("attributes is not an object".to_string()))?;
        found = true;
        attributes.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    for (key, value) in fields {
        if let Some(name) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            found = true;
            attributes.insert(name.to_string(), value.clone());
        }
    }

    Ok(found.then_some(attributes))
}
