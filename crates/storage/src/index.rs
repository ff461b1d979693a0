//! Secondary indexes over table tuples
//!
//! An index maps the wire encoding of its key columns to the locations of
//! the versions carrying that key. Entries are never removed when a version
//! is deleted; readers and uniqueness checks filter dead slots through the
//! tile-group headers instead.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use tilestore_core::{Error, ItemPointer, Oid, Result, SerializeOutput, Value};

/// Index structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IndexType {
    /// Ordered tree
    BwTree = 1,
    /// Hash table
    Hash = 2,
    /// Skip list
    SkipList = 3,
}

impl IndexType {
    /// Decode an index type tag
    pub fn from_tag(tag: u8) -> Result<IndexType> {
        match tag {
            1 => Ok(IndexType::BwTree),
            2 => Ok(IndexType::Hash),
            3 => Ok(IndexType::SkipList),
            other => Err(Error::format(format!("unknown index type {}", other))),
        }
    }
}

/// Constraint an index enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IndexConstraintType {
    /// Plain lookup index
    Default = 1,
    /// Backs a primary key
    PrimaryKey = 2,
    /// Backs a unique constraint
    Unique = 3,
}

impl IndexConstraintType {
    /// Decode a constraint type tag
    pub fn from_tag(tag: u8) -> Result<IndexConstraintType> {
        match tag {
            1 => Ok(IndexConstraintType::Default),
            2 => Ok(IndexConstraintType::PrimaryKey),
            3 => Ok(IndexConstraintType::Unique),
            other => Err(Error::format(format!("unknown index constraint {}", other))),
        }
    }
}

/// Definition of an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Index oid
    pub oid: Oid,
    /// Index name
    pub name: String,
    /// Structure
    pub index_type: IndexType,
    /// Enforced constraint
    pub constraint_type: IndexConstraintType,
    /// Whether keys must be unique among live versions
    pub unique: bool,
    /// Key columns, as offsets into the table schema
    pub key_attrs: Vec<Oid>,
}

/// Ordered key → locations map
#[derive(Debug)]
pub struct Index {
    metadata: IndexMetadata,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<ItemPointer>>>,
}

impl Index {
    /// Create an empty index
    pub fn new(metadata: IndexMetadata) -> Self {
        Index {
            metadata,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Index definition
    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Index oid
    pub fn oid(&self) -> Oid {
        self.metadata.oid
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether keys are unique
    pub fn is_unique(&self) -> bool {
        self.metadata.unique
    }

    /// Project the key columns out of a full tuple and encode them.
    /// Returns `None` if any key column is NULL; such keys never conflict.
    pub fn key_of(&self, tuple: &[Value]) -> Result<Option<Vec<u8>>> {
        let mut out = SerializeOutput::new();
        for attr in &self.metadata.key_attrs {
            let value = tuple.get(*attr as usize).ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "index {} key column {} out of range",
                    self.metadata.name, attr
                ))
            })?;
            if value.is_null() {
                return Ok(None);
            }
            value.serialize_to(&mut out);
        }
        Ok(Some(out.into_inner()))
    }

    /// Encode key values given directly, in key order
    pub fn encode_key(key: &[Value]) -> Vec<u8> {
        let mut out = SerializeOutput::new();
        for value in key {
            value.serialize_to(&mut out);
        }
        out.into_inner()
    }

    /// Add an entry
    pub fn insert_entry(&self, key: Vec<u8>, location: ItemPointer) {
        self.entries.write().entry(key).or_default().push(location);
    }

    /// Locations recorded for an encoded key
    pub fn scan_key(&self, key: &[u8]) -> Vec<ItemPointer> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    /// Locations recorded for key values
    pub fn lookup(&self, key: &[Value]) -> Vec<ItemPointer> {
        self.scan_key(&Index::encode_key(key))
    }

    /// Total number of entries
    pub fn entry_count(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
