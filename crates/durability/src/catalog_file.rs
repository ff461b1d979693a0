//! The catalog-object file of a checkpoint
//!
//! Carries just enough to recreate storage objects: databases, their
//! tables with schema and physical options, and index definitions.
//!
//! ```text
//! i64 databaseCount
//! per database: u32 oid, string name, i64 tableCount
//! per table:    u32 oid, string name, u32 tuplesPerTileGroup,
//!               u8 layoutType, schema, i64 indexCount
//! per index:    u32 oid, string name, u8 indexType, u8 constraintType,
//!               bool unique, i64 keyCount, keyCount x u32 column
//! ```

use crate::error::{CheckpointError, RecoveryError};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tilestore_catalog::{DatabaseDescriptor, TableDescriptor};
use tilestore_core::{Error, Result, Schema, SerializeInput, SerializeOutput};
use tilestore_storage::tile_group::MAX_TILE_GROUP_CAPACITY;
use tilestore_storage::{IndexConstraintType, IndexMetadata, IndexType, LayoutType};

/// Encode `databases` in catalog-file layout
pub fn encode_catalog(databases: &[DatabaseDescriptor]) -> Vec<u8> {
    let mut out = SerializeOutput::new();
    out.write_count(databases.len());
    for database in databases {
        out.write_u32(database.oid);
        out.write_string(&database.name);
        out.write_count(database.tables.len());
        for table in &database.tables {
            encode_table(table, &mut out);
        }
    }
    out.into_inner()
}

fn encode_table(table: &TableDescriptor, out: &mut SerializeOutput) {
    out.write_u32(table.oid);
    out.write_string(&table.name);
    out.write_u32(table.tuples_per_tile_group);
    out.write_byte(table.layout_type as u8);
    table.schema.serialize_to(out);
    out.write_count(table.indexes.len());
    for index in &table.indexes {
        out.write_u32(index.oid);
        out.write_string(&index.name);
        out.write_byte(index.index_type as u8);
        out.write_byte(index.constraint_type as u8);
        out.write_bool(index.unique);
        out.write_count(index.key_attrs.len());
        for attr in &index.key_attrs {
            out.write_u32(*attr);
        }
    }
}

/// Decode a whole catalog file. Trailing bytes are rejected.
pub fn decode_catalog(bytes: &[u8]) -> Result<Vec<DatabaseDescriptor>> {
    let mut input = SerializeInput::new(bytes);
    let database_count = input.read_count()?;
    let mut databases = Vec::new();
    for _ in 0..database_count {
        let oid = input.read_u32()?;
        let name = input.read_string()?;
        let table_count = input.read_count()?;
        let mut tables = Vec::new();
        for _ in 0..table_count {
            tables.push(decode_table(&mut input)?);
        }
        databases.push(DatabaseDescriptor { oid, name, tables });
    }
    if !input.is_exhausted() {
        return Err(Error::format(format!(
            "{} trailing bytes after the last database",
            input.remaining()
        )));
    }
    Ok(databases)
}

fn decode_table(input: &mut SerializeInput<'_>) -> Result<TableDescriptor> {
    let oid = input.read_u32()?;
    let name = input.read_string()?;
    let tuples_per_tile_group = input.read_u32()?;
    if tuples_per_tile_group == 0 || tuples_per_tile_group > MAX_TILE_GROUP_CAPACITY {
        return Err(Error::format(format!(
            "table {} has invalid tile group size {}",
            name, tuples_per_tile_group
        )));
    }
    let layout_type = LayoutType::from_tag(input.read_byte()?)?;
    let schema = Schema::deserialize_from(input)?;

    let index_count = input.read_count()?;
    let mut indexes = Vec::new();
    for _ in 0..index_count {
        let index_oid = input.read_u32()?;
        let index_name = input.read_string()?;
        let index_type = IndexType::from_tag(input.read_byte()?)?;
        let constraint_type = IndexConstraintType::from_tag(input.read_byte()?)?;
        let unique = input.read_bool()?;
        let key_count = input.read_count()?;
        let mut key_attrs = Vec::new();
        for _ in 0..key_count {
            let attr = input.read_u32()?;
            if attr as usize >= schema.column_count() {
                return Err(Error::format(format!(
                    "index {} keys column {} of a {}-column table",
                    index_name,
                    attr,
                    schema.column_count()
                )));
            }
            key_attrs.push(attr);
        }
        indexes.push(IndexMetadata {
            oid: index_oid,
            name: index_name,
            index_type,
            constraint_type,
            unique,
            key_attrs,
        });
    }

    Ok(TableDescriptor {
        oid,
        name,
        schema,
        tuples_per_tile_group,
        layout_type,
        indexes,
    })
}

/// Write the catalog file to `path` and sync it
pub fn write_catalog(databases: &[DatabaseDescriptor], path: &Path) -> std::result::Result<(), CheckpointError> {
    let bytes = encode_catalog(databases);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| CheckpointError::io(path, e))?;
    file.write_all(&bytes)
        .map_err(|e| CheckpointError::io(path, e))?;
    file.sync_all().map_err(|e| CheckpointError::io(path, e))?;
    Ok(())
}

/// Read and decode the catalog file at `path`
pub fn read_catalog(path: &Path) -> std::result::Result<Vec<DatabaseDescriptor>, RecoveryError> {
    let bytes = fs::read(path).map_err(|e| RecoveryError::io(path, e))?;
    decode_catalog(&bytes).map_err(|e| RecoveryError::format(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;
    use tilestore_core::{
        Column, ColumnConstraint, CompareOp, MultiConstraint, MultiConstraintKind, TypeId, Value,
    };

    fn sample() -> Vec<DatabaseDescriptor> {
        let schema = Schema::new(vec![
            Column::new("id", TypeId::BigInt).primary(),
            Column::varlen("email", TypeId::Varchar, 64).unique(),
            Column::new("age", TypeId::SmallInt).with_constraint(ColumnConstraint::Check {
                op: CompareOp::GreaterThanOrEqual,
                value: Value::SmallInt(0),
            }),
        ])
        .with_multi_constraint(MultiConstraint::new(
            MultiConstraintKind::Unique,
            "email_age",
            vec![1, 2],
        ));
        vec![
            DatabaseDescriptor {
                oid: 10,
                name: "shop".to_string(),
                tables: vec![TableDescriptor {
                    oid: 11,
                    name: "users".to_string(),
                    schema,
                    tuples_per_tile_group: 64,
                    layout_type: LayoutType::Hybrid,
                    indexes: vec![
                        IndexMetadata {
                            oid: 12,
                            name: "users_pkey".to_string(),
                            index_type: IndexType::BwTree,
                            constraint_type: IndexConstraintType::PrimaryKey,
                            unique: true,
                            key_attrs: vec![0],
                        },
                        IndexMetadata {
                            oid: 13,
                            name: "email_age".to_string(),
                            index_type: IndexType::Hash,
                            constraint_type: IndexConstraintType::Unique,
                            unique: true,
                            key_attrs: vec![1, 2],
                        },
                    ],
                }],
            },
            DatabaseDescriptor {
                oid: 20,
                name: "empty".to_string(),
                tables: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_catalog_round_trip() {
        let databases = sample();
        assert_eq!(decode_catalog(&encode_catalog(&databases)).unwrap(), databases);
    }

    #[test]
    fn test_empty_catalog() {
        let bytes = encode_catalog(&[]);
        assert_eq!(bytes.len(), 8);
        assert!(decode_catalog(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_every_truncation_is_a_format_error() {
        let bytes = encode_catalog(&sample());
        for len in 0..bytes.len() {
            let err = decode_catalog(&bytes[..len]).unwrap_err();
            assert!(err.is_format(), "prefix of {} bytes: {}", len, err);
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_catalog(&sample());
        bytes.extend_from_slice(&[0, 0]);
        assert!(decode_catalog(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_key_attr_out_of_range_rejected() {
        let mut databases = sample();
        databases[0].tables[0].indexes[0].key_attrs = vec![7];
        assert!(decode_catalog(&encode_catalog(&databases)).unwrap_err().is_format());
    }

    #[test]
    fn test_zero_tile_group_size_rejected() {
        let mut databases = sample();
        databases[0].tables[0].tuples_per_tile_group = 0;
        assert!(decode_catalog(&encode_catalog(&databases)).unwrap_err().is_format());
    }

    #[test]
    fn test_file_round_trip_and_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.cpp");
        write_catalog(&sample(), &path).unwrap();
        assert_eq!(read_catalog(&path).unwrap(), sample());

        let missing = read_catalog(&dir.path().join("absent.cpp")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Io);

        fs::write(&path, [1u8, 0, 0]).unwrap();
        assert_eq!(read_catalog(&path).unwrap_err().kind(), ErrorKind::Format);
    }
}
