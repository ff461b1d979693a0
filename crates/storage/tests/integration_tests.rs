//! Integration tests for the storage layer
//!
//! These tests exercise the storage objects together:
//! - StorageManager ownership of databases and tile groups
//! - Tables spilling across tile groups under concurrent inserts
//! - Tile-group id preservation and allocator bumps

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use tilestore_core::{Column, ItemPointer, Schema, TypeId, Value};
use tilestore_storage::{
    DataTable, Database, Layout, LayoutType, StorageManager, TileGroup,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn schema() -> Schema {
    Schema::new(vec![
        Column::new("k", TypeId::BigInt),
        Column::varlen("v", TypeId::Varchar, 64),
    ])
}

fn setup(capacity: u32) -> (StorageManager, Arc<DataTable>) {
    let manager = StorageManager::new();
    let database = Arc::new(Database::new(10, "shop"));
    manager.add_database(Arc::clone(&database)).unwrap();
    let table = Arc::new(
        DataTable::new(
            20,
            10,
            "orders",
            schema(),
            capacity,
            LayoutType::Hybrid,
            Arc::clone(manager.registry()),
        )
        .unwrap(),
    );
    database.add_table(Arc::clone(&table)).unwrap();
    (manager, table)
}

// ============================================================================
// Ownership
// ============================================================================

#[test]
fn test_lookup_by_oid_offset_and_name() {
    let (manager, table) = setup(8);
    assert_eq!(manager.database_count(), 1);
    let database = manager.database(0).unwrap();
    assert_eq!(database.table_with_name("orders").unwrap().oid(), table.oid());
    assert_eq!(manager.table_with_oid(10, 20).unwrap().name(), "orders");
    assert!(manager.table_with_oid(10, 21).is_err());
    assert!(manager.table_with_oid(11, 20).is_err());
}

#[test]
fn test_duplicate_database_and_table_rejected() {
    let (manager, table) = setup(8);
    assert!(manager.add_database(Arc::new(Database::new(10, "other"))).is_err());
    assert!(manager.add_database(Arc::new(Database::new(11, "shop"))).is_err());
    let database = manager.database_with_oid(10).unwrap();
    assert!(database.add_table(table).is_err());
}

#[test]
fn test_registry_resolves_locations() {
    let (manager, table) = setup(8);
    let location = table
        .insert_tuple(&[Value::BigInt(1), Value::Varchar("a".into())])
        .unwrap();
    let group = manager.tile_group_of(location).unwrap();
    assert_eq!(group.table_oid(), 20);
    assert_eq!(group.tuple(location.offset).unwrap()[1], Value::Varchar("a".into()));
    assert!(manager.tile_group_of(ItemPointer::new(9999, 0)).is_err());
}

#[test]
fn test_drop_database_releases_tile_groups() {
    let (manager, table) = setup(2);
    for i in 0..5 {
        table
            .insert_tuple(&[Value::BigInt(i), Value::Varchar("x".into())])
            .unwrap();
    }
    assert_eq!(manager.registry().len(), 3);
    manager.drop_database(10).unwrap();
    assert!(manager.registry().is_empty());
    assert!(!manager.has_database(10));
}

// ============================================================================
// Preserved tile-group ids
// ============================================================================

#[test]
fn test_restored_group_keeps_id_and_allocator_moves_past_it() {
    let (manager, table) = setup(4);
    table.drop_tile_groups();
    let restored = Arc::new(TileGroup::new(500, 10, 20, 4, Layout::for_type(LayoutType::Hybrid, 2)));
    table.add_tile_group(Arc::clone(&restored)).unwrap();
    manager.ensure_tile_group_id_above(500);
    assert_eq!(manager.tile_group(500).unwrap().id(), 500);
    assert!(manager.next_tile_group_id() > 500);

    // Fill the restored group and spill: the new group gets a fresh id
    for i in 0..5 {
        table
            .insert_tuple(&[Value::BigInt(i), Value::Varchar("y".into())])
            .unwrap();
    }
    assert_eq!(table.tile_group_count(), 2);
    assert!(table.tile_group(1).unwrap().id() > 500);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_inserts_get_distinct_slots() {
    let (_manager, table) = setup(16);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        table
                            .insert_tuple(&[
                                Value::BigInt(t * 1000 + i),
                                Value::Varchar(format!("t{}", t)),
                            ])
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for location in handle.join().unwrap() {
            assert!(seen.insert(location), "slot {} handed out twice", location);
        }
    }
    assert_eq!(seen.len(), 200);
    assert_eq!(table.tuple_count(), 200);
    let slots: u32 = table.tile_groups().iter().map(|g| g.allocated_slots()).sum();
    assert_eq!(slots, 200);
}

// ============================================================================
// Randomized
// ============================================================================

#[test]
fn test_random_rows_read_back_from_every_group() {
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(0x7113);
    let (manager, table) = setup(7);
    let mut rows: Vec<Vec<Value>> = (0..100)
        .map(|k| {
            let len = rng.gen_range(0..64);
            let text: String = (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
            vec![Value::BigInt(k), Value::Varchar(text)]
        })
        .collect();
    rows.shuffle(&mut rng);

    let locations: Vec<ItemPointer> = rows.iter().map(|r| table.insert_tuple(r).unwrap()).collect();
    for (row, location) in rows.iter().zip(&locations) {
        assert_eq!(table.tuple_at(*location).as_ref(), Some(row));
        assert!(manager.tile_group_of(*location).is_ok());
    }
    assert_eq!(table.tile_group_count(), 15);
}
