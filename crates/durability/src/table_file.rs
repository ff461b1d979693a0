//! Per-table checkpoint files
//!
//! ```text
//! i64 groupCount
//! per tile group:
//!     descriptor (id, database oid, table oid, capacity, layout)
//!     i64 visibleCount
//!     visibleCount x columnCount values (type tag, null flag, payload)
//! ```
//!
//! Only versions visible at the checkpoint snapshot are written. Tile
//! group ids are kept so recovery rebuilds the same physical groups.

use crate::error::{CheckpointError, RecoveryError};
use crate::visibility::visible_slots;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tilestore_concurrency::{TransactionContext, TransactionManager};
use tilestore_core::{CommitId, Error, ItemPointer, SerializeInput, SerializeOutput, TypeId, Value};
use tilestore_storage::{DataTable, TileGroup};
use tracing::debug;

/// Write the tuples of `table` visible at `snapshot` to `path`.
///
/// Output is buffered per tile group and the file is synced before
/// returning. `path` must not exist yet. Returns the number of tuples
/// written.
pub fn write_table(table: &DataTable, snapshot: CommitId, path: &Path) -> Result<u64, CheckpointError> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .map_err(|e| CheckpointError::io(path, e))?;

    let groups = table.tile_groups();
    let mut out = SerializeOutput::new();
    out.write_count(groups.len());

    let mut tuples = 0u64;
    for group in &groups {
        group.serialize_to(&mut out);
        let slots = visible_slots(group.header(), snapshot);
        out.write_count(slots.len());
        let column_count = group.layout().column_count();
        for slot in &slots {
            for column in 0..column_count {
                let value = group.value(*slot, column).ok_or_else(|| {
                    CheckpointError::io(
                        path,
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "visible slot {} has no value for column {}",
                                ItemPointer::new(group.id(), *slot),
                                column
                            ),
                        ),
                    )
                })?;
                value.serialize_to(&mut out);
            }
        }
        tuples += slots.len() as u64;
        file.write_all(out.data())
            .map_err(|e| CheckpointError::io(path, e))?;
        out.reset();
    }
    // An empty table still has its group count pending
    file.write_all(out.data())
        .map_err(|e| CheckpointError::io(path, e))?;
    file.sync_all().map_err(|e| CheckpointError::io(path, e))?;

    debug!(
        target: "tilestore::checkpoint",
        table = %table.name(),
        tile_groups = groups.len(),
        tuples,
        snapshot,
        "Wrote table"
    );
    Ok(tuples)
}

/// Rebuild `table` from the file at `path`.
///
/// Existing tile groups are dropped first. Every tuple is stored in its
/// preserved tile group, registered with the table's indexes and claimed
/// as an insert of `txn`. Returns the number of tuples replayed.
pub fn replay_table(
    table: &DataTable,
    txn_manager: &TransactionManager,
    txn: &mut TransactionContext,
    path: &Path,
) -> Result<u64, RecoveryError> {
    let bytes = fs::read(path).map_err(|e| RecoveryError::io(path, e))?;
    let format = |e: Error| RecoveryError::format(path, e);
    let semantic = |e: &dyn std::fmt::Display| RecoveryError::insert(table.name(), e);

    table.drop_tile_groups();

    let types: Vec<TypeId> = table.schema().columns().iter().map(|c| c.type_id).collect();
    let mut input = SerializeInput::new(&bytes);
    let group_count = input.read_count().map_err(format)?;

    let mut max_group_id = 0;
    let mut tuples = 0u64;
    for _ in 0..group_count {
        let group = TileGroup::deserialize_from(&mut input).map_err(format)?;
        if group.table_oid() != table.oid() || group.database_oid() != table.database_oid() {
            return Err(format(Error::format(format!(
                "tile group {} belongs to table {}.{}, not {}.{}",
                group.id(),
                group.database_oid(),
                group.table_oid(),
                table.database_oid(),
                table.oid()
            ))));
        }
        if group.layout().column_count() != types.len() {
            return Err(format(Error::format(format!(
                "tile group {} has {} columns, table {} has {}",
                group.id(),
                group.layout().column_count(),
                table.name(),
                types.len()
            ))));
        }
        let group = Arc::new(group);
        table
            .add_tile_group(Arc::clone(&group))
            .map_err(|e| semantic(&e))?;
        max_group_id = max_group_id.max(group.id());

        let visible = input.read_count().map_err(format)?;
        if visible > group.capacity() as usize {
            return Err(format(Error::format(format!(
                "tile group {} lists {} tuples for {} slots",
                group.id(),
                visible,
                group.capacity()
            ))));
        }
        for _ in 0..visible {
            let values = types
                .iter()
                .map(|t| Value::deserialize_from(&mut input, *t))
                .collect::<tilestore_core::Result<Vec<Value>>>()
                .map_err(format)?;
            let slot = group
                .insert_tuple(&values)
                .map_err(|e| semantic(&e))?
                .ok_or_else(|| {
                    semantic(&Error::CapacityExceeded {
                        tile_group_id: group.id(),
                        capacity: group.capacity(),
                    })
                })?;
            let location = ItemPointer::new(group.id(), slot);
            table
                .insert_tuple_at(&values, location)
                .map_err(|e| semantic(&e))?;
            txn_manager
                .perform_insert(txn, location)
                .map_err(|e| semantic(&e))?;
            tuples += 1;
        }
    }
    if !input.is_exhausted() {
        return Err(format(Error::format(format!(
            "{} trailing bytes after the last tile group",
            input.remaining()
        ))));
    }
    txn_manager.storage().ensure_tile_group_id_above(max_group_id);

    debug!(
        target: "tilestore::recovery",
        table = %table.name(),
        tile_groups = group_count,
        tuples,
        "Replayed table"
    );
    Ok(tuples)
}
