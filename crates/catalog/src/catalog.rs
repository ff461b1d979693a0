//! The catalog: databases, tables and indexes by name and oid
//!
//! Every definition is recorded twice: as a catalog entry with a lifetime
//! in commit-id time, and as a live storage object in the
//! `StorageManager`. Lookups take a transaction and answer as of its
//! snapshot.

use crate::entry::{
    DatabaseCatalogEntry, DatabaseDescriptor, IndexCatalogEntry, Lifetime, TableCatalogEntry,
    TableDescriptor,
};
use crate::settings::{SettingId, Settings};
use crate::system::SystemTable;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tilestore_concurrency::TransactionContext;
use tilestore_core::{
    CommitId, Error, MultiConstraintKind, Oid, Result, Schema, CATALOG_DATABASE_NAME,
    CATALOG_DATABASE_OID, INVALID_CID,
};
use tilestore_storage::{
    DataTable, Database, Index, IndexConstraintType, IndexMetadata, IndexType, LayoutType,
    StorageManager, DEFAULT_TUPLES_PER_TILE_GROUP,
};
use tracing::{debug, info};

/// Physical options of a new table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    /// Layout of tile groups
    pub layout_type: LayoutType,
    /// Slots per tile group
    pub tuples_per_tile_group: u32,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            layout_type: LayoutType::Row,
            tuples_per_tile_group: DEFAULT_TUPLES_PER_TILE_GROUP,
        }
    }
}

impl TableOptions {
    /// Set the layout
    pub fn with_layout(mut self, layout_type: LayoutType) -> Self {
        self.layout_type = layout_type;
        self
    }

    /// Set the tile-group capacity
    pub fn with_tuples_per_tile_group(mut self, n: u32) -> Self {
        self.tuples_per_tile_group = n;
        self
    }
}

/// Definition of a secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, unique within the database
    pub name: String,
    /// Key columns as schema offsets
    pub key_attrs: Vec<Oid>,
    /// Structure
    pub index_type: IndexType,
    /// Enforced constraint
    pub constraint_type: IndexConstraintType,
    /// Reject duplicate live keys
    pub unique: bool,
}

impl IndexSpec {
    /// Plain non-unique ordered index
    pub fn new(name: impl Into<String>, key_attrs: Vec<Oid>) -> Self {
        IndexSpec {
            name: name.into(),
            key_attrs,
            index_type: IndexType::BwTree,
            constraint_type: IndexConstraintType::Default,
            unique: false,
        }
    }

    /// Make the index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.constraint_type = IndexConstraintType::Unique;
        self
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    databases: Vec<DatabaseCatalogEntry>,
    tables: Vec<TableCatalogEntry>,
    indexes: Vec<IndexCatalogEntry>,
}

/// Catalog of databases, tables and indexes
#[derive(Debug)]
pub struct Catalog {
    storage: Arc<StorageManager>,
    settings: Settings,
    state: RwLock<CatalogState>,
    next_oid: AtomicU32,
}

impl Catalog {
    /// Create an empty catalog over `storage`. Call [`Catalog::bootstrap`]
    /// before use.
    pub fn new(storage: Arc<StorageManager>, settings: Settings) -> Self {
        Catalog {
            storage,
            settings,
            state: RwLock::new(CatalogState::default()),
            next_oid: AtomicU32::new(CATALOG_DATABASE_OID + 1),
        }
    }

    /// Storage the catalog manages
    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// Engine settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn allocate_oid(&self) -> Oid {
        self.next_oid.fetch_add(1, Ordering::AcqRel)
    }

    /// Create `pg_catalog` and its system tables
    pub fn bootstrap(&self) -> Result<()> {
        if self.storage.has_database(CATALOG_DATABASE_OID) {
            return Err(Error::catalog("catalog is already bootstrapped"));
        }
        let database = Arc::new(Database::new(CATALOG_DATABASE_OID, CATALOG_DATABASE_NAME));
        self.storage.add_database(Arc::clone(&database))?;
        self.state.write().databases.push(DatabaseCatalogEntry {
            oid: CATALOG_DATABASE_OID,
            name: CATALOG_DATABASE_NAME.to_string(),
            lifetime: Lifetime::created_at(INVALID_CID),
        });
        for system in SystemTable::ALL {
            self.define_table(
                &database,
                self.allocate_oid(),
                system.name(),
                system.schema(),
                TableOptions::default(),
                INVALID_CID,
            )?;
        }
        info!(tables = SystemTable::ALL.len(), "Bootstrapped catalog");
        Ok(())
    }

    /// Create a database
    pub fn create_database(&self, name: &str, txn: &TransactionContext) -> Result<Oid> {
        validate_name("database", name)?;
        if self.database_with_name(name, txn).is_ok() {
            return Err(Error::catalog(format!("database {} already exists", name)));
        }
        let oid = self.allocate_oid();
        self.storage.add_database(Arc::new(Database::new(oid, name)))?;
        self.state.write().databases.push(DatabaseCatalogEntry {
            oid,
            name: name.to_string(),
            lifetime: Lifetime::created_at(txn.read_id()),
        });
        debug!(database = name, oid, "Created database");
        Ok(oid)
    }

    /// Create a table and the indexes its constraints require
    ///
    /// Primary key columns get one `<table>_pkey` index, each unique column
    /// a `<table>_<column>_UNIQ` index, and each multi-column constraint an
    /// index named after the constraint.
    pub fn create_table(
        &self,
        database_oid: Oid,
        name: &str,
        schema: Schema,
        options: TableOptions,
        txn: &TransactionContext,
    ) -> Result<Oid> {
        validate_name("table", name)?;
        let database_entry = self.database_object(database_oid, txn)?;
        if self.table_with_name(database_oid, name, txn).is_ok() {
            return Err(Error::catalog(format!(
                "table {} already exists in {}",
                name, database_entry.name
            )));
        }
        let qualified = qualified_table_name(&database_entry.name, name);
        if let Some((database, table)) = self.qualified_owner(&qualified, txn.read_id()) {
            return Err(Error::catalog(format!(
                "table {}.{} clashes with {}.{} as {}",
                database_entry.name, name, database, table, qualified
            )));
        }
        if schema.column_count() == 0 {
            return Err(Error::catalog(format!("table {} has no columns", name)));
        }
        if let Some(column) = schema.duplicate_column_name() {
            return Err(Error::catalog(format!(
                "column {} appears twice in table {}",
                column, name
            )));
        }
        let indexes = constraint_indexes(name, &schema)?;

        let database = self
            .storage
            .database_with_oid(database_oid)
            .ok_or_else(|| Error::catalog(format!("database {} has no storage", database_oid)))?;
        let table_oid = self.allocate_oid();
        let table = self.define_table(&database, table_oid, name, schema, options, txn.read_id())?;
        for spec in indexes {
            self.define_index(&table, spec, txn.read_id())?;
        }
        debug!(table = name, oid = table_oid, database = database_oid, "Created table");
        Ok(table_oid)
    }

    /// Create a secondary index on an existing table
    pub fn create_index(
        &self,
        database_oid: Oid,
        table_oid: Oid,
        spec: IndexSpec,
        txn: &TransactionContext,
    ) -> Result<Oid> {
        let entry = self.table_object(database_oid, table_oid, txn)?;
        if let Some(bad) = spec
            .key_attrs
            .iter()
            .find(|a| **a as usize >= entry.schema.column_count())
        {
            return Err(Error::catalog(format!(
                "index {} key column {} out of range",
                spec.name, bad
            )));
        }
        let taken = self.state.read().indexes.iter().any(|i| {
            i.database_oid == database_oid
                && i.metadata.name == spec.name
                && i.lifetime.visible_at(txn.read_id())
        });
        if taken {
            return Err(Error::catalog(format!("index {} already exists", spec.name)));
        }
        let table = self.storage.table_with_oid(database_oid, table_oid)?;
        self.define_index(&table, spec, txn.read_id())
    }

    /// Drop a table as of `txn`
    pub fn drop_table(&self, database_oid: Oid, table_oid: Oid, txn: &TransactionContext) -> Result<()> {
        self.table_object(database_oid, table_oid, txn)?;
        {
            let mut state = self.state.write();
            for entry in state
                .tables
                .iter_mut()
                .filter(|t| t.database_oid == database_oid && t.oid == table_oid)
            {
                entry.lifetime.dropped_cid = txn.read_id();
            }
            for entry in state
                .indexes
                .iter_mut()
                .filter(|i| i.database_oid == database_oid && i.table_oid == table_oid)
            {
                entry.lifetime.dropped_cid = txn.read_id();
            }
        }
        if let Some(database) = self.storage.database_with_oid(database_oid) {
            if let Some(table) = database.drop_table(table_oid) {
                table.drop_tile_groups();
            }
        }
        debug!(table = table_oid, database = database_oid, "Dropped table");
        Ok(())
    }

    /// Drop a database and everything in it as of `txn`
    pub fn drop_database(&self, database_oid: Oid, txn: &TransactionContext) -> Result<()> {
        if database_oid == CATALOG_DATABASE_OID {
            return Err(Error::catalog("cannot drop the catalog database"));
        }
        self.database_object(database_oid, txn)?;
        {
            let mut state = self.state.write();
            let read_id = txn.read_id();
            for entry in state.databases.iter_mut().filter(|d| d.oid == database_oid) {
                entry.lifetime.dropped_cid = read_id;
            }
            for entry in state.tables.iter_mut().filter(|t| t.database_oid == database_oid) {
                entry.lifetime.dropped_cid = entry.lifetime.dropped_cid.min(read_id);
            }
            for entry in state.indexes.iter_mut().filter(|i| i.database_oid == database_oid) {
                entry.lifetime.dropped_cid = entry.lifetime.dropped_cid.min(read_id);
            }
        }
        self.storage.drop_database(database_oid);
        debug!(database = database_oid, "Dropped database");
        Ok(())
    }

    /// Database `oid` as of `txn`
    pub fn database_object(&self, oid: Oid, txn: &TransactionContext) -> Result<DatabaseCatalogEntry> {
        self.database_at(oid, txn.read_id())
    }

    fn database_at(&self, oid: Oid, read_id: CommitId) -> Result<DatabaseCatalogEntry> {
        self.state
            .read()
            .databases
            .iter()
            .find(|d| d.oid == oid && d.lifetime.visible_at(read_id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("database {}", oid)))
    }

    /// Database called `name` as of `txn`
    pub fn database_with_name(&self, name: &str, txn: &TransactionContext) -> Result<DatabaseCatalogEntry> {
        self.state
            .read()
            .databases
            .iter()
            .find(|d| d.name == name && d.lifetime.visible_at(txn.read_id()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("database {}", name)))
    }

    /// Every database visible to `txn`, in creation order
    pub fn database_objects(&self, txn: &TransactionContext) -> Vec<DatabaseCatalogEntry> {
        self.state
            .read()
            .databases
            .iter()
            .filter(|d| d.lifetime.visible_at(txn.read_id()))
            .cloned()
            .collect()
    }

    /// Table `table_oid` of database `database_oid` as of `txn`
    pub fn table_object(
        &self,
        database_oid: Oid,
        table_oid: Oid,
        txn: &TransactionContext,
    ) -> Result<TableCatalogEntry> {
        self.state
            .read()
            .tables
            .iter()
            .find(|t| {
                t.database_oid == database_oid
                    && t.oid == table_oid
                    && t.lifetime.visible_at(txn.read_id())
            })
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("table {} in database {}", table_oid, database_oid)))
    }

    /// Table called `name` in database `database_oid` as of `txn`
    pub fn table_with_name(
        &self,
        database_oid: Oid,
        name: &str,
        txn: &TransactionContext,
    ) -> Result<TableCatalogEntry> {
        self.state
            .read()
            .tables
            .iter()
            .find(|t| {
                t.database_oid == database_oid
                    && t.name == name
                    && t.lifetime.visible_at(txn.read_id())
            })
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("table {} in database {}", name, database_oid)))
    }

    /// Tables of a database visible to `txn`, in creation order
    pub fn table_objects(&self, database_oid: Oid, txn: &TransactionContext) -> Vec<TableCatalogEntry> {
        self.tables_at(database_oid, txn.read_id())
    }

    fn tables_at(&self, database_oid: Oid, read_id: CommitId) -> Vec<TableCatalogEntry> {
        self.state
            .read()
            .tables
            .iter()
            .filter(|t| t.database_oid == database_oid && t.lifetime.visible_at(read_id))
            .cloned()
            .collect()
    }

    /// Database and table names of the live table whose qualified name is
    /// `qualified`
    fn qualified_owner(&self, qualified: &str, read_id: CommitId) -> Option<(String, String)> {
        let state = self.state.read();
        state
            .databases
            .iter()
            .filter(|d| d.lifetime.visible_at(read_id))
            .find_map(|d| {
                state
                    .tables
                    .iter()
                    .filter(|t| t.database_oid == d.oid && t.lifetime.visible_at(read_id))
                    .find(|t| qualified_table_name(&d.name, &t.name) == qualified)
                    .map(|t| (d.name.clone(), t.name.clone()))
            })
    }

    /// Indexes of a table visible to `txn`
    pub fn index_objects(
        &self,
        database_oid: Oid,
        table_oid: Oid,
        txn: &TransactionContext,
    ) -> Vec<IndexCatalogEntry> {
        self.indexes_at(database_oid, table_oid, txn.read_id())
    }

    fn indexes_at(&self, database_oid: Oid, table_oid: Oid, read_id: CommitId) -> Vec<IndexCatalogEntry> {
        self.state
            .read()
            .indexes
            .iter()
            .filter(|i| {
                i.database_oid == database_oid
                    && i.table_oid == table_oid
                    && i.lifetime.visible_at(read_id)
            })
            .cloned()
            .collect()
    }

    /// Storage table behind a catalog table
    pub fn storage_table(&self, database_oid: Oid, table_oid: Oid) -> Result<Arc<DataTable>> {
        self.storage.table_with_oid(database_oid, table_oid)
    }

    /// Storage table of a system table
    pub fn system_table(&self, table: SystemTable) -> Result<Arc<DataTable>> {
        self.storage
            .database_with_oid(CATALOG_DATABASE_OID)
            .ok_or_else(|| Error::catalog("catalog is not bootstrapped"))?
            .table_with_name(table.name())
            .ok_or_else(|| Error::NotFound(format!("system table {}", table.name())))
    }

    /// System tables whose contents are checkpointed. Query history only
    /// participates with the brain setting on.
    pub fn checkpoint_system_tables(&self) -> Vec<SystemTable> {
        SystemTable::ALL
            .into_iter()
            .filter(|t| *t != SystemTable::QueryHistory || self.settings.get_bool(SettingId::Brain))
            .collect()
    }

    /// Storage-level description of database `oid` as of `txn`
    pub fn describe_database(&self, oid: Oid, txn: &TransactionContext) -> Result<DatabaseDescriptor> {
        let entry = self.database_object(oid, txn)?;
        let tables = self
            .tables_at(oid, txn.read_id())
            .into_iter()
            .map(|t| TableDescriptor {
                indexes: self
                    .indexes_at(oid, t.oid, txn.read_id())
                    .into_iter()
                    .map(|i| i.metadata)
                    .collect(),
                oid: t.oid,
                name: t.name,
                schema: t.schema,
                tuples_per_tile_group: t.tuples_per_tile_group,
                layout_type: t.layout_type,
            })
            .collect();
        Ok(DatabaseDescriptor {
            oid: entry.oid,
            name: entry.name,
            tables,
        })
    }

    /// Recreate a database, its tables and indexes from a descriptor,
    /// keeping every oid. The restored entries are visible to every
    /// snapshot and the oid allocator moves past them.
    pub fn restore_database(&self, descriptor: &DatabaseDescriptor) -> Result<Arc<Database>> {
        if descriptor.oid == CATALOG_DATABASE_OID {
            return Err(Error::catalog("the catalog database is bootstrapped, not restored"));
        }
        let clash = self.state.read().databases.iter().any(|d| {
            !d.lifetime.is_dropped() && (d.oid == descriptor.oid || d.name == descriptor.name)
        });
        if clash {
            return Err(Error::catalog(format!(
                "database {} ({}) already exists",
                descriptor.name, descriptor.oid
            )));
        }

        let database = Arc::new(Database::new(descriptor.oid, descriptor.name.clone()));
        self.storage.add_database(Arc::clone(&database))?;
        self.state.write().databases.push(DatabaseCatalogEntry {
            oid: descriptor.oid,
            name: descriptor.name.clone(),
            lifetime: Lifetime::created_at(INVALID_CID),
        });
        let mut max_oid = descriptor.oid;
        for table_descriptor in &descriptor.tables {
            let table = self.define_table(
                &database,
                table_descriptor.oid,
                &table_descriptor.name,
                table_descriptor.schema.clone(),
                TableOptions {
                    layout_type: table_descriptor.layout_type,
                    tuples_per_tile_group: table_descriptor.tuples_per_tile_group,
                },
                INVALID_CID,
            )?;
            max_oid = max_oid.max(table_descriptor.oid);
            for metadata in &table_descriptor.indexes {
                self.attach_index(&table, metadata.clone(), INVALID_CID);
                max_oid = max_oid.max(metadata.oid);
            }
        }
        self.next_oid
            .fetch_max(max_oid.saturating_add(1), Ordering::AcqRel);
        info!(
            database = %descriptor.name,
            oid = descriptor.oid,
            tables = descriptor.tables.len(),
            "Restored database"
        );
        Ok(database)
    }

    fn define_table(
        &self,
        database: &Arc<Database>,
        oid: Oid,
        name: &str,
        schema: Schema,
        options: TableOptions,
        created_cid: CommitId,
    ) -> Result<Arc<DataTable>> {
        let table = Arc::new(DataTable::new(
            oid,
            database.oid(),
            name,
            schema.clone(),
            options.tuples_per_tile_group,
            options.layout_type,
            Arc::clone(self.storage.registry()),
        )?);
        database.add_table(Arc::clone(&table))?;
        self.state.write().tables.push(TableCatalogEntry {
            oid,
            database_oid: database.oid(),
            name: name.to_string(),
            schema,
            tuples_per_tile_group: options.tuples_per_tile_group,
            layout_type: options.layout_type,
            lifetime: Lifetime::created_at(created_cid),
        });
        Ok(table)
    }

    fn define_index(&self, table: &Arc<DataTable>, spec: IndexSpec, created_cid: CommitId) -> Result<Oid> {
        let oid = self.allocate_oid();
        self.attach_index(
            table,
            IndexMetadata {
                oid,
                name: spec.name,
                index_type: spec.index_type,
                constraint_type: spec.constraint_type,
                unique: spec.unique,
                key_attrs: spec.key_attrs,
            },
            created_cid,
        );
        Ok(oid)
    }

    fn attach_index(&self, table: &Arc<DataTable>, metadata: IndexMetadata, created_cid: CommitId) {
        table.add_index(Arc::new(Index::new(metadata.clone())));
        self.state.write().indexes.push(IndexCatalogEntry {
            database_oid: table.database_oid(),
            table_oid: table.oid(),
            metadata,
            lifetime: Lifetime::created_at(created_cid),
        });
    }
}

/// Indexes implied by a schema's constraints
/// Flat `<database>_<table>` name of a table, unique among live tables
pub fn qualified_table_name(database: &str, table: &str) -> String {
    format!("{}_{}", database, table)
}

/// Names end up in file names, so path syntax is rejected
fn validate_name(kind: &str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(Error::catalog(format!("invalid {} name {:?}", kind, name)));
    }
    Ok(())
}

fn constraint_indexes(table: &str, schema: &Schema) -> Result<Vec<IndexSpec>> {
    let mut specs = Vec::new();
    let primary = schema.primary_key_columns();
    let multi_primary: Vec<_> = schema
        .multi_constraints()
        .iter()
        .filter(|c| c.kind == MultiConstraintKind::Primary)
        .collect();
    if multi_primary.len() + usize::from(!primary.is_empty()) > 1 {
        return Err(Error::catalog(format!("table {} has more than one primary key", table)));
    }
    if !primary.is_empty() {
        specs.push(IndexSpec {
            name: format!("{}_pkey", table),
            key_attrs: primary,
            index_type: IndexType::BwTree,
            constraint_type: IndexConstraintType::PrimaryKey,
            unique: true,
        });
    }
    for (offset, column) in schema.columns().iter().enumerate() {
        if column.is_unique() && !column.is_primary() {
            specs.push(IndexSpec::new(format!("{}_{}_UNIQ", table, column.name), vec![offset as Oid]).unique());
        }
    }
    for constraint in schema.multi_constraints() {
        let constraint_type = match constraint.kind {
            MultiConstraintKind::Primary => IndexConstraintType::PrimaryKey,
            MultiConstraintKind::Unique => IndexConstraintType::Unique,
        };
        specs.push(IndexSpec {
            name: constraint.name.clone(),
            key_attrs: constraint.column_ids.clone(),
            index_type: IndexType::BwTree,
            constraint_type,
            unique: true,
        });
    }
    Ok(specs)
}
