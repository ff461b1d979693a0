//! System catalog tables
//!
//! These tables live in `pg_catalog`. Their contents are ordinary tuples
//! and are checkpointed alongside user tables.

use tilestore_core::{Column, Schema, TypeId};

/// The auxiliary system tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemTable {
    /// Per-database transaction counters
    DatabaseMetrics,
    /// Per-table access counters
    TableMetrics,
    /// Per-index access counters
    IndexMetrics,
    /// Per-query statistics
    QueryMetrics,
    /// Trigger definitions
    Trigger,
    /// Executed query strings (only with the brain setting)
    QueryHistory,
}

impl SystemTable {
    /// Every system table, in creation order
    pub const ALL: [SystemTable; 6] = [
        SystemTable::DatabaseMetrics,
        SystemTable::TableMetrics,
        SystemTable::IndexMetrics,
        SystemTable::QueryMetrics,
        SystemTable::Trigger,
        SystemTable::QueryHistory,
    ];

    /// Table name inside `pg_catalog`
    pub fn name(self) -> &'static str {
        match self {
            SystemTable::DatabaseMetrics => "pg_database_metrics",
            SystemTable::TableMetrics => "pg_table_metrics",
            SystemTable::IndexMetrics => "pg_index_metrics",
            SystemTable::QueryMetrics => "pg_query_metrics",
            SystemTable::Trigger => "pg_trigger",
            SystemTable::QueryHistory => "pg_query_history",
        }
    }

    /// Table schema
    pub fn schema(self) -> Schema {
        let ts = || Column::new("time_stamp", TypeId::BigInt);
        let counter = |name: &str| Column::new(name, TypeId::BigInt);
        let columns = match self {
            SystemTable::DatabaseMetrics => vec![
                Column::new("database_oid", TypeId::Integer).not_null(),
                counter("txn_committed"),
                counter("txn_aborted"),
                ts(),
            ],
            SystemTable::TableMetrics => vec![
                Column::new("table_oid", TypeId::Integer).not_null(),
                counter("reads"),
                counter("updates"),
                counter("deletes"),
                counter("inserts"),
                ts(),
            ],
            SystemTable::IndexMetrics => vec![
                Column::new("index_oid", TypeId::Integer).not_null(),
                counter("reads"),
                counter("deletes"),
                counter("inserts"),
                ts(),
            ],
            SystemTable::QueryMetrics => vec![
                Column::varlen("query_name", TypeId::Varchar, 1024).not_null(),
                Column::new("database_oid", TypeId::Integer).not_null(),
                Column::new("num_params", TypeId::Integer),
                counter("reads"),
                counter("updates"),
                counter("deletes"),
                counter("inserts"),
                counter("latency"),
                counter("cpu_time"),
                ts(),
            ],
            SystemTable::Trigger => vec![
                Column::new("trigger_oid", TypeId::Integer).primary(),
                Column::varlen("trigger_name", TypeId::Varchar, 256).not_null(),
                Column::new("table_oid", TypeId::Integer).not_null(),
                Column::new("trigger_type", TypeId::SmallInt).not_null(),
                Column::varlen("fire_condition", TypeId::Varchar, 4096),
                Column::new("function_oid", TypeId::Integer),
                Column::varlen("function_arguments", TypeId::Varchar, 4096),
                ts(),
            ],
            SystemTable::QueryHistory => vec![
                Column::varlen("query_string", TypeId::Varchar, 4096).not_null(),
                Column::varlen("fingerprint", TypeId::Varchar, 256).not_null(),
                ts(),
            ],
        };
        Schema::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_distinct() {
        let names: HashSet<_> = SystemTable::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), SystemTable::ALL.len());
    }

    #[test]
    fn test_schemas_have_unique_columns() {
        for table in SystemTable::ALL {
            let schema = table.schema();
            assert!(schema.column_count() > 0);
            assert_eq!(schema.duplicate_column_name(), None, "{}", table.name());
        }
    }
}
