//! Table schemas, columns and constraints
//!
//! A `Schema` is the part of a table definition that storage needs: the
//! ordered columns, their per-column constraints, and constraints that span
//! several columns. Schemas serialize into the checkpoint catalog file.

use crate::error::{Error, Result};
use crate::serialize::{SerializeInput, SerializeOutput};
use crate::types::Oid;
use crate::value::{TypeId, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Comparison operator of a CHECK constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompareOp {
    /// =
    Equal = 1,
    /// <>
    NotEqual = 2,
    /// <
    LessThan = 3,
    /// <=
    LessThanOrEqual = 4,
    /// >
    GreaterThan = 5,
    /// >=
    GreaterThanOrEqual = 6,
}

impl CompareOp {
    fn from_tag(tag: u8) -> Result<CompareOp> {
        Ok(match tag {
            1 => CompareOp::Equal,
            2 => CompareOp::NotEqual,
            3 => CompareOp::LessThan,
            4 => CompareOp::LessThanOrEqual,
            5 => CompareOp::GreaterThan,
            6 => CompareOp::GreaterThanOrEqual,
            other => return Err(Error::format(format!("unknown compare op {}", other))),
        })
    }

    /// Apply the operator to an ordering
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Equal => ord == Ordering::Equal,
            CompareOp::NotEqual => ord != Ordering::Equal,
            CompareOp::LessThan => ord == Ordering::Less,
            CompareOp::LessThanOrEqual => ord != Ordering::Greater,
            CompareOp::GreaterThan => ord == Ordering::Greater,
            CompareOp::GreaterThanOrEqual => ord != Ordering::Less,
        }
    }
}

/// Constraint on a single column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    /// Value may not be NULL
    NotNull,
    /// Column is (part of) the primary key
    Primary,
    /// Column values are unique
    Unique,
    /// `column <op> value` must hold for non-NULL values
    Check {
        /// Comparison operator
        op: CompareOp,
        /// Right-hand side
        value: Value,
    },
}

const CONSTRAINT_NOT_NULL: u8 = 1;
const CONSTRAINT_PRIMARY: u8 = 2;
const CONSTRAINT_UNIQUE: u8 = 3;
const CONSTRAINT_CHECK: u8 = 4;

impl ColumnConstraint {
    fn serialize_to(&self, out: &mut SerializeOutput) {
        match self {
            ColumnConstraint::NotNull => out.write_byte(CONSTRAINT_NOT_NULL),
            ColumnConstraint::Primary => out.write_byte(CONSTRAINT_PRIMARY),
            ColumnConstraint::Unique => out.write_byte(CONSTRAINT_UNIQUE),
            ColumnConstraint::Check { op, value } => {
                out.write_byte(CONSTRAINT_CHECK);
                out.write_byte(*op as u8);
                value.serialize_to(out);
            }
        }
    }

    fn deserialize_from(input: &mut SerializeInput<'_>, column_type: TypeId) -> Result<Self> {
        Ok(match input.read_byte()? {
            CONSTRAINT_NOT_NULL => ColumnConstraint::NotNull,
            CONSTRAINT_PRIMARY => ColumnConstraint::Primary,
            CONSTRAINT_UNIQUE => ColumnConstraint::Unique,
            CONSTRAINT_CHECK => {
                let op = CompareOp::from_tag(input.read_byte()?)?;
                let value = Value::deserialize_from(input, column_type)?;
                ColumnConstraint::Check { op, value }
            }
            other => return Err(Error::format(format!("unknown column constraint {}", other))),
        })
    }
}

/// One column definition
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Value type
    pub type_id: TypeId,
    /// Fixed size, or maximum length for variable-length types
    pub length: u32,
    /// Whether values are stored inline in the tile
    pub inlined: bool,
    /// Per-column constraints
    pub constraints: Vec<ColumnConstraint>,
}

impl Column {
    /// Column of a fixed-width type
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Column {
            name: name.into(),
            type_id,
            length: type_id.fixed_size().unwrap_or(0),
            inlined: !type_id.is_variable_length(),
            constraints: Vec::new(),
        }
    }

    /// Variable-length column with a maximum length
    pub fn varlen(name: impl Into<String>, type_id: TypeId, max_length: u32) -> Self {
        Column {
            length: max_length,
            inlined: false,
            ..Column::new(name, type_id)
        }
    }

    /// Add a constraint
    pub fn with_constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// NOT NULL
    pub fn not_null(self) -> Self {
        self.with_constraint(ColumnConstraint::NotNull)
    }

    /// PRIMARY KEY (implies NOT NULL)
    pub fn primary(self) -> Self {
        self.with_constraint(ColumnConstraint::Primary).not_null()
    }

    /// UNIQUE
    pub fn unique(self) -> Self {
        self.with_constraint(ColumnConstraint::Unique)
    }

    /// True if the column carries the constraint kind
    pub fn is_primary(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::Primary)
    }

    /// True if the column is declared UNIQUE
    pub fn is_unique(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::Unique)
    }

    /// True if the column rejects NULL
    pub fn is_not_null(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::NotNull)
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        if value.type_id() != self.type_id {
            return Err(Error::TypeMismatch {
                expected: self.type_id,
                actual: value.type_id(),
            });
        }
        if value.is_null() {
            if self.is_not_null() {
                return Err(Error::ConstraintViolation(format!(
                    "column {} is NOT NULL",
                    self.name
                )));
            }
            return Ok(());
        }
        if let Some(len) = value.var_len() {
            if self.length > 0 && len > self.length as usize {
                return Err(Error::ConstraintViolation(format!(
                    "value of length {} exceeds column {} length {}",
                    len, self.name, self.length
                )));
            }
        }
        for constraint in &self.constraints {
            if let ColumnConstraint::Check { op, value: rhs } = constraint {
                let holds = value.compare(rhs).map(|ord| op.holds(ord)).unwrap_or(false);
                if !holds {
                    return Err(Error::ConstraintViolation(format!(
                        "CHECK on column {} failed for {}",
                        self.name, value
                    )));
                }
            }
        }
        Ok(())
    }

    fn serialize_to(&self, out: &mut SerializeOutput) {
        out.write_string(&self.name);
        out.write_byte(self.type_id.tag());
        out.write_u32(self.length);
        out.write_bool(self.inlined);
        out.write_count(self.constraints.len());
        for constraint in &self.constraints {
            constraint.serialize_to(out);
        }
    }

    fn deserialize_from(input: &mut SerializeInput<'_>) -> Result<Self> {
        let name = input.read_string()?;
        let type_id = TypeId::from_tag(input.read_byte()?)?;
        let length = input.read_u32()?;
        let inlined = input.read_bool()?;
        let count = input.read_count()?;
        let mut constraints = Vec::new();
        for _ in 0..count {
            constraints.push(ColumnConstraint::deserialize_from(input, type_id)?);
        }
        Ok(Column {
            name,
            type_id,
            length,
            inlined,
            constraints,
        })
    }
}

/// Kind of a multi-column constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MultiConstraintKind {
    /// Composite primary key
    Primary = 1,
    /// Composite unique key
    Unique = 2,
}

/// Constraint spanning several columns
#[derive(Debug, Clone, PartialEq)]
pub struct MultiConstraint {
    /// Constraint kind
    pub kind: MultiConstraintKind,
    /// Constraint name (unique within a table)
    pub name: String,
    /// Constrained column offsets
    pub column_ids: Vec<Oid>,
}

impl MultiConstraint {
    /// Create a multi-column constraint
    pub fn new(kind: MultiConstraintKind, name: impl Into<String>, column_ids: Vec<Oid>) -> Self {
        MultiConstraint {
            kind,
            name: name.into(),
            column_ids,
        }
    }

    /// Append the binary form
    pub fn serialize_to(&self, out: &mut SerializeOutput) {
        out.write_byte(self.kind as u8);
        out.write_string(&self.name);
        out.write_count(self.column_ids.len());
        for id in &self.column_ids {
            out.write_u32(*id);
        }
    }

    /// Decode the binary form
    pub fn deserialize_from(input: &mut SerializeInput<'_>) -> Result<Self> {
        let kind = match input.read_byte()? {
            1 => MultiConstraintKind::Primary,
            2 => MultiConstraintKind::Unique,
            other => return Err(Error::format(format!("unknown multi constraint {}", other))),
        };
        let name = input.read_string()?;
        let count = input.read_count()?;
        let mut column_ids = Vec::new();
        for _ in 0..count {
            column_ids.push(input.read_u32()?);
        }
        Ok(MultiConstraint {
            kind,
            name,
            column_ids,
        })
    }
}

/// Ordered column list plus table-level constraints
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    columns: Vec<Column>,
    multi_constraints: Vec<MultiConstraint>,
}

impl Schema {
    /// Schema over the given columns
    pub fn new(columns: Vec<Column>) -> Self {
        Schema {
            columns,
            multi_constraints: Vec::new(),
        }
    }

    /// Add a multi-column constraint
    pub fn with_multi_constraint(mut self, constraint: MultiConstraint) -> Self {
        self.multi_constraints.push(constraint);
        self
    }

    /// Columns in order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column at `offset`
    pub fn column(&self, offset: usize) -> Option<&Column> {
        self.columns.get(offset)
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Type of column `offset`
    pub fn type_of(&self, offset: usize) -> Option<TypeId> {
        self.columns.get(offset).map(|c| c.type_id)
    }

    /// Offset of the column called `name`
    pub fn column_offset(&self, name: &str) -> Option<Oid> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|p| p as Oid)
    }

    /// Table-level constraints
    pub fn multi_constraints(&self) -> &[MultiConstraint] {
        &self.multi_constraints
    }

    /// Offsets of columns marked PRIMARY
    pub fn primary_key_columns(&self) -> Vec<Oid> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary())
            .map(|(i, _)| i as Oid)
            .collect()
    }

    /// First duplicated column name, if any
    pub fn duplicate_column_name(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .find(|c| !seen.insert(c.name.as_str()))
            .map(|c| c.name.as_str())
    }

    /// Check arity, types, NOT NULL, length and CHECK constraints of a tuple
    pub fn validate_tuple(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::InvalidOperation(format!(
                "tuple has {} values, schema has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(values) {
            column.check_value(value)?;
        }
        Ok(())
    }

    /// Append the binary form
    pub fn serialize_to(&self, out: &mut SerializeOutput) {
        out.write_count(self.columns.len());
        for column in &self.columns {
            column.serialize_to(out);
        }
        out.write_count(self.multi_constraints.len());
        for constraint in &self.multi_constraints {
            constraint.serialize_to(out);
        }
    }

    /// Decode the binary form
    pub fn deserialize_from(input: &mut SerializeInput<'_>) -> Result<Self> {
        let column_count = input.read_count()?;
        let mut columns = Vec::new();
        for _ in 0..column_count {
            columns.push(Column::deserialize_from(input)?);
        }
        let constraint_count = input.read_count()?;
        let mut multi_constraints = Vec::new();
        for _ in 0..constraint_count {
            let constraint = MultiConstraint::deserialize_from(input)?;
            if let Some(bad) = constraint
                .column_ids
                .iter()
                .find(|id| **id as usize >= columns.len())
            {
                return Err(Error::format(format!(
                    "constraint {} references column {} of {}",
                    constraint.name,
                    bad,
                    columns.len()
                )));
            }
            multi_constraints.push(constraint);
        }
        Ok(Schema {
            columns,
            multi_constraints,
        })
    }
}
