//! Column-to-tile layouts
//!
//! A tile group stores its columns in one or more tiles. The layout says
//! which tile holds each column and at which position inside that tile.
//! - Row: every column in a single tile
//! - Column: one tile per column
//! - Hybrid: explicit column → tile map

use tilestore_core::{Error, Result, SerializeInput, SerializeOutput};

/// Upper bound on columns accepted when decoding a layout
pub const MAX_LAYOUT_COLUMNS: usize = 4096;

/// Layout strategy of a table or tile group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LayoutType {
    /// N-ary storage, one tile
    Row = 1,
    /// Decomposed storage, one tile per column
    Column = 2,
    /// Columns grouped into tiles by an explicit map
    Hybrid = 3,
}

impl LayoutType {
    /// Decode a layout tag
    pub fn from_tag(tag: u8) -> Result<LayoutType> {
        match tag {
            1 => Ok(LayoutType::Row),
            2 => Ok(LayoutType::Column),
            3 => Ok(LayoutType::Hybrid),
            other => Err(Error::format(format!("unknown layout type {}", other))),
        }
    }
}

/// Mapping of columns onto tiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    layout_type: LayoutType,
    column_to_tile: Vec<u32>,
}

impl Layout {
    /// Row layout over `column_count` columns
    pub fn row(column_count: usize) -> Self {
        Layout {
            layout_type: LayoutType::Row,
            column_to_tile: vec![0; column_count],
        }
    }

    /// Column layout over `column_count` columns
    pub fn column(column_count: usize) -> Self {
        Layout {
            layout_type: LayoutType::Column,
            column_to_tile: (0..column_count as u32).collect(),
        }
    }

    /// Hybrid layout from an explicit map. Tile ids must be dense from zero.
    pub fn hybrid(column_to_tile: Vec<u32>) -> Result<Self> {
        let tiles = column_to_tile.iter().max().map(|m| m + 1).unwrap_or(0);
        if (0..tiles).any(|t| !column_to_tile.contains(&t)) {
            return Err(Error::InvalidOperation(format!(
                "hybrid layout {:?} leaves a tile empty",
                column_to_tile
            )));
        }
        Ok(Layout {
            layout_type: LayoutType::Hybrid,
            column_to_tile,
        })
    }

    /// Default layout of a given type. Hybrid splits the columns into two halves.
    pub fn for_type(layout_type: LayoutType, column_count: usize) -> Self {
        match layout_type {
            LayoutType::Row => Layout::row(column_count),
            LayoutType::Column => Layout::column(column_count),
            LayoutType::Hybrid => {
                let split = (column_count + 1) / 2;
                Layout {
                    layout_type,
                    column_to_tile: (0..column_count)
                        .map(|c| if c < split { 0 } else { 1 })
                        .collect(),
                }
            }
        }
    }

    /// Layout strategy
    pub fn layout_type(&self) -> LayoutType {
        self.layout_type
    }

    /// Number of columns covered
    pub fn column_count(&self) -> usize {
        self.column_to_tile.len()
    }

    /// Number of tiles
    pub fn tile_count(&self) -> usize {
        self.column_to_tile
            .iter()
            .max()
            .map(|m| *m as usize + 1)
            .unwrap_or(0)
    }

    /// Tile holding `column`
    pub fn tile_of(&self, column: usize) -> Option<usize> {
        self.column_to_tile.get(column).map(|t| *t as usize)
    }

    /// Columns stored in `tile`, in column order
    pub fn columns_of(&self, tile: usize) -> Vec<usize> {
        self.column_to_tile
            .iter()
            .enumerate()
            .filter(|(_, t)| **t as usize == tile)
            .map(|(c, _)| c)
            .collect()
    }

    /// (tile, position within tile) for `column`
    pub fn locate(&self, column: usize) -> Option<(usize, usize)> {
        let tile = self.tile_of(column)?;
        let position = self.column_to_tile[..column]
            .iter()
            .filter(|t| **t as usize == tile)
            .count();
        Some((tile, position))
    }

    /// Append the binary form
    pub fn serialize_to(&self, out: &mut SerializeOutput) {
        out.write_byte(self.layout_type as u8);
        out.write_count(self.column_to_tile.len());
        if self.layout_type == LayoutType::Hybrid {
            for tile in &self.column_to_tile {
                out.write_u32(*tile);
            }
        }
    }

    /// Decode the binary form
    pub fn deserialize_from(input: &mut SerializeInput<'_>) -> Result<Self> {
        let layout_type = LayoutType::from_tag(input.read_byte()?)?;
        let column_count = input.read_count()?;
        if column_count > MAX_LAYOUT_COLUMNS {
            return Err(Error::format(format!(
                "layout with {} columns exceeds {}",
                column_count, MAX_LAYOUT_COLUMNS
            )));
        }
        match layout_type {
            LayoutType::Row => Ok(Layout::row(column_count)),
            LayoutType::Column => Ok(Layout::column(column_count)),
            LayoutType::Hybrid => {
                let mut map = Vec::new();
                for _ in 0..column_count {
                    let tile = input.read_u32()?;
                    if tile as usize >= column_count {
                        return Err(Error::format(format!(
                            "tile {} out of range for {} columns",
                            tile, column_count
                        )));
                    }
                    map.push(tile);
                }
                Layout::hybrid(map).map_err(|e| Error::format(e.to_string()))
            }
        }
    }
}
