// crates/wot-reputation/src/capacity.rs
//
// Rank-to-capacity decay for trust trees.
//
// An identity's influence on scores in a tree shrinks with its distance from
// the tree owner. The decay is a table of percentages indexed by rank: ranks
// past the end of the table reuse its last entry, and ranks at or beyond
// `max_rank` have no influence at all.

use serde::Deserialize;

use wot_core::error::WotError;

/// Capacity percentages for ranks 0, 1, 2, ...
pub const DEFAULT_CAPACITIES: [u8; 6] = [100, 40, 16, 6, 2, 1];

/// First rank whose capacity is 0.
pub const DEFAULT_MAX_RANK: u32 = 16;

/// Validated, overridable decay table.
///
/// Deserializes from `{ table = [...], max_rank = N }`, either key optional,
/// and runs the same validation as `new`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCapacityTable")]
pub struct CapacityTable {
    table: Vec<u8>,
    max_rank: u32,
}

#[derive(Debug, Deserialize)]
struct RawCapacityTable {
    #[serde(default = "default_table")]
    table: Vec<u8>,
    #[serde(default = "default_max_rank")]
    max_rank: u32,
}

fn default_table() -> Vec<u8> {
    DEFAULT_CAPACITIES.to_vec()
}

fn default_max_rank() -> u32 {
    DEFAULT_MAX_RANK
}

impl TryFrom<RawCapacityTable> for CapacityTable {
    type Error = WotError;

    fn try_from(raw: RawCapacityTable) -> Result<Self, Self::Error> {
        CapacityTable::new(raw.table, raw.max_rank)
    }
}

impl CapacityTable {
    /// Build a table, rejecting sequences that are empty, do not start at
    /// 100, exceed 100, or ever increase.
    pub fn new(table: Vec<u8>, max_rank: u32) -> Result<Self, WotError> {
        match table.first() {
            None => return Err(WotError::invalid("capacity table", "must not be empty")),
            Some(&first) if first != 100 => {
                return Err(WotError::invalid(
                    "capacity table",
                    format!("rank 0 capacity must be 100, got {}", first),
                ))
            }
            Some(_) => {}
        }
        if let Some(&above) = table.iter().find(|&&capacity| capacity > 100) {
            return Err(WotError::invalid(
                "capacity table",
                format!("capacity {} exceeds 100", above),
            ));
        }
        if let Some(rank) = table.windows(2).position(|pair| pair[1] > pair[0]) {
            return Err(WotError::invalid(
                "capacity table",
                format!("capacity increases from rank {} to {}", rank, rank + 1),
            ));
        }
        if max_rank == 0 {
            return Err(WotError::invalid("max rank", "must be at least 1"));
        }
        Ok(Self { table, max_rank })
    }

    /// Capacity of an identity at `rank`. Rank 0 (the tree owner) is always 100.
    pub fn capacity(&self, rank: u32) -> u8 {
        if rank == 0 {
            return 100;
        }
        if rank >= self.max_rank {
            return 0;
        }
        let index = usize::try_from(rank).unwrap_or(usize::MAX);
        match self.table.get(index) {
            Some(&capacity) => capacity,
            None => self.table.last().copied().unwrap_or(0),
        }
    }

    pub fn max_rank(&self) -> u32 {
        self.max_rank
    }

    pub fn entries(&self) -> &[u8] {
        &self.table
    }
}

impl Default for CapacityTable {
    fn default() -> Self {
        Self {
            table: DEFAULT_CAPACITIES.to_vec(),
            max_rank: DEFAULT_MAX_RANK,
        }
    }
}
