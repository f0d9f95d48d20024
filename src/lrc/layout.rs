//! Code Layout
//!
//! Static group topology of a two-dimensional LRC. Original shards are laid
//! out row-major in a `row_count x row_width` grid; the tail of the last row
//! is padded with implicit zero shards. Each row and each column carries one
//! local parity shard, and a pool of global parity shards (plus the XOR of
//! that pool) protects every original.
//!
//! ```text
//!            col 0   col 1   ...  col h-1 | row parity
//!   row 0  [   0  ] [   1  ]     [  h-1  ] |  n + 0
//!   row 1  [   h  ] [  h+1 ]     [ 2h-1  ] |  n + 1
//!   ...                                    |
//!   ------------------------------------------------
//!   column  n+v+0    n+v+1        n+v+h-1
//!   parity
//!
//!   global parity:   n+v+h .. n+v+h+g
//!   global local:    n+v+h+g   (XOR of the global parities)
//! ```

use reed_solomon_erasure::galois_8;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Index of one shard slot within a code instance
pub type ShardIndex = usize;

/// Upper bound on every index space: shard indices travel in a single byte
pub const MAX_SHARDS: usize = 256;

/// Default shard size in bytes
pub const DEFAULT_SHARD_SIZE: usize = 16384;

/// Row width used once the original count reaches this threshold
const WIDE_ROW_THRESHOLD: usize = 64;

/// Row width for large shard sets
const WIDE_ROW_WIDTH: usize = 8;

/// Role of a shard index within the code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardKind {
    /// Original data shard at grid position (row, column)
    Original { row: usize, column: usize },
    /// Local parity of a row
    RowParity(usize),
    /// Local parity of a column
    ColumnParity(usize),
    /// One of the global parity shards
    GlobalParity(usize),
    /// XOR of all global parity shards
    GlobalLocalParity,
}

impl ShardKind {
    /// Whether this is a parity shard
    pub fn is_parity(&self) -> bool {
        !matches!(self, ShardKind::Original { .. })
    }
}

impl std::fmt::Display for ShardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardKind::Original { row, column } => write!(f, "original({}, {})", row, column),
            ShardKind::RowParity(r) => write!(f, "row-parity({})", r),
            ShardKind::ColumnParity(c) => write!(f, "column-parity({})", c),
            ShardKind::GlobalParity(k) => write!(f, "global-parity({})", k),
            ShardKind::GlobalLocalParity => write!(f, "global-local-parity"),
        }
    }
}

/// Group topology of one code instance.
///
/// A pure function of the original count and the global parity count; the
/// same parameters always produce the same layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLayout {
    original_count: usize,
    row_width: usize,
    row_count: usize,
    global_count: usize,
}

impl CodeLayout {
    /// Build the layout for `original_count` shards protected by
    /// `global_count` global parity shards.
    pub fn new(original_count: usize, global_count: usize) -> Result<Self> {
        if original_count == 0 {
            return Err(Error::InvalidArgument(
                "original_count must be greater than 0".to_string(),
            ));
        }
        if global_count == 0 {
            return Err(Error::InvalidArgument(
                "global_count must be greater than 0".to_string(),
            ));
        }

        let row_width = row_width_for(original_count);
        let row_count = original_count.div_ceil(row_width);
        let layout = Self {
            original_count,
            row_width,
            row_count,
            global_count,
        };

        // Cauchy rows run from the padded count up to padded + 1 + globals
        if layout.padded_count() + global_count + 2 > MAX_SHARDS {
            return Err(Error::InvalidArgument(format!(
                "{} originals with {} global parity shards exceed the GF(256) matrix",
                original_count, global_count
            )));
        }
        if layout.total_shards() > MAX_SHARDS {
            return Err(Error::InvalidArgument(format!(
                "{} total shards exceed the limit of {}",
                layout.total_shards(),
                MAX_SHARDS
            )));
        }

        Ok(layout)
    }

    /// Number of original data shards (n)
    pub fn original_count(&self) -> usize {
        self.original_count
    }

    /// Originals per row (h)
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Number of rows (v)
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of global parity shards (g)
    pub fn global_count(&self) -> usize {
        self.global_count
    }

    /// Grid size including zero padding (h * v)
    pub fn padded_count(&self) -> usize {
        self.row_width * self.row_count
    }

    /// Number of parity shards of every kind
    pub fn parity_count(&self) -> usize {
        self.row_count + self.row_width + self.global_count + 1
    }

    /// Size of the whole index space
    pub fn total_shards(&self) -> usize {
        self.original_count + self.parity_count()
    }

    /// Classify an index
    pub fn kind(&self, index: ShardIndex) -> Result<ShardKind> {
        let n = self.original_count;
        let first_column = n + self.row_count;
        let first_global = first_column + self.row_width;
        let global_local = first_global + self.global_count;

        let kind = if index < n {
            ShardKind::Original {
                row: index / self.row_width,
                column: index % self.row_width,
            }
        } else if index < first_column {
            ShardKind::RowParity(index - n)
        } else if index < first_global {
            ShardKind::ColumnParity(index - first_column)
        } else if index < global_local {
            ShardKind::GlobalParity(index - first_global)
        } else if index == global_local {
            ShardKind::GlobalLocalParity
        } else {
            return Err(Error::InvalidArgument(format!(
                "shard index {} out of range (total {})",
                index,
                self.total_shards()
            )));
        };
        Ok(kind)
    }

    /// Whether `index` names an original shard
    pub fn is_original(&self, index: ShardIndex) -> bool {
        index < self.original_count
    }

    /// Row of an original shard
    pub fn row_of(&self, index: ShardIndex) -> Option<usize> {
        self.is_original(index).then(|| index / self.row_width)
    }

    /// Column of an original shard
    pub fn column_of(&self, index: ShardIndex) -> Option<usize> {
        self.is_original(index).then(|| index % self.row_width)
    }

    /// Index of a row's parity shard
    pub fn row_parity(&self, row: usize) -> ShardIndex {
        self.original_count + row
    }

    /// Index of a column's parity shard
    pub fn column_parity(&self, column: usize) -> ShardIndex {
        self.original_count + self.row_count + column
    }

    /// Index of the k-th global parity shard
    pub fn global_parity(&self, k: usize) -> ShardIndex {
        self.original_count + self.row_count + self.row_width + k
    }

    /// Index of the XOR of the global parity shards
    pub fn global_local_parity(&self) -> ShardIndex {
        self.global_parity(self.global_count)
    }

    /// Original shards of a row, skipping zero padding
    pub fn row_members(&self, row: usize) -> Vec<ShardIndex> {
        let start = row * self.row_width;
        (start..start + self.row_width)
            .take_while(|&i| i < self.original_count)
            .collect()
    }

    /// Original shards of a column, skipping zero padding
    pub fn column_members(&self, column: usize) -> Vec<ShardIndex> {
        (column..self.original_count)
            .step_by(self.row_width)
            .collect()
    }

    /// Row members plus the row parity
    pub fn row_group(&self, row: usize) -> Vec<ShardIndex> {
        let mut group = self.row_members(row);
        group.push(self.row_parity(row));
        group
    }

    /// Column members plus the column parity
    pub fn column_group(&self, column: usize) -> Vec<ShardIndex> {
        let mut group = self.column_members(column);
        group.push(self.column_parity(column));
        group
    }

    /// Global parity shards followed by their local parity
    pub fn global_parities(&self) -> Vec<ShardIndex> {
        (0..=self.global_count)
            .map(|k| self.global_parity(k))
            .collect()
    }

    /// All originals plus the global parity pool
    pub fn global_group(&self) -> Vec<ShardIndex> {
        let mut group: Vec<ShardIndex> = (0..self.original_count).collect();
        group.extend(self.global_parities());
        group
    }

    /// All parity shard indices
    pub fn parities(&self) -> std::ops::Range<ShardIndex> {
        self.original_count..self.total_shards()
    }

    /// Originals referenced by the equation of a parity shard
    pub fn equation_members(&self, parity: ShardIndex) -> Result<Vec<ShardIndex>> {
        match self.kind(parity)? {
            ShardKind::Original { .. } => Err(Error::InvalidArgument(format!(
                "shard {} is not a parity shard",
                parity
            ))),
            ShardKind::RowParity(r) => Ok(self.row_members(r)),
            ShardKind::ColumnParity(c) => Ok(self.column_members(c)),
            ShardKind::GlobalParity(_) | ShardKind::GlobalLocalParity => {
                Ok((0..self.original_count).collect())
            }
        }
    }

    /// Coefficient vector of a parity shard over the originals.
    ///
    /// Entries outside [`equation_members`](Self::equation_members) are zero.
    /// Row parities are plain XOR over their row. Column parities take the
    /// Cauchy row `T+1` restricted to their column, global parities are full
    /// Cauchy rows, and the global local parity is the XOR of the global rows.
    pub fn coefficients(&self, parity: ShardIndex) -> Result<Vec<u8>> {
        let n = self.original_count;
        let coefficients = match self.kind(parity)? {
            ShardKind::Original { .. } => {
                return Err(Error::InvalidArgument(format!(
                    "shard {} is not a parity shard",
                    parity
                )))
            }
            ShardKind::RowParity(r) => {
                let mut row = vec![0u8; n];
                for member in self.row_members(r) {
                    row[member] = 1;
                }
                row
            }
            ShardKind::ColumnParity(c) => {
                let cauchy = self.cauchy_row(self.padded_count() + 1);
                let mut column = vec![0u8; n];
                for member in self.column_members(c) {
                    column[member] = cauchy[member];
                }
                column
            }
            ShardKind::GlobalParity(k) => self.cauchy_row(self.padded_count() + 2 + k),
            ShardKind::GlobalLocalParity => {
                let mut acc = vec![0u8; n];
                for k in 0..self.global_count {
                    let row = self.cauchy_row(self.padded_count() + 2 + k);
                    for (a, c) in acc.iter_mut().zip(row) {
                        *a = galois_8::add(*a, c);
                    }
                }
                acc
            }
        };
        Ok(coefficients)
    }

    /// Cauchy element `(y ^ T) / (x ^ y)` for every original `y`
    fn cauchy_row(&self, x: usize) -> Vec<u8> {
        let padded = self.padded_count();
        (0..self.original_count)
            .map(|y| galois_8::div((y ^ padded) as u8, (x ^ y) as u8))
            .collect()
    }
}

/// Row width: 8 for large shard sets, otherwise the integer square root.
fn row_width_for(original_count: usize) -> usize {
    if original_count >= WIDE_ROW_THRESHOLD {
        return WIDE_ROW_WIDTH;
    }
    let mut width = 1;
    while (width + 1) * (width + 1) <= original_count {
        width += 1;
    }
    width
}
