use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::error::EditError;

/// Default maze height
pub const DEFAULT_ROWS: usize = 15;
/// Default maze width
pub const DEFAULT_COLS: usize = 25;
/// Probability an empty cell becomes a wall when a random maze is generated
pub const DEFAULT_WALL_DENSITY: f64 = 0.3;

/// What occupies a grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Empty,
    Wall,
    Start,
    End,
    Visited,
    Path,
    Current,
}

impl CellKind {
    /// Marks left behind by a search run
    pub fn is_search_mark(self) -> bool {
        matches!(self, CellKind::Visited | CellKind::Path | CellKind::Current)
    }
}

/// Row/column coordinates of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Rectangular maze with exactly one start and one end cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<CellKind>,
    start: Cell,
    end: Cell,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS, DEFAULT_COLS, Cell::new(7, 2), Cell::new(7, 22))
    }
}

impl Grid {
    /// Creates an empty grid. Out-of-range endpoints are pulled into the grid and
    /// a coinciding end is moved to the opposite corner.
    pub fn new(rows: usize, cols: usize, start: Cell, end: Cell) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(2);
        let fit = |cell: Cell| Cell::new(cell.row.min(rows - 1), cell.col.min(cols - 1));
        let start = fit(start);
        let mut end = fit(end);
        if end == start {
            end = if start == Cell::new(rows - 1, cols - 1) {
                Cell::new(0, 0)
            } else {
                Cell::new(rows - 1, cols - 1)
            };
        }

        let mut grid = Self {
            rows,
            cols,
            cells: vec![CellKind::Empty; rows * cols],
            start,
            end,
        };
        grid.set(start, CellKind::Start);
        grid.set(end, CellKind::End);
        grid
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn start(&self) -> Cell {
        self.start
    }

    pub fn end(&self) -> Cell {
        self.end
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.rows && cell.col < self.cols
    }

    /// Kind of `cell`; cells outside the grid read as walls
    pub fn kind(&self, cell: Cell) -> CellKind {
        if self.contains(cell) {
            self.cells[cell.row * self.cols + cell.col]
        } else {
            CellKind::Wall
        }
    }

    /// Overwrites a cell kind. Executors use this for search marks only.
    pub fn set(&mut self, cell: Cell, kind: CellKind) {
        if self.contains(cell) {
            self.cells[cell.row * self.cols + cell.col] = kind;
        }
    }

    pub fn is_passable(&self, cell: Cell) -> bool {
        self.contains(cell) && self.kind(cell) != CellKind::Wall
    }

    /// In-grid, non-wall neighbours in the order right, down, left, up
    pub fn open_neighbors(&self, cell: Cell) -> Vec<Cell> {
        let mut out = Vec::with_capacity(4);
        let candidates = [
            Some(Cell::new(cell.row, cell.col + 1)),
            Some(Cell::new(cell.row + 1, cell.col)),
            cell.col.checked_sub(1).map(|c| Cell::new(cell.row, c)),
            cell.row.checked_sub(1).map(|r| Cell::new(r, cell.col)),
        ];
        for next in candidates.into_iter().flatten() {
            if self.is_passable(next) {
                out.push(next);
            }
        }
        out
    }

    pub fn count(&self, kind: CellKind) -> usize {
        self.cells.iter().filter(|k| **k == kind).count()
    }

    /// Turns visited/path/current marks back into empty cells
    pub fn clear_search(&mut self) {
        for kind in &mut self.cells {
            if kind.is_search_mark() {
                *kind = CellKind::Empty;
            }
        }
    }

    /// Flips a cell between wall and empty. Start and end cannot become walls.
    pub fn toggle_wall(&mut self, cell: Cell) -> Result<(), EditError> {
        let kind = self.editable(cell)?;
        let next = if kind == CellKind::Wall {
            CellKind::Empty
        } else {
            CellKind::Wall
        };
        self.set(cell, next);
        Ok(())
    }

    /// Sets a wall regardless of the current state (drag painting)
    pub fn paint_wall(&mut self, cell: Cell) -> Result<(), EditError> {
        self.editable(cell)?;
        self.set(cell, CellKind::Wall);
        Ok(())
    }

    /// Moves the start marker, clearing the previous start cell
    pub fn place_start(&mut self, cell: Cell) -> Result<(), EditError> {
        self.require_free_endpoint(cell, self.end)?;
        self.set(self.start, CellKind::Empty);
        self.start = cell;
        self.set(cell, CellKind::Start);
        Ok(())
    }

    /// Moves the end marker, clearing the previous end cell
    pub fn place_end(&mut self, cell: Cell) -> Result<(), EditError> {
        self.require_free_endpoint(cell, self.start)?;
        self.set(self.end, CellKind::Empty);
        self.end = cell;
        self.set(cell, CellKind::End);
        Ok(())
    }

    /// Clears the grid down to start/end and scatters walls over empty cells
    pub fn randomize_walls<R: Rng>(&mut self, density: f64, rng: &mut R) -> Result<(), EditError> {
        if !(0.0..=1.0).contains(&density) {
            return Err(EditError::InvalidDensity(density));
        }
        for kind in &mut self.cells {
            *kind = match *kind {
                CellKind::Start | CellKind::End => *kind,
                _ if rng.gen_bool(density) => CellKind::Wall,
                _ => CellKind::Empty,
            };
        }
        Ok(())
    }

    fn editable(&self, cell: Cell) -> Result<CellKind, EditError> {
        if !self.contains(cell) {
            return Err(EditError::OutOfGrid(cell));
        }
        match self.kind(cell) {
            CellKind::Start | CellKind::End => Err(EditError::CellOccupied(cell)),
            kind => Ok(kind),
        }
    }

    fn require_free_endpoint(&self, cell: Cell, other: Cell) -> Result<(), EditError> {
        if !self.contains(cell) {
            return Err(EditError::OutOfGrid(cell));
        }
        if cell == other || self.kind(cell) == CellKind::Wall {
            return Err(EditError::CellOccupied(cell));
        }
        Ok(())
    }
}
