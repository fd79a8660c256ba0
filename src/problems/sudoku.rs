//! Sudoku as a search problem.
//!
//! A partial solution is the sequence of digits written into the empty
//! cells, in a fixed cell order chosen up front: cells with the fewest
//! candidates (given the clues) come first, so the search commits to the
//! most constrained cells before branching on the loose ones.

use crate::error::{BoxError, CallbackResult};
use crate::problem::Problem;
use std::fmt::Write;
use thiserror::Error;

/// Cell characters are read in base 17, so clues run `1`-`9` then `A`-`G`.
const CELL_RADIX: u32 = 17;

/// Errors building a [`Sudoku`] from user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SudokuError {
    #[error("board has {0} cells; expected a square of a square (16, 81, 256)")]
    BadSize(usize),
    #[error("unexpected character {ch:?} at cell {index}")]
    BadCell { index: usize, ch: char },
    #[error("cell {index} holds {value}, larger than the board size {size}")]
    OutOfRange { index: usize, value: u8, size: usize },
}

/// A Sudoku board of side `box_size²`.
#[derive(Debug, Clone)]
pub struct Sudoku {
    size: usize,
    box_size: usize,
    givens: Vec<u8>,
    /// Empty cells in the order they are filled
    order: Vec<usize>,
    givens_consistent: bool,
}

impl Sudoku {
    /// Build a board from cell values in row-major order; 0 marks an empty cell.
    pub fn new(cells: Vec<u8>) -> Result<Self, SudokuError> {
        let size = (1..=16)
            .find(|s| s * s == cells.len())
            .ok_or(SudokuError::BadSize(cells.len()))?;
        let box_size = (1..=4)
            .find(|b| b * b == size)
            .ok_or(SudokuError::BadSize(cells.len()))?;

        if let Some((index, &value)) = cells
            .iter()
            .enumerate()
            .find(|&(_, &v)| usize::from(v) > size)
        {
            return Err(SudokuError::OutOfRange { index, value, size });
        }

        let mut sudoku = Self {
            size,
            box_size,
            givens: cells,
            order: Vec::new(),
            givens_consistent: true,
        };
        let consistent = (0..sudoku.givens.len())
            .filter(|&cell| sudoku.givens[cell] != 0)
            .all(|cell| !sudoku.conflicts(&sudoku.givens, cell));
        sudoku.givens_consistent = consistent;

        let mut order: Vec<(usize, usize)> = (0..sudoku.givens.len())
            .filter(|&cell| sudoku.givens[cell] == 0)
            .map(|cell| (sudoku.candidates(&sudoku.givens, cell).len(), cell))
            .collect();
        order.sort_unstable();
        sudoku.order = order.into_iter().map(|(_, cell)| cell).collect();

        Ok(sudoku)
    }

    /// Parse a board written as one character per cell: `1`-`9` then `A`-`G`
    /// (10 to 16) for clues, `0` or `.` for empty cells. Whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self, SudokuError> {
        let mut cells = Vec::with_capacity(81);
        for ch in text.chars().filter(|c| !c.is_whitespace()) {
            let value = match ch {
                '.' => 0,
                _ => ch.to_digit(CELL_RADIX).ok_or(SudokuError::BadCell {
                    index: cells.len(),
                    ch,
                })? as u8,
            };
            cells.push(value);
        }
        Self::new(cells)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of cells left to fill.
    pub fn empty_cells(&self) -> usize {
        self.order.len()
    }

    /// The board with the digits of `partial` written in.
    pub fn fill(&self, partial: &[u8]) -> Vec<u8> {
        let mut board = self.givens.clone();
        for (&cell, &digit) in self.order.iter().zip(partial) {
            board[cell] = digit;
        }
        board
    }

    /// Render a board as text, one row per line, `.` for empty cells.
    pub fn render(&self, board: &[u8]) -> String {
        let mut out = String::new();
        for row in board.chunks(self.size) {
            for (i, &v) in row.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                match char::from_digit(u32::from(v), CELL_RADIX) {
                    Some('0') => out.push('.'),
                    Some(ch) => out.push(ch.to_ascii_uppercase()),
                    None => {
                        let _ = write!(out, "{v}");
                    }
                }
            }
            out.push('\n');
        }
        out
    }

    /// Cells sharing a row, column or box with `cell`, excluding `cell` itself.
    fn peers(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        let (row, col) = (cell / self.size, cell % self.size);
        let (box_row, box_col) = (
            row / self.box_size * self.box_size,
            col / self.box_size * self.box_size,
        );
        let row_cells = (0..self.size).map(move |c| row * self.size + c);
        let col_cells = (0..self.size).map(move |r| r * self.size + col);
        let box_cells = (0..self.size).map(move |i| {
            (box_row + i / self.box_size) * self.size + box_col + i % self.box_size
        });
        row_cells
            .chain(col_cells)
            .chain(box_cells)
            .filter(move |&other| other != cell)
    }

    fn candidates(&self, board: &[u8], cell: usize) -> Vec<u8> {
        let mut used = vec![false; self.size + 1];
        for peer in self.peers(cell) {
            used[usize::from(board[peer])] = true;
        }
        (1..=self.size as u8)
            .filter(|&d| !used[usize::from(d)])
            .collect()
    }

    fn conflicts(&self, board: &[u8], cell: usize) -> bool {
        let value = board[cell];
        value != 0 && self.peers(cell).any(|peer| board[peer] == value)
    }

    fn check_length(&self, partial: &[u8]) -> Result<(), BoxError> {
        if partial.len() > self.order.len() {
            return Err(format!(
                "partial solution has {} digits but only {} cells are empty",
                partial.len(),
                self.order.len()
            )
            .into());
        }
        Ok(())
    }
}

impl Problem for Sudoku {
    type Choice = u8;

    fn successors(&self, partial: &[u8]) -> CallbackResult<Vec<u8>> {
        self.check_length(partial)?;
        match self.order.get(partial.len()) {
            Some(&cell) => Ok(self.candidates(&self.fill(partial), cell)),
            None => Ok(Vec::new()),
        }
    }

    fn is_valid(&self, candidate: &[u8]) -> CallbackResult<bool> {
        self.check_length(candidate)?;
        if candidate.is_empty() {
            return Ok(self.givens_consistent);
        }
        // Earlier digits were checked when their own prefix was classified
        let cell = self.order[candidate.len() - 1];
        Ok(self.givens_consistent && !self.conflicts(&self.fill(candidate), cell))
    }

    fn is_complete(&self, candidate: &[u8]) -> CallbackResult<bool> {
        Ok(candidate.len() == self.order.len() && self.is_valid(candidate)?)
    }
}
