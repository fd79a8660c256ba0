//! Ready-made problem models used by the CLI and the tests.

pub mod permutations;
pub mod sudoku;

pub use permutations::Permutations;
pub use sudoku::{Sudoku, SudokuError};
