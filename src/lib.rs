//! Parallel backtracking search.
//!
//! A problem is described by three callbacks (successor generation, partial
//! validity and acceptance) through the [`Problem`] trait. The [`Engine`]
//! explores the resulting search tree depth-first on a pool of worker
//! threads and collects every accepted solution.
//!
//! ```ignore
//! use backtrack::{EngineConfig, run_search};
//! use backtrack::problems::Permutations;
//!
//! let outcome = run_search(Permutations::new(4, 2), EngineConfig::default(), 4)?;
//! assert_eq!(outcome.solutions.len(), 12);
//! ```

pub mod error;
pub mod problem;
pub mod problems;
pub mod search;

pub use error::{BoxError, Callback, CallbackResult, ConfigError, EngineError};
pub use problem::{FnProblem, PartialSolution, Problem};
pub use search::{
    ControlMessage, Engine, EngineConfig, FrontierMode, SearchOutcome, SearchReport, run_search,
};
