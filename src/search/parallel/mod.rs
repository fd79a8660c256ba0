//! Parallel execution of the backtracking search.
//!
//! # Architecture
//!
//! The parallel search system consists of:
//! - A **frontier**: a shared LIFO stack of partial solutions awaiting expansion
//! - A **solution sink** that collects accepted solutions from every worker
//! - **Workers**, one thread each, that pop, expand and classify partial solutions
//! - A **control channel** per worker plus a shared stop flag for terminate,
//!   pause, resume and probe signals
//! - The **engine** (orchestrator) that seeds the frontier and owns the pool
//!
//! # Example
//!
//! ```ignore
//! use backtrack::search::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(problem, EngineConfig::default().with_greedy(true))?;
//! engine.start(4)?;
//! let report = engine.join()?;
//! let solutions = engine.solutions().drain();
//! ```

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod frontier;
pub mod solutions;
mod worker;

pub use channel::{ControlMessage, ProbeAck};
pub use config::{EngineConfig, FrontierMode};
pub use coordinator::{Engine, SearchOutcome, run_search};
pub use frontier::Frontier;
pub use solutions::SolutionSink;
