//! Problem models: the callback contract the engine searches over.
//!
//! A problem is described entirely by three callbacks and a seed set:
//! - `successors` lists the choices that may extend a partial solution
//! - `is_valid` prunes extensions that cannot lead to a solution
//! - `is_complete` recognises an accepted, finished solution
//!
//! Every callback must be deterministic for a given partial solution, since
//! workers re-derive successors independently and never share caches.

use crate::error::{BoxError, Callback, CallbackResult, ConfigError};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An ordered sequence of choices made so far.
///
/// Immutable once constructed; [`PartialSolution::child`] builds the
/// extension with exactly one more choice appended.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartialSolution<C> {
    choices: Vec<C>,
}

impl<C> PartialSolution<C> {
    /// The empty partial solution.
    pub fn root() -> Self {
        Self {
            choices: Vec::new(),
        }
    }

    /// Number of choices made.
    pub fn depth(&self) -> usize {
        self.choices.len()
    }

    pub fn as_slice(&self) -> &[C] {
        &self.choices
    }

    pub fn into_vec(self) -> Vec<C> {
        self.choices
    }
}

impl<C: Clone> PartialSolution<C> {
    /// Extend this partial solution by one choice.
    pub fn child(&self, choice: C) -> Self {
        let mut choices = Vec::with_capacity(self.choices.len() + 1);
        choices.extend_from_slice(&self.choices);
        choices.push(choice);
        Self { choices }
    }
}

impl<C> Default for PartialSolution<C> {
    fn default() -> Self {
        Self::root()
    }
}

impl<C> Deref for PartialSolution<C> {
    type Target = [C];

    fn deref(&self) -> &[C] {
        &self.choices
    }
}

impl<C> From<Vec<C>> for PartialSolution<C> {
    fn from(choices: Vec<C>) -> Self {
        Self { choices }
    }
}

impl<C: fmt::Debug> fmt::Debug for PartialSolution<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.choices).finish()
    }
}

/// A search problem expressed through the three engine callbacks.
pub trait Problem: Send + Sync + 'static {
    /// One choice in a partial solution. Opaque to the engine.
    type Choice: Clone + fmt::Debug + Send + Sync + 'static;

    /// Choices that may be appended to `partial`.
    fn successors(&self, partial: &[Self::Choice]) -> CallbackResult<Vec<Self::Choice>>;

    /// Whether `candidate` can still lead to a solution. `false` prunes it for good.
    fn is_valid(&self, candidate: &[Self::Choice]) -> CallbackResult<bool>;

    /// Whether `candidate` is an accepted solution.
    fn is_complete(&self, candidate: &[Self::Choice]) -> CallbackResult<bool>;

    /// Partial solutions the frontier starts from.
    fn seeds(&self) -> Vec<PartialSolution<Self::Choice>> {
        vec![PartialSolution::root()]
    }
}

impl<P: Problem> Problem for Arc<P> {
    type Choice = P::Choice;

    fn successors(&self, partial: &[Self::Choice]) -> CallbackResult<Vec<Self::Choice>> {
        (**self).successors(partial)
    }

    fn is_valid(&self, candidate: &[Self::Choice]) -> CallbackResult<bool> {
        (**self).is_valid(candidate)
    }

    fn is_complete(&self, candidate: &[Self::Choice]) -> CallbackResult<bool> {
        (**self).is_complete(candidate)
    }

    fn seeds(&self) -> Vec<PartialSolution<Self::Choice>> {
        (**self).seeds()
    }
}

type SuccessorFn<C> = Box<dyn Fn(&[C]) -> Result<Vec<C>, BoxError> + Send + Sync>;
type PredicateFn<C> = Box<dyn Fn(&[C]) -> Result<bool, BoxError> + Send + Sync>;

/// A [`Problem`] assembled from closures.
pub struct FnProblem<C> {
    successors: SuccessorFn<C>,
    is_valid: PredicateFn<C>,
    is_complete: PredicateFn<C>,
    seeds: Vec<PartialSolution<C>>,
}

impl<C> FnProblem<C> {
    pub fn builder() -> FnProblemBuilder<C> {
        FnProblemBuilder::default()
    }
}

impl<C> fmt::Debug for FnProblem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProblem")
            .field("seeds", &self.seeds.len())
            .finish_non_exhaustive()
    }
}

impl<C> Problem for FnProblem<C>
where
    C: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Choice = C;

    fn successors(&self, partial: &[C]) -> CallbackResult<Vec<C>> {
        (self.successors)(partial)
    }

    fn is_valid(&self, candidate: &[C]) -> CallbackResult<bool> {
        (self.is_valid)(candidate)
    }

    fn is_complete(&self, candidate: &[C]) -> CallbackResult<bool> {
        (self.is_complete)(candidate)
    }

    fn seeds(&self) -> Vec<PartialSolution<C>> {
        self.seeds.clone()
    }
}

/// Builder for [`FnProblem`]. All three callbacks are required.
pub struct FnProblemBuilder<C> {
    successors: Option<SuccessorFn<C>>,
    is_valid: Option<PredicateFn<C>>,
    is_complete: Option<PredicateFn<C>>,
    seeds: Option<Vec<PartialSolution<C>>>,
}

impl<C> Default for FnProblemBuilder<C> {
    fn default() -> Self {
        Self {
            successors: None,
            is_valid: None,
            is_complete: None,
            seeds: None,
        }
    }
}

impl<C> FnProblemBuilder<C> {
    pub fn successors<F>(mut self, f: F) -> Self
    where
        F: Fn(&[C]) -> Result<Vec<C>, BoxError> + Send + Sync + 'static,
    {
        self.successors = Some(Box::new(f));
        self
    }

    pub fn is_valid<F>(mut self, f: F) -> Self
    where
        F: Fn(&[C]) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.is_valid = Some(Box::new(f));
        self
    }

    pub fn is_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&[C]) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.is_complete = Some(Box::new(f));
        self
    }

    /// Starting partial solutions (defaults to the single empty one).
    pub fn seeds(mut self, seeds: Vec<PartialSolution<C>>) -> Self {
        self.seeds = Some(seeds);
        self
    }

    pub fn build(self) -> Result<FnProblem<C>, ConfigError> {
        let successors = self
            .successors
            .ok_or(ConfigError::MissingCallback(Callback::Successors))?;
        let is_valid = self
            .is_valid
            .ok_or(ConfigError::MissingCallback(Callback::IsValid))?;
        let is_complete = self
            .is_complete
            .ok_or(ConfigError::MissingCallback(Callback::IsComplete))?;

        Ok(FnProblem {
            successors,
            is_valid,
            is_complete,
            seeds: self.seeds.unwrap_or_else(|| vec![PartialSolution::root()]),
        })
    }
}
