// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module defines the `Engine` trait: the contract between the control
//! layer and the opaque optimization engine it steers. It also defines the
//! `Brancher` callback trait and the `Interrupter` handle used to request
//! early termination of an in-progress solve from another thread.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    BranchDirective, BranchQuery, Decision, ParamError, ParamKind, ParamValue, ProblemLoadError,
    SolveStats, SolverError, Stage,
};

/// This trait defines a branching callback: a function the engine invokes
/// synchronously, on its own call stack, at each branching point to choose
/// how to proceed.
///
/// # Important
/// The engine treats the callback boundary as non-throwing: a panic raised
/// inside `choose` is caught at the boundary and converted into a
/// `SolverError` which aborts the solve cleanly. Nothing ever unwinds
/// through the engine.
pub trait Brancher: Send {
    /// Decides what to do at the decision point described by `query`.
    fn choose(&mut self, query: &BranchQuery) -> BranchDirective;
}
/// The simplest and most natural callback implementation is to simply use
/// a closure.
impl<F: FnMut(&BranchQuery) -> BranchDirective + Send> Brancher for F {
    fn choose(&mut self, query: &BranchQuery) -> BranchDirective {
        self(query)
    }
}

/// A branching callback that never takes over: the engine always applies its
/// own default rule. This is what a batch solve uses when no branch rule has
/// been installed on the model.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoBranching;
impl Brancher for NoBranching {
    fn choose(&mut self, _query: &BranchQuery) -> BranchDirective {
        BranchDirective::DidNotRun
    }
}

/// A cloneable handle to request early termination of an in-progress solve.
/// It is safe to trigger from any thread; the engine polls the flag at least
/// once per node, so there is no immediacy guarantee beyond that.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}
impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }
    /// Requests that the ongoing solve terminates early.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
    /// Tells whether an interruption has been requested (engines poll this).
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
    /// Rearms the handle before a fresh solve.
    pub(crate) fn clear(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// This is the engine abstraction: one value of a type implementing `Engine`
/// is one opaque solver context (problem, search state, statistics). The
/// control layer only ever talks to the engine through this trait, which is
/// why a model handle can host any engine a model factory decides to build.
///
/// Engines are `Send` so that the interactive solve bridge can move them
/// onto its worker thread for the duration of a session.
pub trait Engine: Send {
    /// The lifecycle phase the engine currently is in.
    fn stage(&self) -> Stage;

    /// The kind of the named parameter, or `UnknownParameter`.
    fn param_kind(&self, name: &str) -> Result<ParamKind, ParamError>;
    /// Reads the exact stored value of the named parameter. No conversion
    /// whatsoever happens here; the coercion layer lives in the model handle.
    fn get_param_raw(&self, name: &str) -> Result<ParamValue, ParamError>;
    /// Writes the named parameter. The value kind must exactly match the
    /// parameter kind (`TypeMismatch` otherwise). Every successful write is
    /// observable by the engine on its next read: there is no buffering.
    fn set_param_raw(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError>;

    /// Parses and installs a problem instance, autodetecting the format from
    /// the file extension. Any permutation governed by the engine's
    /// permutation-seed parameter is applied now, which is why seeds must be
    /// written *before* the problem is loaded.
    fn read_problem(&mut self, path: &Path) -> Result<(), ProblemLoadError>;

    /// Transforms, presolves and solves the loaded problem, consulting the
    /// given branching callback at every decision point. This call blocks
    /// the calling thread for the whole run. When the interrupter fires, the
    /// engine returns early and its stage remains `Solving` (which is how
    /// callers can tell an interrupted run from a completed one).
    fn solve(&mut self, brancher: &mut dyn Brancher) -> Result<(), SolverError>;

    /// A handle to request early termination of an in-progress `solve` from
    /// another thread.
    fn interrupter(&self) -> Interrupter;

    /// Deep copies the full engine state into an independent engine.
    ///
    /// # Warning
    /// The duplication primitive is not reentrant across concurrent solver
    /// contexts: process-wide, at most one duplication may run at a time.
    /// This serialization is *not* enforced here; it is the model handle's
    /// job (see the model's duplication lock).
    fn duplicate(&self) -> Box<dyn Engine>;

    /// The run statistics of the last (or ongoing) solve.
    fn stats(&self) -> SolveStats;
    /// The objective value of the best solution found so far, if any.
    fn best_value(&self) -> Option<i64>;
    /// The best solution found so far, if any.
    fn best_solution(&self) -> Option<Vec<Decision>>;
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_interrupter {
    use crate::Interrupter;

    #[test]
    fn a_fresh_interrupter_is_not_triggered() {
        let it = Interrupter::new();
        assert!(!it.is_interrupted());
    }
    #[test]
    fn clones_share_the_same_flag() {
        let it = Interrupter::new();
        let other = it.clone();
        other.interrupt();
        assert!(it.is_interrupted());
    }
    #[test]
    fn clear_rearms_the_flag() {
        let it = Interrupter::new();
        it.interrupt();
        it.clear();
        assert!(!it.is_interrupted());
    }
}
