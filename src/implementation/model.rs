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

//! This module provides the model handle: the owner of exactly one solver
//! engine, exposing its lifecycle, the coercing parameter store, the two
//! solve modes (batch and interactive), and deep duplication.

use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use crate::implementation::iter::{IterEvent, IterSession, WaitOutcome};
use crate::implementation::params::{coerce, CoercionFailure, ParamCast};
use crate::implementation::engine::KnapsackEngine;
use crate::{
    Brancher, Decision, Engine, Interrupter, NoBranching, ParamError, ParamKind, ParamValue,
    ProblemLoadError, SolveStats, SolverError, Stage, Variable,
};

/// The errors that can pop out of a model handle. Parameter store and engine
/// errors propagate unchanged (wrapped, never swallowed).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("failed to load problem: {0}")]
    ProblemLoad(#[from] ProblemLoadError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// An interactive solve session is already open on this model; at most
    /// one may be open at a time
    #[error("an interactive solve session is already open on this model")]
    SessionAlreadyOpen,
    /// The operation is not legal in the current lifecycle state
    #[error("illegal state: {0}")]
    IllegalState(String),
}

/// The engine duplication primitive is not reentrant across concurrent
/// solver contexts, so every deep copy in the process funnels through this
/// lock. It is only ever held for the duration of one `Engine::duplicate`
/// call; all other model operations are independent across distinct models.
static MODEL_COPY_LOCK: Mutex<()> = Mutex::new(());

/// A stateful handle over one solver engine: the only interface to the
/// engine in this library, with higher level methods tailored for episode
/// control. The handle owns the engine exclusively; while an interactive
/// session is open the engine lives on the session's worker thread and every
/// engine-touching operation reports `IllegalState` until the session
/// terminates and ownership transfers back.
pub struct Model {
    engine: Option<Box<dyn Engine>>,
    branch_rule: Option<Box<dyn Brancher>>,
    session: Option<IterSession>,
    iter_done: bool,
}
impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}
impl Model {
    /// Creates a model hosting a freshly initialized built-in engine
    /// (stage `Init`, all parameters at their defaults).
    pub fn new() -> Self {
        Self::with_engine(Box::new(KnapsackEngine::new()))
    }
    /// Creates a model hosting the given engine. This is the hook model
    /// factories use to customize what an episode starts from.
    pub fn with_engine(engine: Box<dyn Engine>) -> Self {
        Self { engine: Some(engine), branch_rule: None, session: None, iter_done: false }
    }

    fn lent() -> ModelError {
        ModelError::IllegalState("the solver is lent to an interactive session".to_string())
    }
    fn engine(&self) -> Result<&dyn Engine, ModelError> {
        self.engine.as_deref().ok_or_else(Self::lent)
    }
    fn engine_mut(&mut self) -> Result<&mut (dyn Engine + 'static), ModelError> {
        self.engine.as_deref_mut().ok_or_else(Self::lent)
    }

    /// The lifecycle stage the engine reports. While the engine is lent to
    /// an interactive session, the model is by definition solving.
    pub fn stage(&self) -> Stage {
        self.engine.as_deref().map(|e| e.stage()).unwrap_or(Stage::Solving)
    }
    /// True iff the last solve ran to its natural end (stage `Solved`). An
    /// interrupted solve leaves the stage at `Solving`, which is how callers
    /// can tell the difference.
    pub fn is_solved(&self) -> bool {
        self.stage() == Stage::Solved
    }

    // ------------------------------------------------------------------------
    // --- PARAMETER STORE ----------------------------------------------------
    // ------------------------------------------------------------------------

    /// The kind of the named parameter.
    pub fn param_kind(&self, name: &str) -> Result<ParamKind, ModelError> {
        Ok(self.engine()?.param_kind(name)?)
    }

    /// Sets a parameter with automatic conversion. Often, it is not required
    /// to know the exact type of a parameter to set its value (for instance
    /// when setting it to zero): this method does its best to convert the
    /// given value to the required kind, and fails (never truncates) when
    /// the value does not survive the conversion.
    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<(), ModelError> {
        let value = value.into();
        let engine = self.engine_mut()?;
        let kind = engine.param_kind(name)?;
        let coerced = coerce(&value, kind).map_err(|failure| match failure {
            CoercionFailure::Mismatch => {
                ParamError::TypeMismatch { name: name.to_string(), value: value.clone() }
            }
            CoercionFailure::Narrowing => {
                ParamError::NarrowingError { name: name.to_string(), value: value.clone() }
            }
        })?;
        debug!(parameter = name, value = %value, ?kind, "setting parameter");
        engine.set_param_raw(name, coerced)?;
        Ok(())
    }

    /// Reads the exact stored value of a parameter.
    pub fn get_param(&self, name: &str) -> Result<ParamValue, ModelError> {
        Ok(self.engine()?.get_param_raw(name)?)
    }

    /// Reads a parameter converted to the requested native type, with the
    /// same conversion rules (and failures) as `set_param`.
    pub fn get_param_as<T: ParamCast>(&self, name: &str) -> Result<T, ModelError> {
        let raw = self.engine()?.get_param_raw(name)?;
        let coerced = coerce(&raw, T::KIND).map_err(|failure| match failure {
            CoercionFailure::Mismatch => {
                ParamError::TypeMismatch { name: name.to_string(), value: raw.clone() }
            }
            CoercionFailure::Narrowing => {
                ParamError::NarrowingError { name: name.to_string(), value: raw.clone() }
            }
        })?;
        match T::from_exact(&coerced) {
            Some(value) => Ok(value),
            None => Err(ParamError::TypeMismatch { name: name.to_string(), value: coerced }.into()),
        }
    }

    /// Sets a parameter without any conversion: the native type of the value
    /// must exactly match the kind of the parameter.
    pub fn set_param_explicit<T: ParamCast>(&mut self, name: &str, value: T) -> Result<(), ModelError> {
        let engine = self.engine_mut()?;
        let kind = engine.param_kind(name)?;
        if kind != T::KIND {
            return Err(ParamError::TypeMismatch { name: name.to_string(), value: value.into() }.into());
        }
        engine.set_param_raw(name, value.into())?;
        Ok(())
    }

    /// Reads a parameter without any conversion: the requested native type
    /// must exactly match the kind of the parameter.
    pub fn get_param_explicit<T: ParamCast>(&self, name: &str) -> Result<T, ModelError> {
        let raw = self.engine()?.get_param_raw(name)?;
        match T::from_exact(&raw) {
            Some(value) => Ok(value),
            None => Err(ParamError::TypeMismatch { name: name.to_string(), value: raw }.into()),
        }
    }

    // ------------------------------------------------------------------------
    // --- SEEDING ------------------------------------------------------------
    // ------------------------------------------------------------------------

    /// The current random seed shift of the model.
    pub fn seed(&self) -> Result<i32, ModelError> {
        self.get_param_as::<i32>("randomization/randomseedshift")
    }
    /// Sets the model random seeds: the shift applied to all random seeds of
    /// the engine and the problem permutation seed, written as a pair. Both
    /// parameters are validated before either is written so the pair is
    /// applied atomically or not at all.
    pub fn set_seed(&mut self, seed: i32) -> Result<(), ModelError> {
        let engine = self.engine_mut()?;
        engine.param_kind("randomization/randomseedshift")?;
        engine.param_kind("randomization/permutationseed")?;
        engine.set_param_raw("randomization/randomseedshift", ParamValue::Int(seed))?;
        engine.set_param_raw("randomization/permutationseed", ParamValue::Int(seed))?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // --- PROBLEM AND BATCH SOLVE --------------------------------------------
    // ------------------------------------------------------------------------

    /// Parses and installs a problem instance, autodetecting the format from
    /// the file extension. Legal from the `Init` or `Problem` stages only.
    /// Note: the problem permutation (if any) happens here, so permutation
    /// parameters and seeds must be set *before* loading the instance.
    pub fn load_problem(&mut self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let engine = self.engine_mut()?;
        match engine.stage() {
            Stage::Init | Stage::Problem => {}
            stage => {
                return Err(ModelError::IllegalState(format!(
                    "cannot load a problem from stage {stage:?}"
                )))
            }
        }
        debug!(path = %path.display(), "loading problem");
        engine.read_problem(path)?;
        Ok(())
    }

    /// Installs the branching rule consulted by batch solves. The rule stays
    /// installed across solves until replaced.
    pub fn set_branch_rule(&mut self, rule: impl Brancher + 'static) {
        self.branch_rule = Some(Box::new(rule));
    }

    /// Transforms, presolves and solves the loaded problem, blocking the
    /// calling thread for the whole run. The installed branching rule (if
    /// any) is consulted at every decision point.
    pub fn solve(&mut self) -> Result<(), ModelError> {
        let engine = self.engine.as_deref_mut().ok_or_else(Self::lent)?;
        if engine.stage() != Stage::Problem {
            return Err(ModelError::IllegalState(format!(
                "cannot solve from stage {:?}",
                engine.stage()
            )));
        }
        engine.interrupter().clear();
        match self.branch_rule.as_deref_mut() {
            Some(rule) => engine.solve(rule)?,
            None => engine.solve(&mut NoBranching)?,
        }
        Ok(())
    }

    /// A handle to request early termination of an in-progress batch solve.
    /// Obtain it *before* calling `solve` and trigger it from any thread;
    /// the engine honors it with at most one node of delay.
    pub fn interrupter(&self) -> Result<Interrupter, ModelError> {
        Ok(self.engine()?.interrupter())
    }
    /// Requests early termination of an in-progress solve. Shorthand for
    /// triggering the `interrupter` handle.
    pub fn interrupt(&self) -> Result<(), ModelError> {
        self.interrupter()?.interrupt();
        Ok(())
    }

    /// The run statistics of the last (or ongoing) solve.
    pub fn stats(&self) -> Result<SolveStats, ModelError> {
        Ok(self.engine()?.stats())
    }
    /// The objective value of the best solution found so far, if any.
    pub fn best_value(&self) -> Result<Option<i64>, ModelError> {
        Ok(self.engine()?.best_value())
    }
    /// The best solution found so far, if any.
    pub fn best_solution(&self) -> Result<Option<Vec<Decision>>, ModelError> {
        Ok(self.engine()?.best_solution())
    }

    // ------------------------------------------------------------------------
    // --- DUPLICATION --------------------------------------------------------
    // ------------------------------------------------------------------------

    /// Deep copies the model. Because the underlying duplication primitive
    /// is not reentrant, deep copies are serialized process-wide behind
    /// `MODEL_COPY_LOCK`; a model which has not loaded any problem yet takes
    /// the cheap path (a fresh context needs no actual state copy, hence no
    /// lock). The copy is fully independent: mutating it never affects the
    /// source. The installed branch rule is not part of the engine state and
    /// does not travel with the copy.
    pub fn duplicate(&self) -> Result<Model, ModelError> {
        let engine = self.engine()?;
        let copy = if engine.stage() == Stage::Init {
            engine.duplicate()
        } else {
            let _guard = MODEL_COPY_LOCK.lock();
            engine.duplicate()
        };
        Ok(Model::with_engine(copy))
    }

    // ------------------------------------------------------------------------
    // --- INTERACTIVE SOLVE --------------------------------------------------
    // ------------------------------------------------------------------------

    /// Starts an interactive solve session: the engine moves onto a
    /// dedicated worker thread which runs the blocking solve, and every
    /// decision point suspends the worker until a decision is supplied
    /// through `solve_iter_branch` (or the session is stopped). This method
    /// returns immediately; use `solve_iter_wait` to reach the first
    /// suspension point.
    ///
    /// At most one session may be open per model: starting a second one
    /// fails with `SessionAlreadyOpen`.
    pub fn solve_iter(&mut self) -> Result<(), ModelError> {
        if self.session.is_some() {
            return Err(ModelError::SessionAlreadyOpen);
        }
        let engine = self.engine_mut()?;
        if engine.stage() != Stage::Problem {
            return Err(ModelError::IllegalState(format!(
                "cannot solve from stage {:?}",
                engine.stage()
            )));
        }
        let engine = match self.engine.take() {
            Some(engine) => engine,
            None => return Err(Self::lent()),
        };
        engine.interrupter().clear();
        self.iter_done = false;
        self.session = Some(IterSession::start(engine));
        Ok(())
    }

    /// Blocks until the session reaches its next suspension point or
    /// terminates. Returns the decision context of the suspension point, or
    /// `Done` once the solve is over (at which point the engine is owned by
    /// the model again and its statistics can be queried).
    pub fn solve_iter_wait(&mut self) -> Result<IterEvent, ModelError> {
        let outcome = {
            let session = self.session.as_ref().ok_or_else(Self::no_session)?;
            session.wait()
        };
        match outcome {
            WaitOutcome::Suspended(query) => Ok(IterEvent::Suspended(query)),
            WaitOutcome::Terminal => {
                self.finish_session()?;
                Ok(IterEvent::Done)
            }
        }
    }

    /// Supplies the branching decision the suspended callback is waiting
    /// for. This is a non-blocking handoff: the worker picks the decision up
    /// and resumes the solve. Legal only while the session is awaiting a
    /// decision; calling it in any other state is an error, never a silent
    /// no-op.
    pub fn solve_iter_branch(&mut self, choice: Variable) -> Result<(), ModelError> {
        let session = self.session.as_ref().ok_or_else(Self::no_session)?;
        session.deliver(crate::BranchDirective::Branch(choice))
    }

    /// Stops the open session within bounded time: a worker parked at a
    /// decision point is unparked with a stop message (the engine then winds
    /// down with whatever partial result it has), a running worker is
    /// interrupted. Idempotent once the session is over; calling it with no
    /// session open is a no-op.
    pub fn solve_iter_stop(&mut self) -> Result<(), ModelError> {
        if self.session.is_none() {
            return Ok(());
        }
        if let Some(session) = self.session.as_mut() {
            session.shutdown();
        }
        self.finish_session()
    }

    /// Non-blocking poll: true iff the session reached a terminal state
    /// (completed, stopped or failed). Remains true after the session's
    /// resources have been reclaimed.
    pub fn solve_iter_is_done(&self) -> bool {
        match self.session.as_ref() {
            Some(session) => session.is_done(),
            None => self.iter_done,
        }
    }

    fn no_session() -> ModelError {
        ModelError::IllegalState("no interactive solve session is open".to_string())
    }

    /// Tears the session down, takes the engine back, and resurfaces any
    /// failure captured on the worker side.
    fn finish_session(&mut self) -> Result<(), ModelError> {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
            let (engine, failure) = session.take_parts();
            self.engine = engine;
            self.iter_done = true;
            if let Some(failure) = failure {
                return Err(ModelError::Solver(failure));
            }
        }
        Ok(())
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_model {
    use std::path::PathBuf;

    use crate::implementation::model::Model;
    use crate::{ModelError, ParamError, ParamValue, ProblemLoadError, Stage};

    fn locate(id: &str) -> PathBuf {
        PathBuf::new()
            .join(env!("CARGO_MANIFEST_DIR"))
            .join("resources/knapsack/")
            .join(id)
    }

    #[test]
    fn a_fresh_model_is_at_stage_init() {
        let model = Model::new();
        assert_eq!(Stage::Init, model.stage());
        assert!(!model.is_solved());
    }

    #[test]
    fn parameters_are_set_with_automatic_conversion() {
        let mut model = Model::new();
        // an i32 converts into the LongInt parameter
        model.set_param("limits/totalnodes", 1_i32).unwrap();
        assert_eq!(ParamValue::LongInt(1), model.get_param("limits/totalnodes").unwrap());
        // and reads back into whichever numeric type fits
        assert_eq!(1_i32, model.get_param_as::<i32>("limits/totalnodes").unwrap());
        assert_eq!(1.0, model.get_param_as::<f64>("limits/totalnodes").unwrap());
    }

    #[test]
    fn a_fractional_real_does_not_narrow_into_an_int_parameter() {
        let mut model = Model::new();
        let result = model.set_param("randomization/randomseedshift", 2.5);
        assert!(matches!(
            result,
            Err(ModelError::Param(ParamError::NarrowingError { .. }))
        ));
        // but an integral real does
        model.set_param("randomization/randomseedshift", 2.0).unwrap();
        assert_eq!(2, model.get_param_as::<i32>("randomization/randomseedshift").unwrap());
    }

    #[test]
    fn an_unknown_parameter_is_reported_by_name() {
        let model = Model::new();
        match model.get_param("branching/does_not_exist") {
            Err(ModelError::Param(ParamError::UnknownParameter { name })) => {
                assert_eq!("branching/does_not_exist", name);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn explicit_accessors_demand_the_exact_native_type() {
        let mut model = Model::new();
        // lp/iterlim is a LongInt parameter
        assert!(model.set_param_explicit::<i64>("lp/iterlim", 0).is_ok());
        assert!(matches!(
            model.set_param_explicit::<i32>("lp/iterlim", 0),
            Err(ModelError::Param(ParamError::TypeMismatch { .. }))
        ));
        assert_eq!(0_i64, model.get_param_explicit::<i64>("lp/iterlim").unwrap());
        assert!(matches!(
            model.get_param_explicit::<i32>("lp/iterlim"),
            Err(ModelError::Param(ParamError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn the_seed_pair_is_written_together() {
        let mut model = Model::new();
        model.set_seed(7).unwrap();
        assert_eq!(7, model.seed().unwrap());
        assert_eq!(7, model.get_param_as::<i32>("randomization/permutationseed").unwrap());
    }

    #[test]
    fn loading_an_unsupported_format_fails() {
        let mut model = Model::new();
        let result = model.load_problem(locate("f1.lp"));
        assert!(matches!(
            result,
            Err(ModelError::ProblemLoad(ProblemLoadError::UnsupportedFormat(_)))
        ));
    }

    #[test]
    fn loading_and_solving_reaches_the_known_optimum() {
        let mut model = Model::new();
        model.load_problem(locate("f1.kp")).unwrap();
        assert_eq!(Stage::Problem, model.stage());
        model.solve().unwrap();
        assert!(model.is_solved());
        assert_eq!(Some(220), model.best_value().unwrap());
    }

    #[test]
    fn solving_without_a_problem_is_an_illegal_state() {
        let mut model = Model::new();
        assert!(matches!(model.solve(), Err(ModelError::IllegalState(_))));
    }

    #[test]
    fn an_interrupted_solve_is_not_solved() {
        let mut model = Model::new();
        model.load_problem(locate("f2.kp")).unwrap();
        // the flag is polled per node, so even a pre-armed interrupt works;
        // note that Model::solve rearms the handle, hence the post-arm here
        let interrupter = model.interrupter().unwrap();
        model.set_branch_rule(move |_: &crate::BranchQuery| {
            interrupter.interrupt();
            crate::BranchDirective::DidNotRun
        });
        model.solve().unwrap();
        assert!(!model.is_solved());
        assert_eq!(Stage::Solving, model.stage());
    }

    #[test]
    fn duplicating_a_fresh_model_takes_the_cheap_path() {
        let model = Model::new();
        let copy = model.duplicate().unwrap();
        assert_eq!(Stage::Init, copy.stage());
    }

    #[test]
    fn duplicating_a_loaded_model_yields_an_independent_copy() {
        let mut model = Model::new();
        model.set_param("lp/iterlim", 5_i64).unwrap();
        model.load_problem(locate("f1.kp")).unwrap();

        let mut copy = model.duplicate().unwrap();
        assert_eq!(Stage::Problem, copy.stage());
        assert_eq!(5_i64, copy.get_param_as::<i64>("lp/iterlim").unwrap());

        copy.set_param("lp/iterlim", 9_i64).unwrap();
        assert_eq!(5_i64, model.get_param_as::<i64>("lp/iterlim").unwrap());

        // both copies solve independently to the same optimum
        copy.solve().unwrap();
        assert!(copy.is_solved());
        assert_eq!(Stage::Problem, model.stage());
    }
}
