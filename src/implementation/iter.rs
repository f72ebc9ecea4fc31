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

//! This module provides the interactive solve bridge: the machinery that
//! turns the engine's blocking, callback-driven `solve` into a suspendable,
//! stepwise protocol. The blocking call runs on a dedicated worker thread;
//! the branching callback installed on that worker does not return
//! immediately when the engine invokes it. Instead it publishes the decision
//! context to the controller side and parks the worker until a decision (or
//! a stop message) is supplied. Controller and worker synchronize through a
//! single-slot rendezvous: a mutex-guarded protocol state and a monitor to
//! park whichever side has to wait.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::common::panic_message;
use crate::implementation::model::ModelError;
use crate::{BranchDirective, BranchQuery, Brancher, Engine, Interrupter, SolverError};

/// The protocol states of an interactive solve session. There is no `Idle`
/// variant: a session only exists once the worker has been spawned, and the
/// model having no session at all is the idle state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SessionState {
    /// The worker is executing engine code, no decision request is pending
    Running,
    /// The worker is parked inside the branching callback, a decision
    /// request has been published
    AwaitingDecision,
    /// The engine ran to its natural end
    Completed,
    /// The session was stopped on request
    Stopped,
    /// The worker failed; the failure is captured in the critical section
    Failed,
}

/// What `Model::solve_iter_wait` reports: either the solve suspended at a
/// decision point and this is its published context, or the session is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterEvent {
    Suspended(BranchQuery),
    Done,
}

/// What the session-level wait distinguishes before the model decides how
/// to surface it.
pub(crate) enum WaitOutcome {
    Suspended(BranchQuery),
    Terminal,
}

/// The shared data that may only be manipulated within critical sections:
/// the protocol state, the single published request, the single pending
/// reply, and the channel through which the engine travels back to the
/// model once the worker is done with it.
struct Critical {
    state: SessionState,
    /// The published decision context, present iff state is AwaitingDecision
    query: Option<BranchQuery>,
    /// The single-slot reply: at most one decision is ever in flight
    reply: Option<BranchDirective>,
    /// Set once a stop has been requested; makes the terminal state Stopped
    stop: bool,
    /// The engine, deposited here by the worker when it terminates
    engine: Option<Box<dyn Engine>>,
    /// The failure captured on the worker side, if any
    failure: Option<SolverError>,
}

/// The state shared between the controller and the worker: the critical
/// data (protected by a mutex) and a monitor to park whichever side must
/// wait for the other.
struct Shared {
    critical: Mutex<Critical>,
    monitor: Condvar,
}

/// One open interactive solve session: the worker thread executing the
/// blocking solve, and the rendezvous it shares with the controller.
pub(crate) struct IterSession {
    shared: Arc<Shared>,
    interrupter: Interrupter,
    worker: Option<JoinHandle<()>>,
}
impl IterSession {
    /// Spawns the worker: the engine moves onto it, gets the bridging
    /// callback installed, and starts solving right away.
    pub(crate) fn start(engine: Box<dyn Engine>) -> Self {
        let interrupter = engine.interrupter();
        let shared = Arc::new(Shared {
            critical: Mutex::new(Critical {
                state: SessionState::Running,
                query: None,
                reply: None,
                stop: false,
                engine: None,
                failure: None,
            }),
            monitor: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || worker_main(engine, worker_shared));
        Self { shared, interrupter, worker: Some(worker) }
    }

    /// Blocks until the worker publishes a decision request or terminates.
    /// A reply still in flight counts as "running": the worker has not
    /// consumed it yet, so the last published query is stale.
    pub(crate) fn wait(&self) -> WaitOutcome {
        let mut critical = self.shared.critical.lock();
        loop {
            match critical.state {
                SessionState::AwaitingDecision if critical.reply.is_none() => {
                    let query = critical.query.clone();
                    match query {
                        Some(query) => return WaitOutcome::Suspended(query),
                        // a published request always carries its context
                        None => unreachable!("awaiting a decision without a published query"),
                    }
                }
                SessionState::Completed | SessionState::Stopped | SessionState::Failed => {
                    return WaitOutcome::Terminal;
                }
                _ => self.shared.monitor.wait(&mut critical),
            }
        }
    }

    /// Hands a decision to the parked callback. Non-blocking: the worker
    /// picks it up and resumes. Only one decision may be in flight at a
    /// time, and only while a request is actually pending.
    pub(crate) fn deliver(&self, directive: BranchDirective) -> Result<(), ModelError> {
        let mut critical = self.shared.critical.lock();
        match critical.state {
            SessionState::AwaitingDecision if critical.reply.is_none() => {
                trace!(?directive, "delivering decision");
                critical.reply = Some(directive);
                self.shared.monitor.notify_all();
                Ok(())
            }
            SessionState::AwaitingDecision => Err(ModelError::IllegalState(
                "a decision is already pending".to_string(),
            )),
            SessionState::Running => Err(ModelError::IllegalState(
                "the solver is not awaiting a decision".to_string(),
            )),
            _ => Err(ModelError::IllegalState(
                "the interactive solve session is finished".to_string(),
            )),
        }
    }

    /// Requests the session to stop and joins the worker. A worker parked at
    /// a decision point is unparked with a stop message; a running worker is
    /// interrupted (the engine polls the flag at least once per node, which
    /// bounds the unparking time). Idempotent.
    pub(crate) fn shutdown(&mut self) {
        {
            let mut critical = self.shared.critical.lock();
            match critical.state {
                SessionState::Running | SessionState::AwaitingDecision => {
                    trace!("stopping interactive session");
                    critical.stop = true;
                    // pre-fill the reply slot so that a callback racing with
                    // the interrupt check is unparked immediately as well
                    if critical.reply.is_none() {
                        critical.reply = Some(BranchDirective::Stop);
                    }
                    self.interrupter.interrupt();
                    self.shared.monitor.notify_all();
                }
                _ => {}
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Non-blocking poll of the protocol state.
    pub(crate) fn is_done(&self) -> bool {
        matches!(
            self.shared.critical.lock().state,
            SessionState::Completed | SessionState::Stopped | SessionState::Failed
        )
    }

    /// Takes the engine and the captured failure out of the terminated
    /// session. Callers must `shutdown` first.
    pub(crate) fn take_parts(&mut self) -> (Option<Box<dyn Engine>>, Option<SolverError>) {
        let mut critical = self.shared.critical.lock();
        (critical.engine.take(), critical.failure.take())
    }
}
impl Drop for IterSession {
    /// A dying session never leaves its worker parked forever.
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The body of the worker thread: run the blocking solve with the bridging
/// callback installed, then deposit the engine and the terminal state for
/// the controller side to collect.
fn worker_main(mut engine: Box<dyn Engine>, shared: Arc<Shared>) {
    let mut brancher = BridgingBrancher { shared: Arc::clone(&shared) };
    // nothing may unwind out of the worker: even an engine bug is captured
    // and resurfaces as a SolverError on the controller side
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| engine.solve(&mut brancher)));

    let mut critical = shared.critical.lock();
    critical.state = match outcome {
        Ok(Ok(())) => {
            if critical.stop {
                SessionState::Stopped
            } else {
                SessionState::Completed
            }
        }
        Ok(Err(failure)) => {
            critical.failure = Some(failure);
            SessionState::Failed
        }
        Err(payload) => {
            critical.failure = Some(SolverError::Internal(panic_message(&*payload)));
            SessionState::Failed
        }
    };
    trace!(state = ?critical.state, "worker terminated");
    critical.query = None;
    critical.engine = Some(engine);
    shared.monitor.notify_all();
}

/// The callback installed on the worker. When the engine invokes it, it does
/// not return immediately: it publishes the decision context and parks the
/// worker until the controller supplies a directive.
struct BridgingBrancher {
    shared: Arc<Shared>,
}
impl Brancher for BridgingBrancher {
    fn choose(&mut self, query: &BranchQuery) -> BranchDirective {
        let mut critical = self.shared.critical.lock();
        // a stop that raced ahead of this decision point wins
        if critical.stop {
            critical.reply = None;
            return BranchDirective::Stop;
        }
        trace!(depth = query.depth, nodes = query.nodes, "suspended at decision point");
        critical.query = Some(query.clone());
        critical.state = SessionState::AwaitingDecision;
        self.shared.monitor.notify_all();

        while critical.reply.is_none() {
            self.shared.monitor.wait(&mut critical);
        }
        let directive = match critical.reply.take() {
            Some(directive) => directive,
            None => unreachable!("the wait only ends once a reply is present"),
        };
        critical.query = None;
        critical.state = SessionState::Running;
        self.shared.monitor.notify_all();
        directive
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

/// The bridge is tested through the model handle, which is the only way
/// client code ever drives it.
#[cfg(test)]
mod test_solve_iter {
    use std::path::PathBuf;

    use crate::implementation::model::Model;
    use crate::{IterEvent, ModelError, Stage, Variable};

    fn locate(id: &str) -> PathBuf {
        PathBuf::new()
            .join(env!("CARGO_MANIFEST_DIR"))
            .join("resources/knapsack/")
            .join(id)
    }
    fn loaded(id: &str) -> Model {
        let mut model = Model::new();
        model.load_problem(locate(id)).unwrap();
        model
    }

    #[test]
    fn a_guided_session_runs_to_completion() {
        let mut model = loaded("f2.kp");
        model.solve_iter().unwrap();
        let mut decisions = 0;
        loop {
            match model.solve_iter_wait().unwrap() {
                IterEvent::Suspended(query) => {
                    assert!(!query.candidates.is_empty());
                    decisions += 1;
                    model.solve_iter_branch(query.candidates[0]).unwrap();
                }
                IterEvent::Done => break,
            }
        }
        assert!(decisions > 0);
        assert!(model.solve_iter_is_done());
        assert!(model.is_solved());
        assert_eq!(Some(220), model.best_value().unwrap());
    }

    #[test]
    fn an_immediate_stop_terminates_the_session_in_bounded_time() {
        let mut model = loaded("f2.kp");
        model.solve_iter().unwrap();
        model.solve_iter_stop().unwrap();
        assert!(model.solve_iter_is_done());
    }

    #[test]
    fn a_stop_at_a_decision_point_unparks_the_worker() {
        let mut model = loaded("f2.kp");
        model.solve_iter().unwrap();
        match model.solve_iter_wait().unwrap() {
            IterEvent::Suspended(_) => {}
            IterEvent::Done => panic!("expected at least one decision point"),
        }
        model.solve_iter_stop().unwrap();
        assert!(model.solve_iter_is_done());
        // a stop-driven finish still winds the engine down
        assert_eq!(Stage::Solved, model.stage());
    }

    #[test]
    fn stopping_twice_is_a_no_op() {
        let mut model = loaded("f1.kp");
        model.solve_iter().unwrap();
        model.solve_iter_stop().unwrap();
        model.solve_iter_stop().unwrap();
        assert!(model.solve_iter_is_done());
    }

    #[test]
    fn branching_without_a_session_is_an_error() {
        let mut model = loaded("f1.kp");
        assert!(matches!(
            model.solve_iter_branch(Variable(0)),
            Err(ModelError::IllegalState(_))
        ));
    }

    #[test]
    fn branching_after_the_session_is_over_is_an_error() {
        let mut model = loaded("f1.kp");
        model.solve_iter().unwrap();
        loop {
            match model.solve_iter_wait().unwrap() {
                IterEvent::Suspended(query) => {
                    model.solve_iter_branch(query.candidates[0]).unwrap();
                }
                IterEvent::Done => break,
            }
        }
        assert!(matches!(
            model.solve_iter_branch(Variable(0)),
            Err(ModelError::IllegalState(_))
        ));
    }

    #[test]
    fn a_second_session_cannot_be_opened_while_one_is_active() {
        let mut model = loaded("f2.kp");
        model.solve_iter().unwrap();
        assert!(matches!(model.solve_iter(), Err(ModelError::SessionAlreadyOpen)));
        model.solve_iter_stop().unwrap();
    }

    #[test]
    fn the_model_is_lent_while_the_session_is_open() {
        let mut model = loaded("f2.kp");
        model.solve_iter().unwrap();
        match model.solve_iter_wait().unwrap() {
            IterEvent::Suspended(_) => {}
            IterEvent::Done => panic!("expected at least one decision point"),
        }
        // the engine lives on the worker: parameter access must fail cleanly
        assert!(matches!(
            model.get_param("lp/iterlim"),
            Err(ModelError::IllegalState(_))
        ));
        model.solve_iter_stop().unwrap();
        // and work again once ownership transferred back
        assert!(model.get_param("lp/iterlim").is_ok());
    }

    #[test]
    fn dropping_a_model_with_an_open_session_does_not_hang() {
        let mut model = loaded("f2.kp");
        model.solve_iter().unwrap();
        match model.solve_iter_wait().unwrap() {
            IterEvent::Suspended(_) => {}
            IterEvent::Done => panic!("expected at least one decision point"),
        }
        drop(model);
    }

    #[test]
    fn a_node_limited_session_suspends_exactly_once() {
        let mut model = loaded("f1.kp");
        // a single node: only the root ever consults the callback
        model.set_param("limits/totalnodes", 1_i64).unwrap();
        model.solve_iter().unwrap();
        let mut decisions = 0;
        loop {
            match model.solve_iter_wait().unwrap() {
                IterEvent::Suspended(query) => {
                    decisions += 1;
                    model.solve_iter_branch(query.candidates[0]).unwrap();
                }
                IterEvent::Done => break,
            }
        }
        assert_eq!(1, decisions);
        assert!(model.solve_iter_is_done());
        assert!(model.is_solved());
    }
}
