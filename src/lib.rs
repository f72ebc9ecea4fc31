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

//! # TILLER
//! Tiller lets an external agent steer a branch-and-bound combinatorial
//! solver one decision at a time, instead of only observing its final
//! answer. The solver's native execution model is a single blocking call
//! which consults strategy callbacks synchronously; tiller turns that
//! push-based, callback-driven call into a pull-based, resumable control
//! loop without modifying the solver itself.
//!
//! The library is organized around four pieces:
//!
//!   * a **parameter store** with automatic conversions, so an agent can set
//!     heterogeneous configuration values without knowing their exact native
//!     type (see [`Model::set_param`]);
//!   * a **model handle** ([`Model`]) owning one solver engine and exposing
//!     its lifecycle, problem loading, seeding, and the two solve modes;
//!   * the **interactive solve bridge** (the `solve_iter` family on
//!     [`Model`]): the blocking solve runs on a dedicated worker thread and
//!     every decision point suspends it until the controller supplies a
//!     decision;
//!   * **episode controllers** ([`ConfiguringEnv`], [`BranchingEnv`]):
//!     gym-style `reset` / `step` state machines with deterministic seeding.
//!
//! ## Quick Example
//! The configuring controller runs one batch solve per episode; the action
//! is a set of parameter assignments applied right before the solve.
//!
//! ```
//! use tiller::*;
//! use std::path::PathBuf;
//!
//! let instance = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
//!     .join("resources/knapsack/f1.kp");
//!
//! let mut env = ConfiguringEnv::new(Some(instance), 0);
//! let (_obs, done) = env.reset(None, Some(42)).unwrap();
//! assert!(!done);
//!
//! // forbid any LP work, then solve a single node
//! let mut action = Action::new();
//! action.insert("lp/iterlim".to_string(), ParamValue::Int(0));
//! action.insert("lp/rootiterlim".to_string(), ParamValue::Int(0));
//! action.insert("limits/totalnodes".to_string(), ParamValue::Int(1));
//!
//! let (_obs, reward, done) = env.step(&action).unwrap();
//! assert!(done);
//! assert_eq!(0.0, reward);
//! ```
//!
//! ## Steering the branching yourself
//! The interactive mode suspends the solver at every branching point and
//! hands control back to you:
//!
//! ```
//! use tiller::*;
//! use std::path::PathBuf;
//!
//! let instance = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
//!     .join("resources/knapsack/f1.kp");
//!
//! let mut model = Model::new();
//! model.load_problem(&instance).unwrap();
//! model.solve_iter().unwrap();
//! loop {
//!     match model.solve_iter_wait().unwrap() {
//!         IterEvent::Suspended(query) => {
//!             // any candidate will do for this example
//!             model.solve_iter_branch(query.candidates[0]).unwrap();
//!         }
//!         IterEvent::Done => break,
//!     }
//! }
//! assert!(model.is_solved());
//! assert_eq!(Some(220), model.best_value().unwrap());
//! ```
//!
//! ## Bring your own solver
//! The built-in engine is a small knapsack branch-and-bound; the whole
//! control layer is written against the [`Engine`] trait, so hosting a
//! different solver is a matter of implementing that trait and handing the
//! engine to [`Model::with_engine`] (possibly through a custom
//! [`ModelFactory`] so that every episode starts from it).

mod common;
mod abstraction;
mod implementation;

pub use common::*;
pub use abstraction::*;
pub use implementation::*;
