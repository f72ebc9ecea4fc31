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

//! This module defines the most basic data types that are used throughout all
//! the code of our library (both at the abstraction and implementation levels).
//! These are also the types your client code is likely to work with.

use std::collections::BTreeMap;
use std::fmt;
use std::num::ParseIntError;

// ----------------------------------------------------------------------------
// --- VARIABLE ---------------------------------------------------------------
// ----------------------------------------------------------------------------
/// This type denotes a variable of the problem loaded in a solver engine.
/// Each variable is identified with an integer ranging from 0 until the
/// number of variables of the loaded problem.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Variable(pub usize);
impl Variable {
    #[inline]
    /// This function retruns the id (numeric value) of the variable.
    ///
    /// # Examples:
    /// ```
    /// # use tiller::Variable;
    /// assert_eq!(0, Variable(0).id());
    /// assert_eq!(1, Variable(1).id());
    /// ```
    pub fn id(self) -> usize {
        self.0
    }
}

// ----------------------------------------------------------------------------
// --- DECISION ---------------------------------------------------------------
// ----------------------------------------------------------------------------
/// This denotes a decision that was made during the search. It affects a given
/// `value` to the specified `variable`. Any given `Decision` should be
/// understood as ```[[ variable = value ]]````
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Decision {
    pub variable : Variable,
    pub value    : isize
}

// ----------------------------------------------------------------------------
// --- STAGE ------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The coarse lifecycle phase of a solver engine. The model handle mirrors
/// whatever stage its engine reports; the episode controllers use it to
/// validate their preconditions (many parameters may only be changed before
/// a problem is loaded or before solving starts).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    /// The engine data structures are initialized but no problem exists yet
    Init,
    /// A problem has been loaded and may still be modified
    Problem,
    /// The problem has been transformed into the solving data space
    Transformed,
    /// The problem is being presolved
    Presolving,
    /// The problem was presolved
    Presolved,
    /// The problem is being solved
    Solving,
    /// The solving process ended (optimally or because some limit was hit)
    Solved,
    /// The engine data structures are being released
    Free,
}

// ----------------------------------------------------------------------------
// --- PARAMETERS -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The types of configuration parameters supported by a solver engine.
///
/// @see `ParamValue` for the associated value representation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ParamKind {
    Bool,
    Int,
    LongInt,
    Real,
    Char,
    Text,
}

/// A dynamically typed parameter value: the closed tagged union over every
/// native parameter type a solver engine understands. Often, it is not
/// required to know the exact type of a parameter to set its value (for
/// instance when setting it to zero). The conversion rules living in the
/// parameter store do their best to convert to and from the required kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    LongInt(i64),
    Real(f64),
    Char(char),
    Text(String),
}
impl ParamValue {
    /// Returns the kind tag of this value.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_)    => ParamKind::Bool,
            ParamValue::Int(_)     => ParamKind::Int,
            ParamValue::LongInt(_) => ParamKind::LongInt,
            ParamValue::Real(_)    => ParamKind::Real,
            ParamValue::Char(_)    => ParamKind::Char,
            ParamValue::Text(_)    => ParamKind::Text,
        }
    }
}
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(x)    => write!(f, "{x}"),
            ParamValue::Int(x)     => write!(f, "{x}"),
            ParamValue::LongInt(x) => write!(f, "{x}"),
            ParamValue::Real(x)    => write!(f, "{x}"),
            ParamValue::Char(x)    => write!(f, "{x}"),
            ParamValue::Text(x)    => write!(f, "{x}"),
        }
    }
}
impl From<bool> for ParamValue {
    fn from(x: bool) -> Self { ParamValue::Bool(x) }
}
impl From<i32> for ParamValue {
    fn from(x: i32) -> Self { ParamValue::Int(x) }
}
impl From<i64> for ParamValue {
    fn from(x: i64) -> Self { ParamValue::LongInt(x) }
}
impl From<f64> for ParamValue {
    fn from(x: f64) -> Self { ParamValue::Real(x) }
}
impl From<char> for ParamValue {
    fn from(x: char) -> Self { ParamValue::Char(x) }
}
impl From<String> for ParamValue {
    fn from(x: String) -> Self { ParamValue::Text(x) }
}
impl From<&str> for ParamValue {
    fn from(x: &str) -> Self { ParamValue::Text(x.to_string()) }
}

/// An action is a mapping from configuration-parameter names to the typed
/// values an agent wants them set to before a solve. The mapping is ordered
/// by parameter name, and entries are applied in that order.
pub type Action = BTreeMap<String, ParamValue>;

/// The errors that can pop out of the parameter store. Every variant carries
/// the parameter name and the offending value so that the diagnostic tells
/// the whole story.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    /// The engine knows no parameter by that name
    #[error("unknown parameter '{name}'")]
    UnknownParameter { name: String },
    /// The value kind cannot be converted to the kind of the parameter
    #[error("parameter '{name}' does not accept value '{value}'")]
    TypeMismatch { name: String, value: ParamValue },
    /// The conversion exists but this specific value does not survive the
    /// round trip to the target kind
    #[error("value '{value}' does not fit parameter '{name}'")]
    NarrowingError { name: String, value: ParamValue },
}

// ----------------------------------------------------------------------------
// --- BRANCHING --------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The decision context a solver engine publishes whenever it consults its
/// branching callback: which variables are candidates for branching, how deep
/// the current node sits, and how many nodes have been processed so far.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchQuery {
    /// The variables the engine considers branching on at this node
    pub candidates: Vec<Variable>,
    /// The depth of the node that triggered the callback
    pub depth: usize,
    /// The number of nodes processed since the beginning of the solve
    pub nodes: i64,
}

/// What a branching callback tells the engine to do at a decision point.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BranchDirective {
    /// Branch on the given variable
    Branch(Variable),
    /// Let the engine apply its own default branching rule
    DidNotRun,
    /// Discontinue branching: the engine winds down and returns control with
    /// whatever (possibly partial) result it has
    Stop,
}

// ----------------------------------------------------------------------------
// --- STATISTICS -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The run statistics a solver engine exposes once (or while) it solves.
/// Reward functions derive their numeric signal from these counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Total number of relaxation (LP) iterations performed
    pub lp_iterations: i64,
    /// Total number of branch-and-bound nodes processed
    pub nodes: i64,
}

// ----------------------------------------------------------------------------
// --- ERRORS AT THE ENGINE BOUNDARY ------------------------------------------
// ----------------------------------------------------------------------------
/// This enumeration simply groups the kinds of errors that might occur when
/// loading a problem instance from file. There can be io errors (file
/// unavailable ?), format errors (e.g. the file is not an instance but
/// contains the text of your next paper), or parse int errors (which are
/// actually a variant of the format error since it tells you that the parser
/// expected an integer number but got ... something else).
#[derive(Debug, thiserror::Error)]
pub enum ProblemLoadError {
    /// There was an io related error
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
    /// The parser expected to read something that was an integer but got some garbage
    #[error("parse int {0}")]
    ParseInt(#[from] ParseIntError),
    /// The file was not properly formatted.
    #[error("ill formed instance")]
    Format,
    /// The file extension maps to no known instance format
    #[error("unsupported instance format '{0}'")]
    UnsupportedFormat(String),
}

/// An internal solver failure. Faults originating inside the branching
/// callback never unwind across the callback boundary: they are caught there
/// and converted into one of these, delivered through the normal return path.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SolverError {
    /// The branching callback panicked; the panic was contained at the
    /// callback boundary and its message captured here
    #[error("the branching callback panicked: {0}")]
    CallbackPanic(String),
    /// The callback asked to branch on a variable that is not branchable at
    /// the current node
    #[error("cannot branch on {0:?}: not a branching candidate")]
    InvalidBranching(Variable),
    /// Any other failure internal to the engine
    #[error("{0}")]
    Internal(String),
}

/// Renders the payload of a contained panic into a displayable message.
/// Engines and the solve bridge use this when converting a fault caught at
/// the callback boundary into a `SolverError`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic of unknown type".to_string()
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_var {
    use crate::Variable;

    #[test]
    fn test_var_id() {
        assert_eq!(0, Variable(0).id());
        assert_eq!(1, Variable(1).id());
        assert_eq!(2, Variable(2).id());
        assert_eq!(3, Variable(3).id());
    }
}

#[cfg(test)]
mod test_param_value {
    use crate::{ParamKind, ParamValue};

    #[test]
    fn kind_tracks_the_variant() {
        assert_eq!(ParamKind::Bool,    ParamValue::Bool(true).kind());
        assert_eq!(ParamKind::Int,     ParamValue::Int(42).kind());
        assert_eq!(ParamKind::LongInt, ParamValue::LongInt(42).kind());
        assert_eq!(ParamKind::Real,    ParamValue::Real(0.5).kind());
        assert_eq!(ParamKind::Char,    ParamValue::Char('s').kind());
        assert_eq!(ParamKind::Text,    ParamValue::Text("x".to_string()).kind());
    }

    #[test]
    fn values_convert_from_native_types() {
        assert_eq!(ParamValue::Bool(true),               true.into());
        assert_eq!(ParamValue::Int(6),                   6_i32.into());
        assert_eq!(ParamValue::LongInt(6),               6_i64.into());
        assert_eq!(ParamValue::Real(2.5),                2.5.into());
        assert_eq!(ParamValue::Char('c'),                'c'.into());
        assert_eq!(ParamValue::Text("hi".to_string()),   "hi".into());
    }

    #[test]
    fn display_shows_the_bare_value() {
        assert_eq!("true", format!("{}", ParamValue::Bool(true)));
        assert_eq!("42",   format!("{}", ParamValue::LongInt(42)));
        assert_eq!("2.5",  format!("{}", ParamValue::Real(2.5)));
        assert_eq!("s",    format!("{}", ParamValue::Char('s')));
    }
}
