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

//! This module provides the typed parameter table of the built-in engine:
//! the set of named configuration values the engine exposes, each with its
//! native kind and default value.

use fxhash::FxHashMap;

use crate::{ParamError, ParamKind, ParamValue};

/// The typed parameter storage of the built-in engine. The kind of a
/// parameter is the kind of its stored value, and writes only accept a value
/// of that exact kind (coercion is the business of the layer above).
#[derive(Debug, Clone)]
pub struct ParamTable {
    values: FxHashMap<String, ParamValue>,
}
impl Default for ParamTable {
    /// The default table mirrors the parameter namespaces of a typical
    /// branch-and-bound solver. A negative limit means "no limit".
    fn default() -> Self {
        let mut values = FxHashMap::default();
        let defaults: &[(&str, ParamValue)] = &[
            ("randomization/randomseedshift", ParamValue::Int(0)),
            ("randomization/permutationseed", ParamValue::Int(0)),
            ("lp/iterlim",                    ParamValue::LongInt(-1)),
            ("lp/rootiterlim",                ParamValue::LongInt(-1)),
            ("limits/totalnodes",             ParamValue::LongInt(-1)),
            ("limits/gap",                    ParamValue::Real(0.0)),
            ("limits/time",                   ParamValue::Real(1e20)),
            ("presolving/maxrounds",          ParamValue::Int(-1)),
            ("branching/preferbinary",        ParamValue::Bool(false)),
            ("branching/scorefunc",           ParamValue::Char('s')),
            ("visual/vbcfilename",            ParamValue::Text("-".to_string())),
        ];
        for (name, value) in defaults {
            values.insert((*name).to_string(), value.clone());
        }
        Self { values }
    }
}
impl ParamTable {
    /// The kind of the named parameter.
    pub fn kind(&self, name: &str) -> Result<ParamKind, ParamError> {
        self.values
            .get(name)
            .map(ParamValue::kind)
            .ok_or_else(|| ParamError::UnknownParameter { name: name.to_string() })
    }

    /// The stored value of the named parameter.
    pub fn get(&self, name: &str) -> Result<ParamValue, ParamError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ParamError::UnknownParameter { name: name.to_string() })
    }

    /// Overwrites the named parameter. The value kind must exactly match the
    /// kind of the parameter.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| ParamError::UnknownParameter { name: name.to_string() })?;
        if slot.kind() != value.kind() {
            return Err(ParamError::TypeMismatch { name: name.to_string(), value });
        }
        *slot = value;
        Ok(())
    }

    // The typed readers below are for the engine's own consumption: the
    // names are compile-time constants seeded by `Default`, so a miss or a
    // kind mismatch is a broken invariant, not a user error.

    pub(crate) fn int(&self, name: &str) -> i32 {
        match self.values.get(name) {
            Some(ParamValue::Int(x)) => *x,
            other => unreachable!("parameter table invariant broken for '{name}': {other:?}"),
        }
    }
    pub(crate) fn long(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(ParamValue::LongInt(x)) => *x,
            other => unreachable!("parameter table invariant broken for '{name}': {other:?}"),
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
