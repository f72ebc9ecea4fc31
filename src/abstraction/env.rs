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

//! This module defines the collaborator seams of the episode controllers:
//! how a fresh model is built at the start of each episode, how observations
//! are extracted from a model, and how the step reward is derived from the
//! run statistics. All three are injected, which makes each of them an
//! extension point.

use crate::implementation::{Model, ModelError};

/// Builds the model a fresh episode starts from. The default factory yields
/// a plain model with the built-in engine and default parameters; override
/// this trait to customize plugins or parameters before each episode (the
/// documented extension point is "what problem state does a fresh episode
/// start from").
pub trait ModelFactory {
    fn build_model(&mut self) -> Result<Model, ModelError>;
}

/// Extracts an observation from a model. The shape of the observation is
/// entirely up to the implementation and opaque to the control layer.
pub trait ObservationFunction {
    type Obs;
    fn extract(&mut self, model: &Model) -> Self::Obs;
}

/// Derives the numeric reward signal of a step from the model at the end of
/// its solve. Implementations may keep state across calls (e.g. to diff
/// against the statistics of a prior step).
pub trait RewardFunction {
    fn compute(&mut self, model: &Model) -> f64;
}
