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

//! This module provides the episode controllers: the gym-style
//! `reset` / `step` state machines an external agent drives. The
//! `ConfiguringEnv` runs one batch solve per episode, with the action being
//! a set of parameter assignments applied up front. The `BranchingEnv` opens
//! an interactive solve session instead and lets the agent supply one
//! branching decision per step.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::implementation::model::{Model, ModelError};
use crate::{
    Action, BranchQuery, IterEvent, ModelFactory, ObservationFunction, ParamValue, RewardFunction,
    Stage, Variable,
};

/// The errors that can pop out of an episode controller. Model errors
/// propagate unchanged; action failures are annotated with the offending
/// parameter.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// The controller needs an instance file, supplied either at
    /// construction or in `reset`
    #[error("an instance file is required, supplied either at construction or in reset()")]
    MissingInstance,
    /// A precondition of the episode state machine does not hold; this is a
    /// programming error, never silently papered over
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// Applying one entry of an action failed; earlier entries of the same
    /// action remain applied
    #[error("error while setting parameter '{name}' to value '{value}'")]
    ActionApplication {
        name: String,
        value: ParamValue,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// The lifecycle of one episode controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum EpisodeState {
    Unstarted,
    Ready,
    Terminated,
}

/// The default model factory: a plain model hosting the built-in engine
/// with default parameters.
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultModelFactory;
impl ModelFactory for DefaultModelFactory {
    fn build_model(&mut self) -> Result<Model, ModelError> {
        Ok(Model::new())
    }
}

/// The trivial observation function: it observes nothing at all. Useful
/// whenever the agent acts on configuration alone.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoObservation;
impl ObservationFunction for NoObservation {
    type Obs = ();
    fn extract(&mut self, _model: &Model) -> Self::Obs {}
}

/// The default reward: the negative of the total number of LP iterations
/// the solve performed. An agent maximizing this reward minimizes LP work.
#[derive(Debug, Default, Copy, Clone)]
pub struct NegLpIterations;
impl RewardFunction for NegLpIterations {
    fn compute(&mut self, model: &Model) -> f64 {
        model.stats().map(|s| -(s.lp_iterations as f64)).unwrap_or(0.0)
    }
}

/// A 0/1 reward: 1 once the solve ran to its natural end.
#[derive(Debug, Default, Copy, Clone)]
pub struct IsDone;
impl RewardFunction for IsDone {
    fn compute(&mut self, model: &Model) -> f64 {
        if model.is_solved() {
            1.0
        } else {
            0.0
        }
    }
}

/// Builds and seeds the model of a fresh episode: validates that the
/// factory handed out a pristine model, derives the 31 bit engine seed from
/// the episode seed, writes the seed pair, and loads the instance (in that
/// order: the problem permutation happens at load time, so the seeds must
/// already be in place).
fn start_episode(
    factory: &mut dyn ModelFactory,
    instance: &Path,
    episode_seed: u32,
) -> Result<Model, EnvError> {
    let mut model = factory.build_model()?;
    if model.stage() != Stage::Init {
        return Err(EnvError::IllegalState(
            "a fresh episode model must be at stage Init".to_string(),
        ));
    }
    // the seed parameters are owned by the controller: a factory that
    // touched them is a programming error, not something to override
    for name in ["randomization/randomseedshift", "randomization/permutationseed"] {
        if model.get_param_as::<i32>(name)? != 0 {
            return Err(EnvError::IllegalState(format!(
                "illegal value for '{name}': this parameter must not be set manually"
            )));
        }
    }
    let episode_rng = fastrand::Rng::with_seed(u64::from(episode_seed));
    // engine seeds are constrained to 31 bits: discard the top bit
    let engine_seed = (episode_rng.u32(..) >> 1) as i32;
    debug!(episode_seed, engine_seed, "episode reset");
    model.set_seed(engine_seed)?;
    model.load_problem(instance)?;
    Ok(model)
}

// ----------------------------------------------------------------------------
// --- CONFIGURING ------------------------------------------------------------
// ----------------------------------------------------------------------------

/// The "learning to configure" episode controller: one episode is one batch
/// solve of one instance under one seed, and the action is a mapping of
/// parameter assignments applied right before the solve.
pub struct ConfiguringEnv<Obs> {
    instance: Option<PathBuf>,
    seed_rng: fastrand::Rng,
    episode_seed: Option<u32>,
    state: EpisodeState,
    model: Option<Model>,
    factory: Box<dyn ModelFactory>,
    obs_fn: Box<dyn ObservationFunction<Obs = Obs>>,
    reward_fn: Box<dyn RewardFunction>,
}
impl ConfiguringEnv<()> {
    /// A controller with the default collaborators: the default model
    /// factory, no observation, and the negative-LP-iterations reward. The
    /// `seed` value seeds the process-level generator from which episode
    /// seeds are drawn when `reset` does not supply one.
    pub fn new(instance: Option<PathBuf>, seed: u64) -> Self {
        Self::custom(
            instance,
            seed,
            Box::new(DefaultModelFactory),
            Box::new(NoObservation),
            Box::new(NegLpIterations),
        )
    }
}
impl<Obs> ConfiguringEnv<Obs> {
    /// A controller with custom collaborators.
    pub fn custom(
        instance: Option<PathBuf>,
        seed: u64,
        factory: Box<dyn ModelFactory>,
        obs_fn: Box<dyn ObservationFunction<Obs = Obs>>,
        reward_fn: Box<dyn RewardFunction>,
    ) -> Self {
        Self {
            instance,
            seed_rng: fastrand::Rng::with_seed(seed),
            episode_seed: None,
            state: EpisodeState::Unstarted,
            model: None,
            factory,
            obs_fn,
            reward_fn,
        }
    }

    /// The seed of the current (or last) episode.
    pub fn episode_seed(&self) -> Option<u32> {
        self.episode_seed
    }
    /// The model of the current episode, while one is live.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Starts a new episode: optionally replaces the instance (else reuses
    /// the previous one), determines the episode seed (the supplied value,
    /// or the next draw from the process-level generator), builds a fresh
    /// seeded model and loads the instance into it.
    pub fn reset(
        &mut self,
        instance: Option<&Path>,
        seed: Option<u32>,
    ) -> Result<(Option<Obs>, bool), EnvError> {
        if let Some(path) = instance {
            self.instance = Some(path.to_path_buf());
        }
        let episode_seed = seed.unwrap_or_else(|| self.seed_rng.u32(..));
        let instance = self.instance.clone().ok_or(EnvError::MissingInstance)?;

        // whatever episode was in flight is over now
        self.model = None;
        self.state = EpisodeState::Unstarted;

        let model = start_episode(self.factory.as_mut(), &instance, episode_seed)?;
        let obs = self.obs_fn.extract(&model);
        self.episode_seed = Some(episode_seed);
        self.model = Some(model);
        self.state = EpisodeState::Ready;
        Ok((Some(obs), false))
    }

    /// Runs the episode to its end: applies every entry of the action
    /// through the parameter store (the first failure aborts the step,
    /// earlier entries remain applied), solves, and derives the reward from
    /// the run statistics. The episode terminates and the model is released.
    pub fn step(&mut self, action: &Action) -> Result<(Option<Obs>, f64, bool), EnvError> {
        if self.state != EpisodeState::Ready {
            return Err(EnvError::IllegalState(
                "reset must be called before step".to_string(),
            ));
        }
        let model = match self.model.as_mut() {
            Some(model) => model,
            None => {
                return Err(EnvError::IllegalState(
                    "no model is attached to this episode".to_string(),
                ))
            }
        };

        for (name, value) in action {
            model
                .set_param(name.as_str(), value.clone())
                .map_err(|source| EnvError::ActionApplication {
                    name: name.clone(),
                    value: value.clone(),
                    source,
                })?;
        }

        model.solve()?;
        if !model.is_solved() {
            return Err(EnvError::IllegalState(
                "the solve did not reach the Solved stage: was the solver interrupted?".to_string(),
            ));
        }

        let reward = self.reward_fn.compute(model);
        debug!(reward, "episode finished");
        self.state = EpisodeState::Terminated;
        self.model = None;
        Ok((None, reward, true))
    }
}

// ----------------------------------------------------------------------------
// --- BRANCHING --------------------------------------------------------------
// ----------------------------------------------------------------------------

/// The "learning to branch" episode controller: one episode is one
/// interactive solve of one instance, and the agent supplies one branching
/// decision per step. The observation of each step is the decision context
/// the solver published when it suspended.
pub struct BranchingEnv {
    instance: Option<PathBuf>,
    seed_rng: fastrand::Rng,
    episode_seed: Option<u32>,
    state: EpisodeState,
    model: Option<Model>,
    factory: Box<dyn ModelFactory>,
    reward_fn: Box<dyn RewardFunction>,
}
impl BranchingEnv {
    /// A controller with the default collaborators.
    pub fn new(instance: Option<PathBuf>, seed: u64) -> Self {
        Self::custom(
            instance,
            seed,
            Box::new(DefaultModelFactory),
            Box::new(NegLpIterations),
        )
    }
    /// A controller with custom collaborators.
    pub fn custom(
        instance: Option<PathBuf>,
        seed: u64,
        factory: Box<dyn ModelFactory>,
        reward_fn: Box<dyn RewardFunction>,
    ) -> Self {
        Self {
            instance,
            seed_rng: fastrand::Rng::with_seed(seed),
            episode_seed: None,
            state: EpisodeState::Unstarted,
            model: None,
            factory,
            reward_fn,
        }
    }

    /// The seed of the current (or last) episode.
    pub fn episode_seed(&self) -> Option<u32> {
        self.episode_seed
    }

    /// Starts a new episode and advances the solve to its first decision
    /// point. An episode whose solve finishes without ever branching is done
    /// at reset already (observation `None`, done `true`).
    pub fn reset(
        &mut self,
        instance: Option<&Path>,
        seed: Option<u32>,
    ) -> Result<(Option<BranchQuery>, bool), EnvError> {
        if let Some(path) = instance {
            self.instance = Some(path.to_path_buf());
        }
        let episode_seed = seed.unwrap_or_else(|| self.seed_rng.u32(..));
        let instance = self.instance.clone().ok_or(EnvError::MissingInstance)?;

        self.model = None;
        self.state = EpisodeState::Unstarted;

        let mut model = start_episode(self.factory.as_mut(), &instance, episode_seed)?;
        self.episode_seed = Some(episode_seed);

        model.solve_iter()?;
        match model.solve_iter_wait()? {
            IterEvent::Suspended(query) => {
                self.model = Some(model);
                self.state = EpisodeState::Ready;
                Ok((Some(query), false))
            }
            IterEvent::Done => {
                self.state = EpisodeState::Terminated;
                Ok((None, true))
            }
        }
    }

    /// Forwards one branching decision to the suspended solver and advances
    /// to the next decision point, or to the end of the episode. The reward
    /// surfaces with the terminal step, once the run statistics are final.
    pub fn step(&mut self, choice: Variable) -> Result<(Option<BranchQuery>, f64, bool), EnvError> {
        if self.state != EpisodeState::Ready {
            return Err(EnvError::IllegalState(
                "reset must be called before step".to_string(),
            ));
        }
        let model = match self.model.as_mut() {
            Some(model) => model,
            None => {
                return Err(EnvError::IllegalState(
                    "no model is attached to this episode".to_string(),
                ))
            }
        };

        model.solve_iter_branch(choice)?;
        match model.solve_iter_wait()? {
            IterEvent::Suspended(query) => Ok((Some(query), 0.0, false)),
            IterEvent::Done => {
                if !model.is_solved() {
                    return Err(EnvError::IllegalState(
                        "the solve did not reach the Solved stage: was the solver interrupted?"
                            .to_string(),
                    ));
                }
                let reward = self.reward_fn.compute(model);
                debug!(reward, "episode finished");
                self.state = EpisodeState::Terminated;
                self.model = None;
                Ok((None, reward, true))
            }
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_configuring {
    use std::path::PathBuf;

    use crate::implementation::env::{ConfiguringEnv, DefaultModelFactory};
    use crate::implementation::model::{Model, ModelError};
    use crate::{Action, EnvError, ModelFactory, ParamValue};

    fn locate(id: &str) -> PathBuf {
        PathBuf::new()
            .join(env!("CARGO_MANIFEST_DIR"))
            .join("resources/knapsack/")
            .join(id)
    }

    #[test]
    fn reset_without_any_instance_is_an_error() {
        let mut env = ConfiguringEnv::new(None, 0);
        assert!(matches!(env.reset(None, None), Err(EnvError::MissingInstance)));
    }

    #[test]
    fn reset_reuses_the_previous_instance() {
        let mut env = ConfiguringEnv::new(None, 0);
        let path = locate("f1.kp");
        env.reset(Some(&path), Some(1)).unwrap();
        env.step(&Action::new()).unwrap();
        // no instance supplied this time: the previous one is reused
        let (obs, done) = env.reset(None, Some(2)).unwrap();
        assert!(obs.is_some());
        assert!(!done);
    }

    #[test]
    fn the_seed_derivation_is_deterministic() {
        let engine_seed = |env: &mut ConfiguringEnv<()>| {
            env.reset(Some(&locate("f1.kp")), Some(42)).unwrap();
            env.model().unwrap().seed().unwrap()
        };
        let mut env = ConfiguringEnv::new(None, 0);
        let first = engine_seed(&mut env);
        let second = engine_seed(&mut env);
        assert_eq!(first, second);
        assert_eq!(Some(42), env.episode_seed());
        // 31 bits only
        assert!(first >= 0);
    }

    #[test]
    fn unseeded_resets_draw_from_the_process_generator() {
        let mut env = ConfiguringEnv::new(Some(locate("f1.kp")), 0);
        env.reset(None, None).unwrap();
        let first = env.episode_seed();
        env.reset(None, None).unwrap();
        let second = env.episode_seed();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn a_step_with_an_empty_action_still_solves() {
        let mut env = ConfiguringEnv::new(Some(locate("f1.kp")), 0);
        env.reset(None, Some(1)).unwrap();
        let (obs, reward, done) = env.step(&Action::new()).unwrap();
        assert!(obs.is_none());
        assert!(done);
        assert!(reward <= 0.0);
    }

    #[test]
    fn forbidding_all_lp_work_yields_a_zero_reward() {
        let mut env = ConfiguringEnv::new(Some(locate("f1.kp")), 0);
        env.reset(None, Some(1)).unwrap();
        let mut action = Action::new();
        action.insert("lp/iterlim".to_string(), ParamValue::Int(0));
        action.insert("lp/rootiterlim".to_string(), ParamValue::Int(0));
        action.insert("limits/totalnodes".to_string(), ParamValue::Int(1));
        let (_, reward, done) = env.step(&action).unwrap();
        assert!(done);
        assert_eq!(0.0, reward);
    }

    #[test]
    fn a_failing_action_entry_aborts_the_step_and_names_the_parameter() {
        let mut env = ConfiguringEnv::new(Some(locate("f1.kp")), 0);
        env.reset(None, Some(1)).unwrap();
        let mut action = Action::new();
        action.insert("limits/totalnodes".to_string(), ParamValue::Int(1));
        action.insert("zzz/does_not_exist".to_string(), ParamValue::Int(1));
        match env.step(&action) {
            Err(EnvError::ActionApplication { name, .. }) => {
                assert_eq!("zzz/does_not_exist", name);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // entries applied before the failure are not rolled back
        let applied = env.model().unwrap().get_param("limits/totalnodes").unwrap();
        assert_eq!(ParamValue::LongInt(1), applied);
    }

    #[test]
    fn stepping_before_reset_is_an_illegal_state() {
        let mut env = ConfiguringEnv::new(Some(locate("f1.kp")), 0);
        assert!(matches!(env.step(&Action::new()), Err(EnvError::IllegalState(_))));
    }

    #[test]
    fn stepping_a_terminated_episode_is_an_illegal_state() {
        let mut env = ConfiguringEnv::new(Some(locate("f1.kp")), 0);
        env.reset(None, Some(1)).unwrap();
        env.step(&Action::new()).unwrap();
        assert!(matches!(env.step(&Action::new()), Err(EnvError::IllegalState(_))));
        // but a new reset brings the controller back to life
        env.reset(None, Some(2)).unwrap();
        let (_, _, done) = env.step(&Action::new()).unwrap();
        assert!(done);
    }

    /// A factory which misbehaves on purpose: it hands out models whose
    /// seed parameters were already tampered with.
    struct TamperingFactory;
    impl ModelFactory for TamperingFactory {
        fn build_model(&mut self) -> Result<Model, ModelError> {
            let mut model = Model::new();
            model.set_param("randomization/randomseedshift", 5_i32)?;
            Ok(model)
        }
    }

    #[test]
    fn a_factory_that_tampers_with_the_seeds_is_rejected() {
        let mut env = ConfiguringEnv::custom(
            Some(locate("f1.kp")),
            0,
            Box::new(TamperingFactory),
            Box::new(super::NoObservation),
            Box::new(super::NegLpIterations),
        );
        assert!(matches!(env.reset(None, Some(1)), Err(EnvError::IllegalState(_))));
    }

    #[test]
    fn the_default_factory_hands_out_pristine_models() {
        let mut factory = DefaultModelFactory;
        let model = factory.build_model().unwrap();
        assert_eq!(crate::Stage::Init, model.stage());
        assert_eq!(0, model.seed().unwrap());
    }
}
