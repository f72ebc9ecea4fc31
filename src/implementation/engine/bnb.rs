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

//! This module provides the built-in solver engine: a best-first
//! branch-and-bound over 0/1 knapsack instances. It is deliberately small,
//! but it exhibits every behavior the control layer needs to steer: a staged
//! lifecycle, a typed parameter table, relaxation (LP) work accounting
//! against iteration limits, node limits, seed and permutation sensitivity,
//! a synchronous branching callback, interruption, and deep duplication.

use std::cmp::Ordering;
use std::panic::AssertUnwindSafe;
use std::path::Path;

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use tracing::debug;

use crate::common::panic_message;
use crate::implementation::engine::instance::{read_instance, KnapsackInstance};
use crate::implementation::engine::params::ParamTable;
use crate::{
    BranchDirective, BranchQuery, Brancher, Decision, Engine, Interrupter, ParamError, ParamKind,
    ParamValue, ProblemLoadError, SolveStats, SolverError, Stage, Variable,
};

/// One open subproblem of the search: the items decided so far (`path`),
/// the remaining ones in ratio order (`free`), and the accumulated profit
/// and leftover capacity.
#[derive(Debug, Clone)]
struct BnbNode {
    value: i64,
    room: i64,
    /// The bound inherited from the parent, used for best-first ordering
    ub: i64,
    free: Vec<usize>,
    path: Vec<Decision>,
}

/// Orders the fringe so that the node with the highest inherited bound pops
/// first.
#[derive(Debug, Clone, Copy)]
struct MaxBound;
impl Compare<BnbNode> for MaxBound {
    fn compare(&self, l: &BnbNode, r: &BnbNode) -> Ordering {
        l.ub.cmp(&r.ub)
    }
}

/// The outcome of the relaxation at one node.
struct Relaxed {
    bound: i64,
    /// The item the relaxation could only take fractionally, if any
    fractional: Option<usize>,
    /// True iff every free item fits: taking them all completes the node
    integral: bool,
}

/// The built-in 0/1 knapsack branch-and-bound engine.
#[derive(Debug)]
pub struct KnapsackEngine {
    params: ParamTable,
    stage: Stage,
    instance: Option<KnapsackInstance>,
    interrupter: Interrupter,
    stats: SolveStats,
    best: Option<(i64, Vec<Decision>)>,
}
impl Default for KnapsackEngine {
    fn default() -> Self {
        Self {
            params: ParamTable::default(),
            stage: Stage::Init,
            instance: None,
            interrupter: Interrupter::new(),
            stats: SolveStats::default(),
            best: None,
        }
    }
}
impl KnapsackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an in-memory instance, applying the problem permutation
    /// governed by `randomization/permutationseed` exactly as a file load
    /// would. Seeds must therefore be set *before* this call.
    pub fn load_instance(&mut self, mut inst: KnapsackInstance) {
        let perm_seed = self.params.int("randomization/permutationseed");
        if perm_seed != 0 {
            let rng = fastrand::Rng::with_seed(perm_seed as u64);
            let mut order: Vec<usize> = (0..inst.nb_items()).collect();
            rng.shuffle(&mut order);
            inst = KnapsackInstance {
                capacity: inst.capacity,
                profit: order.iter().map(|&i| inst.profit[i]).collect(),
                weight: order.iter().map(|&i| inst.weight[i]).collect(),
            };
        }
        debug!(
            items = inst.nb_items(),
            capacity = inst.capacity,
            permuted = perm_seed != 0,
            "problem installed"
        );
        self.instance = Some(inst);
        self.stats = SolveStats::default();
        self.best = None;
        self.stage = Stage::Problem;
    }

    /// Evaluates the fractional relaxation of `node`, scanning items in
    /// ratio order. Every scanned item counts as one LP iteration; when the
    /// `budget` is exhausted (a negative budget means unlimited) the scan
    /// stops and the sum of the unscanned profits keeps the bound valid.
    fn relax_bound(inst: &KnapsackInstance, node: &BnbNode, budget: i64, lp_iterations: &mut i64) -> Relaxed {
        let mut room = node.room;
        let mut bound = node.value;
        let mut iters = 0_i64;
        for (pos, &item) in node.free.iter().enumerate() {
            if budget >= 0 && iters >= budget {
                bound += node.free[pos..].iter().map(|&i| inst.profit[i]).sum::<i64>();
                *lp_iterations += iters;
                return Relaxed { bound, fractional: None, integral: false };
            }
            iters += 1;
            if inst.weight[item] <= room {
                room -= inst.weight[item];
                bound += inst.profit[item];
            } else {
                // fractional fill, rounded up so the bound stays valid
                bound += (inst.profit[item] * room + inst.weight[item] - 1) / inst.weight[item];
                *lp_iterations += iters;
                return Relaxed { bound, fractional: Some(item), integral: false };
            }
        }
        *lp_iterations += iters;
        Relaxed { bound, fractional: None, integral: true }
    }

    /// Builds the full solution of an integral node: the branched decisions,
    /// every free item taken, and every presolved-out item left out.
    fn complete_solution(node: &BnbNode, fixed_out: &[usize]) -> Vec<Decision> {
        let mut sol = node.path.clone();
        sol.extend(node.free.iter().map(|&i| Decision { variable: Variable(i), value: 1 }));
        sol.extend(fixed_out.iter().map(|&i| Decision { variable: Variable(i), value: 0 }));
        sol.sort_unstable_by_key(|d| d.variable.0);
        sol
    }
}
impl Engine for KnapsackEngine {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn param_kind(&self, name: &str) -> Result<ParamKind, ParamError> {
        self.params.kind(name)
    }
    fn get_param_raw(&self, name: &str) -> Result<ParamValue, ParamError> {
        self.params.get(name)
    }
    fn set_param_raw(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        self.params.set(name, value)
    }

    fn read_problem(&mut self, path: &Path) -> Result<(), ProblemLoadError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("kp") => {}
            other => {
                return Err(ProblemLoadError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        }
        let inst = read_instance(path)?;
        self.load_instance(inst);
        Ok(())
    }

    fn solve(&mut self, brancher: &mut dyn Brancher) -> Result<(), SolverError> {
        if self.stage != Stage::Problem {
            return Err(SolverError::Internal(format!(
                "cannot solve from stage {:?}: no freshly loaded problem",
                self.stage
            )));
        }
        let inst = match self.instance.clone() {
            Some(inst) => inst,
            None => return Err(SolverError::Internal("no problem is loaded".to_string())),
        };

        self.stats = SolveStats::default();
        self.best = None;
        self.stage = Stage::Transformed;

        // presolve: items that cannot fit at all are fixed out
        self.stage = Stage::Presolving;
        let presolve_rounds = self.params.int("presolving/maxrounds");
        let mut fixed_out = vec![];
        let mut items: Vec<usize> = (0..inst.nb_items()).collect();
        if presolve_rounds != 0 {
            let (out, kept): (Vec<usize>, Vec<usize>) =
                items.into_iter().partition(|&i| inst.weight[i] > inst.capacity);
            fixed_out = out;
            items = kept;
        }
        self.stage = Stage::Presolved;

        // exploration order: ratio sorted, ties broken by the seed shift
        let seed_shift = self.params.int("randomization/randomseedshift");
        if seed_shift != 0 {
            fastrand::Rng::with_seed(seed_shift as u64).shuffle(&mut items);
        }
        items.sort_by(|&a, &b| (inst.profit[b] * inst.weight[a]).cmp(&(inst.profit[a] * inst.weight[b])));

        let node_limit = self.params.long("limits/totalnodes");
        let root_budget = self.params.long("lp/rootiterlim");
        let node_budget = self.params.long("lp/iterlim");

        self.stage = Stage::Solving;
        let mut fringe = BinaryHeap::from_vec_cmp(vec![], MaxBound);
        fringe.push(BnbNode {
            value: 0,
            room: inst.capacity,
            ub: i64::MAX,
            free: items,
            path: vec![],
        });

        let mut lp_calls = 0_i64;
        let mut stopped = false;
        while let Some(node) = fringe.pop() {
            if self.interrupter.is_interrupted() {
                // an interrupted run never reaches the Solved stage
                debug!(nodes = self.stats.nodes, "solve interrupted");
                return Ok(());
            }
            if node_limit >= 0 && self.stats.nodes >= node_limit {
                break;
            }
            self.stats.nodes += 1;

            let budget = if lp_calls == 0 { root_budget } else { node_budget };
            lp_calls += 1;
            let relaxed = Self::relax_bound(&inst, &node, budget, &mut self.stats.lp_iterations);

            if let Some((incumbent, _)) = &self.best {
                if relaxed.bound <= *incumbent {
                    continue;
                }
            }
            if relaxed.integral {
                self.best = Some((relaxed.bound, Self::complete_solution(&node, &fixed_out)));
                continue;
            }

            // surface the decision point to the branching callback
            let candidates = match relaxed.fractional {
                Some(item) => vec![Variable(item)],
                None => node.free.iter().copied().map(Variable).collect(),
            };
            let query = BranchQuery { candidates, depth: node.path.len(), nodes: self.stats.nodes };
            // the callback boundary is non-throwing: contain any panic here
            let directive = match std::panic::catch_unwind(AssertUnwindSafe(|| brancher.choose(&query))) {
                Ok(directive) => directive,
                Err(payload) => return Err(SolverError::CallbackPanic(panic_message(&*payload))),
            };
            let chosen = match directive {
                BranchDirective::Stop => {
                    stopped = true;
                    break;
                }
                BranchDirective::DidNotRun => match relaxed.fractional {
                    Some(item) => item,
                    None => node.free[0],
                },
                BranchDirective::Branch(var) => {
                    if !node.free.contains(&var.id()) {
                        return Err(SolverError::InvalidBranching(var));
                    }
                    var.id()
                }
            };

            let mut rest = node.free.clone();
            rest.retain(|&i| i != chosen);

            let mut leave_path = node.path.clone();
            leave_path.push(Decision { variable: Variable(chosen), value: 0 });
            fringe.push(BnbNode {
                value: node.value,
                room: node.room,
                ub: relaxed.bound,
                free: rest.clone(),
                path: leave_path,
            });
            if inst.weight[chosen] <= node.room {
                let mut take_path = node.path.clone();
                take_path.push(Decision { variable: Variable(chosen), value: 1 });
                fringe.push(BnbNode {
                    value: node.value + inst.profit[chosen],
                    room: node.room - inst.weight[chosen],
                    ub: relaxed.bound,
                    free: rest,
                    path: take_path,
                });
            }
        }

        self.stage = Stage::Solved;
        debug!(
            nodes = self.stats.nodes,
            lp_iterations = self.stats.lp_iterations,
            best = ?self.best.as_ref().map(|(v, _)| *v),
            stopped,
            "solve finished"
        );
        Ok(())
    }

    fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    fn duplicate(&self) -> Box<dyn Engine> {
        // the copy gets its own interrupt flag: it is an independent context
        Box::new(KnapsackEngine {
            params: self.params.clone(),
            stage: self.stage,
            instance: self.instance.clone(),
            interrupter: Interrupter::new(),
            stats: self.stats,
            best: self.best.clone(),
        })
    }

    fn stats(&self) -> SolveStats {
        self.stats
    }
    fn best_value(&self) -> Option<i64> {
        self.best.as_ref().map(|(v, _)| *v)
    }
    fn best_solution(&self) -> Option<Vec<Decision>> {
        self.best.as_ref().map(|(_, sol)| sol.clone())
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
