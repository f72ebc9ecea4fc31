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

//! This module contains everything that is necessary to parse a knapsack
//! instance file (`.kp`) and turn it into a struct usable by the built-in
//! engine. Chances are high that this module will be of little to no
//! interest to you.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::ProblemLoadError;

/// A 0/1 knapsack problem instance: `n` items with a profit and a weight
/// each, and a sack capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnapsackInstance {
    pub capacity: i64,
    pub profit: Vec<i64>,
    pub weight: Vec<i64>,
}
impl KnapsackInstance {
    /// The number of items (hence of decision variables) of the instance.
    pub fn nb_items(&self) -> usize {
        self.profit.len()
    }
}

/// Reads an instance from a `.kp` file. The format is plain text: the first
/// meaningful line holds `n capacity`, then follow `n` lines of
/// `profit weight`. Lines starting with `#` and blank lines are skipped.
pub fn read_instance<P: AsRef<Path>>(fname: P) -> Result<KnapsackInstance, ProblemLoadError> {
    let f = File::open(fname)?;
    let f = BufReader::new(f);

    let mut header: Option<(usize, i64)> = None;
    let mut profit = vec![];
    let mut weight = vec![];

    for line in f.lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        match header {
            None => {
                let n = tokens.next().ok_or(ProblemLoadError::Format)?.parse::<usize>()?;
                let capacity = tokens.next().ok_or(ProblemLoadError::Format)?.parse::<i64>()?;
                header = Some((n, capacity));
            }
            Some(_) => {
                let p = tokens.next().ok_or(ProblemLoadError::Format)?.parse::<i64>()?;
                let w = tokens.next().ok_or(ProblemLoadError::Format)?.parse::<i64>()?;
                profit.push(p);
                weight.push(w);
            }
        }
    }

    let (n, capacity) = header.ok_or(ProblemLoadError::Format)?;
    if profit.len() != n {
        return Err(ProblemLoadError::Format);
    }
    Ok(KnapsackInstance { capacity, profit, weight })
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
