//! Products of likelihoods.
//!
//! A compound likelihood sums the log-likelihoods of its children. Children
//! that evaluate early are summed first, in registration order; if any of
//! them is impossible the rest is never evaluated. The remaining (late)
//! children are summed sequentially, or on a dedicated worker pool.

use std::sync::Arc;

use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::{error::Result, graph::ModelGraph, likelihood::LikelihoodId};

/// Size of the worker pool used for late children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Threads {
    /// Evaluate everything on the calling thread.
    None,
    /// One worker per late child, if there is more than one.
    #[default]
    Auto,
    Fixed(usize),
}

/// Settings for a compound likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundSettings {
    /// Substitute the children of nested compound likelihoods for the
    /// compound itself.
    pub unroll: bool,
    pub threads: Threads,
}

impl Default for CompoundSettings {
    fn default() -> Self {
        Self {
            unroll: true,
            threads: Threads::Auto,
        }
    }
}

impl CompoundSettings {
    /// The product of likelihood and prior, kept as two nested terms.
    pub fn posterior() -> Self {
        Self {
            unroll: false,
            threads: Threads::None,
        }
    }

    /// Unrolled, without a worker pool.
    pub fn sequential() -> Self {
        Self {
            unroll: true,
            threads: Threads::None,
        }
    }

    pub(crate) fn thread_count(&self, late: usize) -> usize {
        match self.threads {
            Threads::None => 0,
            Threads::Auto if late > 1 => late,
            Threads::Auto => 0,
            Threads::Fixed(threads) => threads,
        }
    }
}

pub(crate) struct CompoundLikelihood {
    likelihoods: Vec<LikelihoodId>,
    early: Vec<LikelihoodId>,
    late: Vec<LikelihoodId>,
    pool: Option<Arc<ThreadPool>>,
}

impl CompoundLikelihood {
    /// `likelihoods` must already be unrolled and free of duplicates; each
    /// entry is paired with whether it evaluates early.
    pub(crate) fn new(
        name: &str,
        likelihoods: Vec<(LikelihoodId, bool)>,
        settings: &CompoundSettings,
    ) -> Result<Self> {
        let early: Vec<_> = likelihoods
            .iter()
            .filter(|(_, early)| *early)
            .map(|&(id, _)| id)
            .collect();
        let late: Vec<_> = likelihoods
            .iter()
            .filter(|(_, early)| !*early)
            .map(|&(id, _)| id)
            .collect();

        let threads = settings.thread_count(late.len());
        let pool = if threads > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("likelihood-worker-{}", i))
                .build()?;
            tracing::debug!(likelihood = name, threads, "started likelihood worker pool");
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(CompoundLikelihood {
            likelihoods: likelihoods.into_iter().map(|(id, _)| id).collect(),
            early,
            late,
            pool,
        })
    }

    pub(crate) fn likelihoods(&self) -> &[LikelihoodId] {
        &self.likelihoods
    }

    pub(crate) fn early(&self) -> &[LikelihoodId] {
        &self.early
    }

    pub(crate) fn late(&self) -> &[LikelihoodId] {
        &self.late
    }

    pub(crate) fn pool(&self) -> Option<&Arc<ThreadPool>> {
        self.pool.as_ref()
    }

    pub(crate) fn calculate_log_likelihood(&self, graph: &ModelGraph) -> Result<f64> {
        let early = evaluate_likelihoods(graph, &self.early)?;
        if early == f64::NEG_INFINITY {
            tracing::debug!("early likelihood is impossible, skipping late likelihoods");
            return Ok(f64::NEG_INFINITY);
        }

        let late = match &self.pool {
            None => evaluate_likelihoods(graph, &self.late)?,
            Some(pool) => pool
                .install(|| {
                    self.late
                        .par_iter()
                        .map(|&likelihood| graph.log_likelihood(likelihood))
                        .collect::<Result<Vec<f64>>>()
                })?
                .into_iter()
                .sum(),
        };

        Ok(early + late)
    }
}

fn evaluate_likelihoods(graph: &ModelGraph, likelihoods: &[LikelihoodId]) -> Result<f64> {
    let mut log_likelihood = 0.;
    for &likelihood in likelihoods {
        let value = graph.log_likelihood(likelihood)?;
        if value == f64::NEG_INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        log_likelihood += value;
    }
    Ok(log_likelihood)
}
