//! Univariate densities and a likelihood built from them.

use rand::{Rng, RngCore};
use rand_distr::Exp;

use crate::{
    error::Result,
    graph::ModelGraph,
    likelihood::{LikelihoodFunction, LikelihoodId},
    variable::VariableId,
};

/// A univariate probability distribution over the reals.
pub trait Distribution: std::fmt::Debug + Send + Sync {
    fn pdf(&self, x: f64) -> f64;

    /// Negative infinity outside the support.
    fn log_pdf(&self, x: f64) -> f64;

    fn differentiate_log_pdf(&self, x: f64) -> f64;

    fn cdf(&self, x: f64) -> f64;

    fn log_cdf(&self, x: f64) -> f64;

    /// The inverse of the cdf. `p` outside `[0, 1]` gives NaN.
    fn quantile(&self, p: f64) -> f64;

    fn mean(&self) -> f64;

    fn variance(&self) -> f64;

    fn sample(&self, rng: &mut dyn RngCore) -> f64;

    /// Lower and upper end of the support.
    fn support(&self) -> (f64, f64);

    fn has_bounded_support(&self) -> bool {
        let (lower, upper) = self.support();
        lower.is_finite() || upper.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uniform {
    lower: f64,
    upper: f64,
}

impl Uniform {
    pub fn new(lower: f64, upper: f64) -> Option<Self> {
        (lower < upper && lower.is_finite() && upper.is_finite()).then_some(Self { lower, upper })
    }
}

impl Distribution for Uniform {
    fn pdf(&self, x: f64) -> f64 {
        if x >= self.lower && x <= self.upper {
            1. / (self.upper - self.lower)
        } else {
            0.
        }
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if x < self.lower || x > self.upper {
            return f64::NEG_INFINITY;
        }
        -(self.upper - self.lower).ln()
    }

    fn differentiate_log_pdf(&self, _x: f64) -> f64 {
        0.
    }

    fn cdf(&self, x: f64) -> f64 {
        ((x - self.lower) / (self.upper - self.lower)).clamp(0., 1.)
    }

    fn log_cdf(&self, x: f64) -> f64 {
        if x < self.lower {
            return f64::NEG_INFINITY;
        }
        if x > self.upper {
            return 0.;
        }
        (x - self.lower).ln() - (self.upper - self.lower).ln()
    }

    fn quantile(&self, p: f64) -> f64 {
        if !(0. ..=1.).contains(&p) {
            return f64::NAN;
        }
        p * (self.upper - self.lower) + self.lower
    }

    fn mean(&self) -> f64 {
        (self.lower + self.upper) / 2.
    }

    fn variance(&self) -> f64 {
        (self.upper - self.lower).powi(2) / 12.
    }

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        rng.random_range(self.lower..self.upper)
    }

    fn support(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

/// The exponential distribution with the given rate.
#[derive(Debug, Clone, Copy)]
pub struct Exponential {
    rate: f64,
    sampler: Exp<f64>,
}

impl Exponential {
    pub fn new(rate: f64) -> Option<Self> {
        if !(rate > 0.) || !rate.is_finite() {
            return None;
        }
        let sampler = Exp::new(rate).ok()?;
        Some(Self { rate, sampler })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Distribution for Exponential {
    fn pdf(&self, x: f64) -> f64 {
        if x < 0. {
            return 0.;
        }
        self.rate * (-self.rate * x).exp()
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if x < 0. {
            return f64::NEG_INFINITY;
        }
        self.rate.ln() - self.rate * x
    }

    fn differentiate_log_pdf(&self, x: f64) -> f64 {
        if x < 0. {
            return 0.;
        }
        -self.rate
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < 0. {
            return 0.;
        }
        -(-self.rate * x).exp_m1()
    }

    fn log_cdf(&self, x: f64) -> f64 {
        if x < 0. {
            return f64::NEG_INFINITY;
        }
        (-(-self.rate * x).exp_m1()).ln()
    }

    fn quantile(&self, p: f64) -> f64 {
        if !(0. ..=1.).contains(&p) {
            return f64::NAN;
        }
        -(-p).ln_1p() / self.rate
    }

    fn mean(&self) -> f64 {
        1. / self.rate
    }

    fn variance(&self) -> f64 {
        1. / (self.rate * self.rate)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        rng.sample(self.sampler)
    }

    fn support(&self) -> (f64, f64) {
        (0., f64::INFINITY)
    }
}

/// Independent draws: the log-likelihood is the sum of `log_pdf` over every
/// entry of one variable.
#[derive(Debug)]
pub struct DistributionLikelihood<D> {
    variable: VariableId,
    distribution: D,
}

impl<D: Distribution + 'static> DistributionLikelihood<D> {
    pub fn new(variable: VariableId, distribution: D) -> Self {
        Self {
            variable,
            distribution,
        }
    }

    /// Builds the likelihood inside `graph`, on a model holding `variable`.
    pub fn attach(
        graph: &mut ModelGraph,
        name: &str,
        variable: VariableId,
        distribution: D,
    ) -> Result<LikelihoodId> {
        let model = graph.new_model(&format!("{}Data", name));
        graph.add_variable(model, variable);
        graph.new_likelihood(name, &[model], Self::new(variable, distribution))
    }

    pub fn distribution(&self) -> &D {
        &self.distribution
    }
}

impl<D: Distribution + 'static> LikelihoodFunction for DistributionLikelihood<D> {
    fn calculate_log_likelihood(&mut self, graph: &ModelGraph) -> anyhow::Result<f64> {
        let mut log_likelihood = 0.;
        for &x in graph.variable(self.variable).values() {
            log_likelihood += self.distribution.log_pdf(x);
            if log_likelihood == f64::NEG_INFINITY {
                break;
            }
        }
        Ok(log_likelihood)
    }

    fn evaluate_early(&self) -> bool {
        self.distribution.has_bounded_support()
    }

    fn derivative(
        &mut self,
        graph: &ModelGraph,
        variable: VariableId,
        index: usize,
    ) -> anyhow::Result<Option<f64>> {
        if variable != self.variable {
            return Ok(Some(0.));
        }
        let x = graph.variable(variable).value(index)?;
        Ok(Some(self.distribution.differentiate_log_pdf(x)))
    }
}
