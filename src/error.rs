use thiserror::Error;

/// Errors raised while assembling or driving a likelihood graph.
///
/// Structural errors name the offending element so they can be traced back
/// to the model description that produced it. A log-likelihood of negative
/// infinity is never an error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Index {index} is out of range for variable '{variable}' of dimension {dimension}")]
    IndexOutOfRange {
        variable: String,
        index: usize,
        dimension: usize,
    },

    #[error("Variable '{variable}' has dimension {expected} but {found} values were given")]
    DimensionMismatch {
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("Variable '{variable}' must have at least one dimension")]
    ZeroDimension { variable: String },

    #[error("Bounds must have the same number of dimensions: expected {expected}, found {found}")]
    BoundsDimensionMismatch { expected: usize, found: usize },

    #[error("Invalid bounds in dimension {dimension}: lower {lower} is above upper {upper}")]
    InvalidBounds {
        dimension: usize,
        lower: f64,
        upper: f64,
    },

    #[error("Adding model '{child}' to '{parent}' would create a cycle")]
    ModelCycle { parent: String, child: String },

    #[error("Compound likelihood '{likelihood}' needs at least one likelihood")]
    EmptyCompound { likelihood: String },

    #[error("Evaluation of likelihood '{likelihood}' failed")]
    Evaluation {
        likelihood: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Could not start likelihood worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Weight must be a positive real, but operator '{operator}' was given {weight}")]
    InvalidWeight { operator: String, weight: f64 },

    #[error("Accept/reject called on operator '{operator}' without operate called in between")]
    AcceptRejectWithoutOperate { operator: String },

    #[error("Operator '{operator}' was asked to operate while a proposal is still pending")]
    OperatePending { operator: String },
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    pub(crate) fn evaluation(
        likelihood: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        GraphError::Evaluation {
            likelihood: likelihood.to_string(),
            source: source.into(),
        }
    }
}
