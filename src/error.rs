use thiserror::Error;

#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Parse error at line {line}, symbol {symbol}: {snippet}")]
    Parse {
        line: usize,
        symbol: usize,
        snippet: String,
    },
    #[error("Unknown function: {0}")]
    FunctionUnknown(String),
    #[error("Function {name} takes {expected} argument(s), got {got}")]
    FunctionArity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("Invalid regex /{pattern}/: {message}")]
    RegexInvalid { pattern: String, message: String },
    #[error("No cluster context for ${0}")]
    NoClusterContext(String),
    #[error("Key expression for cluster {cluster} must name exactly one key, got {got}")]
    KeyNotString { cluster: String, got: usize },
    #[error("State error: {0}")]
    State(String),
    #[error("Evaluation limit of {0} nodes exceeded")]
    EvalLimit(usize),
    #[error("Query cancelled")]
    Cancelled,
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, RangeError>;
