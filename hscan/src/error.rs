use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HscanError {
    #[error("expected {expected} height samples, found {actual}")]
    Width { expected: usize, actual: usize },

    #[error("height sample {index} is not a number: {token:?}")]
    Token { index: usize, token: String },
}
