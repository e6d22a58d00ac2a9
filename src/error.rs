use thiserror::Error;

/// Errors raised while reading or rewriting the answers table.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("answers file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("answers file is not valid csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("no image found for flag '{0}'")]
    NotFound(String),
    #[error("image i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A session call made in a state that does not allow it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("no flag is currently presented")]
    NoCurrentFlag,
    #[error("a registration decision is still pending")]
    DecisionPending,
    #[error("no registration decision is pending")]
    NoPendingDecision,
    #[error("the game is already over")]
    Finished,
}
