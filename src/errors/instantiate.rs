use std::convert::Infallible;

/// Failure reported by a user-provided factory.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<Infallible> for InstantiateErrorKind {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}
