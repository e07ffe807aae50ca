use thiserror::Error;

pub type Result<T, E = TilerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TilerError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("No cluster with the specified id.")]
    UnknownCluster(u64),
    #[error("encode vector tile: {0}")]
    Encode(String),
}

impl TilerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TilerError::InvalidInput(message.into())
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, TilerError::InvalidInput(_))
    }
}

impl From<mvt::Error> for TilerError {
    fn from(err: mvt::Error) -> Self {
        TilerError::Encode(err.to_string())
    }
}
