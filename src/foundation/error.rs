pub type StagehandResult<T> = Result<T, StagehandError>;

#[derive(thiserror::Error, Debug)]
pub enum StagehandError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("callback error: {0}")]
    Callback(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StagehandError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn callback(err: impl Into<anyhow::Error>) -> Self {
        Self::Callback(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            StagehandError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            StagehandError::callback(std::io::Error::other("x"))
                .to_string()
                .contains("callback error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = StagehandError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
