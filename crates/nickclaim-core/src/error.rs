//! Error types for nickclaim-core

use nickclaim_common::StoreError;

/// Errors raised while setting up contenders
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("candidate name set is empty")]
    EmptyRegistry,

    #[error("candidate name must not be blank")]
    BlankName,

    #[error("candidate name '{0}' listed more than once")]
    DuplicateName(String),

    #[error("contender id '{0}' already in use")]
    DuplicateContender(String),

    #[error("contender count must be > 0")]
    NoContenders,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CoreError::DuplicateName("robert".to_string()).to_string(),
            "candidate name 'robert' listed more than once"
        );

        let err: CoreError = StoreError::Connection("refused".to_string()).into();
        assert_eq!(err.to_string(), "could not connect to the cluster: refused");
    }
}
