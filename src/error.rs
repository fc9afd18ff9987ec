// error.rs
use thiserror::Error;

/// Coarse classification the request layer maps to caller-visible responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InvalidInviteCode,
    AlreadyMember,
    DuplicateVote,
    OptionNotInPoll,
    InvalidTransition,
    StorageFailure,
}

#[derive(Error, Debug)]
pub enum CoreError {
    /// The entity is absent or the caller has no visibility into it.
    #[error("not found")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid invite code")]
    InvalidInviteCode,

    #[error("user is already a member or owner of this poll")]
    AlreadyMember,

    #[error("vote already cast for this option")]
    DuplicateVote,

    #[error("option does not exist for this poll")]
    OptionNotInPoll,

    #[error("no vote found for this option")]
    VoteNotFound,

    #[error("no fields provided for updating poll")]
    NoFieldsProvided,

    #[error("match cannot transition from its current state for this caller")]
    InvalidTransition,

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound | CoreError::VoteNotFound => ErrorKind::NotFound,
            CoreError::InvalidInput(_) | CoreError::NoFieldsProvided => ErrorKind::InvalidInput,
            CoreError::InvalidInviteCode => ErrorKind::InvalidInviteCode,
            CoreError::AlreadyMember => ErrorKind::AlreadyMember,
            CoreError::DuplicateVote => ErrorKind::DuplicateVote,
            CoreError::OptionNotInPoll => ErrorKind::OptionNotInPoll,
            CoreError::InvalidTransition => ErrorKind::InvalidTransition,
            CoreError::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specific_errors_fold_into_taxonomy() {
        assert_eq!(CoreError::VoteNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::NoFieldsProvided.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            CoreError::Storage(sqlx::Error::RowNotFound).kind(),
            ErrorKind::StorageFailure
        );
    }
}
