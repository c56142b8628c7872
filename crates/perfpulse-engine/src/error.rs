use perfpulse_db::DbError;
use thiserror::Error;

/// Failures surfaced by a [`crate::PulseStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The generated slug collided with an existing pulse.
    #[error("pulse slug already taken")]
    SlugTaken,

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation_on(perfpulse_db::PULSE_SLUG_CONSTRAINT) {
            StoreError::SlugTaken
        } else {
            StoreError::Db(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown playlist: {0}")]
    UnknownPlaylist(String),

    #[error("could not allocate a unique pulse slug after {attempts} attempts")]
    SlugExhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_constraint_violation_becomes_slug_taken() {
        let err: StoreError = DbError::UniqueViolation {
            constraint: perfpulse_db::PULSE_SLUG_CONSTRAINT.to_owned(),
        }
        .into();
        assert!(matches!(err, StoreError::SlugTaken));

        let err: StoreError = DbError::UniqueViolation {
            constraint: "targets_slug_key".to_owned(),
        }
        .into();
        assert!(matches!(err, StoreError::Db(_)));
    }
}
