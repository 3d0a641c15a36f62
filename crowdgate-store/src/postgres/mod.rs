pub mod booking_repo;
pub mod transaction_repo;

pub use booking_repo::PgBookingRepository;
pub use transaction_repo::{PgOutbox, PgTransactionRepository};

use crowdgate_core::repository::RepositoryError;

pub(crate) fn db_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}
