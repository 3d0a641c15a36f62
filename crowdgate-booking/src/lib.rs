pub mod saga;

pub use saga::{BookingSaga, SagaError};
