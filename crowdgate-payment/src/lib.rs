pub mod engine;
pub mod gateway;

pub use engine::{PaymentEngine, PaymentError};
pub use gateway::MockPaymentGateway;
