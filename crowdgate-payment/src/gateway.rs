//! Reference gateway adapter: stochastic approvals with simulated latency,
//! standing in for Stripe/Razorpay/PayPal. The real adapter plugs in behind
//! the same trait.

use async_trait::async_trait;
use crowdgate_core::gateway::{ChargeOutcome, ChargeRequest, GatewayError, PaymentGateway};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const FAILURE_REASONS: [&str; 5] = [
    "Insufficient funds",
    "Card declined",
    "Invalid card number",
    "Card expired",
    "Transaction limit exceeded",
];

pub struct MockPaymentGateway {
    success_rate: f64,
    latency: Option<(Duration, Duration)>,
    /// Completed charges by transaction id, served back by `lookup`.
    outcomes: Mutex<HashMap<Uuid, ChargeOutcome>>,
    charges: AtomicUsize,
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentGateway {
    /// Production-ish behaviour: 90% success, 1-2 s latency.
    pub fn new() -> Self {
        Self {
            success_rate: 0.9,
            latency: Some((Duration::from_secs(1), Duration::from_secs(2))),
            outcomes: Mutex::new(HashMap::new()),
            charges: AtomicUsize::new(0),
        }
    }

    /// Deterministic approval, no latency. For tests.
    pub fn approving() -> Self {
        Self {
            success_rate: 1.0,
            latency: None,
            outcomes: Mutex::new(HashMap::new()),
            charges: AtomicUsize::new(0),
        }
    }

    /// Deterministic decline, no latency. For tests.
    pub fn declining() -> Self {
        Self {
            success_rate: 0.0,
            latency: None,
            outcomes: Mutex::new(HashMap::new()),
            charges: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some((latency, latency));
        self
    }

    /// How many charges hit the gateway; the payment idempotence tests
    /// assert on this.
    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        info!(
            "Processing payment: amount={}, userId={}, bookingId={}",
            request.amount, request.user_id, request.booking_id
        );

        if let Some((min, max)) = self.latency {
            let spread = max.saturating_sub(min);
            let jitter = spread.mul_f64(rand::random::<f64>());
            tokio::time::sleep(min + jitter).await;
        }

        let outcome = if rand::random::<f64>() < self.success_rate {
            let reference = format!(
                "pg_ref_{}",
                &Uuid::new_v4().simple().to_string()[..8]
            );
            info!("Payment successful: gatewayRef={}", reference);
            ChargeOutcome::Approved {
                gateway_reference: reference,
            }
        } else {
            let index = (rand::random::<f64>() * FAILURE_REASONS.len() as f64) as usize;
            let reason = FAILURE_REASONS[index.min(FAILURE_REASONS.len() - 1)];
            warn!("Payment failed: reason={}", reason);
            ChargeOutcome::Declined {
                reason: reason.to_string(),
            }
        };

        self.outcomes
            .lock()
            .unwrap()
            .insert(request.transaction_id, outcome.clone());
        Ok(outcome)
    }

    async fn lookup(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        Ok(self.outcomes.lock().unwrap().get(&transaction_id).cloned())
    }
}
