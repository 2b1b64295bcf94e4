//! Payment service trait and in-memory implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::Money;

use crate::error::ServiceError;

/// Result of a successful payment charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// The transaction ID assigned by the payment service, when it sends one.
    pub transaction_id: Option<String>,
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the given amount.
    ///
    /// Anything other than an explicit success is an error.
    async fn charge(&self, amount: Money) -> Result<PaymentReceipt, ServiceError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn charge(&self, amount: Money) -> Result<PaymentReceipt, ServiceError> {
        (**self).charge(amount).await
    }
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: Vec<(String, Money)>,
    next_id: u32,
    fail_on_charge: bool,
    unavailable: bool,
}

/// In-memory payment service for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryPaymentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the service to decline every charge.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state().fail_on_charge = fail;
    }

    /// Makes every charge fail as if the service could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Returns the number of successful charges.
    pub fn charge_count(&self) -> usize {
        self.state().charges.len()
    }

    /// Returns every successful charge amount, in order.
    pub fn charged_amounts(&self) -> Vec<Money> {
        self.state().charges.iter().map(|(_, m)| *m).collect()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(&self, amount: Money) -> Result<PaymentReceipt, ServiceError> {
        let mut state = self.state();

        if state.unavailable {
            return Err(ServiceError::Unavailable {
                method: "POST",
                url: "memory://payment/pay".to_string(),
                reason: "payment service is down".to_string(),
            });
        }
        if state.fail_on_charge {
            return Err(ServiceError::Declined("card declined".to_string()));
        }

        state.next_id += 1;
        let transaction_id = format!("PAY-{:04}", state.next_id);
        state.charges.push((transaction_id.clone(), amount));

        Ok(PaymentReceipt {
            transaction_id: Some(transaction_id),
        })
    }
}
