//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::BookingId;
use domain::{IntentRef, Money};

use crate::error::EngineError;

/// A payment intent opened with the external processor.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// The processor-assigned reference for this charge.
    pub reference: IntentRef,
    /// Opaque secret the client uses to complete the charge.
    pub client_secret: String,
}

/// Trait for payment processor operations.
///
/// The processor is the source of truth for settlement; this trait only
/// opens intents and requests refunds. Settlement itself arrives
/// asynchronously through webhooks.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment intent for a booking's total.
    async fn create_intent(
        &self,
        booking_id: BookingId,
        amount: Money,
    ) -> Result<PaymentIntent, EngineError>;

    /// Requests a refund of a settled charge.
    async fn refund(&self, intent_ref: &IntentRef, amount: Money) -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<IntentRef, (BookingId, Money)>,
    refunds: Vec<(IntentRef, Money)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_refund: bool,
    create_failures_left: u32,
    refund_failures_left: u32,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail intent creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the gateway to fail refund calls.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Fails the next `count` intent creations, then recovers.
    pub fn fail_next_creates(&self, count: u32) {
        self.state.write().unwrap().create_failures_left = count;
    }

    /// Fails the next `count` refund calls, then recovers.
    pub fn fail_next_refunds(&self, count: u32) {
        self.state.write().unwrap().refund_failures_left = count;
    }

    /// Returns the number of opened intents.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns the refunds issued so far.
    pub fn refunds(&self) -> Vec<(IntentRef, Money)> {
        self.state.read().unwrap().refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(
        &self,
        booking_id: BookingId,
        amount: Money,
    ) -> Result<PaymentIntent, EngineError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(EngineError::GatewayUnavailable(
                "intent creation failed".to_string(),
            ));
        }
        if state.create_failures_left > 0 {
            state.create_failures_left -= 1;
            return Err(EngineError::GatewayUnavailable(
                "intent creation timed out".to_string(),
            ));
        }

        state.next_id += 1;
        let reference = IntentRef::new(format!("pi_{:04}", state.next_id));
        state.intents.insert(reference.clone(), (booking_id, amount));

        Ok(PaymentIntent {
            client_secret: format!("{}_secret", reference),
            reference,
        })
    }

    async fn refund(&self, intent_ref: &IntentRef, amount: Money) -> Result<(), EngineError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_refund {
            return Err(EngineError::GatewayUnavailable(
                "refund failed".to_string(),
            ));
        }
        if state.refund_failures_left > 0 {
            state.refund_failures_left -= 1;
            return Err(EngineError::GatewayUnavailable(
                "refund timed out".to_string(),
            ));
        }

        state.refunds.push((intent_ref.clone(), amount));
        Ok(())
    }
}
