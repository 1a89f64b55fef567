//! # Payment Confirmation
//!
//! The gateway itself lives outside this crate. What the client owns is the
//! hand-off around it:
//!
//! 1. [`PaymentApi::initiate`] resolves the amount, mints a transaction id and
//!    persists a [`PendingPayment`] before the user leaves for the gateway.
//! 2. On return, [`PaymentApi::process`] checks the schedule, confirms once
//!    through `payment/confirm/`, and only if that fails patches the
//!    schedule to `paid` directly.
//! 3. The pending record is cleared once the schedule is known to be paid.
//!
//! Each user action sends at most one confirmation and one fallback patch.

use crate::client::{Access, ApiClient};
use crate::error::{ApiError, Result};
use crate::schedule::{schedule_path, Schedule};
use crate::vaccine::{price_of, Vaccine};
use bridge_traits::storage::SecureStore;
use bridge_traits::time::Clock;
use core_runtime::config::PaymentConfig;
use core_runtime::events::{ConfirmationRoute, CoreEvent, EventBus, PaymentEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const CONFIRM: &str = "payment/confirm/";

/// Record kept in secure storage while the user is at the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub schedule_id: u64,
    pub amount: f64,
    pub transaction_id: String,
    /// Unix milliseconds when the record was created.
    pub timestamp: i64,
}

#[derive(Serialize)]
struct Confirmation<'a> {
    schedule_id: u64,
    amount: f64,
    transaction_id: &'a str,
}

/// Outcome of a successful confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub schedule_id: u64,
    pub transaction_id: String,
    pub route: ConfirmationRoute,
    /// Server response; `Null` when nothing was sent.
    pub response: Value,
}

/// Payment reported back through the redirect query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPayment {
    pub schedule_id: u64,
    pub message: String,
}

/// Parses `payment_success=true&schedule_id=N`, with or without a leading `?`.
///
/// ```
/// use core_api::payment::completed_from_redirect;
///
/// let done = completed_from_redirect("?payment_success=true&schedule_id=42").unwrap();
/// assert_eq!(done.schedule_id, 42);
/// assert!(completed_from_redirect("payment_success=false&schedule_id=42").is_none());
/// ```
pub fn completed_from_redirect(query: &str) -> Option<CompletedPayment> {
    let params: HashMap<String, String> =
        serde_urlencoded::from_str(query.trim_start_matches('?')).ok()?;

    if params.get("payment_success").map(String::as_str) != Some("true") {
        return None;
    }

    let schedule_id = params.get("schedule_id")?.parse().ok()?;
    Some(CompletedPayment {
        schedule_id,
        message: format!("Payment completed successfully for schedule #{}!", schedule_id),
    })
}

pub struct PaymentApi {
    client: Arc<ApiClient>,
    secure_store: Arc<dyn SecureStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    config: PaymentConfig,
}

impl PaymentApi {
    pub fn new(
        client: Arc<ApiClient>,
        secure_store: Arc<dyn SecureStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        config: PaymentConfig,
    ) -> Self {
        Self {
            client,
            secure_store,
            clock,
            event_bus,
            config,
        }
    }

    /// Schedule amount, then the vaccine's listed price, then the default.
    pub fn resolve_amount(&self, schedule: &Schedule, vaccines: &[Vaccine]) -> f64 {
        schedule
            .amount
            .filter(|amount| *amount > 0.0)
            .or_else(|| {
                schedule
                    .vaccine
                    .as_ref()
                    .and_then(|v| v.get("price"))
                    .and_then(|price| match price {
                        Value::Number(n) => n.as_f64(),
                        Value::String(s) => s.parse().ok(),
                        _ => None,
                    })
                    .filter(|amount| *amount > 0.0)
            })
            .or_else(|| price_of(vaccines, schedule.vaccine_id()?))
            .unwrap_or(self.config.default_amount)
    }

    /// Creates and persists the pending record for `schedule`.
    #[instrument(skip(self, schedule, vaccines), fields(schedule_id = schedule.id))]
    pub async fn initiate(&self, schedule: &Schedule, vaccines: &[Vaccine]) -> Result<PendingPayment> {
        let amount = self.resolve_amount(schedule, vaccines);
        let timestamp = self.clock.unix_timestamp_millis();
        let pending = PendingPayment {
            schedule_id: schedule.id,
            amount,
            transaction_id: format!(
                "{}-{}-{}",
                self.config.transaction_prefix, schedule.id, timestamp
            ),
            timestamp,
        };

        let data = serde_json::to_vec(&pending).map_err(|e| ApiError::decode(CONFIRM, e))?;
        self.secure_store
            .set_secret(&self.config.pending_key, &data)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))?;

        info!(amount, transaction_id = %pending.transaction_id, "Payment initiated");
        self.emit(PaymentEvent::Initiated {
            schedule_id: pending.schedule_id,
            transaction_id: pending.transaction_id.clone(),
            amount,
        });
        Ok(pending)
    }

    /// The pending record, if one survives. A corrupt record is discarded.
    pub async fn pending(&self) -> Result<Option<PendingPayment>> {
        let Some(data) = self
            .secure_store
            .get_secret(&self.config.pending_key)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };

        match serde_json::from_slice(&data) {
            Ok(pending) => Ok(Some(pending)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable pending payment");
                self.clear_pending().await?;
                Ok(None)
            }
        }
    }

    pub async fn clear_pending(&self) -> Result<()> {
        self.secure_store
            .delete_secret(&self.config.pending_key)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))
    }

    /// Confirms once, falling back to patching the schedule.
    #[instrument(skip(self, pending), fields(schedule_id = pending.schedule_id))]
    pub async fn confirm(&self, pending: &PendingPayment) -> Result<PaymentReceipt> {
        let confirmation = Confirmation {
            schedule_id: pending.schedule_id,
            amount: pending.amount,
            transaction_id: &pending.transaction_id,
        };

        let confirm_error = match self
            .client
            .post::<_, Value>(CONFIRM, Access::Authenticated, &confirmation)
            .await
        {
            Ok(response) => {
                return Ok(self.receipt(pending, ConfirmationRoute::ConfirmEndpoint, response))
            }
            Err(e) if e.requires_login() => return Err(self.failed(pending, e)),
            Err(e) => e,
        };

        warn!(error = %confirm_error, "Confirmation endpoint failed, patching schedule");
        let patch = json!({
            "payment_status": "paid",
            "transaction_id": pending.transaction_id,
        });

        match self
            .client
            .patch::<_, Value>(&schedule_path(pending.schedule_id), &patch)
            .await
        {
            Ok(response) => Ok(self.receipt(pending, ConfirmationRoute::SchedulePatch, response)),
            Err(e) => Err(self.failed(pending, e)),
        }
    }

    /// Full return-from-gateway handling for `pending`.
    ///
    /// An already paid schedule sends nothing further. The pending record is
    /// cleared on success and kept on failure so the user can retry.
    #[instrument(skip(self, pending), fields(schedule_id = pending.schedule_id))]
    pub async fn process(&self, pending: &PendingPayment) -> Result<PaymentReceipt> {
        let receipt = match self
            .client
            .get::<Schedule>(&schedule_path(pending.schedule_id), Access::Authenticated)
            .await
        {
            Ok(schedule) if schedule.is_paid() => {
                debug!("Schedule already paid");
                self.receipt(pending, ConfirmationRoute::AlreadyPaid, Value::Null)
            }
            Err(e) if e.requires_login() => return Err(self.failed(pending, e)),
            Ok(_) => self.confirm(pending).await?,
            Err(e) => {
                debug!(error = %e, "Schedule lookup failed, confirming anyway");
                self.confirm(pending).await?
            }
        };

        if let Err(e) = self.clear_pending().await {
            warn!(error = %e, "Failed to clear pending payment");
        }
        Ok(receipt)
    }

    fn receipt(
        &self,
        pending: &PendingPayment,
        route: ConfirmationRoute,
        response: Value,
    ) -> PaymentReceipt {
        info!(route = ?route, transaction_id = %pending.transaction_id, "Payment confirmed");
        self.emit(PaymentEvent::Confirmed {
            schedule_id: pending.schedule_id,
            transaction_id: pending.transaction_id.clone(),
            route,
        });
        PaymentReceipt {
            schedule_id: pending.schedule_id,
            transaction_id: pending.transaction_id.clone(),
            route,
            response,
        }
    }

    fn failed(&self, pending: &PendingPayment, error: ApiError) -> ApiError {
        warn!(error = %error, "Payment confirmation failed");
        self.emit(PaymentEvent::Failed {
            schedule_id: pending.schedule_id,
            message: error.banner_message(),
        });
        error
    }

    fn emit(&self, event: PaymentEvent) {
        let _ = self.event_bus.emit(CoreEvent::Payment(event));
    }
}
