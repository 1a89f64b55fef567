//! Vaccination schedules (`vaccination-schedules/`).
//!
//! Schedules double as orders: they carry the payment method and status that
//! the payment flow updates.

use crate::client::{list_items, Access, ApiClient};
use crate::de::{lenient_f64, Related};
use crate::error::{ApiError, Result};
use bridge_traits::http::HttpMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument};

const SCHEDULES: &str = "vaccination-schedules/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vaccine: Option<Related>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<Related>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Related>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dose_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dose_dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Schedule {
    pub fn vaccine_id(&self) -> Option<u64> {
        self.vaccine.as_ref().and_then(Related::id)
    }

    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("completed")
        )
    }

    pub fn is_online_payment(&self) -> bool {
        self.payment_method
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("online"))
    }

    /// Online orders that still wait for payment.
    pub fn has_unpaid_online_payment(&self) -> bool {
        self.is_online_payment() && !self.is_paid()
    }

    /// When the order was placed, from whichever field the backend filled.
    pub fn order_date(&self) -> Option<&str> {
        [&self.created_at, &self.created, &self.order_date, &self.date]
            .into_iter()
            .find_map(non_empty)
    }

    /// When the dose is due.
    pub fn delivery_date(&self) -> Option<&str> {
        non_empty(&self.dose_date)
            .or_else(|| self.dose_dates.first().map(String::as_str).filter(|d| !d.is_empty()))
            .or_else(|| non_empty(&self.delivery_date))
    }

    pub fn status_label(&self) -> String {
        status_label(self.status.as_deref())
    }

    pub fn payment_method_label(&self) -> String {
        payment_method_label(self.payment_method.as_deref())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `pending` → `Pending`; missing → `Unknown`.
pub fn status_label(status: Option<&str>) -> String {
    let Some(status) = status.filter(|s| !s.is_empty()) else {
        return "Unknown".to_string();
    };
    let mut chars = status.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_string(),
    }
}

pub fn payment_method_label(method: Option<&str>) -> String {
    match method {
        Some("cash") => "Cash on Delivery".to_string(),
        Some("online") => "Online Payment".to_string(),
        Some("insurance") => "Insurance".to_string(),
        Some(other) if !other.is_empty() => other.to_string(),
        _ => "Unknown".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSchedule {
    pub vaccine: u64,
    pub campaign: Option<u64>,
    pub payment_method: String,
    /// `YYYY-MM-DD`
    pub dose_date: String,
    pub patient: u64,
}

/// Response to a create; the id may arrive as `schedule_id` or `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSchedule {
    pub id: u64,
    pub body: Value,
}

impl CreatedSchedule {
    fn from_value(value: Value) -> Result<Self> {
        let id = ["schedule_id", "id"]
            .iter()
            .find_map(|field| value.get(field).and_then(Value::as_u64))
            .ok_or_else(|| ApiError::decode(SCHEDULES, "response carries no schedule id"))?;
        Ok(Self { id, body: value })
    }
}

pub struct ScheduleApi {
    client: Arc<ApiClient>,
}

impl ScheduleApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Schedule>> {
        let value = self
            .client
            .send(HttpMethod::Get, SCHEDULES, Access::Authenticated, None)
            .await?;
        list_items(SCHEDULES, value)
    }

    pub async fn get(&self, id: u64) -> Result<Schedule> {
        self.client
            .get(&schedule_path(id), Access::Authenticated)
            .await
    }

    #[instrument(skip(self, schedule), fields(vaccine = schedule.vaccine))]
    pub async fn create(&self, schedule: &NewSchedule) -> Result<CreatedSchedule> {
        let value: Value = self
            .client
            .post(SCHEDULES, Access::Authenticated, schedule)
            .await?;
        let created = CreatedSchedule::from_value(value)?;
        info!(schedule_id = created.id, "Schedule created");
        Ok(created)
    }

    /// Partial update, e.g. `{"payment_status": "paid"}`.
    pub async fn update<P: Serialize + ?Sized>(&self, id: u64, patch: &P) -> Result<Value> {
        self.client.patch(&schedule_path(id), patch).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: u64) -> Result<()> {
        self.client.delete(&schedule_path(id)).await
    }
}

pub(crate) fn schedule_path(id: u64) -> String {
    format!("{}{}/", SCHEDULES, id)
}
