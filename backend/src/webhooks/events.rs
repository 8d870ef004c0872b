use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Business events a webhook can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.updated")]
    OrderUpdated,
    #[serde(rename = "order.completed")]
    OrderCompleted,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "inspection.created")]
    InspectionCreated,
    #[serde(rename = "inspection.updated")]
    InspectionUpdated,
    #[serde(rename = "inspection.started")]
    InspectionStarted,
    #[serde(rename = "inspection.completed")]
    InspectionCompleted,
    #[serde(rename = "inspection.submitted")]
    InspectionSubmitted,
    #[serde(rename = "client.created")]
    ClientCreated,
    #[serde(rename = "client.updated")]
    ClientUpdated,
    #[serde(rename = "invoice.created")]
    InvoiceCreated,
    #[serde(rename = "invoice.updated")]
    InvoiceUpdated,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.overdue")]
    InvoiceOverdue,
    #[serde(rename = "schedule.created")]
    ScheduleCreated,
    #[serde(rename = "schedule.updated")]
    ScheduleUpdated,
    #[serde(rename = "schedule.cancelled")]
    ScheduleCancelled,
    #[serde(rename = "service.created")]
    ServiceCreated,
    #[serde(rename = "service.updated")]
    ServiceUpdated,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 20] = [
        Self::OrderCreated,
        Self::OrderUpdated,
        Self::OrderCompleted,
        Self::OrderCancelled,
        Self::InspectionCreated,
        Self::InspectionUpdated,
        Self::InspectionStarted,
        Self::InspectionCompleted,
        Self::InspectionSubmitted,
        Self::ClientCreated,
        Self::ClientUpdated,
        Self::InvoiceCreated,
        Self::InvoiceUpdated,
        Self::InvoicePaid,
        Self::InvoiceOverdue,
        Self::ScheduleCreated,
        Self::ScheduleUpdated,
        Self::ScheduleCancelled,
        Self::ServiceCreated,
        Self::ServiceUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order.created",
            Self::OrderUpdated => "order.updated",
            Self::OrderCompleted => "order.completed",
            Self::OrderCancelled => "order.cancelled",
            Self::InspectionCreated => "inspection.created",
            Self::InspectionUpdated => "inspection.updated",
            Self::InspectionStarted => "inspection.started",
            Self::InspectionCompleted => "inspection.completed",
            Self::InspectionSubmitted => "inspection.submitted",
            Self::ClientCreated => "client.created",
            Self::ClientUpdated => "client.updated",
            Self::InvoiceCreated => "invoice.created",
            Self::InvoiceUpdated => "invoice.updated",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoiceOverdue => "invoice.overdue",
            Self::ScheduleCreated => "schedule.created",
            Self::ScheduleUpdated => "schedule.updated",
            Self::ScheduleCancelled => "schedule.cancelled",
            Self::ServiceCreated => "service.created",
            Self::ServiceUpdated => "service.updated",
        }
    }

    /// Representative `data` for test deliveries
    pub fn sample_payload(&self) -> serde_json::Value {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let client = serde_json::json!({
            "id": Uuid::nil(),
            "name": "John Doe",
            "email": "john@example.com",
        });
        let property = serde_json::json!({
            "id": Uuid::nil(),
            "address": "123 Main St, City, State 12345",
        });

        match self.as_str().split('.').next() {
            Some("order") => serde_json::json!({
                "order": {
                    "id": Uuid::nil(),
                    "order_number": "ORD-SAMPLE",
                    "status": "pending",
                    "client": client,
                    "property": property,
                    "services": [{"id": Uuid::nil(), "name": "Home Inspection", "price": 450.0}],
                    "total": 450.0,
                    "created_at": now,
                }
            }),
            Some("inspection") => serde_json::json!({
                "inspection": {
                    "id": Uuid::nil(),
                    "order_id": Uuid::nil(),
                    "status": "in_progress",
                    "inspector": {"id": Uuid::nil(), "name": "Jane Inspector", "email": "jane@example.com"},
                    "property": property,
                    "started_at": now,
                }
            }),
            Some("client") => serde_json::json!({
                "client": {
                    "id": Uuid::nil(),
                    "name": "John Doe",
                    "email": "john@example.com",
                    "phone": "555-1234",
                    "created_at": now,
                }
            }),
            Some("invoice") => serde_json::json!({
                "invoice": {
                    "id": Uuid::nil(),
                    "invoice_number": "INV-SAMPLE",
                    "order_id": Uuid::nil(),
                    "client": client,
                    "total": 450.0,
                    "status": "paid",
                    "issued_at": now,
                }
            }),
            _ => serde_json::json!({
                "message": format!("Test webhook for {}", self.as_str()),
            }),
        }
    }
}

impl fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown webhook event '{0}'")]
pub struct UnknownEvent(pub String);

impl FromStr for WebhookEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}
