use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Returned when a stored enum column holds a value outside its closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// ============================================
// Trigger vocabulary
// ============================================

/// Entity category a workflow or tag assignment applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerScope {
    Lead,
    Client,
    Inspection,
    Invoice,
    Job,
    Payment,
    Service,
    Template,
}

impl TriggerScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Client => "client",
            Self::Inspection => "inspection",
            Self::Invoice => "invoice",
            Self::Job => "job",
            Self::Payment => "payment",
            Self::Service => "service",
            Self::Template => "template",
        }
    }
}

impl FromStr for TriggerScope {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(Self::Lead),
            "client" => Ok(Self::Client),
            "inspection" => Ok(Self::Inspection),
            "invoice" => Ok(Self::Invoice),
            "job" => Ok(Self::Job),
            "payment" => Ok(Self::Payment),
            "service" => Ok(Self::Service),
            "template" => Ok(Self::Template),
            other => Err(UnknownVariant { kind: "trigger scope", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    TagAdded,
    TagRemoved,
    StatusChanged,
    Event,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TagAdded => "tag_added",
            Self::TagRemoved => "tag_removed",
            Self::StatusChanged => "status_changed",
            Self::Event => "event",
        }
    }

    pub fn is_tag_change(&self) -> bool {
        matches!(self, Self::TagAdded | Self::TagRemoved)
    }
}

impl FromStr for TriggerType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tag_added" => Ok(Self::TagAdded),
            "tag_removed" => Ok(Self::TagRemoved),
            "status_changed" => Ok(Self::StatusChanged),
            "event" => Ok(Self::Event),
            other => Err(UnknownVariant { kind: "trigger type", value: other.to_string() }),
        }
    }
}

// ============================================
// Workflow definitions
// ============================================

/// Declarative predicates evaluated before a workflow fires. All present
/// predicates are ANDed; empty tag lists count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_tag_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_tag_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_in: Option<Vec<String>>,
}

impl Conditions {
    /// Whether evaluation needs the entity's assigned tag set.
    pub fn needs_tags(&self) -> bool {
        !self.include_tag_ids.is_empty() || !self.exclude_tag_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagActionConfig {
    #[serde(default)]
    pub tag_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailConfig {
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertLeadConfig {
    #[serde(default)]
    pub delete_lead: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookActionConfig {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub webhook_id: Option<Uuid>,
}

/// Accepts `5`, `5.0` or `"5"`; anything else (including negatives) is zero.
fn lenient_minutes<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let minutes = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if minutes.is_finite() && minutes > 0.0 {
        Ok(minutes.min(u32::MAX as f64) as u32)
    } else {
        Ok(0)
    }
}

/// One step of a workflow pipeline.
///
/// Stored as `{"type": "...", "config": {...}}`. Config that fails to parse
/// falls back to its default, which the executor reports as `skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAction", into = "RawAction")]
pub enum Action {
    AddTag(TagActionConfig),
    RemoveTag(TagActionConfig),
    SendEmail(SendEmailConfig),
    Notify(NotifyConfig),
    Wait(WaitConfig),
    ConvertLeadToClient(ConvertLeadConfig),
    Webhook(WebhookActionConfig),
    Unknown { kind: String, config: serde_json::Value },
}

impl Action {
    pub fn kind(&self) -> &str {
        match self {
            Self::AddTag(_) => "add_tag",
            Self::RemoveTag(_) => "remove_tag",
            Self::SendEmail(_) => "send_email",
            Self::Notify(_) => "notify",
            Self::Wait(_) => "wait",
            Self::ConvertLeadToClient(_) => "convert_lead_to_client",
            Self::Webhook(_) => "webhook",
            Self::Unknown { kind, .. } => kind,
        }
    }

    pub fn add_tag(tag_id: Uuid) -> Self {
        Self::AddTag(TagActionConfig { tag_id: Some(tag_id) })
    }

    pub fn remove_tag(tag_id: Uuid) -> Self {
        Self::RemoveTag(TagActionConfig { tag_id: Some(tag_id) })
    }

    pub fn wait(minutes: u32) -> Self {
        Self::Wait(WaitConfig { minutes })
    }

    pub fn convert_lead(delete_lead: bool) -> Self {
        Self::ConvertLeadToClient(ConvertLeadConfig { delete_lead })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAction {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    config: serde_json::Value,
}

fn parse_config<T: serde::de::DeserializeOwned + Default>(config: serde_json::Value) -> T {
    serde_json::from_value(config).unwrap_or_default()
}

impl From<RawAction> for Action {
    fn from(raw: RawAction) -> Self {
        let config = raw.config;
        match raw.kind.as_deref() {
            Some("add_tag") => Self::AddTag(parse_config(config)),
            Some("remove_tag") => Self::RemoveTag(parse_config(config)),
            Some("send_email") => Self::SendEmail(parse_config(config)),
            Some("notify") => Self::Notify(parse_config(config)),
            Some("wait") => Self::Wait(parse_config(config)),
            Some("convert_lead_to_client") => Self::ConvertLeadToClient(parse_config(config)),
            Some("webhook") => Self::Webhook(parse_config(config)),
            other => Self::Unknown {
                kind: other.unwrap_or("unknown").to_string(),
                config,
            },
        }
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let kind = action.kind().to_string();
        let config = match action {
            Action::AddTag(c) | Action::RemoveTag(c) => serde_json::to_value(c),
            Action::SendEmail(c) => serde_json::to_value(c),
            Action::Notify(c) => serde_json::to_value(c),
            Action::Wait(c) => serde_json::to_value(c),
            Action::ConvertLeadToClient(c) => serde_json::to_value(c),
            Action::Webhook(c) => serde_json::to_value(c),
            Action::Unknown { config, .. } => Ok(config),
        };
        RawAction {
            kind: Some(kind),
            config: config.unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub trigger_scope: TriggerScope,
    pub trigger_type: TriggerType,
    pub trigger_tag_id: Option<Uuid>,
    pub actions: Vec<Action>,
    pub conditions: Conditions,
    pub delay_minutes: u32,
    pub is_active: bool,
}

impl WorkflowDefinition {
    /// An unset trigger tag matches any tag.
    pub fn matches_tag(&self, tag_id: Uuid) -> bool {
        self.trigger_tag_id.is_none_or(|t| t == tag_id)
    }
}

// ============================================
// Workflow runs
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            other => Err(UnknownVariant { kind: "run status", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Ok,
    Skipped,
    Queued,
    Noted,
    Wait,
    Converted,
}

/// Logged result of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "templateId", default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u32>,
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched: Option<usize>,
}

impl ActionOutcome {
    pub fn new(kind: impl Into<String>, status: ActionStatus) -> Self {
        Self {
            kind: kind.into(),
            status,
            reason: None,
            template_id: None,
            message: None,
            minutes: None,
            client_id: None,
            dispatched: None,
        }
    }

    pub fn ok(kind: impl Into<String>) -> Self {
        Self::new(kind, ActionStatus::Ok)
    }

    pub fn skipped(kind: impl Into<String>, reason: Option<&str>) -> Self {
        let mut outcome = Self::new(kind, ActionStatus::Skipped);
        outcome.reason = reason.map(str::to_string);
        outcome
    }

    pub fn wait(minutes: u32) -> Self {
        let mut outcome = Self::new("wait", ActionStatus::Wait);
        outcome.minutes = Some(minutes);
        outcome
    }

    /// Minutes to suspend for, when this outcome is a wait signal.
    pub fn wait_minutes(&self) -> Option<u32> {
        match self.status {
            ActionStatus::Wait => Some(self.minutes.unwrap_or(0)),
            _ => None,
        }
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Resumption state persisted in `workflow_runs.result`.
///
/// At every persisted checkpoint `actions.len() == next_index`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    #[serde(default)]
    pub actions: Vec<ActionOutcome>,
    #[serde(rename = "nextIndex", default)]
    pub next_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RunCheckpoint {
    pub fn scheduled(at: DateTime<Utc>) -> Self {
        Self {
            scheduled_for: Some(at),
            ..Self::default()
        }
    }

    /// Append an executed action and advance the cursor past it.
    pub fn record(&mut self, index: usize, outcome: ActionOutcome) {
        self.actions.push(outcome);
        self.next_index = index + 1;
        self.failures = 0;
        self.last_error = None;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub scope: TriggerScope,
    pub entity_id: Uuid,
    pub status: RunStatus,
    pub result: RunCheckpoint,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================
// Leads and clients
// ============================================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub client_id: Option<Uuid>,
    pub stage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl From<&Lead> for NewClient {
    fn from(lead: &Lead) -> Self {
        Self {
            name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            notes: lead.notes.clone(),
        }
    }
}

// ============================================
// Webhooks
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Active,
    Paused,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for WebhookStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant { kind: "webhook status", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Linear,
    #[default]
    Exponential,
}

fn default_max_attempts() -> u32 {
    3
}

/// Stored as `webhooks.retry_strategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RetryPolicy {
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Request timeout in milliseconds; the dispatcher default applies when unset
    #[validate(range(min = 5000, max = 60000))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffStrategy::default(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub url: String,
    pub secret: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub events: Vec<String>,
    pub status: WebhookStatus,
    pub retry_strategy: RetryPolicy,
    pub failure_count: i32,
    pub last_error: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Webhook {
    pub fn is_subscribed(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

/// Append-only audit row, one per delivery attempt.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub error: Option<String>,
    pub attempt_number: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Pending,
    InFlight,
    Done,
}

impl RetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
        }
    }
}

impl FromStr for RetryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "done" => Ok(Self::Done),
            other => Err(UnknownVariant { kind: "retry status", value: other.to_string() }),
        }
    }
}

/// Durable record of a delivery attempt waiting for its backoff to elapse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRetry {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempt_number: i32,
    pub run_at: DateTime<Utc>,
    pub status: RetryStatus,
}
