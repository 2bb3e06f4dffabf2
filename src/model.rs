use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order lifecycle. Documents carry either the English or the Portuguese
/// vocabulary; the English one is what gets written back.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "pending", alias = "pendente")]
    Pending,
    #[serde(rename = "processing", alias = "processando", alias = "em_andamento")]
    Processing,
    #[serde(rename = "completed", alias = "concluido", alias = "concluído")]
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "pendente" => Some(OrderStatus::Pending),
            "processing" | "processando" | "em_andamento" | "em andamento" => {
                Some(OrderStatus::Processing)
            }
            "completed" | "concluido" | "concluído" => Some(OrderStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchased item, on either an order or a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: u32, price: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
            total: None,
            image: None,
            product_id: None,
        }
    }

    /// Stored total, or price × quantity when the document has none.
    pub fn line_total(&self) -> f64 {
        self.total
            .unwrap_or_else(|| round_cents(self.price * f64::from(self.quantity)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            done: false,
            due: None,
            note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tasks: Vec::new(),
        }
    }
}

/// Fulfillment checklist attached to an order and mirrored onto its contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<LineItem>,
    pub total: f64,
    pub created_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub workflow: Option<Workflow>,
    pub contract_id: Option<String>,
    pub deposit_paid: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    /// First resolvable item image; filled in by the loader.
    pub thumbnail: Option<String>,
    /// Aggregated view over several stored rows tagged with the same contract.
    pub synthetic: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contract {
    pub id: String,
    pub client_name: String,
    pub client_email: String,
    pub store_items: Vec<LineItem>,
    pub workflow: Option<Workflow>,
    pub deposit_paid: bool,
    pub travel_fee: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub price: Option<f64>,
}

/// Which default template seeds a fresh workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Orders with purchased store items.
    Store,
    /// Booking-only orders.
    Session,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Store => "store",
            TemplateKind::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultTemplates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// The `settings/studio` singleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioSettings {
    #[serde(default)]
    pub default_templates: DefaultTemplates,
}

impl StudioSettings {
    pub fn template_id(&self, kind: TemplateKind) -> Option<&str> {
        match kind {
            TemplateKind::Store => self.default_templates.store.as_deref(),
            TemplateKind::Session => self.default_templates.session.as_deref(),
        }
        .filter(|id| !id.trim().is_empty())
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Timestamps arrive as RFC 3339 strings, epoch milliseconds, or
/// `{seconds, nanoseconds}` objects; they are written as RFC 3339 with
/// millisecond precision so lexical order matches chronological order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
    use serde_json::Value;

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Value::Object(map) => {
                let secs = map
                    .get("seconds")
                    .or_else(|| map.get("_seconds"))
                    .and_then(Value::as_i64)?;
                let nanos = map
                    .get("nanoseconds")
                    .or_else(|| map.get("_nanoseconds"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                Utc.timestamp_opt(secs, nanos as u32).single()
            }
            _ => None,
        }
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};
        use serde_json::Value;

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(ts) => serializer.serialize_str(&super::format(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = Option::<Value>::deserialize(deserializer)?;
            Ok(raw.as_ref().and_then(super::from_value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_accepts_both_vocabularies() {
        assert_eq!(OrderStatus::parse_status("pendente"), Some(OrderStatus::Pending));
        assert_eq!(OrderStatus::parse_status("Completed"), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::parse_status("em_andamento"), Some(OrderStatus::Processing));
        assert_eq!(OrderStatus::parse_status("shipped"), None);

        let parsed: OrderStatus = serde_json::from_value(json!("concluido")).unwrap();
        assert_eq!(parsed, OrderStatus::Completed);
        assert_eq!(serde_json::to_value(parsed).unwrap(), json!("completed"));
    }

    #[test]
    fn line_total_falls_back_to_price_times_quantity() {
        let mut item = LineItem::new("Album", 3, 33.33);
        assert_eq!(item.line_total(), 99.99);
        item.total = Some(80.0);
        assert_eq!(item.line_total(), 80.0);
    }

    #[test]
    fn timestamps_in_every_stored_shape() {
        let iso = timestamp::from_value(&json!("2024-03-01T10:00:00Z")).unwrap();
        let millis = timestamp::from_value(&json!(1709287200000_i64)).unwrap();
        let object = timestamp::from_value(&json!({"seconds": 1709287200, "nanoseconds": 0})).unwrap();
        assert_eq!(iso, millis);
        assert_eq!(iso, object);
        assert_eq!(timestamp::format(&iso), "2024-03-01T10:00:00.000Z");
        assert!(timestamp::from_value(&json!(true)).is_none());
    }

    #[test]
    fn task_due_round_trips_through_json() {
        let task: Task = serde_json::from_value(json!({
            "id": "t1",
            "title": "Editar fotos",
            "due": {"_seconds": 1709287200},
        }))
        .unwrap();
        assert!(!task.done);
        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["due"], "2024-03-01T10:00:00.000Z");
        assert!(back.get("note").is_none());
    }

    #[test]
    fn settings_ignore_blank_template_ids() {
        let settings: StudioSettings = serde_json::from_value(json!({
            "defaultTemplates": {"store": "tpl-1", "session": " "}
        }))
        .unwrap();
        assert_eq!(settings.template_id(TemplateKind::Store), Some("tpl-1"));
        assert_eq!(settings.template_id(TemplateKind::Session), None);
    }
}
