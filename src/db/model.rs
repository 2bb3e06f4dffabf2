//! Adapters between stored documents and domain types.
//!
//! Collections were written by several generations of the site, so one
//! logical field can live under a snake_case key, a camelCase key, or a
//! legacy name (`clientName` on orders, `qty` on items). Decoding tries each
//! spelling in order and never fails: a missing or malformed field falls back
//! to its default. Encoding always writes the canonical camelCase form.

use super::Document;
use crate::model::{
    timestamp, Category, Contract, LineItem, Order, OrderStatus, Product, StudioSettings, Task,
    Workflow, WorkflowTemplate,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

const CUSTOMER_NAME: &[&str] = &["customerName", "customer_name", "clientName", "client_name"];
const CUSTOMER_EMAIL: &[&str] = &["customerEmail", "customer_email", "clientEmail", "client_email"];
const CREATED_AT: &[&str] = &["createdAt", "created_at"];

/// Read-only view over a document body with multi-key lookups.
struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn of(body: &'a Value) -> Option<Self> {
        body.as_object().map(Fields)
    }

    fn raw(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !v.is_null())
    }

    fn str(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn f64(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().filter_map(|k| self.0.get(*k)).find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', ".").parse().ok(),
            _ => None,
        })
    }

    fn u32(&self, keys: &[&str]) -> Option<u32> {
        self.f64(keys)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.round() as u32)
    }

    fn bool(&self, keys: &[&str]) -> Option<bool> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find_map(Value::as_bool)
    }

    fn timestamp(&self, keys: &[&str]) -> Option<DateTime<Utc>> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find_map(timestamp::from_value)
    }
}

pub fn decode_line_item(value: &Value) -> LineItem {
    let Some(f) = Fields::of(value) else {
        return LineItem::new(value.as_str().unwrap_or_default(), 1, 0.0);
    };
    LineItem {
        name: f.str(&["name", "title", "productName"]).unwrap_or_default(),
        quantity: f.u32(&["quantity", "qty"]).unwrap_or(1),
        price: f.f64(&["price", "unitPrice", "unit_price"]).unwrap_or(0.0),
        total: f.f64(&["total", "subtotal"]),
        image: f.str(&["image", "imageUrl", "image_url", "thumbnail"]),
        product_id: f.str(&["productId", "product_id"]),
    }
}

fn decode_items(value: Option<&Value>) -> Vec<LineItem> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode_line_item).collect())
        .unwrap_or_default()
}

/// Accepts `{categories: [...]}` as well as a bare category array. Entries
/// are decoded one by one; a malformed task or category is repaired with
/// defaults (or skipped when it is not an object) without affecting the rest.
pub fn decode_workflow(value: &Value) -> Option<Workflow> {
    let categories = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("categories")?.as_array()?,
        _ => return None,
    };
    Some(Workflow {
        categories: categories.iter().filter_map(decode_category).collect(),
    })
}

fn decode_category(value: &Value) -> Option<Category> {
    let Some(f) = Fields::of(value) else {
        debug!(?value, "skipping non-object workflow category");
        return None;
    };
    let tasks = f
        .raw(&["tasks", "items"])
        .and_then(Value::as_array)
        .map(|tasks| tasks.iter().filter_map(decode_task).collect())
        .unwrap_or_default();
    Some(Category {
        id: f.str(&["id"]).unwrap_or_default(),
        name: f.str(&["name", "title"]).unwrap_or_default(),
        tasks,
    })
}

fn decode_task(value: &Value) -> Option<Task> {
    let Some(f) = Fields::of(value) else {
        debug!(?value, "skipping non-object workflow task");
        return None;
    };
    Some(Task {
        id: f.str(&["id"]).unwrap_or_default(),
        title: f.str(&["title", "name", "text"]).unwrap_or_default(),
        done: f.bool(&["done", "completed"]).unwrap_or(false),
        due: f.timestamp(&["due", "dueDate", "due_date"]),
        note: f.str(&["note", "notes"]),
    })
}

pub fn decode_order(doc: &Document) -> Order {
    let Some(f) = Fields::of(&doc.body) else {
        return Order {
            id: doc.id.clone(),
            ..Order::default()
        };
    };
    let items = decode_items(f.raw(&["items", "storeItems"]));
    let total = f
        .f64(&["total", "totalAmount", "total_amount"])
        .unwrap_or_else(|| items.iter().map(LineItem::line_total).sum());
    Order {
        id: doc.id.clone(),
        customer_name: f.str(CUSTOMER_NAME).unwrap_or_default(),
        customer_email: f.str(CUSTOMER_EMAIL).unwrap_or_default(),
        payment_method: f.str(&["paymentMethod", "payment_method"]),
        notes: f.str(&["notes", "note"]),
        items,
        total,
        created_at: f.timestamp(CREATED_AT),
        status: f
            .str(&["status"])
            .and_then(|s| OrderStatus::parse_status(&s))
            .unwrap_or_default(),
        workflow: f.raw(&["workflow"]).and_then(decode_workflow),
        contract_id: f.str(&["contractId", "contract_id"]),
        deposit_paid: f.bool(&["depositPaid", "deposit_paid"]).unwrap_or(false),
        delivered_at: f.timestamp(&["deliveredAt", "delivered_at"]),
        thumbnail: None,
        synthetic: false,
    }
}

pub fn decode_contract(doc: &Document) -> Contract {
    let Some(f) = Fields::of(&doc.body) else {
        return Contract {
            id: doc.id.clone(),
            ..Contract::default()
        };
    };
    Contract {
        id: doc.id.clone(),
        client_name: f.str(&["clientName", "client_name", "name"]).unwrap_or_default(),
        client_email: f.str(&["clientEmail", "client_email", "email"]).unwrap_or_default(),
        store_items: decode_items(f.raw(&["storeItems", "store_items"])),
        workflow: f.raw(&["workflow"]).and_then(decode_workflow),
        deposit_paid: f.bool(&["depositPaid", "deposit_paid"]).unwrap_or(false),
        travel_fee: f.f64(&["travelFee", "travel_fee"]).unwrap_or(0.0),
        created_at: f.timestamp(CREATED_AT),
    }
}

pub fn decode_product(doc: &Document) -> Product {
    let f = Fields::of(&doc.body);
    Product {
        id: doc.id.clone(),
        name: f
            .as_ref()
            .and_then(|f| f.str(&["name", "title"]))
            .unwrap_or_default(),
        image: f
            .as_ref()
            .and_then(|f| f.str(&["image", "imageUrl", "image_url", "thumbnail"])),
        price: f.as_ref().and_then(|f| f.f64(&["price"])),
    }
}

pub fn decode_template(doc: &Document) -> Option<WorkflowTemplate> {
    let f = Fields::of(&doc.body)?;
    let workflow = f
        .raw(&["categories", "workflow"])
        .and_then(decode_workflow)
        .unwrap_or_default();
    Some(WorkflowTemplate {
        id: doc.id.clone(),
        name: f.str(&["name", "title"]).unwrap_or_else(|| doc.id.clone()),
        categories: workflow.categories,
    })
}

pub fn decode_settings(doc: &Document) -> StudioSettings {
    serde_json::from_value(doc.body.clone()).unwrap_or_else(|err| {
        debug!(?err, "ignoring malformed settings document");
        StudioSettings::default()
    })
}

pub fn encode_workflow(workflow: &Workflow) -> Value {
    serde_json::to_value(workflow).unwrap_or_else(|_| json!({ "categories": [] }))
}

pub fn encode_line_item(item: &LineItem) -> Value {
    let mut value = json!({
        "name": item.name,
        "quantity": item.quantity,
        "price": item.price,
        "total": item.line_total(),
    });
    if let Some(image) = &item.image {
        value["image"] = json!(image);
    }
    if let Some(product_id) = &item.product_id {
        value["productId"] = json!(product_id);
    }
    value
}

/// Canonical order document (the id lives outside the body).
pub fn encode_order(order: &Order) -> Value {
    let mut body = Map::new();
    body.insert("customerName".into(), json!(order.customer_name));
    body.insert("customerEmail".into(), json!(order.customer_email));
    if let Some(method) = &order.payment_method {
        body.insert("paymentMethod".into(), json!(method));
    }
    if let Some(notes) = &order.notes {
        body.insert("notes".into(), json!(notes));
    }
    body.insert(
        "items".into(),
        Value::Array(order.items.iter().map(encode_line_item).collect()),
    );
    body.insert("total".into(), json!(order.total));
    if let Some(created_at) = &order.created_at {
        body.insert("createdAt".into(), json!(timestamp::format(created_at)));
    }
    body.insert("status".into(), json!(order.status.as_str()));
    if let Some(workflow) = &order.workflow {
        body.insert("workflow".into(), encode_workflow(workflow));
    }
    if let Some(contract_id) = &order.contract_id {
        body.insert("contractId".into(), json!(contract_id));
    }
    body.insert("depositPaid".into(), json!(order.deposit_paid));
    if let Some(delivered_at) = &order.delivered_at {
        body.insert("deliveredAt".into(), json!(timestamp::format(delivered_at)));
    }
    Value::Object(body)
}

pub fn encode_template(template: &WorkflowTemplate) -> Value {
    json!({
        "name": template.name,
        "categories": serde_json::to_value(&template.categories).unwrap_or_else(|_| json!([])),
    })
}
