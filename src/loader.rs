//! Order list loading and contract → order synthesis.
//!
//! Every contract with purchased items ends up with exactly one order in the
//! list: an order that already links to it, an aggregated view over stored
//! rows tagged with its id, or a freshly created order. Fetch and create
//! failures are logged and degrade the result; they never abort the load.

use crate::connectivity::Connectivity;
use crate::db::model::{decode_contract, decode_order, decode_product, encode_order};
use crate::db::{Document, DocumentStore, CONTRACTS, ORDERS, PRODUCTS};
use crate::model::{round_cents, Contract, LineItem, Order, OrderStatus, Product, TemplateKind, WorkflowTemplate};
use crate::normalize::{dedup_names, name_key};
use crate::reconcile::ContractIndex;
use crate::templates;
use crate::workflow::{ensure_delivery_tasks, from_template};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

const CREATED_AT_FIELD: &str = "createdAt";

/// Products keyed by id and by normalized name, for image lookups.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    by_id: HashMap<String, Product>,
    by_name: HashMap<String, Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        let mut catalog = Self::default();
        for product in products {
            let key = name_key(&product.name);
            if !key.is_empty() {
                catalog.by_name.entry(key).or_insert_with(|| product.clone());
            }
            catalog.by_id.insert(product.id.clone(), product);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Item image, else its product's image (by id, then by name).
    pub fn image_for(&self, item: &LineItem) -> Option<String> {
        if let Some(image) = item.image.as_ref().filter(|i| !i.trim().is_empty()) {
            return Some(image.clone());
        }
        let by_id = item.product_id.as_deref().and_then(|id| self.by_id.get(id));
        by_id
            .or_else(|| self.by_name.get(&name_key(&item.name)))
            .and_then(|p| p.image.clone())
    }

    pub fn thumbnail(&self, items: &[LineItem]) -> Option<String> {
        items.iter().find_map(|i| self.image_for(i))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadedOrders {
    /// Newest first.
    pub orders: Vec<Order>,
    pub contracts: ContractIndex,
    pub catalog: ProductCatalog,
    /// Ids of orders created from contracts during this load.
    pub created: Vec<String>,
    pub offline: bool,
}

#[instrument(skip_all)]
pub async fn load_orders(store: &dyn DocumentStore, connectivity: &dyn Connectivity) -> LoadedOrders {
    if !connectivity.is_online().await {
        info!("offline; skipping order load");
        return LoadedOrders {
            offline: true,
            ..LoadedOrders::default()
        };
    }

    let mut orders = fetch_orders(store).await;
    let catalog = fetch_products(store).await;
    let contracts = fetch_contracts(store).await;

    let created = synthesize_from_contracts(store, &mut orders, &contracts, &catalog).await;

    for order in &mut orders {
        if order.thumbnail.is_none() {
            order.thumbnail = catalog.thumbnail(&order.items);
        }
    }
    newest_first(&mut orders, |o| o.created_at);

    info!(
        orders = orders.len(),
        contracts = contracts.len(),
        products = catalog.len(),
        created = created.len(),
        "orders loaded"
    );
    LoadedOrders {
        orders,
        contracts: ContractIndex::new(contracts),
        catalog,
        created,
        offline: false,
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> Option<DateTime<Utc>>) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// Documents from the ordered query, or from a full scan when that fails;
/// an empty list when both fail. The server order is only a first pass:
/// `createdAt` comes in several shapes that the database compares by storage
/// type, so callers always re-sort on the decoded timestamp.
async fn fetch_all(store: &dyn DocumentStore, collection: &str) -> Vec<Document> {
    match store.list_ordered(collection, CREATED_AT_FIELD).await {
        Ok(docs) => return docs,
        Err(err) => warn!(?err, collection = %collection, "ordered query failed; falling back to full scan"),
    }
    match store.list(collection).await {
        Ok(docs) => docs,
        Err(err) => {
            warn!(?err, collection = %collection, "failed to read collection");
            Vec::new()
        }
    }
}

/// Newest first.
pub async fn fetch_orders(store: &dyn DocumentStore) -> Vec<Order> {
    let mut orders: Vec<Order> = fetch_all(store, ORDERS).await.iter().map(decode_order).collect();
    newest_first(&mut orders, |o| o.created_at);
    orders
}

/// Newest first.
pub async fn fetch_contracts(store: &dyn DocumentStore) -> Vec<Contract> {
    let mut contracts: Vec<Contract> = fetch_all(store, CONTRACTS).await.iter().map(decode_contract).collect();
    newest_first(&mut contracts, |c| c.created_at);
    contracts
}

pub async fn fetch_products(store: &dyn DocumentStore) -> ProductCatalog {
    match store.list(PRODUCTS).await {
        Ok(docs) => ProductCatalog::new(docs.iter().map(decode_product).collect()),
        Err(err) => {
            warn!(?err, "failed to read products");
            ProductCatalog::default()
        }
    }
}

async fn synthesize_from_contracts(
    store: &dyn DocumentStore,
    orders: &mut Vec<Order>,
    contracts: &[Contract],
    catalog: &ProductCatalog,
) -> Vec<String> {
    let mut linked: HashSet<String> = orders.iter().filter_map(|o| o.contract_id.clone()).collect();
    let mut seed: Option<Option<WorkflowTemplate>> = None;
    let mut created = Vec::new();

    for contract in contracts.iter().filter(|c| !c.store_items.is_empty()) {
        if linked.contains(&contract.id) {
            continue;
        }

        let tagged = match store.find_eq(ORDERS, "contractId", &json!(contract.id)).await {
            Ok(docs) => docs,
            Err(err) => {
                warn!(?err, contract_id = %contract.id, "failed to look up orders for contract; skipping");
                continue;
            }
        };
        linked.insert(contract.id.clone());

        if !tagged.is_empty() {
            let rows: Vec<Order> = tagged.iter().map(decode_order).collect();
            debug!(contract_id = %contract.id, rows = rows.len(), "aggregating tagged order rows");
            orders.push(aggregate_rows(contract, rows, catalog));
            continue;
        }

        if seed.is_none() {
            seed = Some(templates::default_template(store, TemplateKind::Store).await);
        }
        let mut order = order_from_contract(contract, seed.as_ref().and_then(Option::as_ref), Utc::now());
        match store.insert(ORDERS, encode_order(&order)).await {
            Ok(id) => {
                info!(order_id = %id, contract_id = %contract.id, total = order.total, "created order from contract");
                order.id = id.clone();
                created.push(id);
                orders.push(order);
            }
            Err(err) => warn!(?err, contract_id = %contract.id, "failed to create order from contract"),
        }
    }
    created
}

/// One view over several stored rows that belong to the same contract.
fn aggregate_rows(contract: &Contract, rows: Vec<Order>, catalog: &ProductCatalog) -> Order {
    let total = round_cents(rows.iter().map(|r| r.total).sum());
    let items: Vec<LineItem> = rows.iter().flat_map(|r| r.items.iter().cloned()).collect();
    let thumbnail = catalog.thumbnail(&items);
    let mut rows = rows.into_iter();
    let first = rows.next().unwrap_or_default();
    Order {
        items,
        total,
        thumbnail,
        contract_id: Some(contract.id.clone()),
        synthetic: true,
        ..first
    }
}

/// New pending order for a contract's purchased items, total including the
/// travel fee, with the delivery checklist in place.
pub fn order_from_contract(contract: &Contract, seed: Option<&WorkflowTemplate>, now: DateTime<Utc>) -> Order {
    let items: Vec<LineItem> = contract
        .store_items
        .iter()
        .map(|item| LineItem {
            total: Some(item.line_total()),
            ..item.clone()
        })
        .collect();
    let subtotal: f64 = items.iter().map(LineItem::line_total).sum();
    let names = dedup_names(items.iter().map(|i| i.name.as_str()));
    let base = seed.map(from_template).unwrap_or_default();

    Order {
        id: String::new(),
        customer_name: contract.client_name.clone(),
        customer_email: contract.client_email.clone(),
        payment_method: None,
        notes: None,
        items,
        total: round_cents(subtotal + contract.travel_fee),
        created_at: Some(now),
        status: OrderStatus::Pending,
        workflow: Some(ensure_delivery_tasks(&base, &names)),
        contract_id: Some(contract.id.clone()),
        deposit_paid: contract.deposit_paid,
        delivered_at: None,
        thumbnail: None,
        synthetic: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Task};

    fn contract() -> Contract {
        Contract {
            id: "c1".into(),
            client_name: "Ana".into(),
            client_email: "ana@x.com".into(),
            store_items: vec![LineItem::new("Album A", 2, 100.0), LineItem::new("album a", 1, 10.0)],
            travel_fee: 25.0,
            ..Contract::default()
        }
    }

    #[test]
    fn order_from_contract_totals_and_checklist() {
        let order = order_from_contract(&contract(), None, Utc::now());
        assert_eq!(order.total, 235.0);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items[0].total, Some(200.0));
        let delivery = order.workflow.as_ref().unwrap().delivery().unwrap();
        assert_eq!(delivery.tasks.len(), 1);
        assert_eq!(delivery.tasks[0].title, "Entregar Album A");
    }

    #[test]
    fn seed_template_precedes_delivery() {
        let mut category = Category::new("", "Pós-produção");
        let mut task = Task::new("", "Tratamento");
        task.done = true;
        category.tasks.push(task);
        let tpl = WorkflowTemplate {
            id: "tpl".into(),
            name: "Loja".into(),
            categories: vec![category],
        };
        let order = order_from_contract(&contract(), Some(&tpl), Utc::now());
        let wf = order.workflow.unwrap();
        assert_eq!(wf.categories.len(), 2);
        assert_eq!(wf.categories[0].name, "Pós-produção");
        assert!(!wf.categories[0].tasks[0].done);
    }

    #[test]
    fn catalog_resolves_images_in_order() {
        let catalog = ProductCatalog::new(vec![
            Product {
                id: "p1".into(),
                name: "Álbum A".into(),
                image: Some("album.jpg".into()),
                price: None,
            },
            Product {
                id: "p2".into(),
                name: "Quadro".into(),
                image: Some("quadro.jpg".into()),
                price: None,
            },
        ]);
        let mut by_id = LineItem::new("whatever", 1, 1.0);
        by_id.product_id = Some("p2".into());
        assert_eq!(catalog.image_for(&by_id).as_deref(), Some("quadro.jpg"));
        assert_eq!(
            catalog.image_for(&LineItem::new("album a", 1, 1.0)).as_deref(),
            Some("album.jpg")
        );
        let mut own = LineItem::new("album a", 1, 1.0);
        own.image = Some("own.jpg".into());
        assert_eq!(catalog.image_for(&own).as_deref(), Some("own.jpg"));
        assert_eq!(
            catalog.thumbnail(&[LineItem::new("unknown", 1, 1.0), LineItem::new("quadro", 1, 1.0)]).as_deref(),
            Some("quadro.jpg")
        );
    }

    #[test]
    fn aggregation_sums_rows() {
        let row = |id: &str, name: &str, total: f64| Order {
            id: id.into(),
            items: vec![LineItem::new(name, 1, total)],
            total,
            ..Order::default()
        };
        let view = aggregate_rows(
            &contract(),
            vec![row("r1", "Album A", 200.0), row("r2", "Quadro", 50.5)],
            &ProductCatalog::default(),
        );
        assert_eq!(view.id, "r1");
        assert_eq!(view.total, 250.5);
        assert_eq!(view.items.len(), 2);
        assert!(view.synthetic);
        assert_eq!(view.contract_id.as_deref(), Some("c1"));
    }
}
