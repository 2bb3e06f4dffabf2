//! Reconciliation of an order's stored items against its contract.
//!
//! The contract is authoritative for *which* items were bought. When an order
//! row carries an item with the same (normalized) name, the order-side
//! quantity, price and total are shown under the contract's label; otherwise
//! the contract's own values are used. Order items unknown to the contract
//! are kept as extras.

use crate::model::{round_cents, Contract, LineItem, Order};
use crate::normalize::{dedup_names, email_key, name_key};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    pub total: f64,
    pub image: Option<String>,
}

impl DisplayItem {
    fn from_item(item: &LineItem) -> Self {
        Self {
            name: item.name.clone(),
            quantity: item.quantity,
            price: item.price,
            total: item.line_total(),
            image: item.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// Contract items (or the order's own items when there is no contract).
    pub items: Vec<DisplayItem>,
    /// Order items the contract does not list.
    pub extras: Vec<DisplayItem>,
    /// Whether `items` came from a contract.
    pub from_contract: bool,
}

impl Reconciled {
    pub fn all(&self) -> impl Iterator<Item = &DisplayItem> {
        self.items.iter().chain(self.extras.iter())
    }

    pub fn total(&self) -> f64 {
        round_cents(self.all().map(|i| i.total).sum())
    }

    /// Distinct purchased names, used for the delivery checklist.
    pub fn product_names(&self) -> Vec<String> {
        dedup_names(self.all().map(|i| i.name.as_str()))
    }
}

/// Contracts keyed by id and by normalized client email.
#[derive(Debug, Clone, Default)]
pub struct ContractIndex {
    contracts: Vec<Contract>,
    by_id: HashMap<String, usize>,
    by_email: HashMap<String, usize>,
}

impl ContractIndex {
    /// Earlier contracts win the email slot; callers pass them newest first.
    pub fn new(contracts: Vec<Contract>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_email = HashMap::new();
        for (idx, contract) in contracts.iter().enumerate() {
            by_id.entry(contract.id.clone()).or_insert(idx);
            let email = email_key(&contract.client_email);
            if !email.is_empty() {
                by_email.entry(email).or_insert(idx);
            }
        }
        Self {
            contracts,
            by_id,
            by_email,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Contract> {
        self.by_id.get(id).map(|idx| &self.contracts[*idx])
    }

    pub fn by_email(&self, email: &str) -> Option<&Contract> {
        let key = email_key(email);
        if key.is_empty() {
            return None;
        }
        self.by_email.get(&key).map(|idx| &self.contracts[*idx])
    }

    /// The order's linked contract: explicit id first, then customer email.
    pub fn resolve(&self, order: &Order) -> Option<&Contract> {
        order
            .contract_id
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| self.by_email(&order.customer_email))
    }
}

/// Items to show for `order`. Pure: reads its inputs only.
pub fn display_items(order: &Order, contracts: &ContractIndex) -> Reconciled {
    match contracts.resolve(order) {
        Some(contract) if !contract.store_items.is_empty() => reconcile_with(order, contract),
        _ => Reconciled {
            items: order.items.iter().map(DisplayItem::from_item).collect(),
            extras: Vec::new(),
            from_contract: false,
        },
    }
}

fn reconcile_with(order: &Order, contract: &Contract) -> Reconciled {
    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    for canonical in &contract.store_items {
        let key = name_key(&canonical.name);
        if !seen.insert(key.clone()) {
            continue;
        }
        let shown = match order.items.iter().find(|i| name_key(&i.name) == key) {
            Some(stored) => DisplayItem {
                name: canonical.name.clone(),
                quantity: stored.quantity,
                price: stored.price,
                total: stored.line_total(),
                image: stored.image.clone().or_else(|| canonical.image.clone()),
            },
            None => DisplayItem::from_item(canonical),
        };
        items.push(shown);
    }

    let extras = order
        .items
        .iter()
        .filter(|i| !seen.contains(&name_key(&i.name)))
        .map(DisplayItem::from_item)
        .collect();

    Reconciled {
        items,
        extras,
        from_contract: true,
    }
}
