//! Admin console session over the order list.
//!
//! Mutations go to the store first (order, then its contract when one
//! resolves) and are followed by a full reload, so the in-memory view always
//! reflects committed state. Store write failures are logged and do not
//! abort the operation; nothing is retried.

use crate::admin_mode::AdminMode;
use crate::auth::validate_email;
use crate::connectivity::Connectivity;
use crate::db::model::encode_workflow;
use crate::db::{DocumentStore, CONTRACTS, ORDERS};
use crate::loader::{fetch_contracts, load_orders, LoadedOrders};
use crate::model::{timestamp, Category, Contract, Order, OrderStatus, Task, TemplateKind, Workflow, WorkflowTemplate};
use crate::payment::{summarize, PaymentSummary};
use crate::reconcile::{display_items, ContractIndex, Reconciled};
use crate::templates;
use crate::workflow::{
    ensure_delivery_tasks, from_template, is_delivery_category, mirror_onto_contract, new_id,
    set_delivery_done,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PanelError {
    #[error("admin mode is required for this action")]
    AdminModeRequired,
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("no workflow is open")]
    NoOpenWorkflow,
    #[error("category {0} not found")]
    CategoryNotFound(String),
    #[error("task {task_id} not found in category {category_id}")]
    TaskNotFound { category_id: String, task_id: String },
    #[error("workflow is not in edit mode")]
    NotEditing,
}

/// Asked before destructive or bulk actions.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Fixed answer, for scripted use and `--yes`.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Workflow staged for one order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowEditor {
    pub order_id: String,
    pub staged: Workflow,
    /// Distinct purchased product names, from the reconciled items.
    pub products: Vec<String>,
    pub editing: bool,
}

pub struct OrderPanel {
    store: Arc<dyn DocumentStore>,
    connectivity: Arc<dyn Connectivity>,
    admin: AdminMode,
    state: LoadedOrders,
    editor: Option<WorkflowEditor>,
}

impl OrderPanel {
    pub fn new(store: Arc<dyn DocumentStore>, connectivity: Arc<dyn Connectivity>, admin: AdminMode) -> Self {
        Self {
            store,
            connectivity,
            admin,
            state: LoadedOrders::default(),
            editor: None,
        }
    }

    /// Re-run the loader and replace the whole view.
    pub async fn reload(&mut self) {
        self.state = load_orders(self.store.as_ref(), self.connectivity.as_ref()).await;
    }

    pub fn admin(&self) -> &AdminMode {
        &self.admin
    }

    pub fn state(&self) -> &LoadedOrders {
        &self.state
    }

    pub fn orders(&self) -> &[Order] {
        &self.state.orders
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.state.orders.iter().find(|o| o.id == order_id)
    }

    pub fn contracts(&self) -> &ContractIndex {
        &self.state.contracts
    }

    pub fn editor(&self) -> Option<&WorkflowEditor> {
        self.editor.as_ref()
    }

    fn require_admin(&self) -> Result<(), PanelError> {
        if self.admin.is_enabled() {
            Ok(())
        } else {
            Err(PanelError::AdminModeRequired)
        }
    }

    fn find_order(&self, order_id: &str) -> Result<Order, PanelError> {
        self.order(order_id)
            .cloned()
            .ok_or_else(|| PanelError::OrderNotFound(order_id.to_string()))
    }

    fn linked_contract(&self, order_id: &str) -> Option<Contract> {
        let order = self.order(order_id)?;
        self.state.contracts.resolve(order).cloned()
    }

    pub fn display(&self, order_id: &str) -> Result<Reconciled, PanelError> {
        let order = self.find_order(order_id)?;
        Ok(display_items(&order, &self.state.contracts))
    }

    pub fn payment_summary(&self, order_id: &str) -> Result<PaymentSummary, PanelError> {
        let order = self.find_order(order_id)?;
        let shown = display_items(&order, &self.state.contracts);
        Ok(summarize(&order, &shown, self.state.contracts.resolve(&order)))
    }

    /// Stage the order's workflow (delivery tasks ensured) with edit mode off.
    #[instrument(skip(self))]
    pub async fn open_workflow(&mut self, order_id: &str) -> Result<&WorkflowEditor, PanelError> {
        let order = self.find_order(order_id)?;
        let (staged, products) = self.committed_workflow(&order).await;
        Ok(&*self.editor.insert(WorkflowEditor {
            order_id: order.id,
            staged,
            products,
            editing: false,
        }))
    }

    /// The order's stored workflow (or its default template when it has
    /// none) with delivery tasks ensured, plus the purchased product names.
    async fn committed_workflow(&mut self, order: &Order) -> (Workflow, Vec<String>) {
        if self.state.contracts.is_empty() {
            self.state.contracts = ContractIndex::new(fetch_contracts(self.store.as_ref()).await);
        }
        let products = display_items(order, &self.state.contracts).product_names();

        let base = match &order.workflow {
            Some(workflow) => workflow.clone(),
            None => {
                let kind = if products.is_empty() {
                    TemplateKind::Session
                } else {
                    TemplateKind::Store
                };
                templates::default_template(self.store.as_ref(), kind)
                    .await
                    .map(|t| from_template(&t))
                    .unwrap_or_default()
            }
        };
        (ensure_delivery_tasks(&base, &products), products)
    }

    pub fn close_workflow(&mut self) {
        self.editor = None;
    }

    pub fn set_editing(&mut self, editing: bool) -> Result<(), PanelError> {
        let editor = self.editor.as_mut().ok_or(PanelError::NoOpenWorkflow)?;
        editor.editing = editing;
        Ok(())
    }

    fn editing_workflow(&mut self) -> Result<&mut Workflow, PanelError> {
        let editor = self.editor.as_mut().ok_or(PanelError::NoOpenWorkflow)?;
        if !editor.editing {
            return Err(PanelError::NotEditing);
        }
        Ok(&mut editor.staged)
    }

    pub fn add_category(&mut self, name: &str) -> Result<String, PanelError> {
        let workflow = self.editing_workflow()?;
        let id = new_id();
        workflow.categories.push(Category::new(id.clone(), name.trim()));
        Ok(id)
    }

    pub fn add_task(&mut self, category_id: &str, title: &str) -> Result<String, PanelError> {
        let category = self
            .editing_workflow()?
            .category_mut(category_id)
            .ok_or_else(|| PanelError::CategoryNotFound(category_id.to_string()))?;
        let id = new_id();
        category.tasks.push(Task::new(id.clone(), title.trim()));
        Ok(id)
    }

    pub fn remove_task(&mut self, category_id: &str, task_id: &str) -> Result<(), PanelError> {
        let category = self
            .editing_workflow()?
            .category_mut(category_id)
            .ok_or_else(|| PanelError::CategoryNotFound(category_id.to_string()))?;
        let before = category.tasks.len();
        category.tasks.retain(|t| t.id != task_id);
        if category.tasks.len() == before {
            return Err(PanelError::TaskNotFound {
                category_id: category_id.to_string(),
                task_id: task_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_task_details(
        &mut self,
        category_id: &str,
        task_id: &str,
        due: Option<DateTime<Utc>>,
        note: Option<String>,
    ) -> Result<(), PanelError> {
        let task = self
            .editing_workflow()?
            .task_mut(category_id, task_id)
            .ok_or_else(|| PanelError::TaskNotFound {
                category_id: category_id.to_string(),
                task_id: task_id.to_string(),
            })?;
        task.due = due;
        task.note = note.filter(|n| !n.trim().is_empty());
        Ok(())
    }

    /// Replace the staged workflow with a fresh copy of `template`.
    pub fn apply_template(&mut self, template: &WorkflowTemplate) -> Result<(), PanelError> {
        let editor = self.editor.as_mut().ok_or(PanelError::NoOpenWorkflow)?;
        editor.staged = ensure_delivery_tasks(&from_template(template), &editor.products);
        Ok(())
    }

    /// Persist the staged workflow to the order and mirror delivery state
    /// onto the linked contract.
    #[instrument(skip(self))]
    pub async fn save_workflow(&mut self) -> Result<(), PanelError> {
        self.require_admin()?;
        let editor = self.editor.clone().ok_or(PanelError::NoOpenWorkflow)?;
        self.persist_order_workflow(&editor.order_id, &editor.staged).await;
        self.mirror_delivery(&editor).await;
        if let Some(editor) = self.editor.as_mut() {
            editor.editing = false;
        }
        self.reload().await;
        Ok(())
    }

    /// Flip one task and write it through immediately. Returns the new state.
    #[instrument(skip(self))]
    pub async fn toggle_task(&mut self, category_id: &str, task_id: &str) -> Result<bool, PanelError> {
        self.require_admin()?;
        let editor = self.editor.as_mut().ok_or(PanelError::NoOpenWorkflow)?;
        let category = editor
            .staged
            .category_mut(category_id)
            .ok_or_else(|| PanelError::CategoryNotFound(category_id.to_string()))?;
        let delivery = is_delivery_category(category);
        let task = category
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| PanelError::TaskNotFound {
                category_id: category_id.to_string(),
                task_id: task_id.to_string(),
            })?;
        task.done = !task.done;
        let done = task.done;
        let editor = editor.clone();

        self.persist_order_workflow(&editor.order_id, &editor.staged).await;
        if delivery {
            self.mirror_delivery(&editor).await;
        }
        self.reload().await;
        Ok(done)
    }

    /// All delivery tasks done, deposit paid, order completed.
    pub async fn mark_delivery_paid(&mut self, order_id: &str) -> Result<(), PanelError> {
        self.set_delivery_paid(order_id, true).await
    }

    /// Inverse of [`OrderPanel::mark_delivery_paid`]; status goes back to pending.
    pub async fn reset_delivery_paid(&mut self, order_id: &str) -> Result<(), PanelError> {
        self.set_delivery_paid(order_id, false).await
    }

    /// Starts from the committed workflow, so unsaved edits in an open
    /// editor are not persisted; the editor only gets the delivery flags.
    #[instrument(skip(self))]
    async fn set_delivery_paid(&mut self, order_id: &str, paid: bool) -> Result<(), PanelError> {
        self.require_admin()?;
        let order = self.find_order(order_id)?;
        let (mut workflow, products) = self.committed_workflow(&order).await;
        set_delivery_done(&mut workflow, paid);
        if let Some(editor) = self.editor.as_mut().filter(|e| e.order_id == order_id) {
            editor.staged = ensure_delivery_tasks(&editor.staged, &products);
            set_delivery_done(&mut editor.staged, paid);
        }

        let (status, delivered_at) = if paid {
            (OrderStatus::Completed, json!(timestamp::format(&Utc::now())))
        } else {
            (OrderStatus::Pending, Value::Null)
        };
        self.write(
            ORDERS,
            order_id,
            json!({
                "workflow": encode_workflow(&workflow),
                "depositPaid": paid,
                "status": status.as_str(),
                "deliveredAt": delivered_at,
            }),
        )
        .await;

        if let Some(contract) = self.linked_contract(order_id) {
            let mut mirrored = ensure_delivery_tasks(&contract.workflow.clone().unwrap_or_default(), &products);
            set_delivery_done(&mut mirrored, paid);
            self.write(
                CONTRACTS,
                &contract.id,
                json!({ "workflow": encode_workflow(&mirrored), "depositPaid": paid }),
            )
            .await;
        }

        info!(order_id, paid, "delivery payment state updated");
        self.reload().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn change_status(&mut self, order_id: &str, status: OrderStatus) -> Result<(), PanelError> {
        self.require_admin()?;
        self.find_order(order_id)?;
        self.write(ORDERS, order_id, json!({ "status": status.as_str() })).await;
        self.reload().await;
        Ok(())
    }

    /// Returns false when the prompt was declined.
    #[instrument(skip(self, confirm))]
    pub async fn delete_order(&mut self, order_id: &str, confirm: &dyn Confirm) -> Result<bool, PanelError> {
        self.require_admin()?;
        let order = self.find_order(order_id)?;
        let prompt = format!("Excluir o pedido de {} ({})?", order.customer_name, order.id);
        if !confirm.confirm(&prompt) {
            return Ok(false);
        }
        if let Err(err) = self.store.delete(ORDERS, order_id).await {
            warn!(?err, order_id, "failed to delete order");
        }
        if self.editor.as_ref().map(|e| e.order_id.as_str()) == Some(order_id) {
            self.editor = None;
        }
        self.reload().await;
        Ok(true)
    }

    /// Link every unlinked order to the contract sharing its email. Orders
    /// whose email fails the syntax check are left alone. Returns how many
    /// orders were linked.
    #[instrument(skip_all)]
    pub async fn link_orders_to_contracts(&mut self, confirm: &dyn Confirm) -> Result<usize, PanelError> {
        self.require_admin()?;
        let pairs: Vec<(String, String)> = self
            .state
            .orders
            .iter()
            .filter(|o| o.contract_id.is_none() && !o.synthetic)
            .filter(|o| validate_email(&o.customer_email).is_ok())
            .filter_map(|o| {
                self.state
                    .contracts
                    .by_email(&o.customer_email)
                    .map(|c| (o.id.clone(), c.id.clone()))
            })
            .collect();
        if pairs.is_empty() {
            return Ok(0);
        }
        let prompt = format!("Vincular {} pedido(s) aos contratos correspondentes?", pairs.len());
        if !confirm.confirm(&prompt) {
            return Ok(0);
        }
        let mut linked = 0;
        for (order_id, contract_id) in &pairs {
            if self.write(ORDERS, order_id, json!({ "contractId": contract_id })).await {
                linked += 1;
            }
        }
        info!(linked, "orders linked to contracts");
        self.reload().await;
        Ok(linked)
    }

    async fn persist_order_workflow(&self, order_id: &str, workflow: &Workflow) {
        self.write(ORDERS, order_id, json!({ "workflow": encode_workflow(workflow) }))
            .await;
    }

    /// Read-modify-write of the contract's workflow; a no-op when the order
    /// has no resolvable contract.
    async fn mirror_delivery(&self, editor: &WorkflowEditor) {
        let Some(contract) = self.linked_contract(&editor.order_id) else {
            return;
        };
        let mirrored = mirror_onto_contract(contract.workflow.as_ref(), &editor.products, &editor.staged);
        self.write(CONTRACTS, &contract.id, json!({ "workflow": encode_workflow(&mirrored) }))
            .await;
    }

    async fn write(&self, collection: &str, id: &str, patch: Value) -> bool {
        match self.store.update(collection, id, patch).await {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, collection = %collection, id = %id, "write failed; change not applied");
                false
            }
        }
    }
}
