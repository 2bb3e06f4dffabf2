use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use studio_admin::admin_mode::AdminMode;
use studio_admin::config;
use studio_admin::connectivity::{AssumeOnline, Connectivity, HttpProbe};
use studio_admin::db::{self, DocumentStore, SqliteDocumentStore};
use studio_admin::model::{OrderStatus, TemplateKind, WorkflowTemplate};
use studio_admin::panel::{AutoConfirm, Confirm, OrderPanel};
use studio_admin::templates;

#[derive(Debug, Parser)]
#[command(author, version, about = "Order and workflow console for the studio")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Turn admin mode on regardless of the configured default
    #[arg(long)]
    admin: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List orders, creating missing orders for contracts
    Orders,
    /// Reconciled items, payment state and checklist of one order
    Show { order: String },
    /// Flip one checklist task
    Toggle {
        order: String,
        category: String,
        task: String,
    },
    /// Store a workflow template from a JSON file
    SaveTemplate {
        file: PathBuf,
        /// Also make it the default for this kind of order
        #[arg(long, value_enum)]
        default_for: Option<DefaultFor>,
    },
    /// Replace an order's checklist with a template and save it
    ApplyTemplate { order: String, template: String },
    /// Mark delivery done and deposit paid
    MarkPaid { order: String },
    /// Undo mark-paid
    ResetPaid { order: String },
    /// Set order status (pending, processing, completed)
    Status { order: String, status: String },
    /// Delete an order
    Delete {
        order: String,
        #[arg(long)]
        yes: bool,
    },
    /// Link unlinked orders to the contract with the same email
    LinkContracts {
        #[arg(long)]
        yes: bool,
    },
    /// Import documents from a JSON array into a collection
    Import { collection: String, file: PathBuf },
    /// List workflow templates
    Templates,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DefaultFor {
    Store,
    Session,
}

impl From<DefaultFor> for TemplateKind {
    fn from(value: DefaultFor) -> Self {
        match value {
            DefaultFor::Store => TemplateKind::Store,
            DefaultFor::Session => TemplateKind::Session,
        }
    }
}

/// Asks on the terminal; anything but "s"/"y" declines.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{} [s/N] ", prompt);
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "s" | "sim" | "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool));

    let connectivity: Arc<dyn Connectivity> = match &cfg.connectivity.probe_url {
        Some(url) => Arc::new(HttpProbe::new(url.parse()?, cfg.probe_timeout())?),
        None => Arc::new(AssumeOnline),
    };
    let admin = AdminMode::new(cfg.app.admin_mode || args.admin);

    match args.command {
        Command::Import { collection, file } => import(store.as_ref(), &collection, &file).await,
        Command::Templates => {
            for template in templates::list_templates(store.as_ref()).await {
                let tasks: usize = template.categories.iter().map(|c| c.tasks.len()).sum();
                println!("{}  {}  ({} categorias, {} tarefas)", template.id, template.name, template.categories.len(), tasks);
            }
            Ok(())
        }
        Command::SaveTemplate { file, default_for } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let template: WorkflowTemplate = serde_json::from_str(&raw).context("invalid template JSON")?;
            let id = templates::save_template(store.as_ref(), &template).await?;
            if let Some(kind) = default_for {
                templates::set_default_template(store.as_ref(), kind.into(), &id).await?;
            }
            println!("{}", id);
            Ok(())
        }
        command => {
            let mut panel = OrderPanel::new(store.clone(), connectivity, admin);
            panel.reload().await;
            if panel.state().offline {
                warn!("offline; the order list is empty");
            }
            run_panel_command(&mut panel, store.as_ref(), command).await
        }
    }
}

async fn run_panel_command(panel: &mut OrderPanel, store: &dyn DocumentStore, command: Command) -> Result<()> {
    match command {
        Command::Orders => {
            for order in panel.orders() {
                let (done, total) = order.workflow.as_ref().map(|w| w.progress()).unwrap_or((0, 0));
                println!(
                    "{}  {:<24} {:<10} {:>10.2}  {}/{}{}",
                    order.id,
                    order.customer_name,
                    order.status,
                    order.total,
                    done,
                    total,
                    if order.synthetic { "  (agregado)" } else { "" }
                );
            }
            if !panel.state().created.is_empty() {
                info!(created = panel.state().created.len(), "orders created from contracts");
            }
        }
        Command::Show { order } => show(panel, &order).await?,
        Command::Toggle { order, category, task } => {
            panel.open_workflow(&order).await?;
            let done = panel.toggle_task(&category, &task).await?;
            println!("{}", if done { "concluída" } else { "pendente" });
        }
        Command::ApplyTemplate { order, template } => {
            let template = templates::get_template(store, &template)
                .await
                .ok_or_else(|| anyhow!("template {} not found", template))?;
            panel.open_workflow(&order).await?;
            panel.apply_template(&template)?;
            panel.save_workflow().await?;
        }
        Command::MarkPaid { order } => panel.mark_delivery_paid(&order).await?,
        Command::ResetPaid { order } => panel.reset_delivery_paid(&order).await?,
        Command::Status { order, status } => {
            let status = OrderStatus::parse_status(&status).ok_or_else(|| anyhow!("unknown status {:?}", status))?;
            panel.change_status(&order, status).await?;
        }
        Command::Delete { order, yes } => {
            let deleted = if yes {
                panel.delete_order(&order, &AutoConfirm(true)).await?
            } else {
                panel.delete_order(&order, &StdinConfirm).await?
            };
            if !deleted {
                println!("cancelado");
            }
        }
        Command::LinkContracts { yes } => {
            let linked = if yes {
                panel.link_orders_to_contracts(&AutoConfirm(true)).await?
            } else {
                panel.link_orders_to_contracts(&StdinConfirm).await?
            };
            println!("{} pedido(s) vinculado(s)", linked);
        }
        Command::Import { .. } | Command::Templates | Command::SaveTemplate { .. } => {
            unreachable!("handled before the panel is loaded")
        }
    }
    Ok(())
}

async fn show(panel: &mut OrderPanel, order_id: &str) -> Result<()> {
    let shown = panel.display(order_id)?;
    let payment = panel.payment_summary(order_id)?;
    let order = panel
        .order(order_id)
        .ok_or_else(|| anyhow!("order {} not found", order_id))?;
    println!("{} <{}>  {}", order.customer_name, order.customer_email, order.status);
    for item in &shown.items {
        println!("  {:>3} x {:<30} {:>10.2} {:>10.2}", item.quantity, item.name, item.price, item.total);
    }
    for item in &shown.extras {
        println!("  {:>3} x {:<30} {:>10.2} {:>10.2}  (extra)", item.quantity, item.name, item.price, item.total);
    }
    println!(
        "  total {:.2}  sinal {:.2}{}  pago {:.2}  restante {:.2}",
        payment.total,
        payment.deposit,
        if payment.deposit_paid { " (pago)" } else { "" },
        payment.paid,
        payment.remaining
    );

    let editor = panel.open_workflow(order_id).await?;
    for category in &editor.staged.categories {
        println!("[{}] {}", category.id, category.name);
        for task in &category.tasks {
            println!("  [{}] {} ({})", if task.done { "x" } else { " " }, task.title, task.id);
        }
    }
    Ok(())
}

async fn import(store: &dyn DocumentStore, collection: &str, file: &PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let docs: Vec<Value> = serde_json::from_str(&raw).context("expected a JSON array of documents")?;
    let mut imported = 0;
    for mut body in docs {
        let id = body
            .as_object_mut()
            .and_then(|m| m.remove("id"))
            .and_then(|v| v.as_str().map(str::to_string));
        match id {
            Some(id) => store.set(collection, &id, body).await?,
            None => {
                store.insert(collection, body).await?;
            }
        }
        imported += 1;
    }
    info!(collection, imported, "documents imported");
    Ok(())
}
