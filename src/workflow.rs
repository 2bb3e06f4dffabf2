//! Checklist operations shared by orders and contracts.
//!
//! Every workflow carries a delivery category (any category whose normalized
//! name contains "entrega") holding one "Entregar {product}" task per
//! purchased product. Only that category is ever mirrored between an order
//! and its contract; all other categories belong to whichever record owns
//! them.

use crate::model::{Category, Task, Workflow, WorkflowTemplate};
use crate::normalize::name_key;
use std::collections::{HashMap, HashSet};

pub const DELIVERY_CATEGORY: &str = "Entrega";
const DELIVERY_MARKER: &str = "entrega";
const DELIVERY_ID_PREFIX: &str = "entrega";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn delivery_task_title(product: &str) -> String {
    format!("Entregar {}", product.trim())
}

pub fn is_delivery_category(category: &Category) -> bool {
    name_key(&category.name).contains(DELIVERY_MARKER)
}

impl Workflow {
    pub fn delivery(&self) -> Option<&Category> {
        self.categories.iter().find(|c| is_delivery_category(c))
    }

    pub fn delivery_mut(&mut self) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| is_delivery_category(c))
    }

    pub fn category_mut(&mut self, category_id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == category_id)
    }

    pub fn task_mut(&mut self, category_id: &str, task_id: &str) -> Option<&mut Task> {
        self.category_mut(category_id)?
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
    }

    /// `(done, total)` over every task.
    pub fn progress(&self) -> (usize, usize) {
        self.categories
            .iter()
            .flat_map(|c| c.tasks.iter())
            .fold((0, 0), |(done, total), t| (done + usize::from(t.done), total + 1))
    }
}

/// Copy of `workflow` with a delivery category holding one task per product.
/// Idempotent for a fixed product set; existing tasks are left untouched.
///
/// Ids of created entries derive from the product name (`entrega`,
/// `entrega-album-a`), so the same order yields the same ids whether or not
/// the ensured workflow was ever persisted.
pub fn ensure_delivery_tasks<S: AsRef<str>>(workflow: &Workflow, products: &[S]) -> Workflow {
    let mut out = workflow.clone();
    if out.delivery().is_none() {
        let id = {
            let taken: HashSet<&str> = out.categories.iter().map(|c| c.id.as_str()).collect();
            derived_id(&taken, DELIVERY_ID_PREFIX.to_string())
        };
        out.categories.push(Category::new(id, DELIVERY_CATEGORY));
    }
    let Some(delivery) = out.delivery_mut() else {
        return out;
    };
    let mut present: HashSet<String> = delivery.tasks.iter().map(|t| name_key(&t.title)).collect();
    for product in products {
        let product = product.as_ref().trim();
        if product.is_empty() {
            continue;
        }
        let title = delivery_task_title(product);
        if present.insert(name_key(&title)) {
            let slug = name_key(product).split_whitespace().collect::<Vec<_>>().join("-");
            let id = {
                let taken: HashSet<&str> = delivery.tasks.iter().map(|t| t.id.as_str()).collect();
                derived_id(&taken, format!("{}-{}", DELIVERY_ID_PREFIX, slug))
            };
            delivery.tasks.push(Task::new(id, title));
        }
    }
    out
}

fn derived_id(taken: &HashSet<&str>, candidate: String) -> String {
    if taken.contains(candidate.as_str()) {
        new_id()
    } else {
        candidate
    }
}

/// Set every delivery task to `done`.
pub fn set_delivery_done(workflow: &mut Workflow, done: bool) {
    if let Some(delivery) = workflow.delivery_mut() {
        for task in &mut delivery.tasks {
            task.done = done;
        }
    }
}

/// Copy delivery-task completion from `source` into `target` by task title.
/// Non-delivery categories of `target` and unmatched tasks are unchanged.
pub fn merge_delivery_state(target: &mut Workflow, source: &Workflow) {
    let Some(source_delivery) = source.delivery() else {
        return;
    };
    let states: HashMap<String, bool> = source_delivery
        .tasks
        .iter()
        .map(|t| (name_key(&t.title), t.done))
        .collect();
    if let Some(delivery) = target.delivery_mut() {
        for task in &mut delivery.tasks {
            if let Some(done) = states.get(&name_key(&task.title)) {
                task.done = *done;
            }
        }
    }
}

/// The contract-side workflow after an order-side change: the contract's
/// own workflow (ensured) with delivery completion taken from `staged`.
pub fn mirror_onto_contract<S: AsRef<str>>(
    contract_workflow: Option<&Workflow>,
    products: &[S],
    staged: &Workflow,
) -> Workflow {
    let base = contract_workflow.cloned().unwrap_or_default();
    let mut mirrored = ensure_delivery_tasks(&base, products);
    merge_delivery_state(&mut mirrored, staged);
    mirrored
}

/// Fresh workflow from a template: tasks reset, missing ids assigned.
pub fn from_template(template: &WorkflowTemplate) -> Workflow {
    let mut workflow = Workflow {
        categories: template.categories.clone(),
    };
    assign_missing_ids(&mut workflow);
    for task in workflow.categories.iter_mut().flat_map(|c| c.tasks.iter_mut()) {
        task.done = false;
    }
    workflow
}

pub fn assign_missing_ids(workflow: &mut Workflow) {
    for category in &mut workflow.categories {
        if category.id.trim().is_empty() {
            category.id = new_id();
        }
        for task in &mut category.tasks {
            if task.id.trim().is_empty() {
                task.id = new_id();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workflow {
        let mut edit = Category::new("c-edit", "Edição");
        edit.tasks.push(Task::new("t-sel", "Seleção de fotos"));
        Workflow {
            categories: vec![edit],
        }
    }

    #[test]
    fn creates_delivery_category_and_tasks() {
        let wf = ensure_delivery_tasks(&sample(), &["Album A", "Quadro"]);
        let delivery = wf.delivery().unwrap();
        assert_eq!(delivery.name, DELIVERY_CATEGORY);
        let titles: Vec<_> = delivery.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Entregar Album A", "Entregar Quadro"]);
        assert!(delivery.tasks.iter().all(|t| !t.done && !t.id.is_empty()));
        assert_eq!(wf.categories[0], sample().categories[0]);
    }

    #[test]
    fn ensured_ids_are_stable_across_calls() {
        let a = ensure_delivery_tasks(&sample(), &["Álbum  A", "Quadro"]);
        let b = ensure_delivery_tasks(&sample(), &["Álbum  A", "Quadro"]);
        assert_eq!(a, b);
        let delivery = a.delivery().unwrap();
        assert_eq!(delivery.id, "entrega");
        assert_eq!(delivery.tasks[0].id, "entrega-album-a");

        let mut clash = sample();
        clash.categories[0].id = "entrega".into();
        let ensured = ensure_delivery_tasks(&clash, &["Quadro"]);
        assert_ne!(ensured.delivery().unwrap().id, "entrega");
    }

    #[test]
    fn ensure_is_idempotent() {
        let once = ensure_delivery_tasks(&sample(), &["Album A", "álbum a", "Quadro"]);
        let twice = ensure_delivery_tasks(&once, &["Album A", "álbum a", "Quadro"]);
        assert_eq!(once, twice);
        assert_eq!(once.delivery().unwrap().tasks.len(), 2);
    }

    #[test]
    fn existing_delivery_category_is_reused_case_insensitively() {
        let mut wf = sample();
        let mut delivery = Category::new("c-del", "ENTREGAS finais");
        let mut done = Task::new("t1", "entregar ÁLBUM A");
        done.done = true;
        delivery.tasks.push(done);
        wf.categories.push(delivery);

        let ensured = ensure_delivery_tasks(&wf, &["Album A", "Quadro"]);
        assert_eq!(ensured.categories.len(), 2);
        let tasks = &ensured.delivery().unwrap().tasks;
        assert_eq!(tasks.len(), 2);
        assert!(tasks[0].done);
        assert_eq!(tasks[1].title, "Entregar Quadro");
    }

    #[test]
    fn merge_touches_only_delivery_tasks() {
        let mut contract = ensure_delivery_tasks(&sample(), &["Album A"]);
        contract.categories[0].tasks[0].done = true;
        let mut staged = ensure_delivery_tasks(&Workflow::default(), &["Album A"]);
        set_delivery_done(&mut staged, true);

        merge_delivery_state(&mut contract, &staged);
        assert!(contract.delivery().unwrap().tasks[0].done);
        assert!(contract.categories[0].tasks[0].done);

        set_delivery_done(&mut staged, false);
        merge_delivery_state(&mut contract, &staged);
        assert!(!contract.delivery().unwrap().tasks[0].done);
        assert!(contract.categories[0].tasks[0].done);
    }

    #[test]
    fn mirror_keeps_contract_ids_and_adds_missing_tasks() {
        let contract_wf = ensure_delivery_tasks(&Workflow::default(), &["Album A"]);
        let contract_task_id = contract_wf.delivery().unwrap().tasks[0].id.clone();
        let mut staged = ensure_delivery_tasks(&Workflow::default(), &["Album A", "Quadro"]);
        set_delivery_done(&mut staged, true);

        let mirrored = mirror_onto_contract(Some(&contract_wf), &["Album A", "Quadro"], &staged);
        let tasks = &mirrored.delivery().unwrap().tasks;
        assert_eq!(tasks[0].id, contract_task_id);
        assert!(tasks.iter().all(|t| t.done));
    }

    #[test]
    fn template_copy_resets_tasks_and_fills_ids() {
        let mut task = Task::new("", "Backup");
        task.done = true;
        let template = WorkflowTemplate {
            id: "tpl".into(),
            name: "Padrão".into(),
            categories: vec![Category {
                id: String::new(),
                name: "Pós-produção".into(),
                tasks: vec![task, Task::new("keep", "Tratamento")],
            }],
        };
        let wf = from_template(&template);
        assert!(!wf.categories[0].id.is_empty());
        assert!(!wf.categories[0].tasks[0].id.is_empty());
        assert_eq!(wf.categories[0].tasks[1].id, "keep");
        assert_eq!(wf.progress(), (0, 2));
    }

    #[test]
    fn task_lookup_by_ids() {
        let mut wf = sample();
        wf.task_mut("c-edit", "t-sel").unwrap().done = true;
        assert_eq!(wf.progress(), (1, 1));
        assert!(wf.task_mut("c-edit", "nope").is_none());
    }
}
