use crate::db::model::{decode_settings, decode_template, encode_template};
use crate::db::{DocumentStore, SETTINGS, SETTINGS_DOC, WORKFLOW_TEMPLATES};
use crate::model::{StudioSettings, TemplateKind, WorkflowTemplate};
use anyhow::{Context, Result};
use serde_json::json;
use tracing::{instrument, warn};

/// All stored templates, sorted by name. Read failures yield an empty list.
#[instrument(skip_all)]
pub async fn list_templates(store: &dyn DocumentStore) -> Vec<WorkflowTemplate> {
    let docs = match store.list(WORKFLOW_TEMPLATES).await {
        Ok(docs) => docs,
        Err(err) => {
            warn!(?err, "failed to list workflow templates");
            return Vec::new();
        }
    };
    let mut templates: Vec<_> = docs.iter().filter_map(decode_template).collect();
    templates.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    templates
}

pub async fn get_template(store: &dyn DocumentStore, id: &str) -> Option<WorkflowTemplate> {
    match store.get(WORKFLOW_TEMPLATES, id).await {
        Ok(doc) => doc.as_ref().and_then(decode_template),
        Err(err) => {
            warn!(?err, template_id = id, "failed to read workflow template");
            None
        }
    }
}

/// Create (empty id) or overwrite a template; returns its id.
#[instrument(skip_all)]
pub async fn save_template(store: &dyn DocumentStore, template: &WorkflowTemplate) -> Result<String> {
    let body = encode_template(template);
    if template.id.trim().is_empty() {
        return store
            .insert(WORKFLOW_TEMPLATES, body)
            .await
            .context("failed to create workflow template");
    }
    store
        .set(WORKFLOW_TEMPLATES, &template.id, body)
        .await
        .context("failed to save workflow template")?;
    Ok(template.id.clone())
}

pub async fn load_settings(store: &dyn DocumentStore) -> StudioSettings {
    match store.get(SETTINGS, SETTINGS_DOC).await {
        Ok(Some(doc)) => decode_settings(&doc),
        Ok(None) => StudioSettings::default(),
        Err(err) => {
            warn!(?err, "failed to read studio settings");
            StudioSettings::default()
        }
    }
}

/// Point the `kind` default at `template_id`, keeping the other default.
pub async fn set_default_template(
    store: &dyn DocumentStore,
    kind: TemplateKind,
    template_id: &str,
) -> Result<()> {
    let mut settings = load_settings(store).await;
    let slot = match kind {
        TemplateKind::Store => &mut settings.default_templates.store,
        TemplateKind::Session => &mut settings.default_templates.session,
    };
    *slot = Some(template_id.to_string());
    let body = serde_json::to_value(&settings).unwrap_or_else(|_| json!({}));
    store
        .set(SETTINGS, SETTINGS_DOC, body)
        .await
        .context("failed to save studio settings")
}

/// The template configured as default for `kind`, if it still exists.
pub async fn default_template(store: &dyn DocumentStore, kind: TemplateKind) -> Option<WorkflowTemplate> {
    let settings = load_settings(store).await;
    let id = settings.template_id(kind)?;
    get_template(store, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDocumentStore;
    use crate::model::{Category, Task};

    fn template(name: &str) -> WorkflowTemplate {
        let mut category = Category::new("c1", "Pós-produção");
        category.tasks.push(Task::new("t1", "Tratamento"));
        WorkflowTemplate {
            id: String::new(),
            name: name.into(),
            categories: vec![category],
        }
    }

    #[tokio::test]
    async fn save_list_and_default() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let casamento = save_template(&store, &template("casamento")).await.unwrap();
        save_template(&store, &template("Aniversário")).await.unwrap();

        let names: Vec<_> = list_templates(&store).await.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Aniversário", "casamento"]);

        assert!(default_template(&store, TemplateKind::Store).await.is_none());
        set_default_template(&store, TemplateKind::Store, &casamento).await.unwrap();
        set_default_template(&store, TemplateKind::Session, "missing").await.unwrap();

        let found = default_template(&store, TemplateKind::Store).await.unwrap();
        assert_eq!(found.id, casamento);
        assert_eq!(found.categories[0].tasks[0].title, "Tratamento");
        assert!(default_template(&store, TemplateKind::Session).await.is_none());
        assert_eq!(
            load_settings(&store).await.template_id(TemplateKind::Store),
            Some(casamento.as_str())
        );
    }

    #[tokio::test]
    async fn overwrite_keeps_id() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let mut tpl = template("Ensaio");
        tpl.id = save_template(&store, &tpl).await.unwrap();
        tpl.name = "Ensaio externo".into();
        assert_eq!(save_template(&store, &tpl).await.unwrap(), tpl.id);
        assert_eq!(list_templates(&store).await.len(), 1);
    }
}
