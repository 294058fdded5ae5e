//! Rule editing with persisted undo/redo history
//!
//! Every edit records its inverse on the undo stack. Undoing applies that
//! inverse and records the inverse of *that* on the redo stack, so both
//! directions use the same mechanism. Both stacks are persisted next to
//! the rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bookmarks::{Folder, folder_name};
use crate::rules::Rule;
use crate::settings::{self, Namespace, SettingsStore, StoreError, keys};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("No rule at position {0}")]
    NoSuchRule(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single change to the rule list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Edit {
    Insert { index: usize, rule: Rule },
    Remove { index: usize },
    Replace { index: usize, rule: Rule },
}

impl Edit {
    /// Apply to `rules` and return the edit that reverts it
    fn apply(self, rules: &mut Vec<Rule>) -> Result<Edit, EditorError> {
        match self {
            Edit::Insert { index, rule } => {
                if index > rules.len() {
                    return Err(EditorError::NoSuchRule(index));
                }
                rules.insert(index, rule);
                Ok(Edit::Remove { index })
            }
            Edit::Remove { index } => {
                if index >= rules.len() {
                    return Err(EditorError::NoSuchRule(index));
                }
                let rule = rules.remove(index);
                Ok(Edit::Insert { index, rule })
            }
            Edit::Replace { index, rule } => {
                let slot = rules.get_mut(index).ok_or(EditorError::NoSuchRule(index))?;
                let old = std::mem::replace(slot, rule);
                Ok(Edit::Replace { index, rule: old })
            }
        }
    }
}

/// Rule list editor bound to a settings store
pub struct RuleEditor {
    store: Arc<dyn SettingsStore>,
    undo: Vec<Edit>,
    redo: Vec<Edit>,
}

impl RuleEditor {
    /// Load the persisted history. A history in an unknown layout is
    /// discarded rather than failing the editor.
    pub async fn load(store: Arc<dyn SettingsStore>) -> Result<Self, EditorError> {
        let data = store.get(&[keys::UNDO_STACK, keys::REDO_STACK]).await?;
        let undo = stack_from(&data, keys::UNDO_STACK);
        let redo = stack_from(&data, keys::REDO_STACK);
        Ok(Self { store, undo, redo })
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub async fn rules(&self) -> Result<Vec<Rule>, EditorError> {
        Ok(settings::load_rules(self.store.as_ref()).await?)
    }

    /// Append a blank, disabled rule targeting `folder` and return its index
    pub async fn add_rule(&mut self, folder: Option<String>) -> Result<usize, EditorError> {
        let rule = Rule {
            bookmark_location: folder,
            ..Rule::default()
        };
        self.insert_rule(rule).await
    }

    /// Append `rule` and return its index
    pub async fn insert_rule(&mut self, rule: Rule) -> Result<usize, EditorError> {
        let index = self.rules().await?.len();
        self.commit(Edit::Insert { index, rule }).await?;
        Ok(index)
    }

    /// Replace the rule at `index`, returning a summary of what changed
    pub async fn update_rule(
        &mut self,
        index: usize,
        rule: Rule,
        folders: &[Folder],
    ) -> Result<Vec<String>, EditorError> {
        let old = self
            .rules()
            .await?
            .get(index)
            .cloned()
            .ok_or(EditorError::NoSuchRule(index))?;
        let changes = describe_changes(index, &old, &rule, folders);
        self.commit(Edit::Replace { index, rule }).await?;
        Ok(changes)
    }

    /// Delete the rule at `index` and return it
    pub async fn delete_rule(&mut self, index: usize) -> Result<Rule, EditorError> {
        let rule = self
            .rules()
            .await?
            .get(index)
            .cloned()
            .ok_or(EditorError::NoSuchRule(index))?;
        self.commit(Edit::Remove { index }).await?;
        Ok(rule)
    }

    /// Revert the most recent edit; false when there is nothing to undo
    pub async fn undo(&mut self) -> Result<bool, EditorError> {
        let Some(edit) = self.undo.pop() else {
            return Ok(false);
        };
        match self.apply(edit.clone()).await {
            Ok(inverse) => self.redo.push(inverse),
            Err(e) => {
                self.undo.push(edit);
                return Err(e);
            }
        }
        self.save_history().await?;
        Ok(true)
    }

    /// Re-apply the most recently undone edit; false when there is nothing to redo
    pub async fn redo(&mut self) -> Result<bool, EditorError> {
        let Some(edit) = self.redo.pop() else {
            return Ok(false);
        };
        match self.apply(edit.clone()).await {
            Ok(inverse) => self.undo.push(inverse),
            Err(e) => {
                self.redo.push(edit);
                return Err(e);
            }
        }
        self.save_history().await?;
        Ok(true)
    }

    pub async fn clear_history(&mut self) -> Result<(), EditorError> {
        self.undo.clear();
        self.redo.clear();
        self.save_history().await
    }

    async fn commit(&mut self, edit: Edit) -> Result<(), EditorError> {
        let inverse = self.apply(edit).await?;
        self.undo.push(inverse);
        self.redo.clear();
        self.save_history().await
    }

    async fn apply(&self, edit: Edit) -> Result<Edit, EditorError> {
        let mut rules = self.rules().await?;
        debug!("Applying rule edit: {:?}", edit);
        let inverse = edit.apply(&mut rules)?;
        settings::save_rules(self.store.as_ref(), &rules).await?;
        Ok(inverse)
    }

    async fn save_history(&self) -> Result<(), EditorError> {
        let mut items = Namespace::new();
        items.insert(
            keys::UNDO_STACK.to_string(),
            serde_json::to_value(&self.undo).map_err(StoreError::from)?,
        );
        items.insert(
            keys::REDO_STACK.to_string(),
            serde_json::to_value(&self.redo).map_err(StoreError::from)?,
        );
        self.store.set(items).await?;
        Ok(())
    }
}

fn stack_from(data: &Namespace, key: &str) -> Vec<Edit> {
    match data.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!("Discarding unreadable {}: {}", key, e);
            Vec::new()
        }),
    }
}

/// Human-readable summary of the differences between two versions of the
/// rule at `index` (0-based; messages use 1-based numbering).
pub fn describe_changes(index: usize, old: &Rule, new: &Rule, folders: &[Folder]) -> Vec<String> {
    let number = index + 1;
    let on_off = |flag: bool| if flag { "Enabled" } else { "Disabled" };
    let mut changes = Vec::new();

    for (before, after) in [(&old.domain, &new.domain), (&old.contains, &new.contains)] {
        if before != after {
            changes.push(match (after, before) {
                (Some(value), _) => format!("\"{}\" is Added", value),
                (None, Some(value)) => format!("\"{}\" is Removed", value),
                (None, None) => continue,
            });
        }
    }
    if old.priority != new.priority {
        changes.push(format!("Priority set to ({})", new.priority));
    }
    if old.bookmark_location != new.bookmark_location {
        let name = new
            .bookmark_location
            .as_deref()
            .and_then(|id| folder_name(folders, id))
            .unwrap_or("");
        changes.push(format!("Selected {}", name));
    }
    if old.bookmark_action != new.bookmark_action {
        changes.push(format!("Selected {}", new.bookmark_action.label()));
    }
    if old.enabled != new.enabled {
        changes.push(format!("Rule {} {}", number, on_off(new.enabled)));
    }
    if old.auto_execute != new.auto_execute {
        changes.push(format!(
            "Auto Execution {} for Rule {}",
            on_off(new.auto_execute),
            number
        ));
    }
    if old.close_tab != new.close_tab {
        changes.push(format!(
            "Auto Close {} for Rule {}",
            on_off(new.close_tab),
            number
        ));
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::BookmarkAction;
    use crate::settings::JsonStore;

    async fn editor() -> (Arc<JsonStore>, RuleEditor) {
        let store = Arc::new(JsonStore::in_memory());
        let editor = RuleEditor::load(store.clone()).await.unwrap();
        (store, editor)
    }

    fn folders() -> Vec<Folder> {
        vec![Folder {
            id: "5".to_string(),
            title: "Reading".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_add_rule_defaults() {
        let (_, mut editor) = editor().await;
        let index = editor.add_rule(Some("1".to_string())).await.unwrap();
        assert_eq!(index, 0);

        let rule = &editor.rules().await.unwrap()[0];
        assert_eq!(rule.domain, None);
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.bookmark_location.as_deref(), Some("1"));
        assert_eq!(rule.bookmark_action, BookmarkAction::DoNothing);
        assert!(!rule.enabled && !rule.auto_execute && !rule.close_tab);
        assert!(editor.can_undo());
    }

    #[tokio::test]
    async fn test_undo_redo_update() {
        let (_, mut editor) = editor().await;
        editor.add_rule(None).await.unwrap();
        editor
            .update_rule(0, Rule::for_domain("example.com"), &folders())
            .await
            .unwrap();

        assert!(editor.undo().await.unwrap());
        assert_eq!(editor.rules().await.unwrap()[0].domain, None);

        assert!(editor.redo().await.unwrap());
        assert_eq!(
            editor.rules().await.unwrap()[0].domain.as_deref(),
            Some("example.com")
        );
    }

    #[tokio::test]
    async fn test_undo_add_and_delete() {
        let (_, mut editor) = editor().await;
        editor.insert_rule(Rule::for_domain("a.test")).await.unwrap();
        editor.insert_rule(Rule::for_domain("b.test")).await.unwrap();

        let deleted = editor.delete_rule(0).await.unwrap();
        assert_eq!(deleted.domain.as_deref(), Some("a.test"));
        assert_eq!(editor.rules().await.unwrap().len(), 1);

        editor.undo().await.unwrap();
        let rules = editor.rules().await.unwrap();
        assert_eq!(rules[0].domain.as_deref(), Some("a.test"));
        assert_eq!(rules[1].domain.as_deref(), Some("b.test"));

        editor.undo().await.unwrap();
        assert_eq!(editor.rules().await.unwrap().len(), 1);

        editor.redo().await.unwrap();
        assert_eq!(editor.rules().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_new_edit_clears_redo() {
        let (_, mut editor) = editor().await;
        editor.insert_rule(Rule::for_domain("a.test")).await.unwrap();
        editor.undo().await.unwrap();
        assert!(editor.can_redo());

        editor.insert_rule(Rule::for_domain("b.test")).await.unwrap();
        assert!(!editor.can_redo());
        assert!(!editor.redo().await.unwrap());
    }

    #[tokio::test]
    async fn test_history_survives_reload() {
        let (store, mut editor) = editor().await;
        editor.insert_rule(Rule::for_domain("a.test")).await.unwrap();

        let mut reloaded = RuleEditor::load(store).await.unwrap();
        assert!(reloaded.can_undo());
        reloaded.undo().await.unwrap();
        assert!(reloaded.rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_history() {
        let (_, mut editor) = editor().await;
        editor.insert_rule(Rule::for_domain("a.test")).await.unwrap();
        editor.clear_history().await.unwrap();
        assert!(!editor.undo().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_rule_errors() {
        let (_, mut editor) = editor().await;
        assert!(matches!(
            editor.delete_rule(3).await,
            Err(EditorError::NoSuchRule(3))
        ));
        assert!(matches!(
            editor.update_rule(0, Rule::default(), &[]).await,
            Err(EditorError::NoSuchRule(0))
        ));
    }

    #[tokio::test]
    async fn test_failed_undo_keeps_history() {
        let (store, mut editor) = editor().await;
        editor.insert_rule(Rule::for_domain("a.test")).await.unwrap();
        editor.insert_rule(Rule::for_domain("b.test")).await.unwrap();

        // rule list shrunk behind the editor's back
        settings::save_rules(store.as_ref(), &[]).await.unwrap();

        assert!(matches!(
            editor.undo().await,
            Err(EditorError::NoSuchRule(1))
        ));
        assert!(editor.can_undo());
        assert!(!editor.can_redo());

        settings::save_rules(
            store.as_ref(),
            &[Rule::for_domain("a.test"), Rule::for_domain("b.test")],
        )
        .await
        .unwrap();
        assert!(editor.undo().await.unwrap());
        assert_eq!(editor.rules().await.unwrap().len(), 1);
        assert!(editor.can_redo());
    }

    #[test]
    fn test_describe_changes() {
        let old = Rule::default();
        let new = Rule {
            domain: Some("example.com".to_string()),
            priority: 5,
            bookmark_location: Some("5".to_string()),
            bookmark_action: BookmarkAction::Replace,
            enabled: true,
            auto_execute: true,
            ..Rule::default()
        };

        assert_eq!(
            describe_changes(1, &old, &new, &folders()),
            vec![
                "\"example.com\" is Added",
                "Priority set to (5)",
                "Selected Reading",
                "Selected Replace Bookmark",
                "Rule 2 Enabled",
                "Auto Execution Enabled for Rule 2",
            ]
        );

        let removed = describe_changes(0, &new, &Rule { domain: None, ..new.clone() }, &[]);
        assert_eq!(removed, vec!["\"example.com\" is Removed"]);
        assert!(describe_changes(0, &new, &new, &[]).is_empty());
    }
}
