//! Folder (label) listing

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::client::MailApi;
use crate::error::Result;
use crate::models::{Folder, LabelRecord, INBOX_ID};

/// Lists the folders a user can pick as cleanup target
pub struct FolderLister {
    api: Arc<dyn MailApi>,
}

impl FolderLister {
    pub fn new(api: Arc<dyn MailApi>) -> Self {
        Self { api }
    }

    /// User labels sorted by name, with the inbox first when the mailbox has one
    pub async fn list_folders(&self) -> Result<Vec<Folder>> {
        let labels = self.api.list_labels().await?;
        let folders = folders_from_labels(&labels);
        debug!("{} labels -> {} selectable folders", labels.len(), folders.len());
        Ok(folders)
    }
}

/// Compare folder names alphabetically, ignoring case first
///
/// Not locale-aware: accented letters sort after ASCII ones ("Éclair" after "Zeta").
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Build the selectable folder list from raw label records
pub fn folders_from_labels(labels: &[LabelRecord]) -> Vec<Folder> {
    let mut folders: Vec<Folder> = labels
        .iter()
        .filter(|label| label.is_user_label())
        .map(|label| Folder::new(label.id.clone(), label.name.clone()))
        .collect();
    folders.sort_by(|a, b| compare_names(&a.name, &b.name));

    // Inbox is a system label but the primary cleanup target
    if labels.iter().any(|label| label.id == INBOX_ID) {
        folders.insert(0, Folder::inbox());
    }

    folders
}
