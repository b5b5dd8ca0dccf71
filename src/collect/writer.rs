// src/collect/writer.rs
use std::sync::Arc;

use metrics::counter;

use crate::error::StoreError;
use crate::model::ItemDraft;
use crate::store::Store;

/// Append-only item writer.
///
/// Items are inserted one row at a time with no lookup against earlier rows,
/// so the same URL collected on two runs yields two rows. A failed insert
/// stops the batch; rows written before it stay written.
#[derive(Clone)]
pub struct StorageWriter {
    store: Arc<dyn Store>,
}

impl StorageWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn append(
        &self,
        items: &[ItemDraft],
        keyword: &str,
        owner: Option<i64>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = self.store.insert_item(keyword, owner, item).await?;
            counter!("collect_items_stored_total").increment(1);
            ids.push(id);
        }
        Ok(ids)
    }
}
