// table/link_table.rs - Ordered table of linked instances
//
// Rows reference records in the shared cache; adding a row whose record is
// still unresolved requests its resolution. Only the first `default_visible`
// rows are rendered up front, the rest become visible once shown (e.g. when
// scrolled into view). Shown ids are tracked per table; the cache's `show`
// flag is set as well but is shared by every view of the record.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{InstanceRecord, ResolutionState};
use crate::errors::Result;
use crate::queue::{validate_instance_id, ResolutionQueue};

pub const DEFAULT_VISIBLE_INSTANCES: usize = 10;

/// Column derived from the first row's fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub label: String,
}

/// One table row; cells are present only once the record is resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: String,
    pub cells: Option<IndexMap<String, Value>>,
}

pub struct LinkTable {
    queue: Arc<ResolutionQueue>,
    instances: Vec<String>,
    default_visible: usize,
    shown: HashSet<String>,
}

impl LinkTable {
    pub fn new(queue: Arc<ResolutionQueue>) -> Self {
        Self::with_default_visible(queue, DEFAULT_VISIBLE_INSTANCES)
    }

    pub fn with_default_visible(queue: Arc<ResolutionQueue>, default_visible: usize) -> Self {
        Self {
            queue,
            instances: Vec::new(),
            default_visible,
            shown: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.instances
    }

    /// Append `id` (once) and request its resolution if it was never requested
    ///
    /// Invalid ids are rejected before the table or the cache is touched.
    pub fn add_instance(&mut self, id: &str) -> Result<InstanceRecord> {
        validate_instance_id(id)?;

        let record = self.queue.cache().get_or_create(id);

        if !self.instances.iter().any(|existing| existing == id) {
            self.instances.push(id.to_string());
        }

        if record.state() == ResolutionState::Unresolved {
            self.queue.request_resolution(id)?;
        }

        Ok(record)
    }

    /// Remove a row. The cached record is shared and stays.
    pub fn remove_instance(&mut self, id: &str) -> bool {
        let before = self.instances.len();
        self.instances.retain(|existing| existing != id);
        self.shown.remove(id);
        self.instances.len() != before
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.shown.clear();
    }

    /// Mark a row as shown; counts towards the visible total once
    pub fn show_instance(&mut self, id: &str) {
        if self.shown.insert(id.to_string()) {
            self.queue.cache().set_show(id, true);
        }
    }

    pub fn is_instance_visible(&self, index: usize, id: &str) -> bool {
        index < self.default_visible || self.shown.contains(id)
    }

    /// Rows rendered: the default window plus every shown row outside it
    pub fn visible_instances_count(&self) -> usize {
        let default_rows = self.default_visible.min(self.instances.len());
        let shown_beyond_default = self.instances[default_rows..]
            .iter()
            .filter(|id| self.shown.contains(id.as_str()))
            .count();

        default_rows + shown_beyond_default
    }

    pub fn has_initialization_error(&self) -> bool {
        self.first_record()
            .map(|record| record.fetch_error.is_some())
            .unwrap_or(false)
    }

    pub fn is_initialized(&self) -> bool {
        self.has_initialization_error()
            || self
                .first_record()
                .map(|record| !record.fields.is_empty())
                .unwrap_or(false)
    }

    pub fn columns(&self) -> Vec<Column> {
        if self.is_initialized() && !self.has_initialization_error() {
            if let Some(first) = self.first_record() {
                return first
                    .fields
                    .iter()
                    .map(|(name, field)| Column {
                        name: name.clone(),
                        label: field.name.clone(),
                    })
                    .collect();
            }
        }

        vec![Column {
            name: "id".to_string(),
            label: "Name".to_string(),
        }]
    }

    pub fn rows(&self) -> Vec<Row> {
        let columns = self.columns();

        self.instances
            .iter()
            .map(|id| {
                let cells = self
                    .record(id)
                    .filter(|record| record.is_fetched && !record.is_fetching)
                    .map(|record| {
                        columns
                            .iter()
                            .map(|column| {
                                let value = record
                                    .fields
                                    .get(&column.name)
                                    .map(|field| field.value.clone())
                                    .unwrap_or(Value::Null);
                                (column.name.clone(), value)
                            })
                            .collect()
                    });

                Row {
                    id: id.clone(),
                    cells,
                }
            })
            .collect()
    }

    fn record(&self, id: &str) -> Option<InstanceRecord> {
        self.queue.cache().get(id)
    }

    fn first_record(&self) -> Option<InstanceRecord> {
        self.instances.first().and_then(|id| self.record(id))
    }
}
