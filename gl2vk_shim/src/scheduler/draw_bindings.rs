/// Interned draw-time resource bindings
///
/// A draw command only carries a small id; the pipeline and buffers it needs
/// live in this append-only table shared by the producer and every worker.
/// Identical binding sets share one id, so steady-state frames never grow
/// the table.

use std::sync::Arc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use crate::backend::{BufferId, PipelineId};
use crate::layout::IndexType;

/// Id of an interned `DrawBindings`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawBindingsId(pub u64);

/// Pipeline and buffers bound for a draw
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrawBindings {
    pub pipeline: PipelineId,
    /// Vertex buffers in binding order
    pub vertex_buffers: Vec<BufferId>,
    pub index_buffer: Option<(BufferId, IndexType)>,
}

#[derive(Default)]
struct Table {
    entries: Vec<Arc<DrawBindings>>,
    lookup: FxHashMap<DrawBindings, DrawBindingsId>,
}

/// Append-only `DrawBindings` table
#[derive(Default)]
pub struct DrawBindingsTable {
    table: RwLock<Table>,
}

impl DrawBindingsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `bindings`, adding it if unseen
    pub fn intern(&self, bindings: DrawBindings) -> DrawBindingsId {
        if let Some(id) = self.table.read().lookup.get(&bindings) {
            return *id;
        }
        let mut table = self.table.write();
        if let Some(id) = table.lookup.get(&bindings) {
            return *id;
        }
        let id = DrawBindingsId(table.entries.len() as u64);
        table.entries.push(Arc::new(bindings.clone()));
        table.lookup.insert(bindings, id);
        id
    }

    pub fn get(&self, id: DrawBindingsId) -> Option<Arc<DrawBindings>> {
        self.table.read().entries.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
