use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use draftbook_notebook::{NodeId, NodeStore, TreeError};

/// 編輯分頁/視窗插槽的識別碼，由外層介面指派。 / Identifies a tab or window slot; assigned by the hosting UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 應用視窗的識別碼。 / Identifies an application window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// 文件表面註冊相關的錯誤。 / Error conditions exposed by the document registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("surface {0} is not registered")]
    UnknownSurface(SurfaceId),
    #[error("node {0} has no open document")]
    NoSuchOpenDocument(NodeId),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// 單一編輯表面的狀態快照。 / Snapshot of one editing surface bound to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenDocument {
    pub node: NodeId,
    pub surface: SurfaceId,
    pub window: WindowId,
    pub dirty: bool,
}

#[derive(Debug, Clone)]
struct SharedBuffer {
    bytes: Vec<u8>,
    dirty: bool,
}

#[derive(Debug, Clone, Copy)]
struct SurfaceRecord {
    node: NodeId,
    window: WindowId,
}

/// 管理綁定到節點的編輯表面；每個節點僅有一份權威緩衝，
/// 所有表面共享同一狀態。 / Tracks editing surfaces bound to nodes under a
/// single-authoritative-buffer-per-node policy: every surface viewing a node
/// shares one buffer and one dirty state.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    buffers: HashMap<NodeId, SharedBuffer>,
    surfaces: HashMap<SurfaceId, SurfaceRecord>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 將表面綁定至檔案節點；若該節點已有共享緩衝則直接附掛，
    /// 否則自儲存區讀入內容。已綁定的表面會先解除原有綁定。 /
    /// Binds a surface to a file node. When a shared buffer already exists
    /// the surface attaches to it, inheriting its dirty state; otherwise the
    /// buffer is materialised from the store. A surface that was already
    /// bound elsewhere is detached first.
    pub fn open(
        &mut self,
        store: &NodeStore,
        node: NodeId,
        surface: SurfaceId,
        window: WindowId,
    ) -> Result<OpenDocument, RegistryError> {
        if !self.buffers.contains_key(&node) {
            let bytes = store.read_content(node)?.to_vec();
            self.buffers.insert(node, SharedBuffer { bytes, dirty: false });
        }
        if let Some(prior) = self.surfaces.remove(&surface) {
            self.release_if_unused(prior.node);
        }
        self.surfaces.insert(surface, SurfaceRecord { node, window });
        Ok(OpenDocument {
            node,
            surface,
            window,
            dirty: self.is_dirty(node),
        })
    }

    /// 更新共享緩衝並將所有綁定表面標記為已修改。 / Replaces the shared
    /// buffer, marking every surface bound to the node dirty at once.
    pub fn edit(&mut self, node: NodeId, bytes: impl Into<Vec<u8>>) -> Result<(), RegistryError> {
        let buffer = self
            .buffers
            .get_mut(&node)
            .ok_or(RegistryError::NoSuchOpenDocument(node))?;
        buffer.bytes = bytes.into();
        buffer.dirty = true;
        Ok(())
    }

    /// 解除單一表面的綁定；若它是最後一個表面且緩衝無未儲存變更，
    /// 共享緩衝會被釋放。 / Detaches one surface. When it was the last
    /// surface bound to the node and the buffer is clean, the buffer is
    /// released.
    pub fn close(&mut self, surface: SurfaceId) -> Result<(), RegistryError> {
        let record = self
            .surfaces
            .remove(&surface)
            .ok_or(RegistryError::UnknownSurface(surface))?;
        self.release_if_unused(record.node);
        Ok(())
    }

    /// 無條件關閉節點的所有表面並丟棄共享緩衝；未儲存變更是否保留
    /// 由呼叫端事先確認。 / Unconditionally closes every surface bound to
    /// the node and drops the shared buffer. Confirming the loss of unsaved
    /// edits is the caller's responsibility.
    pub fn close_everywhere(&mut self, node: NodeId) -> Vec<SurfaceId> {
        let mut removed: Vec<SurfaceId> = self
            .surfaces
            .iter()
            .filter(|(_, record)| record.node == node)
            .map(|(surface, _)| *surface)
            .collect();
        removed.sort_by_key(SurfaceId::as_u64);
        for surface in &removed {
            self.surfaces.remove(surface);
        }
        self.buffers.remove(&node);
        removed
    }

    /// 取得節點目前的共享緩衝內容。 / Returns the current shared buffer for the node, if any.
    pub fn buffer_contents(&self, node: NodeId) -> Option<&[u8]> {
        self.buffers.get(&node).map(|buffer| buffer.bytes.as_slice())
    }

    /// 判斷節點是否有未儲存變更。 / Returns whether the node's buffer differs from its last-saved state.
    pub fn is_dirty(&self, node: NodeId) -> bool {
        self.buffers
            .get(&node)
            .map(|buffer| buffer.dirty)
            .unwrap_or(false)
    }

    /// 列出所有帶未儲存變更的節點。 / Lists every node with unsaved changes, ordered by id.
    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| buffer.dirty)
            .map(|(node, _)| *node)
            .collect();
        nodes.sort();
        nodes
    }

    /// 列出綁定至節點的所有表面。 / Lists the surfaces bound to the node, ordered by id.
    pub fn surfaces_of(&self, node: NodeId) -> Vec<SurfaceId> {
        let mut surfaces: Vec<SurfaceId> = self
            .surfaces
            .iter()
            .filter(|(_, record)| record.node == node)
            .map(|(surface, _)| *surface)
            .collect();
        surfaces.sort_by_key(SurfaceId::as_u64);
        surfaces
    }

    /// 列出指定視窗中可見的節點。 / Lists the nodes visible in the given window, ordered by id.
    pub fn nodes_in_window(&self, window: WindowId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .surfaces
            .values()
            .filter(|record| record.window == window)
            .map(|record| record.node)
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// 取得表面的目前狀態快照。 / Returns a snapshot of the surface, if registered.
    pub fn surface(&self, surface: SurfaceId) -> Option<OpenDocument> {
        self.surfaces.get(&surface).map(|record| OpenDocument {
            node: record.node,
            surface,
            window: record.window,
            dirty: self.is_dirty(record.node),
        })
    }

    pub(crate) fn mark_clean(&mut self, node: NodeId) {
        if let Some(buffer) = self.buffers.get_mut(&node) {
            buffer.dirty = false;
        }
    }

    fn release_if_unused(&mut self, node: NodeId) {
        let still_bound = self.surfaces.values().any(|record| record.node == node);
        if !still_bound && !self.is_dirty(node) {
            self.buffers.remove(&node);
        }
    }
}
