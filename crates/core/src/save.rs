use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use draftbook_notebook::{
    ContainerError, ContainerStore, NodeId, NodeStore, TreeError, PLAIN_TEXT_EXTENSION,
};

use crate::documents::{DocumentRegistry, WindowId};

/// 儲存流程相關的錯誤。 / Error conditions raised while saving.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("node {0} has no open document")]
    NoSuchOpenDocument(NodeId),
    #[error("scratch flush failed: {0}")]
    Scratch(io::Error),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// 單一節點儲存失敗的紀錄。 / Records one node that did not save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFailure {
    pub node: NodeId,
    pub name: String,
    pub reason: String,
}

/// 批次儲存的結果；失敗不會中止其餘節點。 / Outcome of a batch save. A
/// failure on one node never aborts the remaining saves.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub saved: Vec<NodeId>,
    pub failed: Vec<SaveFailure>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// 取得儲存失敗的節點名稱。 / Returns the display names of the nodes that failed.
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed
            .iter()
            .map(|failure| failure.name.as_str())
            .collect()
    }
}

/// 協調單檔與整批儲存：先將共享緩衝寫入暫存檔，套用至儲存區，
/// 再一次寫出整個容器；成功後才清除 dirty 標記。 / Orchestrates save and
/// save-all: each shared buffer is flushed to a scratch file, applied to
/// the store, then the whole container is written once. Dirty flags clear
/// only after the container write succeeds, so failed edits stay retryable.
#[derive(Debug)]
pub struct SaveCoordinator {
    container: ContainerStore,
    scratch_dir: PathBuf,
}

impl SaveCoordinator {
    /// 建立綁定至容器路徑與暫存資料夾的協調器。 / Creates a coordinator bound to a container path and a scratch directory.
    pub fn new(container_path: impl AsRef<Path>, scratch_dir: impl AsRef<Path>) -> Self {
        Self {
            container: ContainerStore::new(container_path),
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        }
    }

    pub fn container(&self) -> &ContainerStore {
        &self.container
    }

    /// 儲存單一節點：寫入儲存區並持久化整個容器，成功後清除所有綁定
    /// 表面的 dirty 標記。 / Saves one node: applies the shared buffer to
    /// the store, persists the whole container and clears dirty on every
    /// bound surface once the write succeeds.
    pub fn save(
        &self,
        store: &mut NodeStore,
        registry: &mut DocumentRegistry,
        node: NodeId,
    ) -> Result<(), SaveError> {
        self.flush(store, registry, node)?;
        self.container.save(store)?;
        self.finish(registry, node);
        Ok(())
    }

    /// 儲存所有帶未儲存變更的節點。 / Saves every dirty node in the notebook.
    pub fn save_all(&self, store: &mut NodeStore, registry: &mut DocumentRegistry) -> SaveReport {
        let scope = registry.dirty_nodes();
        self.save_scope(store, registry, scope)
    }

    /// 儲存指定視窗中可見的未儲存節點。 / Saves the dirty nodes visible in the given window.
    pub fn save_all_in_window(
        &self,
        store: &mut NodeStore,
        registry: &mut DocumentRegistry,
        window: WindowId,
    ) -> SaveReport {
        let in_window = registry.nodes_in_window(window);
        let scope = registry
            .dirty_nodes()
            .into_iter()
            .filter(|node| in_window.contains(node))
            .collect();
        self.save_scope(store, registry, scope)
    }

    fn save_scope(
        &self,
        store: &mut NodeStore,
        registry: &mut DocumentRegistry,
        scope: Vec<NodeId>,
    ) -> SaveReport {
        let mut report = SaveReport::default();
        let mut flushed = Vec::new();
        for node in scope {
            match self.flush(store, registry, node) {
                Ok(()) => flushed.push(node),
                Err(err) => report.failed.push(SaveFailure {
                    node,
                    name: display_name(store, node),
                    reason: err.to_string(),
                }),
            }
        }
        if flushed.is_empty() {
            return report;
        }
        match self.container.save(store) {
            Ok(()) => {
                for node in flushed {
                    self.finish(registry, node);
                    report.saved.push(node);
                }
            }
            Err(err) => {
                let reason = err.to_string();
                for node in flushed {
                    report.failed.push(SaveFailure {
                        node,
                        name: display_name(store, node),
                        reason: reason.clone(),
                    });
                }
            }
        }
        report
    }

    fn flush(
        &self,
        store: &mut NodeStore,
        registry: &mut DocumentRegistry,
        node: NodeId,
    ) -> Result<(), SaveError> {
        if registry.surfaces_of(node).is_empty() {
            return Err(SaveError::NoSuchOpenDocument(node));
        }
        let bytes = registry
            .buffer_contents(node)
            .ok_or(SaveError::NoSuchOpenDocument(node))?
            .to_vec();
        write_atomic(&self.scratch_path(node), &bytes).map_err(SaveError::Scratch)?;
        store.write_content(node, bytes)?;
        Ok(())
    }

    fn finish(&self, registry: &mut DocumentRegistry, node: NodeId) {
        registry.mark_clean(node);
        let _ = fs::remove_file(self.scratch_path(node));
    }

    /// 節點緩衝的暫存檔路徑。 / Scratch file path for a node's buffer.
    pub fn scratch_path(&self, node: NodeId) -> PathBuf {
        self.scratch_dir
            .join(format!("{node}.{PLAIN_TEXT_EXTENSION}"))
    }
}

fn display_name(store: &NodeStore, node: NodeId) -> String {
    store
        .name_of(node)
        .map(str::to_string)
        .unwrap_or_else(|_| node.to_string())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}
