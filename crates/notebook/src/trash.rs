use thiserror::Error;

use crate::tree::{NodeId, NodeStore, TreeError};

/// Trash-manipulation errors.
/// 垃圾桶操作的錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrashError {
    #[error("node {0} is not a valid trash target")]
    InvalidTarget(NodeId),
    #[error("node {0} is not in the trash")]
    NotTrashed(NodeId),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TrashEntry {
    root: NodeId,
    prior_parent: NodeId,
    prior_index: usize,
}

/// Outcome of an `empty_trash` sweep. Every subtree purge runs
/// independently; failures never block the remaining entries.
/// 清空垃圾桶的結果；每個子樹的清除各自獨立，單一失敗不會阻擋其餘項目。
#[derive(Debug, Default)]
pub struct TrashSweep {
    pub purged: Vec<NodeId>,
    pub failed: Vec<(NodeId, TrashError)>,
}

impl TrashSweep {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Soft-delete bin layered over a [`NodeStore`]. Trashed subtrees stay in
/// the store, flagged and detached from normal traversal, until they are
/// restored or purged. Entries remember where the subtree came from.
/// 架在 [`NodeStore`] 之上的軟刪除垃圾桶；被刪除的子樹仍留在儲存區內，
/// 只是加上標記並脫離一般走訪，直到還原或永久清除為止。每筆條目記住子樹原本的位置。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrashBin {
    entries: Vec<TrashEntry>,
}

impl TrashBin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a bin from the trashed flags of a freshly decoded store.
    /// The original trash order and sibling positions are not persisted, so
    /// rebuilt entries restore by appending.
    /// 從剛解碼的儲存區中依刪除標記重建垃圾桶；原始的刪除順序與手足位置
    /// 不會被持久化，因此重建後的條目在還原時一律附加於尾端。
    pub fn rebuild(store: &NodeStore) -> Self {
        let mut entries = Vec::new();
        for id in store.ids() {
            let node = match store.node(id) {
                Ok(node) => node,
                Err(_) => continue,
            };
            if !node.trashed {
                continue;
            }
            let parent = match node.parent {
                Some(parent) => parent,
                None => continue,
            };
            let parent_trashed = store.is_trashed(parent).unwrap_or(false);
            if !parent_trashed {
                entries.push(TrashEntry {
                    root: id,
                    prior_parent: parent,
                    prior_index: usize::MAX,
                });
            }
        }
        Self { entries }
    }

    /// Lists the trashed subtree roots, most recently trashed first.
    /// 列出垃圾桶中的子樹根節點，最近刪除者在前。
    pub fn list_trash(&self) -> Vec<NodeId> {
        self.entries.iter().rev().map(|entry| entry.root).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Moves a subtree into the trash. The whole subtree is flagged as one
    /// atomic unit and detached from normal traversal while keeping its
    /// parent reference for restore. Trashing an already trashed node is a
    /// no-op.
    /// 將子樹移入垃圾桶；整個子樹作為單一原子單位加上標記並脫離一般走訪，
    /// 同時保留親節點參照以便還原。對已在垃圾桶中的節點再次刪除不造成任何變化。
    pub fn trash(&mut self, store: &mut NodeStore, id: NodeId) -> Result<(), TrashError> {
        let node = store.node(id)?;
        if id == store.root_id() {
            return Err(TrashError::InvalidTarget(id));
        }
        if node.trashed {
            return Ok(());
        }
        let prior_parent = node.parent.ok_or(TrashError::InvalidTarget(id))?;
        let prior_index = store.child_index(id).unwrap_or(usize::MAX);
        store.detach(id);
        store.set_trashed_subtree(id, true);
        self.entries.push(TrashEntry {
            root: id,
            prior_parent,
            prior_index,
        });
        Ok(())
    }

    /// Restores a trashed subtree. When the original parent is still live
    /// the subtree returns to its prior sibling position (clamped to the
    /// current child count); otherwise it is appended under the root.
    /// 還原垃圾桶中的子樹；若原親節點仍然有效，子樹回到先前的手足位置
    /// （超出範圍時夾擠至尾端），否則附加於根資料夾之下。
    pub fn restore(&mut self, store: &mut NodeStore, id: NodeId) -> Result<(), TrashError> {
        if !store.is_trashed(id)? {
            return Err(TrashError::NotTrashed(id));
        }
        let position = self
            .entries
            .iter()
            .position(|entry| entry.root == id)
            .ok_or(TrashError::InvalidTarget(id))?;
        let entry = self.entries.remove(position);
        let parent_live = store
            .node(entry.prior_parent)
            .map(|node| node.is_folder() && !node.trashed)
            .unwrap_or(false);
        let target = if parent_live {
            entry.prior_parent
        } else {
            store.root_id()
        };
        let index = if parent_live {
            entry.prior_index
        } else {
            usize::MAX
        };
        store.set_trashed_subtree(id, false);
        store.attach(id, target, index);
        Ok(())
    }

    /// Permanently removes a trashed subtree from the store. Purging a live
    /// node is rejected; permanent deletion only acts inside the trash.
    /// 將垃圾桶中的子樹自儲存區永久移除；不可對仍然有效的節點執行，
    /// 永久刪除僅在垃圾桶檢視中生效。
    pub fn purge(&mut self, store: &mut NodeStore, id: NodeId) -> Result<(), TrashError> {
        if !store.is_trashed(id)? {
            return Err(TrashError::NotTrashed(id));
        }
        let members = store.subtree_ids(id);
        store.remove(id)?;
        self.entries.retain(|entry| !members.contains(&entry.root));
        Ok(())
    }

    /// Purges every trashed subtree, collecting per-subtree failures.
    /// 清除垃圾桶內所有子樹，並收集個別子樹的失敗情形。
    pub fn empty_trash(&mut self, store: &mut NodeStore) -> TrashSweep {
        let mut sweep = TrashSweep::default();
        for root in self.list_trash() {
            match self.purge(store, root) {
                Ok(()) => sweep.purged.push(root),
                Err(err) => sweep.failed.push((root, err)),
            }
        }
        sweep
    }
}
