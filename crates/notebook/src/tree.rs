use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier assigned to each node in a notebook tree. Ids are
/// allocated from a per-store counter and never reused within the lifetime
/// of a notebook.
/// 筆記本樹中每個節點的穩定識別碼；由儲存器內的計數器配發，整個筆記本生命週期內不重複使用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The kind of notebook node.
/// 筆記本節點的類型。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NodeKind {
    Folder {
        #[serde(default)]
        children: Vec<NodeId>,
        #[serde(default)]
        expanded: bool,
    },
    File {
        #[serde(default, with = "crate::serde_content")]
        content: Vec<u8>,
    },
}

impl NodeKind {
    pub fn is_folder(&self) -> bool {
        matches!(self, NodeKind::Folder { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File { .. })
    }
}

/// A single file or folder entry in the tree. Unrecognized fields read from
/// a container are kept in `extra` and written back verbatim.
/// 樹中的單一檔案或資料夾節點；容器中無法辨識的欄位保存在 `extra` 並原樣寫回。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    #[serde(default)]
    pub trashed: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Node {
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    fn children(&self) -> Option<&Vec<NodeId>> {
        match &self.kind {
            NodeKind::Folder { children, .. } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.kind {
            NodeKind::Folder { children, .. } => Some(children),
            NodeKind::File { .. } => None,
        }
    }
}

/// Tree-manipulation errors.
/// 樹狀結構操作的錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} not found")]
    NotFound(NodeId),
    #[error("node {0} is not the expected kind")]
    WrongKind(NodeId),
    #[error("node {0} cannot accept children")]
    InvalidParent(NodeId),
    #[error("node {0} is not a valid target for this operation")]
    InvalidTarget(NodeId),
}

/// Arena of nodes addressed by id. Parent and children links are stored as
/// ids rather than references, so cycle checks reduce to an ancestor walk.
/// 以識別碼定址的節點儲存區；親子關係皆以識別碼表示，循環檢查即為向上走訪祖先。
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
}

impl NodeStore {
    /// Constructs a store holding only a root folder with the given name.
    /// 建立僅含指定名稱根資料夾的儲存區。
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = NodeId(1);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            Node {
                id: root,
                name: root_name.into(),
                parent: None,
                kind: NodeKind::Folder {
                    children: Vec::new(),
                    expanded: true,
                },
                trashed: false,
                extra: serde_json::Map::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 2,
        }
    }

    /// Returns the identifier of the root folder.
    /// 取得根資料夾的識別碼。
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Looks up a node by identifier.
    /// 依識別碼尋找節點。
    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::NotFound(id))
    }

    pub fn name_of(&self, id: NodeId) -> Result<&str, TreeError> {
        Ok(self.node(id)?.name.as_str())
    }

    pub fn is_trashed(&self, id: NodeId) -> Result<bool, TreeError> {
        Ok(self.node(id)?.trashed)
    }

    /// Iterates every id currently held by the store, trashed nodes included.
    /// 走訪儲存區內所有識別碼，含已移入垃圾桶的節點。
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Creates a new file node under the given live folder.
    /// 在指定的有效資料夾下建立新檔案節點。
    pub fn create_file(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
    ) -> Result<NodeId, TreeError> {
        self.allocate(
            parent,
            name.into(),
            NodeKind::File {
                content: Vec::new(),
            },
        )
    }

    /// Creates a new folder node under the given live folder.
    /// 在指定的有效資料夾下建立新資料夾節點。
    pub fn create_folder(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
    ) -> Result<NodeId, TreeError> {
        self.allocate(
            parent,
            name.into(),
            NodeKind::Folder {
                children: Vec::new(),
                expanded: false,
            },
        )
    }

    /// Renames a node. The root folder keeps its name for the lifetime of
    /// the notebook.
    /// 重新命名節點；根資料夾在筆記本生命週期內不可改名。
    pub fn rename(&mut self, id: NodeId, new_name: impl Into<String>) -> Result<(), TreeError> {
        self.node(id)?;
        if id == self.root {
            return Err(TreeError::InvalidTarget(id));
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.name = new_name.into();
        }
        Ok(())
    }

    /// Moves a node under a new live folder at the given position (clamped
    /// to the child count). Moving the root, moving into the moved node's
    /// own subtree, or moving trashed nodes is rejected.
    /// 將節點移至新的有效資料夾並插入指定位置（超出範圍時夾擠至尾端）；
    /// 根節點、移入自身子樹或已刪除節點的搬移都會被拒絕。
    pub fn move_node(
        &mut self,
        id: NodeId,
        new_parent: NodeId,
        position: usize,
    ) -> Result<(), TreeError> {
        let trashed = self.node(id)?.trashed;
        if id == self.root {
            return Err(TreeError::InvalidTarget(id));
        }
        if trashed {
            return Err(TreeError::InvalidTarget(id));
        }
        let parent_ok = self
            .nodes
            .get(&new_parent)
            .map(|node| node.is_folder() && !node.trashed)
            .unwrap_or(false);
        if !parent_ok {
            return Err(TreeError::InvalidParent(new_parent));
        }
        if new_parent == id || self.is_ancestor(id, new_parent) {
            return Err(TreeError::InvalidTarget(new_parent));
        }
        self.detach(id);
        self.attach(id, new_parent, position);
        Ok(())
    }

    /// Returns the current byte payload of a file node.
    /// 取得檔案節點目前的位元組內容。
    pub fn read_content(&self, id: NodeId) -> Result<&[u8], TreeError> {
        match &self.node(id)?.kind {
            NodeKind::File { content } => Ok(content),
            NodeKind::Folder { .. } => Err(TreeError::WrongKind(id)),
        }
    }

    /// Replaces the byte payload of a file node.
    /// 以新的位元組內容取代檔案節點的內容。
    pub fn write_content(
        &mut self,
        id: NodeId,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<(), TreeError> {
        match &mut self
            .nodes
            .get_mut(&id)
            .ok_or(TreeError::NotFound(id))?
            .kind
        {
            NodeKind::File { content } => {
                *content = bytes.into();
                Ok(())
            }
            NodeKind::Folder { .. } => Err(TreeError::WrongKind(id)),
        }
    }

    /// Returns the ordered live children of a folder.
    /// 取得資料夾中依序排列且未被移入垃圾桶的子節點。
    pub fn children_of(&self, folder: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let node = self.node(folder)?;
        match node.children() {
            Some(children) => Ok(children
                .iter()
                .copied()
                .filter(|child| !self.trashed_flag(*child))
                .collect()),
            None => Err(TreeError::WrongKind(folder)),
        }
    }

    /// Records the expand/collapse state of a folder.
    /// 記錄資料夾的展開/收合狀態。
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> Result<(), TreeError> {
        match &mut self
            .nodes
            .get_mut(&id)
            .ok_or(TreeError::NotFound(id))?
            .kind
        {
            NodeKind::Folder { expanded: flag, .. } => {
                *flag = expanded;
                Ok(())
            }
            NodeKind::File { .. } => Err(TreeError::WrongKind(id)),
        }
    }

    /// Structurally removes a subtree from the store. The ids are gone for
    /// good; permanent deletion of user content goes through the trash.
    /// 將子樹自儲存區永久移除；使用者內容的永久刪除應經由垃圾桶操作。
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.node(id)?;
        if id == self.root {
            return Err(TreeError::InvalidTarget(id));
        }
        self.detach(id);
        for member in self.subtree_ids(id) {
            self.nodes.remove(&member);
        }
        Ok(())
    }

    /// Collects the ids of a subtree in depth-first order, root first.
    pub(crate) fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(node) = self.nodes.get(&current) {
                result.push(current);
                if let Some(children) = node.children() {
                    for child in children.iter().rev() {
                        pending.push(*child);
                    }
                }
            }
        }
        result
    }

    pub(crate) fn set_trashed_subtree(&mut self, id: NodeId, trashed: bool) {
        for member in self.subtree_ids(id) {
            if let Some(node) = self.nodes.get_mut(&member) {
                node.trashed = trashed;
            }
        }
    }

    /// Removes the id from its parent's children list, keeping the node's
    /// own parent reference intact.
    pub(crate) fn detach(&mut self, id: NodeId) {
        let parent = self.nodes.get(&id).and_then(|node| node.parent);
        if let Some(parent_id) = parent {
            if let Some(children) = self
                .nodes
                .get_mut(&parent_id)
                .and_then(|node| node.children_mut())
            {
                children.retain(|child| *child != id);
            }
        }
    }

    pub(crate) fn attach(&mut self, id: NodeId, parent: NodeId, index: usize) {
        if let Some(children) = self
            .nodes
            .get_mut(&parent)
            .and_then(|node| node.children_mut())
        {
            let slot = index.min(children.len());
            children.insert(slot, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(parent);
        }
    }

    /// Returns the position of the id within its parent's children list.
    pub(crate) fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes.get(&id).and_then(|node| node.parent)?;
        self.nodes
            .get(&parent)
            .and_then(|node| node.children())
            .and_then(|children| children.iter().position(|child| *child == id))
    }

    pub(crate) fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.nodes.get(&id).and_then(|node| node.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(&parent).and_then(|node| node.parent);
        }
        false
    }

    fn trashed_flag(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map(|node| node.trashed).unwrap_or(false)
    }

    fn allocate(
        &mut self,
        parent: NodeId,
        name: String,
        kind: NodeKind,
    ) -> Result<NodeId, TreeError> {
        let parent_ok = self
            .nodes
            .get(&parent)
            .map(|node| node.is_folder() && !node.trashed)
            .unwrap_or(false);
        if !parent_ok {
            return Err(TreeError::InvalidParent(parent));
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                name,
                parent: Some(parent),
                kind,
                trashed: false,
                extra: serde_json::Map::new(),
            },
        );
        if let Some(children) = self
            .nodes
            .get_mut(&parent)
            .and_then(|node| node.children_mut())
        {
            children.push(id);
        }
        Ok(id)
    }

    pub(crate) fn from_parts(root: NodeId, next_id: u64, nodes: BTreeMap<NodeId, Node>) -> Self {
        Self {
            nodes,
            root,
            next_id,
        }
    }

    pub(crate) fn nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.nodes
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_folder() -> (NodeStore, NodeId) {
        let mut store = NodeStore::new("Notebook");
        let folder = store.create_folder(store.root_id(), "Chapters").unwrap();
        (store, folder)
    }

    #[test]
    fn create_under_file_is_rejected() {
        let (mut store, folder) = store_with_folder();
        let file = store.create_file(folder, "Ch1").unwrap();
        let err = store.create_file(file, "nested").unwrap_err();
        assert_eq!(err, TreeError::InvalidParent(file));
    }

    #[test]
    fn create_under_unknown_parent_is_invalid() {
        let mut store = NodeStore::new("Notebook");
        let bogus = NodeId::from_u64(999);
        let err = store.create_folder(bogus, "ghost").unwrap_err();
        assert_eq!(err, TreeError::InvalidParent(bogus));
    }

    #[test]
    fn ids_are_never_reused() {
        let (mut store, folder) = store_with_folder();
        let file = store.create_file(folder, "Ch1").unwrap();
        store.remove(file).unwrap();
        let replacement = store.create_file(folder, "Ch1").unwrap();
        assert_ne!(file, replacement);
    }

    #[test]
    fn rename_root_is_rejected() {
        let mut store = NodeStore::new("Notebook");
        let err = store.rename(store.root_id(), "Other").unwrap_err();
        assert_eq!(err, TreeError::InvalidTarget(store.root_id()));
    }

    #[test]
    fn rename_updates_display_name() {
        let (mut store, folder) = store_with_folder();
        store.rename(folder, "Parts").unwrap();
        assert_eq!(store.name_of(folder).unwrap(), "Parts");
    }

    #[test]
    fn move_into_own_subtree_is_rejected_and_tree_unchanged() {
        let (mut store, folder) = store_with_folder();
        let inner = store.create_folder(folder, "Inner").unwrap();
        let before = store.clone();
        let err = store.move_node(folder, inner, 0).unwrap_err();
        assert_eq!(err, TreeError::InvalidTarget(inner));
        let err = store.move_node(folder, folder, 0).unwrap_err();
        assert_eq!(err, TreeError::InvalidTarget(folder));
        assert_eq!(store, before);
    }

    #[test]
    fn move_reorders_only_the_folders_involved() {
        let (mut store, folder) = store_with_folder();
        let root = store.root_id();
        let a = store.create_file(root, "a").unwrap();
        let b = store.create_file(root, "b").unwrap();
        store.move_node(a, folder, 0).unwrap();
        assert_eq!(store.children_of(folder).unwrap(), vec![a]);
        assert_eq!(store.children_of(root).unwrap(), vec![folder, b]);
        assert_eq!(store.node(a).unwrap().parent, Some(folder));
    }

    #[test]
    fn move_position_is_clamped() {
        let (mut store, folder) = store_with_folder();
        let a = store.create_file(folder, "a").unwrap();
        let b = store.create_file(store.root_id(), "b").unwrap();
        store.move_node(b, folder, 42).unwrap();
        assert_eq!(store.children_of(folder).unwrap(), vec![a, b]);
    }

    #[test]
    fn content_round_trips_through_store() {
        let (mut store, folder) = store_with_folder();
        let file = store.create_file(folder, "Ch1").unwrap();
        store.write_content(file, "Hello".as_bytes()).unwrap();
        assert_eq!(store.read_content(file).unwrap(), b"Hello");
        let err = store.read_content(folder).unwrap_err();
        assert_eq!(err, TreeError::WrongKind(folder));
    }

    #[test]
    fn expanded_flag_only_applies_to_folders() {
        let (mut store, folder) = store_with_folder();
        let file = store.create_file(folder, "Ch1").unwrap();
        store.set_expanded(folder, true).unwrap();
        assert!(matches!(
            store.node(folder).unwrap().kind,
            NodeKind::Folder { expanded: true, .. }
        ));
        let err = store.set_expanded(file, true).unwrap_err();
        assert_eq!(err, TreeError::WrongKind(file));
    }

    #[test]
    fn remove_drops_the_whole_subtree() {
        let (mut store, folder) = store_with_folder();
        let file = store.create_file(folder, "Ch1").unwrap();
        store.remove(folder).unwrap();
        assert!(!store.contains(folder));
        assert!(!store.contains(file));
        assert!(store.children_of(store.root_id()).unwrap().is_empty());
    }
}
