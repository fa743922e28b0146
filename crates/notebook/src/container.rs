use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::{Node, NodeId, NodeStore};
use crate::util::write_atomic;

/// Current container format version.
pub const CONTAINER_FORMAT_VERSION: u32 = 1;

/// Schema marker written into every container document.
pub const CONTAINER_SCHEMA: &str = "draftbook-notebook";

/// Filename extension for notebook containers.
pub const CONTAINER_EXTENSION: &str = "nbk";

/// Filename extension for plain-text import/export.
pub const PLAIN_TEXT_EXTENSION: &str = "txt";

/// Errors raised while encoding, decoding or persisting a container.
/// 容器編碼、解碼或持久化時可能出現的錯誤。
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container document is empty")]
    EmptyDocument,
    #[error("malformed container: {0}")]
    Malformed(String),
    #[error("not a notebook container: {}", .0.display())]
    NotAContainer(PathBuf),
    #[error("container IO error: {0}")]
    Io(#[from] io::Error),
}

/// Wire representation of a whole notebook: schema marker, root id and a
/// node map keyed by id. Live and trashed nodes are serialized alike, with
/// folder ordering preserved exactly as stored.
/// 整本筆記本的序列化表示：結構標記、根節點識別碼與以識別碼為鍵的節點映射。
/// 有效與已刪除節點一併序列化，資料夾排序原樣保留。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerDocument {
    pub schema: String,
    pub format_version: u32,
    pub root: NodeId,
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
}

/// Serialises a store into a container document.
/// 將儲存區序列化為容器文件。
pub fn encode(store: &NodeStore) -> ContainerDocument {
    ContainerDocument {
        schema: CONTAINER_SCHEMA.to_string(),
        format_version: CONTAINER_FORMAT_VERSION,
        root: store.root_id(),
        next_id: store.next_id(),
        nodes: store.nodes().clone(),
    }
}

/// Serialises a store into pretty-printed container JSON. The node map is
/// ordered by id, so encoding the same tree twice yields identical bytes.
/// 將儲存區序列化為易讀的容器 JSON；節點映射依識別碼排序，
/// 同一棵樹重複編碼會得到完全相同的位元組。
pub fn to_json(store: &NodeStore) -> Result<Vec<u8>, ContainerError> {
    serde_json::to_vec_pretty(&encode(store)).map_err(|err| ContainerError::Malformed(err.to_string()))
}

/// Validates a container document and rebuilds the store it describes.
/// 驗證容器文件並重建其描述的儲存區。
pub fn decode(document: ContainerDocument) -> Result<NodeStore, ContainerError> {
    if document.schema != CONTAINER_SCHEMA {
        return Err(malformed(format!(
            "unrecognized schema {:?}",
            document.schema
        )));
    }
    if document.nodes.is_empty() {
        return Err(ContainerError::EmptyDocument);
    }

    let nodes = &document.nodes;
    let root = document.root;
    let root_node = nodes
        .get(&root)
        .ok_or_else(|| malformed(format!("root node {root} is missing")))?;
    if root_node.parent.is_some() {
        return Err(malformed(format!("root node {root} has a parent")));
    }
    if !root_node.is_folder() {
        return Err(malformed(format!("root node {root} is not a folder")));
    }
    if root_node.trashed {
        return Err(malformed(format!("root node {root} is trashed")));
    }

    let mut attached: HashSet<NodeId> = HashSet::new();
    for (key, node) in nodes {
        if *key != node.id {
            return Err(malformed(format!(
                "node {key} is keyed under a mismatched id"
            )));
        }
        match node.parent {
            None if node.id != root => {
                return Err(malformed(format!(
                    "node {} has no parent but is not the root",
                    node.id
                )));
            }
            Some(parent) => {
                if !nodes.contains_key(&parent) {
                    return Err(malformed(format!(
                        "node {} references missing parent {parent}",
                        node.id
                    )));
                }
            }
            None => {}
        }
        if let crate::tree::NodeKind::Folder { children, .. } = &node.kind {
            for child in children {
                let child_node = nodes.get(child).ok_or_else(|| {
                    malformed(format!("folder {} lists missing child {child}", node.id))
                })?;
                if child_node.parent != Some(node.id) {
                    return Err(malformed(format!(
                        "child {child} does not point back at folder {}",
                        node.id
                    )));
                }
                if node.trashed && !child_node.trashed {
                    return Err(malformed(format!(
                        "live node {child} is held by trashed folder {}",
                        node.id
                    )));
                }
                if !attached.insert(*child) {
                    return Err(malformed(format!(
                        "node {child} is referenced by more than one folder"
                    )));
                }
            }
        }
    }

    for node in nodes.values() {
        if node.id != root && !attached.contains(&node.id) && !node.trashed {
            return Err(malformed(format!("live node {} is unreachable", node.id)));
        }
    }

    // parent-walk with a step cap; anything longer than the node count loops
    for node in nodes.values() {
        let mut current = node.parent;
        let mut steps = 0;
        while let Some(parent) = current {
            steps += 1;
            if steps > nodes.len() {
                return Err(malformed(format!(
                    "cycle detected above node {}",
                    node.id
                )));
            }
            current = nodes.get(&parent).and_then(|ancestor| ancestor.parent);
        }
    }

    let max_id = nodes.keys().map(NodeId::as_u64).max().unwrap_or(0);
    let next_id = document.next_id.max(max_id + 1);
    Ok(NodeStore::from_parts(root, next_id, document.nodes))
}

/// Parses and validates container JSON.
/// 解析並驗證容器 JSON。
pub fn from_json(bytes: &[u8]) -> Result<NodeStore, ContainerError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ContainerError::EmptyDocument);
    }
    let document: ContainerDocument =
        serde_json::from_slice(bytes).map_err(|err| ContainerError::Malformed(err.to_string()))?;
    decode(document)
}

fn malformed(reason: String) -> ContainerError {
    ContainerError::Malformed(reason)
}

/// Persists notebook containers to disk using atomic writes, refreshing a
/// rollback copy of the previous container before each save.
/// 以原子寫入方式將筆記本容器存至磁碟，每次儲存前先更新前一版的備援副本。
#[derive(Debug, Clone)]
pub struct ContainerStore {
    path: PathBuf,
}

impl ContainerStore {
    /// Constructs a store bound to the provided container path.
    /// 建立綁定至指定容器路徑的儲存器。
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the rollback copy refreshed on every save.
    /// 每次儲存時更新的備援副本路徑。
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Loads a notebook from disk, returning `Ok(None)` when the container
    /// is absent. Paths without the container extension are rejected before
    /// any bytes are read.
    /// 從磁碟載入筆記本；檔案不存在時回傳 `Ok(None)`。
    /// 副檔名不符的路徑在讀取任何位元組前即被拒絕。
    pub fn load(&self) -> Result<Option<NodeStore>, ContainerError> {
        self.check_extension()?;
        match fs::read(&self.path) {
            Ok(bytes) => from_json(&bytes).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ContainerError::Io(err)),
        }
    }

    /// Saves the whole store atomically to disk.
    /// 將整個儲存區以原子方式寫入磁碟。
    pub fn save(&self, store: &NodeStore) -> Result<(), ContainerError> {
        self.check_extension()?;
        let payload = to_json(store)?;
        self.refresh_backup()?;
        write_atomic(&self.path, &payload).map_err(ContainerError::Io)
    }

    fn check_extension(&self) -> Result<(), ContainerError> {
        let recognized = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION))
            .unwrap_or(false);
        if recognized {
            Ok(())
        } else {
            Err(ContainerError::NotAContainer(self.path.clone()))
        }
    }

    fn refresh_backup(&self) -> Result<(), ContainerError> {
        match fs::copy(&self.path, self.backup_path()) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ContainerError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trash::TrashBin;
    use serde_json::Value;
    use tempfile::tempdir;

    fn seeded_store() -> NodeStore {
        let mut store = NodeStore::new("Notebook");
        let folder = store.create_folder(store.root_id(), "Chapters").unwrap();
        let file = store.create_file(folder, "Ch1").unwrap();
        store.write_content(file, "Hello".as_bytes()).unwrap();
        store.set_expanded(folder, true).unwrap();
        store
    }

    #[test]
    fn round_trip_preserves_the_whole_tree() {
        let mut store = seeded_store();
        let extra_file = store.create_file(store.root_id(), "Notes").unwrap();
        let mut bin = TrashBin::new();
        bin.trash(&mut store, extra_file).unwrap();

        let decoded = from_json(&to_json(&store).unwrap()).unwrap();
        assert_eq!(decoded, store);
    }

    #[test]
    fn encoding_twice_is_byte_identical() {
        let store = seeded_store();
        assert_eq!(to_json(&store).unwrap(), to_json(&store).unwrap());
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(matches!(
            from_json(b"").unwrap_err(),
            ContainerError::EmptyDocument
        ));
        assert!(matches!(
            from_json(b"  \n\t").unwrap_err(),
            ContainerError::EmptyDocument
        ));
    }

    #[test]
    fn plain_text_payload_is_rejected_as_malformed() {
        let err = from_json(b"just some prose, not a container").unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let mut value: Value =
            serde_json::from_slice(&to_json(&seeded_store()).unwrap()).unwrap();
        value["schema"] = Value::String("some-other-app".into());
        let err = from_json(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn missing_parent_reference_is_rejected() {
        let store = seeded_store();
        let mut value: Value = serde_json::from_slice(&to_json(&store).unwrap()).unwrap();
        value["nodes"]["2"]["parent"] = Value::from(999u64);
        let err = from_json(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn second_root_is_rejected() {
        let store = seeded_store();
        let mut value: Value = serde_json::from_slice(&to_json(&store).unwrap()).unwrap();
        value["nodes"]["2"]["parent"] = Value::Null;
        let err = from_json(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn parent_cycle_is_rejected() {
        let store = seeded_store();
        let mut value: Value = serde_json::from_slice(&to_json(&store).unwrap()).unwrap();
        // fold the folder and its file into a two-node loop off to the side
        value["nodes"]["2"]["parent"] = Value::from(3u64);
        value["nodes"]["3"]["kind"] =
            serde_json::json!({ "Folder": { "children": [2], "expanded": false } });
        value["nodes"]["1"]["kind"]["Folder"]["children"] = serde_json::json!([]);
        let err = from_json(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn unknown_node_fields_survive_a_round_trip() {
        let store = seeded_store();
        let mut value: Value = serde_json::from_slice(&to_json(&store).unwrap()).unwrap();
        value["nodes"]["3"]["color_tag"] = Value::String("crimson".into());
        let decoded = from_json(&serde_json::to_vec(&value).unwrap()).unwrap();
        let reencoded: Value = serde_json::from_slice(&to_json(&decoded).unwrap()).unwrap();
        assert_eq!(reencoded["nodes"]["3"]["color_tag"], "crimson");
    }

    #[test]
    fn store_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let container = ContainerStore::new(dir.path().join("draft.nbk"));
        let store = seeded_store();
        container.save(&store).unwrap();
        let loaded = container.load().unwrap().unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let container = ContainerStore::new(dir.path().join("absent.nbk"));
        assert!(container.load().unwrap().is_none());
    }

    #[test]
    fn wrong_extension_is_rejected_before_reading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("draft.txt");
        fs::write(&path, b"plain text body").unwrap();
        let container = ContainerStore::new(&path);
        assert!(matches!(
            container.load().unwrap_err(),
            ContainerError::NotAContainer(_)
        ));
        assert!(matches!(
            container.save(&seeded_store()).unwrap_err(),
            ContainerError::NotAContainer(_)
        ));
    }

    #[test]
    fn saving_refreshes_the_rollback_copy() {
        let dir = tempdir().unwrap();
        let container = ContainerStore::new(dir.path().join("draft.nbk"));
        let mut store = seeded_store();
        container.save(&store).unwrap();
        let first = fs::read(container.path()).unwrap();

        store.create_file(store.root_id(), "Later").unwrap();
        container.save(&store).unwrap();
        let backup = fs::read(container.backup_path()).unwrap();
        assert_eq!(backup, first);
        assert_ne!(fs::read(container.path()).unwrap(), first);
    }
}
