use crate::tree::{NodeId, NodeStore, TreeError};

/// One externally supplied file: a display name plus a raw byte stream.
/// 單一外部匯入檔案：顯示名稱加上原始位元組串流。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItem {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImportItem {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Records an item that could not be imported.
/// 紀錄無法匯入的項目。
#[derive(Debug, PartialEq, Eq)]
pub struct ImportFailure {
    pub name: String,
    pub error: TreeError,
}

/// Outcome of a batch import. Failures never abort the remaining items.
/// 批次匯入的結果；單一失敗不會中止其餘項目。
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<NodeId>,
    pub failed: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ingests one name+content pair as a new file node under the target
/// folder. Name collisions among siblings are permitted.
/// 將一組名稱與內容匯入為目標資料夾下的新檔案節點；允許與手足同名。
pub fn import(
    store: &mut NodeStore,
    parent: NodeId,
    name: impl Into<String>,
    bytes: impl Into<Vec<u8>>,
) -> Result<NodeId, TreeError> {
    let id = store.create_file(parent, name)?;
    store.write_content(id, bytes)?;
    Ok(id)
}

/// Imports a batch of items under the same folder, collecting per-item
/// failures.
/// 將一批項目匯入同一資料夾，並收集個別項目的失敗情形。
pub fn import_all(store: &mut NodeStore, parent: NodeId, items: Vec<ImportItem>) -> ImportReport {
    let mut report = ImportReport::default();
    for item in items {
        match import(store, parent, item.name.clone(), item.bytes) {
            Ok(id) => report.imported.push(id),
            Err(error) => report.failed.push(ImportFailure {
                name: item.name,
                error,
            }),
        }
    }
    report
}
