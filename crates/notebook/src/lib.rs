//! Notebook tree model and container persistence for Draftbook.
//! Draftbook 筆記本的樹狀模型與容器持久化核心模組。

mod serde_content;
mod util;

pub mod container;
pub mod import;
pub mod sample;
pub mod trash;
pub mod tree;

pub use container::{
    ContainerDocument, ContainerError, ContainerStore, CONTAINER_EXTENSION,
    CONTAINER_FORMAT_VERSION, CONTAINER_SCHEMA, PLAIN_TEXT_EXTENSION,
};
pub use import::{import, import_all, ImportFailure, ImportItem, ImportReport};
pub use sample::sample_notebook;
pub use trash::{TrashBin, TrashError, TrashSweep};
pub use tree::{Node, NodeId, NodeKind, NodeStore, TreeError};
