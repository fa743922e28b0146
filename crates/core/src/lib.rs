pub mod documents;
pub mod save;

pub use documents::{DocumentRegistry, OpenDocument, RegistryError, SurfaceId, WindowId};
pub use save::{SaveCoordinator, SaveError, SaveFailure, SaveReport};
