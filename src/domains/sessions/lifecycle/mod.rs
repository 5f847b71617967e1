pub mod cleanup;

pub use cleanup::{DeletionCoordinator, DeletionOutcome};
