//! Model and result persistence
//!
//! The forecast core only talks to the [`ModelStore`] contract. The shipped
//! store is an in-memory LRU cache; forecast results go to JSON files
//! through [`ResultStore`].

mod cache;
mod results;

pub use cache::{ModelCache, ModelKey};
pub use results::{ResultStore, StoredResult};

use crate::learners::LearnerHandle;

/// Where trained models are kept between forecast calls
pub trait ModelStore: Send + Sync {
    /// Newest stored version for `(model_type, symbol)`
    fn load(&self, model_type: &str, symbol: &str) -> Option<LearnerHandle>;

    fn save(&self, handle: LearnerHandle, model_type: &str, symbol: &str, version: &str);
}
