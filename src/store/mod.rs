pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{BudgetVerdict, ConversationPatch, Store};

/// Factory: create the right store backend from config.
pub fn create_store(backend: &str) -> anyhow::Result<Box<dyn Store>> {
    match backend {
        "memory" => Ok(Box::new(MemoryStore::new())),
        _ => anyhow::bail!(
            "Unknown store backend: {backend}. Only \"memory\" ships in-tree; \
             external backends implement the Store trait."
        ),
    }
}
