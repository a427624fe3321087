pub mod inventory;

pub use inventory::{InventoryError, InventoryManager};
