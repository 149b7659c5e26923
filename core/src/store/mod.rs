pub mod adapter;
pub mod assignments;
pub mod file;
pub mod name_store;

pub use adapter::{remove_assignment_by_name, set_assignment, NameStoreAdapter};
pub use assignments::{Assignments, NameAssignment};
pub use file::FileStore;
pub use name_store::{MemoryStore, NameStore};
