// # State Stores
//
// `MemoryStateStore` for tests and throwaway runs, `FileStateStore` for
// everything that must survive the process.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
