mod backend;
mod memory;
mod rocksdb;

pub use backend::{StoreBackend, StoreConfig};
pub use memory::MemoryStore;
pub use self::rocksdb::RocksDbStore;
