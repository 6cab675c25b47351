// Dataset persistence: main window, monthly archive, atomic writes

pub mod archive;
pub mod atomic;
pub mod dataset;
pub mod store;


pub use archive::Archive;
pub use atomic::{AtomicWriter, FileReplacer, FsReplacer};
pub use dataset::{Dataset, COLUMNS};
pub use store::MainStore;
