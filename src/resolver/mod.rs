mod loader;
mod merge;

pub use loader::{DocumentSource, FsSource, MemSource, SpecLoader};
pub use merge::deep_merge;
