//! Storage layer: the backend capability and its reference implementations

pub mod backend;
pub mod journaled;
pub mod table;
pub mod wal;

pub use backend::*;
pub use journaled::*;
pub use table::*;
pub use wal::*;
