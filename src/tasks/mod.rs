pub mod flusher;

pub use flusher::{FlushState, WriteCoalescer};
