//! Collaborators the engine consumes but does not implement: persistence,
//! the blockchain node, the decompiler and report delivery.
//!
//! [`InMemoryStore`] is the one concrete implementation shipped with the
//! crate; it backs the tests and the local campaign demo.

mod chain;
mod decompiler;
mod memory;
mod reporter;
mod store;

pub use chain::{BatchOutcome, ChainClient, Deployment};
pub use decompiler::{DecompiledBlock, DecompiledInstruction, Decompiler};
pub use memory::InMemoryStore;
pub use reporter::ReportSink;
pub use store::Store;
