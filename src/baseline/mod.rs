//! Non-learned link prediction baselines that consume flat edge arrays.

mod edgebank;

pub use edgebank::{EdgeBank, EdgeBankOptions, MemoryMode};
