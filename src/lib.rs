pub mod ast;
pub mod cfg;
pub mod compile;
pub mod error;
pub mod ic;
pub mod ic_text;
pub mod symbol_table;
pub mod types;
pub mod optimizer {
    pub mod constant_folding;
    pub mod constant_propagation;
    pub mod copy_propagation;
    pub mod dead_store_elimination;
    pub mod tracker;
    pub mod unreachable_code_elimination;
}

pub use compile::compile;
pub use error::{CompileError, Result};
pub use ic::{ICProgram, Optimization, Optimize};
