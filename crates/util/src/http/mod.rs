pub mod fetch;
pub mod parser;

pub use fetch::*;
pub use parser::*;
