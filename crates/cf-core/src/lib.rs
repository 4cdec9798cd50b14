pub mod config;
pub mod diagnostic;
pub mod model;
pub mod parser;

pub use config::*;
pub use diagnostic::*;
pub use model::*;
pub use parser::*;
