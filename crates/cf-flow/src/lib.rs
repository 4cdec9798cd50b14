// Rule-evaluation flow resolution over a parsed table
pub mod resolver;

pub use resolver::*;
