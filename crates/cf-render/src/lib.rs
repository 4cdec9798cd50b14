pub mod dot;
pub mod graphviz;
pub mod html;
pub mod markup;
pub mod output;

pub use dot::*;
pub use graphviz::*;
pub use html::*;
pub use output::*;
