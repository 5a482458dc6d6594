//! Message module - typed asset messages and their validation

mod model;
mod validate;

pub use model::*;
pub use validate::*;
