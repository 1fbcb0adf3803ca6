pub mod encoder;
pub mod errors;
pub mod parser;

pub use encoder::encode;
pub use parser::{Value, decode, parse};
