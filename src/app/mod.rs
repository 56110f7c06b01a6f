pub mod error;

pub use error::{FelixError, Result};
