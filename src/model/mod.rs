mod credential;
mod error;
mod outcome;

pub use credential::*;
pub use error::*;
pub use outcome::*;
