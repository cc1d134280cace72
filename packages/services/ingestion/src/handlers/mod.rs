pub mod csv;
pub mod upload;

pub use self::csv::*;
pub use upload::*;
