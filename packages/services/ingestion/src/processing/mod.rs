pub mod access;
pub mod validator;

pub use access::*;
pub use validator::*;
