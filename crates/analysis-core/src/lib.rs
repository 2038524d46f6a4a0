pub mod decision;
pub mod error;
pub mod payloads;
pub mod result;
pub mod retry;
pub mod traits;
pub mod types;

pub use decision::*;
pub use error::*;
pub use payloads::*;
pub use result::*;
pub use retry::*;
pub use traits::*;
pub use types::*;
