pub mod cache;
pub mod fetch;
pub mod protocol;
pub mod transport;

pub use cache::*;
pub use fetch::*;
pub use protocol::*;
pub use transport::*;
