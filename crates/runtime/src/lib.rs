pub mod clock;
pub mod viewport;

pub use clock::*;
pub use viewport::*;
