pub mod effect;
pub mod session;
pub mod target;

pub use effect::{GameEffect, GuessOutcome, Turn};
pub use session::{Game, ScopeStats};
pub use target::{CountryTarget, Mode, Prompt, Target};
