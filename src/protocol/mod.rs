pub mod anthropic;
pub mod normalized;

pub use normalized::NormalizedEvent;
