pub mod ask;
pub mod assets;
pub(crate) mod common;
pub mod health;
