pub mod admin;
pub mod health;
pub mod webhook;

pub use admin::*;
pub use health::*;
pub use webhook::*;
