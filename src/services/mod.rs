pub mod gateway;
pub mod responder;

pub use gateway::{GatewayError, GhlGateway};
pub use responder::{BotReply, SalesResponder};
