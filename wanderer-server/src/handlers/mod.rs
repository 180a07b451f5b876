pub mod operational;
pub mod subscriptions;
pub mod websocket;
