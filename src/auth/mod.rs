pub mod cookie;
pub mod gateway;
pub mod handlers;
pub mod session;
