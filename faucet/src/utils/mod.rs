pub mod config;
pub mod event_listener;
pub mod logging;
pub mod retry;
pub mod rpc_client;
