//! Gateway binary internals: the axum application, the WebSocket chat
//! surface, webhook ingress, and the media-room token endpoint.

pub mod app;
pub mod http;
pub mod route;
pub mod ws;
