//! HTTP server for aquaserver
//!
//! Serves the four JSON endpoints under `/aquaserver/` that browser
//! pollers and the dashboard consume. Everything else answers with an
//! empty success so probes never see an error page.

mod routes;
mod server;

pub use routes::aqua_routes;
pub use server::HttpServer;
