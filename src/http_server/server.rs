//! # HTTP Server
//!
//! Binds the configured address and serves the coordinator's routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::coordinator::Coordinator;
use crate::observability::Logger;

use super::routes::aqua_routes;

/// HTTP server for the coordinator's public API
pub struct HttpServer {
    addr: String,
    router: Router,
}

impl HttpServer {
    /// Build the server against a shared coordinator
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let addr = coordinator.config.socket_addr();

        // Reporting clients are unauthenticated cross-origin pages
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = aqua_routes(coordinator).layer(cors);

        Self { addr, router }
    }

    /// The socket address this server will bind
    pub fn socket_addr(&self) -> &str {
        &self.addr
    }

    /// The router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind and serve until process exit
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;

        Logger::info("HTTP_SERVER_STARTED", &[("addr", &addr.to_string())]);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_server_uses_configured_addr() {
        let coordinator = Arc::new(Coordinator::new(ServerConfig::with_port(8080)));
        let server = HttpServer::new(coordinator);
        assert_eq!(server.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_router_builds() {
        let coordinator = Arc::new(Coordinator::new(ServerConfig::default()));
        let server = HttpServer::new(coordinator);
        let _router = server.router();
    }
}
