use crate::app::config::ServerConfig;
use actix_web::dev::ServerHandle;
use actix_web::error::JsonPayloadError;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use anyhow::Error;
use tracing::info;

/// Running http server handle, kept on the startup context so
/// shutdown can stop it gracefully
pub struct Server {
    handle: ServerHandle,
}

/// Map json extraction failures onto the wire contract: an
/// oversized body is a 413, anything else malformed is a 400
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = match &err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            log::warn!("Rejecting oversized request body");

            HttpResponse::PayloadTooLarge().json(serde_json::json!({
                "error": "payload too large"
            }))
        }
        other => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("malformed request: {}", other)
        })),
    };

    actix_web::error::InternalError::from_response(err, response).into()
}

impl Server {
    /// Bind and start serving, returning once the listener is up
    pub async fn listen<F>(cfg: &ServerConfig, configure: F) -> Result<Server, Error>
    where
        F: Fn(&mut web::ServiceConfig) + Send + Sync + Clone + 'static,
    {
        let payload_limit = cfg.max_payload_bytes;

        let mut server = HttpServer::new(move || {
            let json_cfg = web::JsonConfig::default()
                .limit(payload_limit)
                .error_handler(json_error_handler);

            let configure = configure.clone();

            App::new()
                .app_data(json_cfg)
                .configure(move |service| configure(service))
        })
        .disable_signals()
        .bind(&cfg.bind)?;

        if let Some(workers) = cfg.workers {
            server = server.workers(workers);
        }

        let server = server.run();
        let handle = server.handle();

        actix_web::rt::spawn(server);

        info!("Listening on {}", cfg.bind);

        Ok(Server { handle })
    }

    pub async fn stop(&self, graceful: bool) {
        self.handle.stop(graceful).await;
    }
}
