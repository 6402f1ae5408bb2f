use crate::app::lifecycle::context::StartupContext;
use crate::app::pipeline::auction::AuctionContext;
use crate::app::server::Server;
use crate::core::adapters::BidderRegistry;
use crate::core::adapters::dynamic::DynamicRegistry;
use crate::core::idr::IdrClient;
use crate::core::idr::model::ModeToggle;
use crate::core::ortb::BidRequest;
use crate::core::pipeline::{AsyncTask, Pipeline};
use crate::sample_or_attach_root_span;
use actix_web::{HttpResponse, web};
use anyhow::{Error, anyhow, bail};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{Instrument, debug, info, instrument};

pub struct StartServerTask;

/// Run one auction end to end and render its response.
///
/// # Behavior
/// Malformed requests surface as a 400 with the rejection reason.
/// Everything else is a 200 carrying the bid response, including
/// no-bid and deadline-expired outcomes. A 500 only happens when
/// the pipeline failed without leaving a response behind, which is
/// an internal invariant violation
async fn handle_auction(
    req: BidRequest,
    pipeline: Arc<Pipeline<AuctionContext, Error>>,
    span_sample_rate: f32,
) -> HttpResponse {
    let root_span = sample_or_attach_root_span!(span_sample_rate, "handle_auction");

    let context = AuctionContext::new(req);
    let outcome = pipeline.run(&context).instrument(root_span).await;

    if let Some(reason) = context.malformed.get() {
        return HttpResponse::BadRequest().json(json!({ "error": reason }));
    }

    match &outcome {
        Ok(_) => debug!("Auction pipeline success"),
        Err(e) => {
            debug!("Auction pipeline aborted: {}", e);

            if context.res.get().is_none() {
                return HttpResponse::InternalServerError()
                    .json(json!({ "error": "internal error" }));
            }
        }
    }

    let result = context.into_result();

    HttpResponse::Ok().json(result.response)
}

fn bidder_codes(
    registry: &BidderRegistry,
    dynamic: Option<&Arc<DynamicRegistry>>,
) -> Vec<String> {
    let mut codes = registry.enabled_codes();

    if let Some(dynamic) = dynamic {
        codes.extend(dynamic.snapshot().enabled_codes());
    }

    codes.sort();
    codes.dedup();
    codes
}

fn breaker_response(client: Option<&Arc<IdrClient>>) -> HttpResponse {
    match client {
        Some(client) => HttpResponse::Ok().json(json!({
            "enabled": true,
            "breaker": client.breaker().stats(),
        })),
        None => HttpResponse::Ok().json(json!({ "enabled": false })),
    }
}

async fn mode_toggle(
    client: Option<Arc<IdrClient>>,
    mode: String,
    toggle: ModeToggle,
) -> HttpResponse {
    if mode != "bypass" && mode != "shadow" {
        return HttpResponse::BadRequest().json(json!({ "error": "unknown mode" }));
    }

    let Some(client) = client else {
        return HttpResponse::BadRequest().json(json!({ "error": "idr disabled" }));
    };

    match client.set_mode(&mode, toggle.enabled).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "ok": true })),
        Err(e) => HttpResponse::BadGateway().json(json!({ "error": e.to_string() })),
    }
}

#[async_trait]
impl AsyncTask<StartupContext, Error> for StartServerTask {
    #[instrument(skip_all, name = "start_server_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = match context.config.get() {
            Some(config) => config,
            None => bail!("Config missing during start server task"),
        };

        let pipeline = context
            .auction_pipeline
            .get()
            .ok_or_else(|| anyhow!("Auction pipeline not built"))?
            .clone();

        let registry = context
            .registry
            .get()
            .ok_or_else(|| anyhow!("Bidder registry not built"))?
            .clone();

        let dynamic = context.dynamic_registry.get().cloned();
        let idr_client = context.idr_client.get().cloned();
        let span_sample_rate = config.logging.span_sample_rate;

        let server = Server::listen(&config.server, move |service| {
            service
                .route(
                    "/openrtb2/auction",
                    web::post().to({
                        let pipeline = pipeline.clone();
                        move |req: web::Json<BidRequest>| {
                            let pipeline = pipeline.clone();

                            async move {
                                handle_auction(req.into_inner(), pipeline, span_sample_rate).await
                            }
                        }
                    }),
                )
                .route(
                    "/status",
                    web::get().to(|| async { HttpResponse::Ok().json(json!({ "status": "ok" })) }),
                )
                .route(
                    "/health",
                    web::get().to(|| async {
                        HttpResponse::Ok().json(json!({
                            "status": "ok",
                            "version": env!("CARGO_PKG_VERSION"),
                        }))
                    }),
                )
                .route(
                    "/info/bidders",
                    web::get().to({
                        let registry = registry.clone();
                        let dynamic = dynamic.clone();
                        move || {
                            let codes = bidder_codes(&registry, dynamic.as_ref());

                            async move { HttpResponse::Ok().json(json!({ "bidders": codes })) }
                        }
                    }),
                )
                .route(
                    "/admin/circuit-breaker",
                    web::get().to({
                        let client = idr_client.clone();
                        move || {
                            let response = breaker_response(client.as_ref());

                            async move { response }
                        }
                    }),
                )
                .route(
                    "/admin/circuit-breaker/open",
                    web::post().to({
                        let client = idr_client.clone();
                        move || {
                            if let Some(client) = client.as_ref() {
                                client.breaker().force_open();
                            }

                            let response = breaker_response(client.as_ref());

                            async move { response }
                        }
                    }),
                )
                .route(
                    "/admin/circuit-breaker/reset",
                    web::post().to({
                        let client = idr_client.clone();
                        move || {
                            if let Some(client) = client.as_ref() {
                                client.breaker().reset();
                            }

                            let response = breaker_response(client.as_ref());

                            async move { response }
                        }
                    }),
                )
                .route(
                    "/admin/idr/mode/{mode}",
                    web::post().to({
                        let client = idr_client.clone();
                        move |mode: web::Path<String>, toggle: web::Json<ModeToggle>| {
                            let client = client.clone();

                            async move {
                                mode_toggle(client, mode.into_inner(), toggle.into_inner()).await
                            }
                        }
                    }),
                );
        })
        .await?;

        context
            .server
            .set(server)
            .map_err(|_| anyhow!("Could not set server"))?;

        info!("Started http server, ready for requests");

        Ok(())
    }
}
