use std::sync::Arc;

use actix_web::http::header::AUTHORIZATION;
use actix_web::dev::Payload;
use actix_web::web::Bytes;
use actix_web::{FromRequest, HttpRequest, HttpResponse};
use anyhow::{bail, Result};
use log::{debug, error, info};

use crate::handlers::Handler;
use crate::response::Response;

use super::{Denial, Guard, GuardContext, GuardKind, GuardResult, RequestParts, Stage};

/// An ordered list of guards evaluated one after another.
///
/// The order is fixed at construction. Every guard runs at most once per
/// request and evaluation stops at the first denial, so a failing
/// authentication guard means no authorization guard and no handler ever
/// runs for that request.
#[derive(Clone)]
pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardChain {
    /// Creates a chain, rejecting orders where an authorization guard would
    /// run before any authentication guard.
    ///
    /// # Arguments
    ///
    /// * `guards` - Guards in evaluation order, may be empty for public routes
    ///
    /// # Returns
    ///
    /// An error naming the first misplaced authorization guard.
    pub fn new(guards: Vec<Arc<dyn Guard>>) -> Result<Self> {
        let first_authn = guards
            .iter()
            .position(|g| g.kind() == GuardKind::Authentication);
        let first_authz = guards
            .iter()
            .position(|g| g.kind() == GuardKind::Authorization);

        if let Some(authz) = first_authz {
            match first_authn {
                Some(authn) if authn < authz => {}
                _ => bail!(
                    "authorization guard '{}' must be placed after an authentication guard",
                    guards[authz].name()
                ),
            }
        }

        Ok(Self { guards })
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Guard names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.guards.iter().map(|g| g.name()).collect()
    }

    /// Runs the guards in order against one request.
    ///
    /// # Returns
    ///
    /// * `Ok(ctx)` - Every guard allowed, `ctx` holds the subject (if any)
    /// * `Err(denial)` - The first guard that denied, later guards were not run
    pub async fn evaluate(&self, req: &RequestParts) -> Result<GuardContext, Denial> {
        let mut ctx = GuardContext::new();
        for guard in self.guards.iter() {
            let kind = guard.kind();
            ctx.set_stage(kind.running());

            match guard.evaluate(req, &mut ctx).await {
                GuardResult::Allow => {
                    ctx.set_stage(kind.passed());
                    debug!("Guard '{}' allowed {req}", guard.name());
                }
                GuardResult::Deny(denial) => {
                    ctx.set_stage(Stage::Denied);
                    if denial.is_server_error() {
                        error!("Guard '{}' failed {req}: {denial}", guard.name());
                    } else {
                        info!("Guard '{}' denied {req}: {denial}", guard.name());
                    }
                    return Err(denial);
                }
            }
        }
        Ok(ctx)
    }
}

/// Wires a guard chain in front of a terminal handler.
pub struct Adapter {
    chain: GuardChain,
}

impl Adapter {
    pub fn new(guards: Vec<Arc<dyn Guard>>) -> Result<Self> {
        let chain = GuardChain::new(guards)?;
        Ok(Self { chain })
    }

    /// Puts `handler` behind the chain. It only runs for requests every
    /// guard allowed.
    pub fn then<H>(self, handler: H) -> Endpoint
    where
        H: Handler + 'static,
    {
        Endpoint {
            chain: self.chain,
            handler: Box::new(handler),
        }
    }
}

/// A guarded handler, built once at route registration and shared read-only
/// by every worker.
pub struct Endpoint {
    chain: GuardChain,
    handler: Box<dyn Handler>,
}

impl Endpoint {
    pub fn chain(&self) -> &GuardChain {
        &self.chain
    }

    /// Serves one request.
    ///
    /// The body is only read once every guard allowed the request, so a
    /// denied request never has its payload buffered. Reading it honors the
    /// app's [`actix_web::web::PayloadConfig`]. The handler future is dropped
    /// together with this one when the transport cancels the request.
    ///
    /// # Arguments
    ///
    /// * `req` - The transport request
    /// * `payload` - The unread request body
    pub async fn serve(&self, req: HttpRequest, mut payload: Payload) -> HttpResponse {
        let parts = request_parts(&req);

        let mut ctx = match self.chain.evaluate(&parts).await {
            Ok(ctx) => ctx,
            Err(denial) => return Response::from(denial).into(),
        };

        let body = match Bytes::from_request(&req, &mut payload).await {
            Ok(body) => body,
            Err(e) => {
                info!("Read body of {parts}: {e}");
                return Response::payload_error(&e).into();
            }
        };

        ctx.set_stage(Stage::Dispatched);
        let resp = self.handler.handle(&ctx, &parts, body).await;
        debug!("- {parts} -> {}", resp.status());
        resp.into()
    }
}

fn request_parts(req: &HttpRequest) -> RequestParts {
    let params = req
        .match_info()
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).to_string());

    let peer = req.connection_info().peer_addr().map(String::from);

    RequestParts {
        method: req.method().as_str().to_string(),
        path: req.path().to_string(),
        params,
        authorization,
        peer,
    }
}
