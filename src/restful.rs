use std::sync::Arc;
use std::time::Duration;

use actix_web::web::{self, Data, PayloadConfig};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use log::{info, warn};
use openssl::ssl::SslAcceptorBuilder;
use sd_notify::NotifyState;

use crate::authz::scope::ScopedAuthorization;
use crate::context::ServerContext;
use crate::guard::chain::{Adapter, Endpoint};
use crate::guard::Guard;
use crate::handlers::accounts::{
    CreateAccountHandler, DeleteAccountHandler, GetAccountHandler, ID_PARAM,
};
use crate::handlers::healthz::HealthzHandler;
use crate::handlers::token::TokenHandler;
use crate::permission::{Action, ACCOUNTS};
use crate::response::Response;

/// Every guarded endpoint of the service, built once and shared by all
/// workers.
pub struct Routes {
    create_account: Endpoint,
    get_account: Endpoint,
    delete_account: Endpoint,
    token: Endpoint,
    healthz: Endpoint,
}

impl Routes {
    const ACCOUNTS_PATH: &'static str = "/accounts";
    const ACCOUNT_PATHS: [&'static str; 2] = ["/accounts/", "/accounts/{id}"];
    const TOKEN_PATH: &'static str = "/token";
    const HEALTHZ_PATH: &'static str = "/healthz";

    pub fn build(ctx: &ServerContext) -> Result<Self> {
        let authn: Arc<dyn Guard> = ctx.authenticator.clone();
        let scoped = |action: Action| -> Arc<dyn Guard> {
            let guard = match action {
                Action::Create => ScopedAuthorization::collection(
                    ctx.authorizer.clone(),
                    ctx.namer.clone(),
                    ACCOUNTS,
                    action,
                ),
                Action::Get | Action::Delete => ScopedAuthorization::instance(
                    ctx.authorizer.clone(),
                    ctx.namer.clone(),
                    ACCOUNTS,
                    action,
                    ID_PARAM,
                ),
            };
            Arc::new(guard)
        };

        let create_account = Adapter::new(vec![authn.clone(), scoped(Action::Create)])
            .context("create account route")?
            .then(CreateAccountHandler::new(ctx.storage.clone()));
        let get_account = Adapter::new(vec![authn.clone(), scoped(Action::Get)])
            .context("get account route")?
            .then(GetAccountHandler::new(ctx.storage.clone()));
        let delete_account = Adapter::new(vec![authn, scoped(Action::Delete)])
            .context("delete account route")?
            .then(DeleteAccountHandler::new(ctx.storage.clone()));

        let token = Adapter::new(vec![])?.then(TokenHandler::new(
            ctx.storage.clone(),
            ctx.token_generator.clone(),
        ));
        let healthz = Adapter::new(vec![])?.then(HealthzHandler);

        Ok(Self {
            create_account,
            get_account,
            delete_account,
            token,
            healthz,
        })
    }

    /// Registers every route on an actix app, see [`default_handler`] for
    /// the fallback.
    pub fn register(self: &Arc<Self>, cfg: &mut web::ServiceConfig) {
        cfg.app_data(Data::new(self.clone()))
            .service(
                web::resource(Self::ACCOUNTS_PATH).route(web::post().to(Self::handle_create)),
            )
            .service(
                web::resource(Self::ACCOUNT_PATHS)
                    .route(web::get().to(Self::handle_get))
                    .route(web::delete().to(Self::handle_delete)),
            )
            .service(web::resource(Self::TOKEN_PATH).route(web::post().to(Self::handle_token)))
            .service(
                web::resource(Self::HEALTHZ_PATH).route(web::get().to(Self::handle_healthz)),
            );
    }

    async fn handle_create(
        req: HttpRequest,
        payload: web::Payload,
        routes: Data<Arc<Routes>>,
    ) -> HttpResponse {
        routes.create_account.serve(req, payload.into_inner()).await
    }

    async fn handle_get(
        req: HttpRequest,
        payload: web::Payload,
        routes: Data<Arc<Routes>>,
    ) -> HttpResponse {
        routes.get_account.serve(req, payload.into_inner()).await
    }

    async fn handle_delete(
        req: HttpRequest,
        payload: web::Payload,
        routes: Data<Arc<Routes>>,
    ) -> HttpResponse {
        routes.delete_account.serve(req, payload.into_inner()).await
    }

    async fn handle_token(
        req: HttpRequest,
        payload: web::Payload,
        routes: Data<Arc<Routes>>,
    ) -> HttpResponse {
        routes.token.serve(req, payload.into_inner()).await
    }

    async fn handle_healthz(
        req: HttpRequest,
        payload: web::Payload,
        routes: Data<Arc<Routes>>,
    ) -> HttpResponse {
        routes.healthz.serve(req, payload.into_inner()).await
    }
}

pub async fn default_handler(req: HttpRequest) -> HttpResponse {
    let path = req.uri().path().to_string();
    let method = req.method().as_str().to_string();
    Response::not_found(format!("No route to {method} {path}")).into()
}

pub struct RestfulServer {
    ssl: Option<SslAcceptorBuilder>,
    routes: Arc<Routes>,

    keep_alive_secs: Option<u64>,
    workers: Option<u64>,

    bind: String,

    payload_limit_mib: u64,
}

impl RestfulServer {
    const DEFAULT_PAYLOAD_LIMIT_MIB: u64 = 1;

    pub fn new(bind: String, ctx: Arc<ServerContext>) -> Result<Self> {
        let routes = Routes::build(&ctx)?;
        Ok(Self {
            ssl: None,
            routes: Arc::new(routes),
            keep_alive_secs: None,
            workers: None,
            bind,
            payload_limit_mib: Self::DEFAULT_PAYLOAD_LIMIT_MIB,
        })
    }

    pub fn set_ssl(&mut self, ssl: SslAcceptorBuilder) {
        self.ssl = Some(ssl);
    }

    pub fn set_keep_alive_secs(&mut self, keep_alive_secs: u64) {
        self.keep_alive_secs = Some(keep_alive_secs);
    }

    pub fn set_workers(&mut self, workers: u64) {
        self.workers = Some(workers);
    }

    pub fn set_payload_limit_mib(&mut self, payload_limit_mib: u64) {
        self.payload_limit_mib = payload_limit_mib;
    }

    pub async fn run(mut self) -> Result<()> {
        let routes = self.routes.clone();
        let payload_limit = (self.payload_limit_mib * 1024 * 1024) as usize;
        let mut srv = HttpServer::new(move || {
            let routes = routes.clone();
            App::new()
                .app_data(PayloadConfig::new(payload_limit))
                .configure(|cfg| routes.register(cfg))
                .default_service(web::route().to(default_handler))
        });

        if let Some(ssl) = self.ssl.take() {
            info!("Binding to https://{}", self.bind);
            srv = srv.bind_openssl(&self.bind, ssl).context("bind with ssl")?
        } else {
            warn!("Using HTTP (without SSL). THIS IS DANGEROUS, DO NOT USE IN PRODUCTION");
            info!("Binding to http://{}", self.bind);
            srv = srv.bind(&self.bind).context("bind without ssl")?
        };

        if let Some(keep_alive) = self.keep_alive_secs {
            srv = srv.keep_alive(Duration::from_secs(keep_alive));
        }
        if let Some(workers) = self.workers {
            srv = srv.workers(workers as usize);
        }

        sd_notify::notify(true, &[NotifyState::Ready]).context("notify systemd")?;
        info!("Starting restful server");
        srv.run().await.context("run server")?;

        info!("Server stopped by user");
        Ok(())
    }
}
