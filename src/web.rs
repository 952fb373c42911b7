use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer, Result};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::form::export::{authorize_export, stream_export, ExportQuery, EXPORT_FILENAME};
use crate::form::submission::{parse_submission, record_submission};
use crate::store::Store;

/// Chunks buffered between the database reader and the response
const EXPORT_CHANNEL_DEPTH: usize = 32;

/// Shared, read-only request context
pub struct AppState {
    pub store: Store,
    pub config: AppConfig,
}

// Health endpoint
async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("OK\n")
}

// POST /submit
// JSON body: { "first_name": "...", "last_name": "...", "email": "..." }
async fn submit(body: web::Bytes, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let req = parse_submission(&body)?;

    let store = state.store.clone();
    let record = web::block(move || record_submission(&store, req))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Submission worker failed");
            AppError::Internal
        })??;

    Ok(HttpResponse::Created().json(record))
}

// GET /export?password=XXX&exported=0|1
async fn export(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let query = ExportQuery::from_query_string(req.query_string());
    authorize_export(state.config.export_password.as_ref(), query.password.as_deref())
        .inspect_err(|_| tracing::warn!(peer = ?req.peer_addr(), "Rejected export request"))?;

    let filter = query.exported_filter();
    let (tx, mut rx) = mpsc::channel(EXPORT_CHANNEL_DEPTH);
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || stream_export(&store, filter, tx));

    // The header chunk arrives only once the query has run; anything else
    // at this point is a failure we can still report with a status code.
    let header = match rx.recv().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(e)) => return Err(AppError::Export(e)),
        None => {
            tracing::error!("Export worker exited before producing output");
            return Err(AppError::Internal);
        }
    };

    let body = tokio_stream::once(Ok(header)).chain(ReceiverStream::new(rx));

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(EXPORT_FILENAME.to_string())],
        })
        .streaming(body))
}

async fn method_not_allowed() -> Result<HttpResponse, AppError> {
    Err(AppError::MethodNotAllowed)
}

/// Registers every route. Shared by the server and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .service(
            web::resource("/submit")
                .route(web::post().to(submit))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/export")
                .route(web::get().to(export))
                .default_service(web::to(method_not_allowed)),
        );
}

pub async fn start_server(store: Store, config: AppConfig) -> std::io::Result<()> {
    let bind = config.bind.clone();
    let app_state = web::Data::new(AppState { store, config });

    tracing::info!(addr = %bind, "Starting server");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await
}
