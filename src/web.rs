use crate::date_utils;
use crate::db::{Database, SqliteDatabase};
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tracing::{error, info};

const INDEX_HTML: &str = include_str!("../static/index.html");

type Db = Arc<Mutex<SqliteDatabase>>;

#[derive(Debug, Serialize)]
struct EventView {
    step_number: u32,
    event_date: String,
    event_time: String,
    description: String,
    location: String,
    // Display labels, precomputed so the page stays dumb.
    date_label: String,
    time_label: String,
}

#[derive(Debug, Serialize)]
struct DeliveryView {
    id: i64,
    name: String,
    tracking_number: String,
    created_at: String,
    events: Vec<EventView>,
}

#[derive(Debug, Serialize)]
struct DeliveriesResponse {
    deliveries: Vec<DeliveryView>,
    last_refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddDeliveryRequest {
    name: String,
    tracking_number: String,
}

fn event_date_label(event_date: &str, today: NaiveDate) -> String {
    match NaiveDate::parse_from_str(event_date, "%Y-%m-%d") {
        Ok(date) => date_utils::to_relative_date(date, today),
        Err(_) => event_date.to_string(),
    }
}

async fn index() -> Response {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML).into_response()
}

async fn api_deliveries(State(db): State<Db>) -> Response {
    let db = db.lock().unwrap();

    let deliveries = match db.get_deliveries_with_events() {
        Ok(deliveries) => deliveries,
        Err(err) => {
            error!(error = %err, "Failed to query deliveries");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let last_refresh = match db.get_last_refresh() {
        Ok(at) => at.map(|at| at.to_rfc3339()),
        Err(err) => {
            error!(error = %err, "Failed to query last refresh time");
            None
        }
    };

    let today = Local::now().date_naive();
    let deliveries = deliveries
        .into_iter()
        .map(|d| DeliveryView {
            id: d.id,
            name: d.name,
            tracking_number: d.tracking_number,
            created_at: d.created_at,
            events: d
                .events
                .into_iter()
                .map(|e| EventView {
                    date_label: event_date_label(&e.event_date, today),
                    time_label: date_utils::to_am_pm(&e.event_time),
                    step_number: e.step_number,
                    event_date: e.event_date,
                    event_time: e.event_time,
                    description: e.description,
                    location: e.location,
                })
                .collect(),
        })
        .collect();

    Json(DeliveriesResponse {
        deliveries,
        last_refresh,
    })
    .into_response()
}

async fn api_add_delivery(
    State(db): State<Db>,
    Json(request): Json<AddDeliveryRequest>,
) -> Response {
    let name = request.name.trim();
    let tracking_number = request.tracking_number.trim();

    if name.is_empty() || tracking_number.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "نام و کد رهگیری الزامی است" })),
        )
            .into_response();
    }

    let tracking_number_re = Regex::new(r"^\d{10,24}$").expect("invalid tracking number pattern");
    if !tracking_number_re.is_match(tracking_number) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "کد رهگیری باید عددی و بین ۱۰ تا ۲۴ رقم باشد" })),
        )
            .into_response();
    }

    let mut db = db.lock().unwrap();
    match db.insert_delivery(name, tracking_number) {
        Ok(Some(id)) => {
            info!(id, tracking_number, "Delivery added");
            // Make the poller pick the new delivery up on its next cycle
            // instead of scraping inline; lookups stay one at a time.
            if let Err(err) = db.clear_last_refresh() {
                error!(error = %err, "Failed to schedule refresh for new delivery");
            }
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(json!({ "message": "کد رهگیری قبلا ثبت شده است" })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to insert delivery");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn api_remove_delivery(State(db): State<Db>, Path(id): Path<i64>) -> Response {
    let mut db = db.lock().unwrap();
    match db.delete_delivery(id) {
        Ok(true) => {
            info!(id, "Delivery removed");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(error = %err, "Failed to delete delivery");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn api_refresh(State(db): State<Db>) -> Response {
    let mut db = db.lock().unwrap();
    match db.clear_last_refresh() {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => {
            error!(error = %err, "Failed to schedule refresh");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn start(db_path: String, port: u16, running: Arc<AtomicBool>) {
    let db = match SqliteDatabase::open(&db_path) {
        Ok(db) => Arc::new(Mutex::new(db)),
        Err(err) => {
            error!(error = %err, "Web server failed to open database");
            return;
        }
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/api/deliveries", get(api_deliveries).post(api_add_delivery))
        .route("/api/deliveries/{id}", delete(api_remove_delivery))
        .route("/api/refresh", post(api_refresh))
        .with_state(db);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime for web server");

    rt.block_on(async {
        let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
            Ok(l) => l,
            Err(err) => {
                error!(error = %err, port, "Web server failed to bind");
                return;
            }
        };

        info!(port, "Web server listening");

        let shutdown = async move {
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
            info!("Web server shutting down");
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .expect("Web server error");
    });
}
