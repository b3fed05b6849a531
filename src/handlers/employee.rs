use actix_web::{web, HttpResponse};
use futures_util::stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

use crate::errors::AppError;
use crate::models::employee::{EmployeeRecord, NewEmployee};
use crate::sync::Synchronizer;

#[derive(Deserialize)]
pub struct EmployeeQueryParams {
    refresh: Option<bool>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Body errors answer in the same JSON shape as every other failure
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into());

    cfg.app_data(json_config)
        .service(web::resource("/v1/employee/events").route(web::get().to(employee_events)))
        .service(web::resource("/v1/employee/duplicates").route(web::post().to(remove_duplicates)))
        .service(
            web::resource("/v1/employee")
                .route(web::post().to(create_employee))
                .route(web::get().to(get_employees))
                .route(web::delete().to(clear_employees)),
        )
        .service(web::resource("/v1/employee/{id}").route(web::delete().to(delete_employee)));
}

pub async fn create_employee(
    sync: web::Data<Synchronizer>,
    new_employee: web::Json<NewEmployee>,
) -> Result<HttpResponse, AppError> {
    let record = sync.add(&new_employee).await?;
    Ok(HttpResponse::Created().json(record))
}

pub async fn get_employees(
    sync: web::Data<Synchronizer>,
    query: web::Query<EmployeeQueryParams>,
) -> Result<HttpResponse, AppError> {
    let employees = if query.refresh.unwrap_or(false) {
        sync.refresh().await
    } else {
        sync.snapshot()
    };
    Ok(HttpResponse::Ok().json(employees))
}

pub async fn delete_employee(
    sync: web::Data<Synchronizer>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    sync.delete(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Employee deleted successfully",
    })))
}

pub async fn clear_employees(sync: web::Data<Synchronizer>) -> Result<HttpResponse, AppError> {
    sync.clear().await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "All employees deleted successfully",
    })))
}

pub async fn remove_duplicates(sync: web::Data<Synchronizer>) -> Result<HttpResponse, AppError> {
    let report = sync.remove_duplicates().await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Server-sent events: the current list right away, then every new snapshot.
pub async fn employee_events(sync: web::Data<Synchronizer>) -> HttpResponse {
    let events = stream::unfold((sync.watch(), true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let frame = snapshot_event(&mut rx);
        Some((frame, (rx, false)))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events)
}

fn snapshot_event(rx: &mut watch::Receiver<Vec<EmployeeRecord>>) -> Result<web::Bytes, AppError> {
    let employees = rx.borrow_and_update();
    let payload = serde_json::to_string(&*employees).map_err(|err| AppError::Internal(err.to_string()))?;
    Ok(web::Bytes::from(format!("event: employees\ndata: {}\n\n", payload)))
}
