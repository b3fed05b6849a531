use std::pin::Pin;
use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use futures_util::future::poll_fn;
use serde_json::{json, Value};
use tempfile::TempDir;

use employee_directory::db::{KeyValueStore, SqlStore};
use employee_directory::handlers;
use employee_directory::models::employee::{DedupReport, EmployeeRecord};
use employee_directory::sync::Synchronizer;

async fn sql_sync() -> web::Data<Synchronizer> {
    let store = SqlStore::in_memory().await.unwrap();
    web::Data::new(Synchronizer::start(Arc::new(store)).await)
}

macro_rules! app {
    ($sync:expr) => {
        test::init_service(
            App::new()
                .app_data($sync.clone())
                .configure(handlers::employee::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn create_and_list_employees() {
    let sync = sql_sync().await;
    let app = app!(sync);

    let req = test::TestRequest::post()
        .uri("/v1/employee")
        .set_json(json!({"name": "Ana", "designation": "Engineer", "department": "R&D"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: EmployeeRecord = test::read_body_json(resp).await;
    assert_eq!(created.name, "Ana");

    let req = test::TestRequest::get().uri("/v1/employee").to_request();
    let listed: Vec<EmployeeRecord> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed, vec![created]);
}

#[actix_web::test]
async fn blank_field_is_bad_request() {
    let sync = sql_sync().await;
    let app = app!(sync);

    let req = test::TestRequest::post()
        .uri("/v1/employee")
        .set_json(json!({"name": "Ana", "designation": " ", "department": "R&D"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("designation"));
    assert!(sync.snapshot().is_empty());
}

#[actix_web::test]
async fn malformed_body_is_json_bad_request() {
    let sync = sql_sync().await;
    let app = app!(sync);

    let req = test::TestRequest::post()
        .uri("/v1/employee")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"name\": \"Ana\",")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());

    // Missing fields fail deserialization the same way
    let req = test::TestRequest::post()
        .uri("/v1/employee")
        .set_json(json!({"name": "Ana"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Validation failed"));
    assert!(sync.snapshot().is_empty());
}

#[actix_web::test]
async fn delete_and_clear() {
    let sync = sql_sync().await;
    let app = app!(sync);

    for name in ["Ana", "Ben"] {
        let req = test::TestRequest::post()
            .uri("/v1/employee")
            .set_json(json!({"name": name, "designation": "Engineer", "department": "R&D"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }
    let ana_id = sync.snapshot().iter().find(|e| e.name == "Ana").unwrap().id;

    let req = test::TestRequest::delete().uri(&format!("/v1/employee/{}", ana_id)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert_eq!(sync.snapshot().len(), 1);

    // Unknown ids are fine
    let req = test::TestRequest::delete().uri("/v1/employee/424242").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::delete().uri("/v1/employee").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert!(sync.snapshot().is_empty());
}

#[actix_web::test]
async fn remove_duplicates_endpoint() {
    let dir = TempDir::new().unwrap();
    let store = KeyValueStore::open(dir.path().join("employees.json")).await.unwrap();
    let sync = web::Data::new(Synchronizer::start(Arc::new(store)).await);
    let app = app!(sync);

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/v1/employee")
            .set_json(json!({"name": "Ana", "designation": "Engineer", "department": "R&D"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::post().uri("/v1/employee/duplicates").to_request();
    let report: DedupReport = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report.removed, 1);
    assert_eq!(sync.snapshot().len(), 1);
}

#[actix_web::test]
async fn events_stream_starts_with_current_list() {
    let sync = sql_sync().await;
    let app = app!(sync);

    let req = test::TestRequest::get().uri("/v1/employee/events").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "text/event-stream"
    );

    let mut body = resp.into_body();
    let first = poll_fn(|cx| Pin::new(&mut body).poll_next(cx)).await.unwrap().unwrap();
    assert_eq!(&first[..], b"event: employees\ndata: []\n\n");
}
