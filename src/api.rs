// src/api.rs
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::dashboard::{FilterKey, Panel};
use crate::freshness::FreshnessToken;
use crate::producer::ProducerState;
use crate::reporter::Reporter;
use crate::topic::{remove_topic, write_topic, TopicConfig};
use crate::AppState;

// 1. Topic control
#[derive(Deserialize)]
pub struct TopicRequest {
    pub topic: String,
    // Number inputs arrive as 3, 3.0 or "3"
    pub agent_count: Value,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TopicResponse {
    pub topic: String,
    pub accepted: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StopResponse {
    pub stopped: bool,
    pub message: String,
}

// 2. Filter controls
#[derive(Deserialize)]
pub struct FilterUpdate {
    pub panel: Panel,
    pub index: usize,
    pub value: Option<String>,
}

// 3. Freshness
#[derive(Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: FreshnessToken,
    pub published: Option<FreshnessToken>,
}

// GET /api/dashboard
pub async fn get_dashboard(data: web::Data<AppState>) -> impl Responder {
    let consumer = data.consumer.clone();
    let view = web::block(move || {
        if consumer.view().is_none() {
            consumer.refresh();
        }
        consumer.view()
    })
    .await;

    match view {
        Ok(Some(view)) => HttpResponse::Ok().json(view),
        Ok(None) => HttpResponse::ServiceUnavailable().body("Dashboard not ready"),
        Err(e) => {
            warn!(error = %e, "❌ API: dashboard refresh failed");
            HttpResponse::InternalServerError().body("Failed to build dashboard")
        }
    }
}

fn count_to_string(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

// POST /api/topic
pub async fn submit_topic(data: web::Data<AppState>, req: web::Json<TopicRequest>) -> impl Responder {
    let req = req.into_inner();
    let cfg = match TopicConfig::from_input(&req.topic, &count_to_string(&req.agent_count)) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(topic = %req.topic, error = %e, "topic rejected");
            return HttpResponse::BadRequest().json(TopicResponse {
                topic: req.topic,
                accepted: false,
                message: e.to_string(),
            });
        }
    };

    match write_topic(&data.topic_path, &cfg) {
        Ok(()) => {
            info!(topic = %cfg.topic, agents = cfg.agent_count, "🚀 API: simulation requested");
            HttpResponse::Ok().json(TopicResponse {
                message: format!("Simulation started with {} agent(s)", cfg.agent_count),
                topic: cfg.topic,
                accepted: true,
            })
        }
        Err(e) => {
            warn!(error = %e, "❌ API: could not write topic file");
            HttpResponse::InternalServerError().json(TopicResponse {
                topic: cfg.topic,
                accepted: false,
                message: e.to_string(),
            })
        }
    }
}

// POST /api/stop
// Removing the topic file sends the producer back to waiting; it snapshots
// the agents on the way.
pub async fn stop_simulation(data: web::Data<AppState>) -> impl Responder {
    let was_running = data.topic_path.exists();
    match remove_topic(&data.topic_path) {
        Ok(()) => {
            info!(was_running, "🛑 API: simulation stop requested");
            HttpResponse::Ok().json(StopResponse {
                stopped: was_running,
                message: if was_running {
                    "Simulation stopping".to_string()
                } else {
                    "No simulation running".to_string()
                },
            })
        }
        Err(e) => {
            warn!(error = %e, "❌ API: could not remove topic file");
            HttpResponse::InternalServerError().json(StopResponse {
                stopped: false,
                message: e.to_string(),
            })
        }
    }
}

// GET /api/filters
pub async fn get_filters(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.consumer.filters())
}

// POST /api/filters
pub async fn set_filter(data: web::Data<AppState>, req: web::Json<FilterUpdate>) -> impl Responder {
    let req = req.into_inner();
    let key = FilterKey { panel: req.panel, index: req.index };
    let consumer = data.consumer.clone();

    let updated = web::block(move || consumer.set_filter(key, req.value).map(|_| consumer.view())).await;
    match updated {
        Ok(Some(Some(published))) => HttpResponse::Ok().json(published),
        Ok(_) => HttpResponse::NotFound().body("Unknown filter"),
        Err(e) => {
            warn!(error = %e, "❌ API: filter update failed");
            HttpResponse::InternalServerError().body("Failed to apply filter")
        }
    }
}

// GET /api/token
pub async fn get_token(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(TokenResponse {
        token: data.consumer.token(),
        published: data.consumer.view().map(|v| v.token),
    })
}

// GET /api/producer
pub async fn get_producer(data: web::Data<AppState>) -> impl Responder {
    let state = match &data.producer {
        Some(rx) => rx.borrow().clone(),
        None => ProducerState::Cancelled,
    };
    HttpResponse::Ok().json(state)
}

// GET /api/export.csv
pub async fn export_csv(data: web::Data<AppState>) -> impl Responder {
    let records = data.consumer.data().read_all();
    match Reporter::to_csv_string(&records) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header(("Content-Disposition", "attachment; filename=\"comments.csv\""))
            .body(body),
        Err(e) => {
            warn!(error = %e, "❌ API: export failed");
            HttpResponse::InternalServerError().body("Failed to export")
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/dashboard", web::get().to(get_dashboard))
        .route("/api/topic", web::post().to(submit_topic))
        .route("/api/stop", web::post().to(stop_simulation))
        .route("/api/filters", web::get().to(get_filters))
        .route("/api/filters", web::post().to(set_filter))
        .route("/api/token", web::get().to(get_token))
        .route("/api/producer", web::get().to(get_producer))
        .route("/api/export.csv", web::get().to(export_csv));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{Consumer, DashboardLayout};
    use crate::datafile::DataFile;
    use crate::freshness::MtimeToken;
    use crate::nlp::RuleAnnotator;
    use crate::record::CommentRecord;
    use crate::brain::{RetryPolicy, ScriptedBrain};
    use crate::producer::{Producer, ProducerSettings};
    use crate::sentiment::LexiconScorer;
    use actix_web::{test, App};
    use std::sync::Arc;
    use std::time::Duration;

    fn state(dir: &std::path::Path) -> (web::Data<AppState>, DataFile) {
        let path = dir.join("data.json");
        let data = DataFile::new(&path);
        let consumer = Consumer::new(
            data.clone(),
            DashboardLayout::default(),
            Box::new(MtimeToken::new(&path)),
            Box::new(RuleAnnotator),
            false,
        );
        let app_state = web::Data::new(AppState {
            consumer: Arc::new(consumer),
            topic_path: dir.join("topic.json"),
            producer: None,
        });
        (app_state, data)
    }

    #[actix_web::test]
    async fn topic_is_validated_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let (app_state, _) = state(dir.path());
        let app = test::init_service(App::new().app_data(app_state).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/topic")
            .set_json(serde_json::json!({"topic": "Mars", "agent_count": 3.0}))
            .to_request();
        let resp: TopicResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.accepted);
        assert_eq!(resp.topic, "Mars");
        let written = crate::topic::read_topic(&dir.path().join("topic.json")).unwrap();
        assert_eq!(written.agent_count, 3);

        let req = test::TestRequest::post()
            .uri("/api/topic")
            .set_json(serde_json::json!({"topic": "Venus", "agent_count": "lots"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let body: TopicResponse = test::read_body_json(resp).await;
        assert!(!body.accepted);
        assert_eq!(body.topic, "Venus");
        // Still the previous topic on disk.
        let written = crate::topic::read_topic(&dir.path().join("topic.json")).unwrap();
        assert_eq!(written.topic, "Mars");
    }

    #[actix_web::test]
    async fn dashboard_and_filters_follow_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (app_state, data) = state(dir.path());
        data.append(CommentRecord::new("Ana", "casual", "optimistic", "Great launch!", 0.6, "Mars"))
            .await
            .unwrap();
        data.append(CommentRecord::new("Bob", "formal", "pessimistic", "Too expensive.", -0.3, "Mars"))
            .await
            .unwrap();
        let app = test::init_service(App::new().app_data(app_state).configure(routes)).await;

        let req = test::TestRequest::get().uri("/api/dashboard").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["record_count"], 2);
        assert_eq!(body["last_comment"]["agent_name"], "Bob");
        assert_eq!(body["bar"][0]["agent_name"], "Ana");

        let req = test::TestRequest::post()
            .uri("/api/filters")
            .set_json(serde_json::json!({"panel": "line", "index": 1, "value": "formal"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["line"]["points"].as_array().unwrap().len(), 1);
        assert_eq!(body["filters"][1]["selected"], "formal");

        let req = test::TestRequest::post()
            .uri("/api/filters")
            .set_json(serde_json::json!({"panel": "bar", "index": 7, "value": "x"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn export_and_token_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let (app_state, data) = state(dir.path());
        data.append(CommentRecord::new("Ana", "casual", "neutral", "hi", 0.0, "Mars"))
            .await
            .unwrap();
        let app = test::init_service(App::new().app_data(app_state).configure(routes)).await;

        let req = test::TestRequest::get().uri("/api/export.csv").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("round,agent_name"));
        assert!(text.contains("1,Ana,casual"));

        let req = test::TestRequest::get().uri("/api/token").to_request();
        let token: TokenResponse = test::call_and_read_body_json(&app, req).await;
        assert!(token.token.0 > 0);
        assert!(token.published.is_none());

        let req = test::TestRequest::get().uri("/api/dashboard").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["token"], serde_json::json!(token.token.0));
    }

    #[actix_web::test]
    async fn filters_keep_their_shape_before_the_first_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let (app_state, _) = state(dir.path());
        let app = test::init_service(App::new().app_data(app_state).configure(routes)).await;

        let req = test::TestRequest::get().uri("/api/filters").to_request();
        let before: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(before.as_array().unwrap().len(), 4);
        assert_eq!(before[0]["key"]["panel"], "line");
        assert_eq!(before[0]["column"], "agent_name");
        assert_eq!(before[0]["options"], serde_json::json!([]));
        assert!(before[0]["selected"].is_null());

        let req = test::TestRequest::get().uri("/api/dashboard").to_request();
        let _: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::get().uri("/api/filters").to_request();
        let after: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(after.as_array().unwrap().len(), 4);
        assert_eq!(after[0]["column"], "agent_name");
        assert!(after[0]["options"].is_array());
    }

    #[actix_web::test]
    async fn stop_returns_the_producer_to_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let (app_state, data) = state(dir.path());
        let snapshot_path = dir.path().join("state.json");
        let producer = Arc::new(Producer::new(
            ProducerSettings {
                topic_path: dir.path().join("topic.json"),
                snapshot_path: snapshot_path.clone(),
                topic_poll: Duration::from_millis(10),
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                resume: false,
                reset_on_start: true,
                retry: RetryPolicy {
                    max_attempts: 2,
                    base_delay: Duration::from_millis(1),
                    factor: 2.0,
                    max_delay: Duration::from_millis(2),
                },
            },
            data.clone(),
            Arc::new(ScriptedBrain),
            Arc::new(LexiconScorer),
        ));
        let app_state = web::Data::new(AppState {
            consumer: Arc::clone(&app_state.consumer),
            topic_path: app_state.topic_path.clone(),
            producer: Some(producer.subscribe()),
        });
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let runner = {
            let producer = Arc::clone(&producer);
            tokio::spawn(async move { producer.run(shutdown_rx).await })
        };
        let app = test::init_service(App::new().app_data(app_state).configure(routes)).await;

        // Nothing to stop yet
        let req = test::TestRequest::post().uri("/api/stop").to_request();
        let resp: StopResponse = test::call_and_read_body_json(&app, req).await;
        assert!(!resp.stopped);

        let req = test::TestRequest::post()
            .uri("/api/topic")
            .set_json(serde_json::json!({"topic": "Mars", "agent_count": 2}))
            .to_request();
        let resp: TopicResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.accepted);

        let mut status = serde_json::Value::Null;
        for _ in 0..300 {
            let req = test::TestRequest::get().uri("/api/producer").to_request();
            status = test::call_and_read_body_json(&app, req).await;
            if status["state"] == "running" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status["state"], "running");
        assert_eq!(status["agents"], 2);

        let req = test::TestRequest::post().uri("/api/stop").to_request();
        let resp: StopResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.stopped);

        for _ in 0..300 {
            let req = test::TestRequest::get().uri("/api/producer").to_request();
            status = test::call_and_read_body_json(&app, req).await;
            if status["state"] == "waiting_for_topic" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status["state"], "waiting_for_topic");
        assert_eq!(crate::snapshot::load_state(&snapshot_path).len(), 2);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
    }
}
