use actix_web::HttpResponse;
use actix_web::web::{self, Json, Path};
use serde::Deserialize;

use crate::control::ControlClient;

use super::{ControlPanelError, ControlPanelResponse};

pub fn new_actix_web_scope(client: ControlClient) -> actix_web::Scope {
    web::scope("/api/window")
        .route("", web::get().to(get_snapshot))
        .route("/", web::get().to(get_snapshot))
        .route("/open", web::post().to(open))
        .route("/close", web::post().to(close))
        .route("/slider", web::put().to(drag_slider))
        .route("/slider/release", web::post().to(release_slider))
        .route("/target", web::put().to(set_target))
        .route("/auto", web::put().to(set_auto))
        .route("/timers", web::get().to(get_timers))
        .route("/timers", web::post().to(add_timer))
        .route("/timers/{id}", web::delete().to(remove_timer))
        .app_data(web::Data::new(client))
}

#[derive(Debug, Deserialize)]
struct SliderDTO {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct TargetDTO {
    target: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AutoDTO {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct TimerDTO {
    time: String,
    opening: i64,
}

async fn get_snapshot(client: web::Data<ControlClient>) -> ControlPanelResponse {
    Ok(HttpResponse::Ok().json(client.snapshot()))
}

async fn open(client: web::Data<ControlClient>) -> ControlPanelResponse {
    let snapshot = client.open().await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

async fn close(client: web::Data<ControlClient>) -> ControlPanelResponse {
    let snapshot = client.close().await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

async fn drag_slider(client: web::Data<ControlClient>, Json(dto): Json<SliderDTO>) -> ControlPanelResponse {
    let snapshot = client.slider_drag(dto.value).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

async fn release_slider(client: web::Data<ControlClient>) -> ControlPanelResponse {
    let snapshot = client.slider_release().await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

async fn set_target(client: web::Data<ControlClient>, Json(dto): Json<TargetDTO>) -> ControlPanelResponse {
    let snapshot = client.set_target(dto.target).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

async fn set_auto(client: web::Data<ControlClient>, Json(dto): Json<AutoDTO>) -> ControlPanelResponse {
    let snapshot = client.set_auto(dto.enabled).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

async fn get_timers(client: web::Data<ControlClient>) -> ControlPanelResponse {
    Ok(HttpResponse::Ok().json(client.timers()))
}

async fn add_timer(client: web::Data<ControlClient>, Json(dto): Json<TimerDTO>) -> ControlPanelResponse {
    let time = chrono::DateTime::parse_from_rfc3339(&dto.time)
        .map_err(|_| ControlPanelError::InvalidTime { value: dto.time.clone() })?;

    client.add_timer(time, dto.opening).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn remove_timer(client: web::Data<ControlClient>, id: Path<String>) -> ControlPanelResponse {
    client.remove_timer(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use assert_json_diff::{assert_json_eq, assert_json_include};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::actuator::ActuatorSettings;
    use crate::adapter::backend::BackendConfig;
    use crate::adapter::backend::fake::FakeBackend;
    use crate::control::ControlRunner;
    use crate::persistence::MemorySettingsStore;
    use crate::thermostat::ThermostatConfig;

    use super::*;

    fn start_control() -> (ControlClient, Arc<FakeBackend>, CancellationToken) {
        let backend = Arc::new(FakeBackend::default());
        let cancel = CancellationToken::new();
        let runner = ControlRunner::new(
            backend.clone(),
            Arc::new(MemorySettingsStore::default()),
            &ThermostatConfig::default(),
            &ActuatorSettings::default(),
            &BackendConfig::default(),
            cancel.clone(),
        );
        let client = runner.client();
        actix_web::rt::spawn(runner.run());

        (client, backend, cancel)
    }

    #[actix_web::test]
    async fn snapshot_lists_actuator_state() {
        let (client, _, cancel) = start_control();
        let app = test::init_service(App::new().service(new_actix_web_scope(client))).await;

        let req = test::TestRequest::get().uri("/api/window/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_json_include!(
            actual: body,
            expected: json!({
                "opening": 0,
                "status": "closed",
                "is_open": false,
                "is_auto": false,
                "target": null,
                "notice": null
            })
        );
        cancel.cancel();
    }

    #[actix_web::test]
    async fn open_then_open_again_conflicts() {
        let (client, _, cancel) = start_control();
        let app = test::init_service(App::new().service(new_actix_web_scope(client))).await;

        let req = test::TestRequest::post().uri("/api/window/open").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], json!("open"));
        assert_eq!(body["opening"], json!(100));

        let req = test::TestRequest::post().uri("/api/window/open").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        cancel.cancel();
    }

    #[actix_web::test]
    async fn slider_and_target_validation() {
        let (client, _, cancel) = start_control();
        let app = test::init_service(App::new().service(new_actix_web_scope(client))).await;

        let req = test::TestRequest::put()
            .uri("/api/window/slider")
            .set_json(json!({ "value": 34.0 }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["opening"], json!(30));

        let req = test::TestRequest::put()
            .uri("/api/window/target")
            .set_json(json!({ "target": 55.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::put()
            .uri("/api/window/auto")
            .set_json(json!({ "enabled": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        cancel.cancel();
    }

    #[actix_web::test]
    async fn timers_can_be_added_and_listed() {
        let (client, backend, cancel) = start_control();
        let app = test::init_service(App::new().service(new_actix_web_scope(client))).await;

        let req = test::TestRequest::post()
            .uri("/api/window/timers")
            .set_json(json!({ "time": "2026-10-19T07:00:00+02:00", "opening": 40 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(backend.timers().len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let req = test::TestRequest::get().uri("/api/window/timers").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_json_eq!(
            body["timers"],
            json!([{ "id": 1, "time": "2026-10-19T07:00:00+02:00", "display_angle": 40.0 }])
        );
        cancel.cancel();
    }

    #[actix_web::test]
    async fn invalid_timer_requests_are_rejected() {
        let (client, _, cancel) = start_control();
        let app = test::init_service(App::new().service(new_actix_web_scope(client))).await;

        let req = test::TestRequest::post()
            .uri("/api/window/timers")
            .set_json(json!({ "time": "tomorrow", "opening": 40 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/window/timers")
            .set_json(json!({ "time": "2026-10-19T07:00:00Z", "opening": 101 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete().uri("/api/window/timers/7").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        cancel.cancel();
    }

    #[actix_web::test]
    async fn stopped_controller_is_unavailable() {
        let (client, _, cancel) = start_control();
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let app = test::init_service(App::new().service(new_actix_web_scope(client))).await;
        let req = test::TestRequest::post().uri("/api/window/close").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
