//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;
use crate::web;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(web::index))
        .route("/start", post(web::start))
        .route("/api/sensors", get(web::list_sensors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the web server
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use soilsense_hub::{
        DeviceRecord, DeviceRegistry, DeviceSessionManager, HubSession, HubTransport,
        ProvisionError, Provisioner, RegistrationRequest, RegistrationResult, RegistryError,
        SessionConfig, TransportError,
    };
    use tower::ServiceExt;

    struct AssignAll;

    #[async_trait]
    impl Provisioner for AssignAll {
        async fn register(
            &self,
            request: &RegistrationRequest,
        ) -> Result<RegistrationResult, ProvisionError> {
            Ok(RegistrationResult {
                status: "assigned".to_string(),
                assigned_hub: Some("farm.azure-devices.net".to_string()),
                device_id: Some(request.registration_id.clone()),
            })
        }
    }

    struct EmptyRegistry;

    #[async_trait]
    impl DeviceRegistry for EmptyRegistry {
        async fn get_device(&self, _device_id: &str) -> Result<Option<DeviceRecord>, RegistryError> {
            Ok(None)
        }
    }

    struct NullTransport;

    struct NullSession;

    impl HubTransport for NullTransport {
        fn open(&self, _connection_string: &str) -> Result<Box<dyn HubSession>, TransportError> {
            Ok(Box::new(NullSession))
        }
    }

    #[async_trait]
    impl HubSession for NullSession {
        async fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_message(&mut self, _payload: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn app() -> Router {
        let config = Config::default();
        let manager = DeviceSessionManager::new(
            SessionConfig {
                provisioning_host: "global.azure-devices-provisioning.net".to_string(),
                id_scope: "0ne00000001".to_string(),
                group_key: "c29pbHNlbnNlLWdyb3VwLWVucm9sbG1lbnQta2V5ISE=".to_string(),
            },
            config.sensor_identities(),
            Arc::new(AssignAll),
            Arc::new(EmptyRegistry),
            Arc::new(NullTransport),
        );
        router(AppState::with_manager(Arc::new(manager)))
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn start_request(form: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/start")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_lists_sensors() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        for n in 1..=5 {
            assert!(html.contains(&format!(r#"value="moistureSensor{}""#, n)));
        }
    }

    #[tokio::test]
    async fn test_start_reports_success() {
        let response = app()
            .oneshot(start_request("sensor=moistureSensor3"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("moistureSensor3 successfully connected to DPS and telemetry sent."));
    }

    #[tokio::test]
    async fn test_start_without_sensor() {
        let response = app().oneshot(start_request("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_unknown_sensor() {
        let response = app()
            .oneshot(start_request("sensor=%3Cscript%3E"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Error connecting &lt;script&gt; to DPS: Unknown sensor &lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn test_sensor_api_tracks_cache() {
        let app = app();

        let response = app
            .clone()
            .oneshot(start_request("sensor=moistureSensor2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/api/sensors").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let sensors: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();

        assert_eq!(sensors[0], serde_json::json!({"name": "moistureSensor1", "connected": false}));
        assert_eq!(sensors[1], serde_json::json!({"name": "moistureSensor2", "connected": true}));
    }
}
