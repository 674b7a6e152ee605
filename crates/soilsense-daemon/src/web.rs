//! Web front end handlers

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

#[derive(Template)]
#[template(path = "index.html")]
struct IndexPage {
    sensors: Vec<String>,
}

#[derive(Template)]
#[template(path = "result.html")]
struct ResultPage<'a> {
    sensor: &'a str,
    status: &'a str,
}

fn render(page: &impl Template) -> Response {
    match page.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

/// Sensor list with a start button per sensor
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    let sensors = state.manager.sensors().iter().map(|s| s.to_string()).collect();
    render(&IndexPage { sensors })
}

#[derive(Deserialize)]
pub struct StartForm {
    #[serde(default)]
    sensor: Option<String>,
}

/// Connect one sensor and report the outcome
pub async fn start(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StartForm>,
) -> Response {
    let sensor = match form.sensor.as_deref().map(str::trim) {
        Some(sensor) if !sensor.is_empty() => sensor.to_string(),
        _ => {
            let mut response = render(&ResultPage {
                sensor: "",
                status: "No sensor selected.",
            });
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return response;
        }
    };

    info!(device = %sensor, "Sensor start requested");
    let outcome = state.manager.process(&sensor).await;

    render(&ResultPage {
        sensor: &sensor,
        status: &outcome.message,
    })
}

/// JSON list of sensors and whether each has a cached connection string
pub async fn list_sensors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.manager.sensor_status().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_escapes_sensor_names() {
        let html = IndexPage {
            sensors: vec!["moistureSensor1".to_string(), r#"bed"><b>"#.to_string()],
        }
        .render()
        .unwrap();

        assert!(html.contains(r#"value="moistureSensor1""#));
        assert!(html.contains("Start moistureSensor1"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_result_page_escapes_status() {
        let html = ResultPage {
            sensor: "moistureSensor1",
            status: "Error: <timeout>",
        }
        .render()
        .unwrap();

        assert!(html.contains("<h1>moistureSensor1</h1>"));
        assert!(html.contains("Error: &lt;timeout&gt;"));
    }

    #[test]
    fn test_result_page_without_sensor() {
        let html = ResultPage {
            sensor: "",
            status: "No sensor selected.",
        }
        .render()
        .unwrap();

        assert!(html.contains("<h1>Sensor</h1>"));
        assert!(html.contains("No sensor selected."));
    }
}
