//! HTTP handlers for the landing page and health endpoint.

use crate::web::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Json};
use serde_json::json;
use tracing::error;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let device = state.station.device.read().await.clone();
    let lease = state.station.lease.read().await.clone();

    Json(json!({
        "status": "ok",
        "service": "windrose",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "device": device,
        "broadcast_port": lease.map(|l| l.broadcast_port),
        "clients": state.broadcaster.client_count().await,
    }))
}

/// Serve the dashboard HTML page from a static directory.
pub async fn serve_index(path: String) -> Result<Html<String>, StatusCode> {
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Html(content)),
        Err(e) => {
            error!("Failed to read {}: {}", path, e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

/// Serve the built-in dashboard when no static files are configured.
pub async fn default_index() -> Html<&'static str> {
    Html(DEFAULT_INDEX_HTML)
}

/// Minimal live dashboard embedded in the binary.
const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>windrose - Live Weather</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(160deg, #1e3c72 0%, #2a5298 100%);
            color: #eef;
            min-height: 100vh;
            padding: 24px;
        }
        .container { max-width: 900px; margin: 0 auto; }
        h1 { font-size: 2.2rem; text-align: center; margin-bottom: 4px; }
        .status { text-align: center; opacity: 0.8; margin-bottom: 28px; }
        .cards { display: grid; grid-template-columns: repeat(auto-fit, minmax(260px, 1fr)); gap: 16px; }
        .card {
            background: rgba(255,255,255,0.08);
            border-radius: 12px;
            padding: 20px;
        }
        .card h3 { margin-bottom: 12px; color: #9fc5ff; }
        .metric { display: flex; justify-content: space-between; padding: 6px 0; border-bottom: 1px solid rgba(255,255,255,0.08); }
        .metric:last-child { border-bottom: none; }
        .value { font-weight: bold; }
    </style>
</head>
<body>
    <div class="container">
        <h1>windrose</h1>
        <div class="status" id="status">Connecting…</div>
        <div class="cards" id="cards"></div>
    </div>
    <script>
        const fields = [
            ['temp', 'Temperature', '°F'],
            ['hum', 'Humidity', '%'],
            ['wind_speed_last', 'Wind speed', ' mph'],
            ['wind_dir_last', 'Wind direction', '°'],
            ['rain_rate_last', 'Rain rate', ' in/h'],
            ['rain_24_hr', 'Rain (24h)', ' in'],
            ['rainfall_daily', 'Rain (today)', ' in'],
            ['bar_sea_level', 'Barometer', ' inHg'],
        ];

        function render(envelope) {
            const cards = document.getElementById('cards');
            cards.innerHTML = '';
            (envelope.data.conditions || []).forEach((record, i) => {
                const card = document.createElement('div');
                card.className = 'card';
                const title = record.lsid ? `Sensor ${record.lsid}` : `Sensor ${i + 1}`;
                let rows = '';
                for (const [key, label, unit] of fields) {
                    if (record[key] === undefined || record[key] === null) continue;
                    const value = typeof record[key] === 'number' ? record[key].toFixed(2) : record[key];
                    rows += `<div class="metric"><span>${label}</span><span class="value">${value}${unit}</span></div>`;
                }
                card.innerHTML = `<h3>${title}</h3>${rows || '<div class="metric">no data</div>'}`;
                cards.appendChild(card);
            });
            document.getElementById('status').textContent =
                `Last update ${new Date(envelope.timestamp).toLocaleTimeString()} via ${envelope.dataSource.toUpperCase()} (${envelope.source})`;
        }

        function connect() {
            const protocol = location.protocol === 'https:' ? 'wss:' : 'ws:';
            const ws = new WebSocket(`${protocol}//${location.host}/ws`);
            ws.onmessage = (event) => {
                try { render(JSON.parse(event.data)); } catch (e) { console.error(e); }
            };
            ws.onclose = () => {
                document.getElementById('status').textContent = 'Disconnected, retrying…';
                setTimeout(connect, 2000);
            };
        }
        connect();
    </script>
</body>
</html>"#;
