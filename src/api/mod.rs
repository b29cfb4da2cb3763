//! REST API for the hostdash dashboard
//!
//! Chart endpoints carry their rolling windows in cookies: the previous
//! state comes in with the request and the updated state goes out with the
//! response. The server itself remembers nothing between polls.

use actix_web::{web, HttpResponse, HttpRequest, cookie::Cookie};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::auth::{self, SessionManager, SESSION_COOKIE};
use crate::charts;
use crate::config::Config;
use crate::dashboard::{self, MetricKind};
use crate::monitoring::{InfoTopic, MetricsProvider, Quantity};
use crate::sampler::Reading;

/// Shared application state
pub struct AppState {
    pub provider: Arc<Mutex<Box<dyn MetricsProvider>>>,
    pub sessions: Arc<SessionManager>,
    pub config: Config,
    pub web_dir: Option<PathBuf>,
}

/// Named routes, exposed to the front end so it never hard-codes paths
const ROUTES: &[(&str, &str)] = &[
    ("settings", "/api/settings"),
    ("login", "/api/auth/login"),
    ("logout", "/api/auth/logout"),
    ("uptime", "/info/uptime"),
    ("platform", "/info/platform/"),
    ("getcpus", "/info/getcpus/"),
    ("getdisk", "/info/getdisk"),
    ("getips", "/info/getips"),
    ("getusers", "/info/getusers"),
    ("getnetstat", "/info/getnetstat"),
    ("getproc", "/info/proc"),
    ("cpuusage", "/info/cpuusage"),
    ("memusage", "/info/memusage"),
    ("loadaverage", "/info/loadaverage"),
    ("gettraffic", "/info/gettraffic"),
    ("getdiskio", "/info/getdiskio"),
];

// ─── Auth helpers ───

fn get_session_token(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

/// Check if request is authenticated; returns username or error response
pub fn require_auth(req: &HttpRequest, state: &web::Data<AppState>) -> Result<String, HttpResponse> {
    if !state.config.auth_enabled() {
        return Ok("anonymous".to_string());
    }
    match get_session_token(req) {
        Some(token) => match state.sessions.validate(&token) {
            Some(username) => Ok(username),
            None => Err(HttpResponse::Unauthorized().json(json!({
                "error": "Session expired"
            }))),
        },
        None => Err(HttpResponse::Unauthorized().json(json!({
            "error": "Not authenticated"
        }))),
    }
}

// ─── Auth API ───

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> HttpResponse {
    if !auth::authenticate_user(&state.config.auth, &body.username, &body.password) {
        return HttpResponse::Unauthorized().json(json!({
            "success": false,
            "error": "Invalid username or password"
        }));
    }

    let token = state.sessions.create_session(&body.username);
    let cookie = Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .max_age(actix_web::cookie::time::Duration::seconds(
            i64::try_from(state.config.session_lifetime().as_secs()).unwrap_or(i64::MAX),
        ))
        .finish();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({
            "success": true,
            "username": body.username
        }))
}

/// POST /api/auth/logout
pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(token) = get_session_token(&req) {
        state.sessions.destroy(&token);
    }
    let mut cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .finish();
    cookie.make_removal();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "success": true }))
}

/// GET /api/auth/check
pub async fn auth_check(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match require_auth(&req, &state) {
        Ok(username) => HttpResponse::Ok().json(json!({
            "authenticated": true,
            "username": username
        })),
        Err(_) => HttpResponse::Ok().json(json!({
            "authenticated": false
        })),
    }
}

// ─── Provider access ───

/// Read several quantities in one go, off the async workers and under the
/// configured timeout. Anything that goes wrong reads as unavailable.
async fn read_quantities(state: &web::Data<AppState>, quantities: &'static [Quantity]) -> Vec<Reading> {
    let provider = state.provider.clone();
    let task = web::block(move || {
        let mut provider = provider.lock()
            .map_err(|_| "metrics provider lock poisoned".to_string())?;
        Ok::<_, String>(provider.read_metrics(quantities))
    });

    match tokio::time::timeout(state.config.provider_timeout(), task).await {
        Ok(Ok(Ok(readings))) => readings,
        Ok(Ok(Err(e))) => {
            warn!("Metrics read failed: {}", e);
            vec![Reading::Unavailable; quantities.len()]
        }
        Ok(Err(e)) => {
            warn!("Metrics read task failed: {}", e);
            vec![Reading::Unavailable; quantities.len()]
        }
        Err(_) => {
            warn!("Metrics read timed out after {:?}", state.config.provider_timeout());
            vec![Reading::Unavailable; quantities.len()]
        }
    }
}

/// Host facts for the info endpoints; failures become JSON null
async fn read_info(state: &web::Data<AppState>, topic: InfoTopic) -> Value {
    let provider = state.provider.clone();
    let task = web::block(move || {
        let mut provider = provider.lock()
            .map_err(|_| "metrics provider lock poisoned".to_string())?;
        provider.host_info(topic)
    });

    match tokio::time::timeout(state.config.provider_timeout(), task).await {
        Ok(Ok(Ok(value))) => value,
        Ok(Ok(Err(e))) => {
            warn!("{:?} lookup failed: {}", topic, e);
            Value::Null
        }
        Ok(Err(e)) => {
            warn!("{:?} lookup task failed: {}", topic, e);
            Value::Null
        }
        Err(_) => {
            warn!("{:?} lookup timed out", topic);
            Value::Null
        }
    }
}

// ─── Dashboard API ───

/// GET /api/settings: refresh intervals and route map for the front end
pub async fn settings(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(resp) = require_auth(&req, &state) { return resp; }
    HttpResponse::Ok().json(bootstrap(&state.config))
}

fn bootstrap(config: &Config) -> Value {
    let urls: serde_json::Map<String, Value> = ROUTES.iter()
        .map(|(name, path)| (name.to_string(), json!(path)))
        .collect();
    json!({
        "time_refresh": config.time_refresh_ms,
        "time_refresh_long": config.time_refresh_long_ms,
        "time_refresh_net": config.time_refresh_net_ms,
        "version": env!("CARGO_PKG_VERSION"),
        "urls": urls,
    })
}

/// GET /: the dashboard page if installed, else the login page or bootstrap data
pub async fn index(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let authenticated = require_auth(&req, &state).is_ok();
    let page = if authenticated { "index.html" } else { "login.html" };

    if let Some(dir) = &state.web_dir {
        if let Ok(content) = std::fs::read_to_string(dir.join(page)) {
            return HttpResponse::Ok().content_type("text/html").body(content);
        }
    }
    if authenticated {
        HttpResponse::Ok().json(bootstrap(&state.config))
    } else {
        HttpResponse::Unauthorized().json(json!({ "error": "Not authenticated" }))
    }
}

async fn info(req: HttpRequest, state: web::Data<AppState>, topic: Option<InfoTopic>) -> HttpResponse {
    if let Err(resp) = require_auth(&req, &state) { return resp; }
    let value = match topic {
        Some(topic) => read_info(&state, topic).await,
        None => Value::Null,
    };
    HttpResponse::Ok().json(value)
}

/// GET /info/uptime
pub async fn uptime(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    info(req, state, Some(InfoTopic::Uptime)).await
}

/// GET /info/platform/{name}: hostname, osname or kernel
pub async fn platform(req: HttpRequest, state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let topic = match path.as_str() {
        "hostname" => Some(InfoTopic::Hostname),
        "osname" => Some(InfoTopic::OsName),
        "kernel" => Some(InfoTopic::Kernel),
        _ => None,
    };
    info(req, state, topic).await
}

/// GET /info/getcpus/{name}: type or count
pub async fn getcpus(req: HttpRequest, state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let topic = match path.as_str() {
        "type" => Some(InfoTopic::CpuModel),
        "count" => Some(InfoTopic::CpuCount),
        _ => None,
    };
    info(req, state, topic).await
}

/// GET /info/getdisk
pub async fn getdisk(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    info(req, state, Some(InfoTopic::Disks)).await
}

/// GET /info/getips
pub async fn getips(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    info(req, state, Some(InfoTopic::Addresses)).await
}

/// GET /info/getusers
pub async fn getusers(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    info(req, state, Some(InfoTopic::Users)).await
}

/// GET /info/getnetstat
pub async fn getnetstat(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    info(req, state, Some(InfoTopic::Connections)).await
}

/// GET /info/proc
pub async fn getproc(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    info(req, state, Some(InfoTopic::Processes)).await
}

/// GET /info/cpuusage: free/used doughnut
pub async fn cpuusage(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(resp) = require_auth(&req, &state) { return resp; }
    let readings = read_quantities(&state, &[Quantity::CpuUsed]).await;
    let used = readings.first().copied().unwrap_or(Reading::Unavailable).or_neutral();
    HttpResponse::Ok().json(charts::cpu_pie(used))
}

// ─── Charts ───

async fn chart(req: HttpRequest, state: web::Data<AppState>, kind: MetricKind) -> HttpResponse {
    if let Err(resp) = require_auth(&req, &state) { return resp; }

    let previous = req.cookie(kind.cookie_name()).map(|c| c.value().to_string());
    let readings = read_quantities(&state, kind.quantities()).await;
    let sample = dashboard::sample(
        kind,
        previous.as_deref(),
        &readings,
        state.config.chart_interval_secs(),
    );

    let cookie = Cookie::build(kind.cookie_name(), sample.state)
        .path("/")
        .finish();
    HttpResponse::Ok()
        .cookie(cookie)
        .json(&sample.chart)
}

/// GET /info/memusage
pub async fn memusage(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    chart(req, state, MetricKind::Memory).await
}

/// GET /info/loadaverage
pub async fn loadaverage(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    chart(req, state, MetricKind::LoadAverage).await
}

/// GET /info/gettraffic
pub async fn gettraffic(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    chart(req, state, MetricKind::Traffic).await
}

/// GET /info/getdiskio
pub async fn getdiskio(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    chart(req, state, MetricKind::DiskIo).await
}

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/", web::get().to(index))
        // Auth (no auth required)
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/logout", web::post().to(logout))
        .route("/api/auth/check", web::get().to(auth_check))
        .route("/api/settings", web::get().to(settings))
        // Host facts
        .route("/info/uptime", web::get().to(uptime))
        .route("/info/platform/{name}", web::get().to(platform))
        .route("/info/getcpus/{name}", web::get().to(getcpus))
        .route("/info/getdisk", web::get().to(getdisk))
        .route("/info/getips", web::get().to(getips))
        .route("/info/getusers", web::get().to(getusers))
        .route("/info/getnetstat", web::get().to(getnetstat))
        .route("/info/proc", web::get().to(getproc))
        // Charts
        .route("/info/cpuusage", web::get().to(cpuusage))
        .route("/info/memusage", web::get().to(memusage))
        .route("/info/loadaverage", web::get().to(loadaverage))
        .route("/info/gettraffic", web::get().to(gettraffic))
        .route("/info/getdiskio", web::get().to(getdiskio));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{cookie::Cookie, test, App};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeProvider {
        values: HashMap<Quantity, f64>,
    }

    impl MetricsProvider for FakeProvider {
        fn read_metric(&mut self, quantity: Quantity) -> Reading {
            self.values.get(&quantity).copied().into()
        }

        fn host_info(&mut self, topic: InfoTopic) -> Result<Value, String> {
            match topic {
                InfoTopic::Hostname => Ok(json!("testhost")),
                InfoTopic::CpuCount => Ok(json!(4)),
                InfoTopic::Users => Err("who is not installed".to_string()),
                _ => Ok(json!([])),
            }
        }
    }

    /// Never answers within the provider timeout
    struct SlowProvider;

    impl MetricsProvider for SlowProvider {
        fn read_metric(&mut self, _quantity: Quantity) -> Reading {
            std::thread::sleep(Duration::from_millis(300));
            Reading::Value(1.0)
        }

        fn host_info(&mut self, _topic: InfoTopic) -> Result<Value, String> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(json!("late"))
        }
    }

    /// Counts how the handlers ask for readings
    struct BatchCounter {
        batches: Arc<AtomicUsize>,
        singles: Arc<AtomicUsize>,
    }

    impl MetricsProvider for BatchCounter {
        fn read_metric(&mut self, _quantity: Quantity) -> Reading {
            self.singles.fetch_add(1, Ordering::SeqCst);
            Reading::Value(1.0)
        }

        fn read_metrics(&mut self, quantities: &[Quantity]) -> Vec<Reading> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            vec![Reading::Value(1.0); quantities.len()]
        }

        fn host_info(&mut self, _topic: InfoTopic) -> Result<Value, String> {
            Ok(Value::Null)
        }
    }

    fn fake_provider() -> Box<dyn MetricsProvider> {
        let values = HashMap::from([
            (Quantity::MemoryFree, 100.0),
            (Quantity::MemoryUsed, 50.0),
            (Quantity::MemoryBuffers, 10.0),
            (Quantity::MemoryCached, 5.0),
            (Quantity::LoadAverage, 0.5),
            (Quantity::DiskSectorsRead, 1000.0),
            (Quantity::DiskSectorsWritten, 2000.0),
            (Quantity::CpuUsed, 30.0),
        ]);
        Box::new(FakeProvider { values })
    }

    fn app_state(provider: Box<dyn MetricsProvider>, config: Config) -> web::Data<AppState> {
        web::Data::new(AppState {
            provider: Arc::new(Mutex::new(provider)),
            sessions: Arc::new(SessionManager::new(config.session_lifetime())),
            config,
            web_dir: None,
        })
    }

    fn state_cookie<B>(resp: &actix_web::dev::ServiceResponse<B>, name: &str) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|c| c.name() == name)
            .map(|c| c.into_owned())
            .expect("state cookie")
    }

    #[actix_web::test]
    async fn memory_chart_round_trips_state_through_cookie() {
        let state = app_state(fake_provider(), Config::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let mut cookie: Option<Cookie<'static>> = None;
        let mut body = Value::Null;
        for _ in 0..3 {
            let mut req = test::TestRequest::get().uri("/info/memusage");
            if let Some(c) = cookie.clone() {
                req = req.cookie(c);
            }
            let resp = test::call_service(&app, req.to_request()).await;
            assert!(resp.status().is_success());
            cookie = Some(state_cookie(&resp, "memory_usage"));
            body = test::read_body_json(resp).await;
        }

        assert_eq!(body["datasets"][0]["data"], json!([0.0, 50.0, 50.0, 50.0]));
        assert_eq!(body["labels"].as_array().map(|l| l.len()), Some(10));
        let stored: Value = serde_json::from_str(cookie.unwrap().value()).unwrap();
        assert_eq!(stored[0], json!([0.0, 100.0, 100.0, 100.0]));
    }

    #[actix_web::test]
    async fn traffic_without_interface_still_slides() {
        let state = app_state(fake_provider(), Config::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/info/gettraffic").to_request();
        let resp = test::call_service(&app, req).await;
        let cookie = state_cookie(&resp, "traffic");
        let body: Value = test::read_body_json(resp).await;

        assert_eq!(body["labels"][0], "KBps");
        assert_eq!(body["datasets"][0]["data"], json!([0.0, 0.0]));
        assert_eq!(cookie.value(), "[[0.0,0.0],[0.0,0.0],[],[]]");
    }

    #[actix_web::test]
    async fn disk_io_first_poll_records_baseline() {
        let state = app_state(fake_provider(), Config::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/info/getdiskio")
            .cookie(Cookie::new("diskrw", "[[0],[0],[500],[1000]]"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;

        // default chart interval is 2s
        assert_eq!(body["datasets"][0]["data"], json!([0.0, 250.0]));
        assert_eq!(body["datasets"][1]["data"], json!([0.0, 500.0]));
    }

    #[actix_web::test]
    async fn chart_poll_reads_provider_once() {
        let batches = Arc::new(AtomicUsize::new(0));
        let singles = Arc::new(AtomicUsize::new(0));
        let provider = BatchCounter { batches: batches.clone(), singles: singles.clone() };
        let state = app_state(Box::new(provider), Config::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        for uri in ["/info/memusage", "/info/gettraffic"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }
        assert_eq!(batches.load(Ordering::SeqCst), 2);
        assert_eq!(singles.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn cpu_pie_and_info_endpoints() {
        let state = app_state(fake_provider(), Config::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/info/cpuusage").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!([
            {"value": 70.0, "color": "#0AD11B"},
            {"value": 30.0, "color": "#F7464A"}
        ]));

        let req = test::TestRequest::get().uri("/info/platform/hostname").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!("testhost"));

        let req = test::TestRequest::get().uri("/info/platform/nonsense").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, Value::Null);

        let req = test::TestRequest::get().uri("/info/getcpus/count").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!(4));

        // provider failures degrade to null
        let req = test::TestRequest::get().uri("/info/getusers").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, Value::Null);
    }

    #[actix_web::test]
    async fn slow_provider_times_out_to_neutral_values() {
        let mut config = Config::default();
        config.provider_timeout_ms = 20;
        let state = app_state(Box::new(SlowProvider), config);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/info/loadaverage").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["datasets"][0]["data"], json!([0.0, 0.0]));
    }

    #[actix_web::test]
    async fn settings_expose_intervals_and_routes() {
        let state = app_state(fake_provider(), Config::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/settings").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["time_refresh_net"], 2000);
        assert_eq!(body["urls"]["memusage"], "/info/memusage");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn charts_require_login_when_configured() {
        let mut config = Config::default();
        config.auth.password_hash = auth::hash_password("hunter2").unwrap();
        let state = app_state(fake_provider(), config);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/info/memusage").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"username": "admin", "password": "wrong"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"username": "admin", "password": "hunter2"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let session = state_cookie(&resp, SESSION_COOKIE);

        let req = test::TestRequest::get()
            .uri("/info/memusage")
            .cookie(session)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
