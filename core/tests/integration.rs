//! End-to-end tests against the live mock Jenkins server.
//!
//! # Design
//! Each test starts the mock server on a random port in a background tokio
//! runtime, then drives `ApiClient` over real HTTP through `UreqTransport`.
//! The shared `MockJenkins` handle lets tests rotate crumbs and inspect what
//! the server received.

use jenkins_core::{ApiClient, ApiError, ClientConfig, Payload, RequestOptions};
use mock_server::{MockJenkins, CRUMB_FIELD, DEFAULT_API_TOKEN, DEFAULT_USER};
use serde_json::{json, Value};

const JOB_XML: &str = "<project><description>app</description></project>";

/// Start the mock server on a random port and return its base URL.
fn start(state: MockJenkins) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, state).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn client_for(base_url: &str) -> ApiClient {
    ApiClient::new(ClientConfig::new(base_url, DEFAULT_USER, DEFAULT_API_TOKEN))
}

fn ready(state: MockJenkins) -> ApiClient {
    let client = client_for(&start(state));
    client.init().unwrap();
    client
}

#[test]
fn init_obtains_server_crumb() {
    let state = MockJenkins::default();
    let client = ready(state.clone());

    let crumb = client.crumb().unwrap();
    assert_eq!(crumb.field, CRUMB_FIELD);
    assert_eq!(crumb.token, state.crumb());
    assert_eq!(state.crumb_requests(), 1);
}

#[test]
fn init_accepts_string_encoded_crumb() {
    let state = MockJenkins::default();
    state.set_crumb_as_string(true);
    let client = ready(state.clone());

    assert_eq!(client.crumb().unwrap().token, state.crumb());
}

#[test]
fn init_fails_when_csrf_is_disabled() {
    let state = MockJenkins::default();
    state.set_csrf_enabled(false);
    let client = client_for(&start(state));

    let err = client.init().unwrap_err();
    assert!(matches!(err, ApiError::CrumbUnavailable(_)));
    let err = client.get("/api/json", RequestOptions::default()).unwrap_err();
    assert!(matches!(err, ApiError::NotInitialized));
}

#[test]
fn init_fails_with_bad_credentials() {
    let base_url = start(MockJenkins::default());
    let client = ApiClient::new(ClientConfig::new(&base_url, DEFAULT_USER, "wrong"));

    let err = client.init().unwrap_err();
    match err {
        ApiError::CrumbUnavailable(source) => assert_eq!(source.status(), Some(401)),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn get_requests_json_representation() {
    let state = MockJenkins::default().with_job("app", JOB_XML);
    let client = ready(state.clone());

    let job: Value = client.get("/job/app", RequestOptions::default()).unwrap().json().unwrap();
    assert_eq!(job["name"], "app");
    assert!(state.requests().contains(&"GET /job/app/api/json".to_string()));
}

#[test]
fn view_alias_redirect_is_retried_with_suffix() {
    let state = MockJenkins::default().with_job("app", JOB_XML);
    let client = ready(state.clone());

    let job: Value = client
        .get("/view/all/job/app", RequestOptions::default())
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(job["name"], "app");

    let requests = state.requests();
    assert_eq!(
        &requests[1..],
        &[
            "GET /view/all/job/app/api/json".to_string(),
            "GET /job/app/".to_string(),
            "GET /job/app/api/json".to_string(),
        ]
    );
}

#[test]
fn unknown_job_surfaces_html_description() {
    let client = ready(MockJenkins::default());

    let err = client.get("/job/ghost", RequestOptions::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "request failed with status code 404 (html error message:No such job: ghost)"
    );
}

#[test]
fn build_with_json_envelope_carries_crumb() {
    let state = MockJenkins::default().with_job("app", JOB_XML);
    let client = ready(state.clone());

    let parameters = json!({"parameter": [{"name": "BRANCH", "value": "main"}]});
    let response = client
        .post(
            "/job/app/build",
            Payload::json(parameters.as_object().cloned().unwrap()),
            RequestOptions::default(),
        )
        .unwrap();
    assert_eq!(response.status, 201);

    let recorded = state.last_build_parameters("app").unwrap();
    assert_eq!(recorded[CRUMB_FIELD], state.crumb());
    assert_eq!(recorded["parameter"][0]["value"], "main");
}

#[test]
fn stale_crumb_is_refreshed_and_request_retried() {
    let state = MockJenkins::default().with_job("app", JOB_XML);
    let client = ready(state.clone());
    let fresh = state.rotate_crumb();

    client
        .post("/job/app/build", Payload::default(), RequestOptions::default())
        .unwrap();

    assert_eq!(state.build_count("app"), 1);
    assert_eq!(state.crumb_requests(), 2);
    assert_eq!(client.crumb().unwrap().token, fresh);
}

#[test]
fn stale_crumb_in_json_envelope_is_reinjected_on_retry() {
    let state = MockJenkins::default().with_job("app", JOB_XML);
    let client = ready(state.clone());
    let fresh = state.rotate_crumb();

    client
        .post(
            "/job/app/build",
            Payload::json(serde_json::Map::new()),
            RequestOptions::default(),
        )
        .unwrap();

    assert_eq!(state.last_build_parameters("app").unwrap()[CRUMB_FIELD], fresh);
}

#[test]
fn create_and_update_job_config() {
    let state = MockJenkins::default();
    let client = ready(state.clone());

    client
        .post_config("/createItem?name=fresh", JOB_XML, RequestOptions::default())
        .unwrap();
    assert_eq!(state.job_config("fresh").as_deref(), Some(JOB_XML));

    let updated = "<project><disabled>true</disabled></project>";
    client
        .post_config(
            "/job/fresh/config.xml",
            updated,
            RequestOptions::default().content_type("application/xml"),
        )
        .unwrap();
    assert_eq!(state.job_config("fresh").as_deref(), Some(updated));
}

#[test]
fn duplicate_job_surfaces_message_field() {
    let state = MockJenkins::default().with_job("app", JOB_XML);
    let client = ready(state);

    let err = client
        .post_config("/createItem?name=app", JOB_XML, RequestOptions::default())
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(
        err.to_string(),
        "request failed with status code 400 (html error message:A job already exists with the name 'app')"
    );
}

#[test]
fn concurrent_auth_failures_share_one_refresh() {
    let state = MockJenkins::default().with_job("app", JOB_XML);
    let client = ready(state.clone());
    state.rotate_crumb();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                client
                    .post("/job/app/build", Payload::default(), RequestOptions::default())
                    .unwrap();
            });
        }
    });

    assert_eq!(state.build_count("app"), 4);
    // One fetch at init plus at most one per distinct stale generation.
    assert_eq!(state.crumb_requests(), 2);
}
