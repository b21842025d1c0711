//! End-to-end tests of the JSON API against in-memory backends

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use tourwithme::{
    AppConfig, AppState, PersistentCache, Providers, Store,
    llm::{StubGenerator, TextGenerator},
    notify::Notifier,
    routing::{MappingProvider, StubMappingProvider},
    web,
};

const ITINERARY: &str = r#"```json
{
  "destination_overview": "Beaches and forts",
  "itinerary": [
    {"day": 1, "title": "Arrival", "activities": ["Baga beach"],},
  ],
  "estimated_costs": {"total": 1},
}
```"#;

struct TestApp {
    app: Router,
    _cache_dir: TempDir,
}

impl TestApp {
    fn new(providers: Providers) -> Self {
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::open(cache_dir.path()).unwrap();
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(AppConfig::default(), store, cache, providers);
        Self {
            app: web::app(state),
            _cache_dir: cache_dir,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Sign up and return the session token
    async fn signup(&self, name: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/signup",
                None,
                Some(json!({
                    "name": name,
                    "email": format!("{}@example.com", name.to_lowercase()),
                    "password": "secret123",
                    "confirmpassword": "secret123",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }
}

fn providers() -> Providers {
    Providers {
        mapping: Some(Arc::new(StubMappingProvider::new()) as Arc<dyn MappingProvider>),
        primary: Some(Arc::new(StubGenerator::replying("openrouter", ITINERARY)) as Arc<dyn TextGenerator>),
        fallback: None,
        notifier: Notifier::disabled(),
    }
}

#[fixture]
fn app() -> TestApp {
    TestApp::new(providers())
}

#[rstest]
#[tokio::test]
async fn test_health_reports_features(app: TestApp) {
    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["features"]["maps"], true);
    assert_eq!(body["features"]["trip_planner"], true);
    assert_eq!(body["features"]["email"], false);
}

#[rstest]
#[tokio::test]
async fn test_signup_login_and_me(app: TestApp) {
    let token = app.signup("Asha").await;

    let (status, me) = app.get("/api/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["authenticated"], true);
    assert_eq!(me["email"], "asha@example.com");

    let (status, anonymous) = app.call(Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anonymous["authenticated"], false);

    let (status, login) = app
        .call(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"email": "ASHA@example.com", "password": "secret123"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(login["token"].is_string());

    let (status, _) = app.post("/api/logout", &token, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.get("/api/destinations", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
}

#[rstest]
#[tokio::test]
async fn test_signup_validation(app: TestApp) {
    let (status, body) = app
        .call(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({"name": "Ravi", "email": "ravi@example.com", "password": "123", "confirmpassword": "123"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation-error");

    app.signup("Ravi").await;
    let (status, body) = app
        .call(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({"name": "Ravi", "email": "ravi@example.com", "password": "secret123", "confirmpassword": "secret123"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
}

#[rstest]
#[tokio::test]
async fn test_malformed_json_is_validation_error(app: TestApp) {
    let token = app.signup("Asha").await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/destinations")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_destination_crud(app: TestApp) {
    let token = app.signup("Asha").await;

    let (status, body) = app.post("/api/destinations", &token, json!({"title": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, created) = app
        .post(
            "/api/destinations",
            &token,
            json!({
                "title": "Goa",
                "category": "beach",
                "latitude": "15.2993",
                "longitude": 74.124,
                "average_cost_per_day": 3000,
                "rating": 4.5,
                "tags": "beach, nightlife"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["tags"], json!(["beach", "nightlife"]));

    let (status, list) = app.get("/api/destinations", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, updated) = app
        .call(
            Method::PUT,
            &format!("/api/destinations/{id}"),
            Some(&token),
            Some(json!({"description": "Sun and sand", "category": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["description"], "Sun and sand");
    assert!(updated["category"].is_null());

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/destinations/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.get(&format!("/api/destinations/{id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not-found");
}

#[rstest]
#[tokio::test]
async fn test_geocoding_endpoints(app: TestApp) {
    let token = app.signup("Asha").await;

    let (status, place) = app.get("/api/geocode?address=Mumbai", &token).await;
    assert_eq!(status, StatusCode::OK, "{place}");
    assert!((place["latitude"].as_f64().unwrap() - 19.076).abs() < 0.01);

    let (status, _) = app.get("/api/geocode?address=Atlantis%20Prime", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, reverse) = app.get("/api/reverse-geocode?lat=19.076&lon=72.8777", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(reverse["label"].is_string());

    let (status, body) = app.get("/api/reverse-geocode?lat=19.076", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, short) = app.get("/api/location/autocomplete?query=M", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(short["suggestions"], json!([]));
}

#[rstest]
#[tokio::test]
async fn test_directions_between_identical_points(app: TestApp) {
    let token = app.signup("Asha").await;
    let (status, route) = app
        .post(
            "/api/directions",
            &token,
            json!({"start_lat": 19.0, "start_lon": 72.8, "end_lat": 19.0, "end_lon": 72.8}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{route}");
    assert_eq!(route["distance_km"], 0.0);
    assert_eq!(route["steps"], json!([]));
    assert_eq!(route["profile"], "driving-car");

    let (status, body) = app
        .post(
            "/api/directions",
            &token,
            json!({"start_lat": 100.0, "start_lon": 72.8, "end_lat": 19.0, "end_lon": 72.8}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[rstest]
#[tokio::test]
async fn test_restaurant_directions_use_home(app: TestApp) {
    let token = app.signup("Asha").await;

    let body = json!({"restaurant_address": "Pune"});
    let (status, error) = app.post("/api/restaurant-directions", &token, body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("home location"));

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/user/location",
            Some(&token),
            Some(json!({"home_city": "Mumbai", "home_latitude": 19.076, "home_longitude": 72.8777, "currency_code": "inr"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, route) = app.post("/api/restaurant-directions", &token, body).await;
    assert_eq!(status, StatusCode::OK, "{route}");
    assert!(route["distance_km"].as_f64().unwrap() > 0.0);
    assert!(route["summary_text"].as_str().unwrap().starts_with("Route Summary:"));
}

#[rstest]
#[tokio::test]
async fn test_transport_options(app: TestApp) {
    let token = app.signup("Asha").await;
    let (status, options) = app
        .get(
            "/api/transport-options?start_lat=19.076&start_lon=72.8777&destination=Delhi",
            &token,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{options}");
    assert_eq!(options["no_options"], false);
    let recommended = options["recommended_mode"].as_str().unwrap();
    assert_eq!(options["all_options"][recommended]["available"], true);
    let car = &options["all_options"]["car"];
    assert_eq!(
        car["round_trip_cost"].as_f64().unwrap(),
        2.0 * car["one_way_cost"].as_f64().unwrap()
    );
}

#[rstest]
#[tokio::test]
async fn test_trip_plan_is_generated_and_saved(app: TestApp) {
    let token = app.signup("Asha").await;
    let request = json!({
        "destination": "Goa",
        "duration_days": 3,
        "budget": "budget",
        "interests": ["beaches"],
        "travelers": 2,
        "user_home_city": "Mumbai"
    });

    let (status, plan) = app.post("/api/trip-plan", &token, request.clone()).await;
    assert_eq!(status, StatusCode::OK, "{plan}");
    assert_eq!(plan["format"], "structured");
    assert_eq!(plan["provider"], "openrouter");
    assert_eq!(plan["from_cache"], false);
    assert_ne!(plan["itinerary"]["estimated_costs"]["total"], 1);
    let saved = plan["saved_plan_id"].as_i64().unwrap();

    let (status, cached) = app.post("/api/trip-plan", &token, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cached["from_cache"], true);

    let (status, details) = app.get(&format!("/api/trip-plans/{saved}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["role"], "creator");

    let (status, body) = app
        .post("/api/trip-plan", &token, json!({"destination": "Goa", "duration_days": 45}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn test_trip_plan_without_providers_is_unavailable() {
    let app = TestApp::new(Providers::default());
    let token = app.signup("Asha").await;
    let (status, body) = app
        .post("/api/trip-plan", &token, json!({"destination": "Goa"}))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "unavailable");

    let (status, _) = app.get("/api/geocode?address=Goa", &token).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[rstest]
#[tokio::test]
async fn test_collaborative_plan_flow(app: TestApp) {
    let asha = app.signup("Asha").await;
    let ravi = app.signup("Ravi").await;

    let (status, plan) = app
        .post(
            "/api/trip-plans",
            &asha,
            json!({"title": "Goa weekend", "destination": "Goa", "max_participants": 4}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{plan}");
    let id = plan["id"].as_i64().unwrap();
    let plan_uri = format!("/api/trip-plans/{id}");

    let (status, _) = app.get(&plan_uri, &ravi).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, invited) = app
        .post(&format!("{plan_uri}/invite"), &asha, json!({"email": "ravi@example.com", "role": "editor"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{invited}");

    let (status, _) = app
        .post(&format!("{plan_uri}/invite"), &asha, json!({"email": "ravi@example.com"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, activity) = app
        .post(&format!("{plan_uri}/activities"), &ravi, json!({"title": "Fort Aguada"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{activity}");

    let (status, details) = app.get(&plan_uri, &ravi).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["participants"].as_array().unwrap().len(), 2);
    assert_eq!(details["activities"].as_array().unwrap().len(), 1);

    let (status, _) = app.call(Method::DELETE, &plan_uri, Some(&ravi), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post(&format!("{plan_uri}/leave"), &ravi, json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, listed) = app.get("/api/trip-plans", &ravi).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));

    let (status, _) = app.call(Method::DELETE, &plan_uri, Some(&asha), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[rstest]
#[tokio::test]
async fn test_oversized_body_is_rejected(app: TestApp) {
    let token = app.signup("Asha").await;
    let limit = AppConfig::default().server.body_limit_bytes;
    let (status, body) = app
        .post(
            "/api/destinations",
            &token,
            json!({"title": "Goa", "description": "x".repeat(limit + 1)}),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{body}");
    assert_eq!(body["kind"], "payload-too-large");

    let (status, _) = app
        .post("/api/destinations", &token, json!({"title": "Goa", "description": "x".repeat(1000)}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[rstest]
#[tokio::test]
async fn test_location_validation_priority(app: TestApp) {
    let token = app.signup("Asha").await;

    let (status, body) = app.post("/api/location/validate", &token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, manual) = app
        .post("/api/location/validate", &token, json!({"manual_city": "Jaipur"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{manual}");
    assert_eq!(manual["source"], "manual_input");

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/user/location",
            Some(&token),
            Some(json!({"home_city": "Mumbai", "home_latitude": 19.076, "home_longitude": 72.8777})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, saved) = app
        .post("/api/location/validate", &token, json!({"manual_city": "Jaipur"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["source"], "saved_profile");
    assert_eq!(saved["location"]["city"], "Mumbai");

    let (status, gps) = app
        .post("/api/location/validate", &token, json!({"gps_lat": "18.52", "gps_lon": "73.85"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gps["source"], "gps");
}

#[rstest]
#[tokio::test]
async fn test_matrix_and_nearest_places(app: TestApp) {
    let token = app.signup("Asha").await;
    for (title, lat, lon) in [("Juhu Beach", 19.0988, 72.8267), ("Goa", 15.2993, 74.124)] {
        let (status, _) = app
            .post(
                "/api/destinations",
                &token,
                json!({"title": title, "category": "beach", "latitude": lat, "longitude": lon}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, matrix) = app
        .post(
            "/api/matrix",
            &token,
            json!({"locations": [[19.076, 72.8777], [18.5204, 73.8567]], "sources": [0]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{matrix}");
    assert_eq!(matrix["distances_km"].as_array().unwrap().len(), 1);
    assert_eq!(matrix["destinations"], json!([0, 1]));

    let (status, _) = app
        .post("/api/matrix", &token, json!({"locations": [[19.076, 72.8777]]}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, nearby) = app
        .post(
            "/api/location/nearest-places",
            &token,
            json!({"gps_lat": 19.076, "gps_lon": 72.8777, "max_distance_km": 50}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{nearby}");
    assert_eq!(nearby["location_source"], "gps");
    assert_eq!(nearby["total_found"], 1);
    assert_eq!(nearby["places"][0]["title"], "Juhu Beach");
}

#[rstest]
#[tokio::test]
async fn test_enhance_trip_plan(app: TestApp) {
    let asha = app.signup("Asha").await;
    let ravi = app.signup("Ravi").await;
    let (status, plan) = app
        .post(
            "/api/trip-plans",
            &asha,
            json!({"title": "Goa weekend", "destination": "Goa", "max_participants": 4}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{plan}");
    let uri = format!("/api/trip-plans/{}/enhance", plan["id"]);

    let (status, _) = app.post(&uri, &ravi, json!({"preferences": {}})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, enhanced) = app
        .post(&uri, &asha, json!({"preferences": {"asha@example.com": "beaches"}}))
        .await;
    assert_eq!(status, StatusCode::OK, "{enhanced}");
    assert_eq!(enhanced["format"], "structured");
    assert_eq!(enhanced["collaborators_count"], 0);
    assert_eq!(enhanced["provider"], "openrouter");
}

#[rstest]
#[tokio::test]
async fn test_recommendations(app: TestApp) {
    let token = app.signup("Asha").await;
    for (title, lat, lon, cost, rating) in [
        ("Goa", 15.2993, 74.124, 3000.0, 4.5),
        ("Jaipur", 26.9124, 75.7873, 2500.0, 4.2),
        ("Paris", 48.8566, 2.3522, 12000.0, 4.8),
    ] {
        let (status, _) = app
            .post(
                "/api/destinations",
                &token,
                json!({
                    "title": title,
                    "category": "city",
                    "latitude": lat,
                    "longitude": lon,
                    "average_cost_per_day": cost,
                    "rating": rating,
                    "tags": "culture"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .get("/api/recommendations?user_lat=19.076&user_lon=72.8777&max_distance_km=2000", &token)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let titles: Vec<&str> = body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles.len(), 2);
    assert!(!titles.contains(&"Paris"));
    assert_eq!(body["using_saved_location"], false);

    let (status, budget) = app.get("/api/recommendations/budget?min=2000&max=3500", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(budget[0]["title"], "Goa");
    assert_eq!(budget.as_array().unwrap().len(), 2);

    let (status, _) = app.get("/api/recommendations/budget?min=500&max=100", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/recommendations/similar/999", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, trending) = app.get("/api/recommendations/trending?limit=2", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(trending.as_array().unwrap().len() <= 2);
}
