use axum::{
    Router,
    routing::get,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::resource::{
    Resource, create, destroy, list, partial_update, retrieve, update,
};
use crate::api::serializers::{
    BookingSerializer, GroupSerializer, MenuItemSerializer, MenuSerializer, UserSerializer,
};
use crate::config::Settings;
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Settings,
}

/// Collection route at `base`, detail route at `base/{id}`.
fn mount<R: Resource>(router: Router<Arc<AppState>>, base: &str) -> Router<Arc<AppState>> {
    router
        .route(base, get(list::<R>).post(create::<R>))
        .route(
            &format!("{base}/{{id}}"),
            get(retrieve::<R>)
                .put(update::<R>)
                .patch(partial_update::<R>)
                .delete(destroy::<R>),
        )
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new().route("/health", get(|| async { "OK" }));
    let api = mount::<MenuSerializer>(api, "/api/menu");
    let api = mount::<MenuItemSerializer>(api, "/api/menu-items");
    let api = mount::<BookingSerializer>(api, "/api/bookings");
    let api = mount::<UserSerializer>(api, "/api/users");
    let api = mount::<GroupSerializer>(api, "/api/groups");

    api.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(settings: Settings) -> anyhow::Result<()> {
    let pool = db::connect(&settings.database).await?;
    tracing::info!(url = %settings.database.url, "database ready");

    let addr = settings.bind_addr();
    let state = Arc::new(AppState {
        db: pool,
        settings,
    });
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn app_with(settings: Settings) -> Router {
        let state = Arc::new(AppState {
            db: db::test_pool().await,
            settings,
        });
        router(state)
    }

    async fn app() -> Router {
        app_with(Settings::default()).await
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "lemon.test");
        let body = match body {
            Some(doc) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(doc.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    fn key_set(doc: &Value) -> Vec<&str> {
        let mut keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("OK".to_string()));
    }

    #[tokio::test]
    async fn test_create_menu_item_wire_shape() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/menu-items",
            Some(json!({ "title": "IceCream", "price": 80, "inventory": 100 })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(key_set(&body), vec!["id", "inventory", "price", "title"]);
        assert_eq!(body["price"], "80.00");

        let (status, listed) = send(&app, Method::GET, "/api/menu-items", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_menu_item_reports_fields() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/menu-items",
            Some(json!({ "title": "", "price": "1.999" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "title": ["This field may not be blank."],
                "price": ["Ensure that there are no more than 2 decimal places."],
                "inventory": ["This field is required."]
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = app().await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/menu")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"title\": "))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_menu_put_patch_delete() {
        let app = app().await;
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/menu",
            Some(json!({ "title": "Greek Salad", "price": "12.50", "inventory": 20 })),
        )
        .await;
        let uri = format!("/api/menu/{}", created["id"]);

        let (status, patched) = send(&app, Method::PATCH, &uri, Some(json!({ "inventory": 19 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["title"], "Greek Salad");
        assert_eq!(patched["price"], "12.50");
        assert_eq!(patched["inventory"], 19);

        let (status, body) = send(&app, Method::PUT, &uri, Some(json!({ "title": "Salad" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("price").is_some());
        assert!(body.get("inventory").is_some());

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Not found." }));
    }

    #[tokio::test]
    async fn test_booking_exposes_all_fields() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/bookings",
            Some(json!({ "name": "Adrian", "no_of_guests": "4", "booking_date": "2026-03-14T19:30" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(key_set(&body), vec!["booking_date", "id", "name", "no_of_guests"]);
        assert_eq!(body["booking_date"], "2026-03-14T19:30:00Z");
        assert_eq!(body["no_of_guests"], 4);
    }

    #[tokio::test]
    async fn test_users_with_groups() {
        let app = app().await;
        let (status, group) = send(&app, Method::POST, "/api/groups", Some(json!({ "name": "Manager" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, user) = send(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({ "username": "mario", "email": "mario@littlelemon.com", "groups": [group["id"]] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(key_set(&user), vec!["email", "groups", "url", "username"]);
        assert_eq!(user["url"], "http://lemon.test/api/users/1");
        assert_eq!(user["groups"], json!([group["id"]]));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({ "username": "mario", "groups": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "username": ["A user with that username already exists."] }));

        let (status, body) = send(
            &app,
            Method::PATCH,
            "/api/users/1",
            Some(json!({ "groups": [99] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "groups": ["Invalid pk \"99\" - object does not exist."] }));

        let (status, body) = send(&app, Method::PATCH, "/api/users/1", Some(json!({ "groups": [] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "mario@littlelemon.com");
        assert_eq!(body["groups"], json!([]));
    }

    #[tokio::test]
    async fn test_public_url_overrides_host() {
        let mut settings = Settings::default();
        settings.server.public_url = Some("https://api.littlelemon.com/".to_string());
        let app = app_with(settings).await;

        let (_, user) = send(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({ "username": "luigi", "groups": [] })),
        )
        .await;
        assert_eq!(user["url"], "https://api.littlelemon.com/api/users/1");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let app = app().await;
        for uri in [
            "/api/menu/5",
            "/api/menu-items/5",
            "/api/bookings/5",
            "/api/users/5",
            "/api/groups/5",
            "/api/menu/abc",
            "/api/users/1.5",
        ] {
            let (status, body) = send(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, json!({ "detail": "Not found." }), "{uri}");
            let (status, _) = send(&app, Method::DELETE, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }

        let (status, body) = send(&app, Method::PATCH, "/api/bookings/abc", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Not found." }));
    }

    #[tokio::test]
    async fn test_user_without_groups() {
        let app = app().await;
        let (status, user) = send(&app, Method::POST, "/api/users", Some(json!({ "username": "mario" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["groups"], json!([]));
        assert_eq!(user["email"], "");
    }

    #[tokio::test]
    async fn test_missing_content_type_is_unsupported() {
        let app = app().await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/menu")
            .body(Body::from(json!({ "title": "Soup", "price": 5, "inventory": 1 }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_user_errors_reported_together() {
        let app = app().await;
        let (status, _) = send(&app, Method::POST, "/api/users", Some(json!({ "username": "mario" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({ "username": "mario", "groups": [42] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "username": ["A user with that username already exists."],
                "groups": ["Invalid pk \"42\" - object does not exist."]
            })
        );

        let (_, listed) = send(&app, Method::GET, "/api/users", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_group_rename() {
        let app = app().await;
        let (_, staff) = send(&app, Method::POST, "/api/groups", Some(json!({ "name": "Staff" }))).await;
        send(&app, Method::POST, "/api/groups", Some(json!({ "name": "Manager" }))).await;
        let uri = format!("/api/groups/{}", staff["id"]);

        let (status, body) = send(&app, Method::PUT, &uri, Some(json!({ "name": "Delivery crew" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": staff["id"], "name": "Delivery crew" }));

        let (status, body) = send(&app, Method::PATCH, &uri, Some(json!({ "name": "Manager" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("name").is_some());
    }
}
