//! CRUD handlers shared by every resource.
//!
//! A resource is a [`ModelSerializer`] plus the store calls for its table;
//! routes pick the entity with a turbofish, e.g. `get(list::<MenuSerializer>)`.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, Path, State, rejection::JsonRejection},
    http::{StatusCode, request::Parts},
};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::api::serializers::{
    BookingSerializer, GroupSerializer, MenuItemSerializer, MenuSerializer, ModelSerializer,
    UserSerializer, WireContext,
};
use crate::api::server::AppState;
use crate::db::DbError;
use crate::db::models::{
    Booking, Group, Menu, MenuItem, NewBooking, NewGroup, NewMenu, NewMenuItem, NewUser, User,
};
use crate::db::repo;
use crate::error::ApiError;

/// Numeric path id. Anything that does not parse is treated as a missing
/// object rather than a malformed request.
pub struct Id(pub i64);

impl<S> FromRequestParts<S> for Id
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<i64>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(Id(id)),
            Err(rejection) => {
                tracing::debug!("Unparseable id: {}", rejection.body_text());
                Err(ApiError::NotFound)
            }
        }
    }
}

pub trait Resource: ModelSerializer + Send + Sync + 'static {
    /// Used in log lines.
    const NAME: &'static str;

    fn id(record: &Self::Record) -> i64;

    fn fetch_all(
        db: &SqlitePool,
    ) -> impl Future<Output = Result<Vec<Self::Record>, DbError>> + Send;

    fn fetch(
        db: &SqlitePool,
        id: i64,
    ) -> impl Future<Output = Result<Option<Self::Record>, DbError>> + Send;

    fn insert(
        db: &SqlitePool,
        data: &Self::Data,
    ) -> impl Future<Output = Result<Self::Record, DbError>> + Send;

    fn update(
        db: &SqlitePool,
        id: i64,
        data: &Self::Data,
    ) -> impl Future<Output = Result<Option<Self::Record>, DbError>> + Send;

    fn delete(db: &SqlitePool, id: i64) -> impl Future<Output = Result<bool, DbError>> + Send;
}

impl Resource for MenuSerializer {
    const NAME: &'static str = "menu";

    fn id(record: &Menu) -> i64 {
        record.id
    }

    async fn fetch_all(db: &SqlitePool) -> Result<Vec<Menu>, DbError> {
        Ok(repo::list_menus(db).await?)
    }

    async fn fetch(db: &SqlitePool, id: i64) -> Result<Option<Menu>, DbError> {
        Ok(repo::get_menu(db, id).await?)
    }

    async fn insert(db: &SqlitePool, data: &NewMenu) -> Result<Menu, DbError> {
        Ok(repo::insert_menu(db, data).await?)
    }

    async fn update(db: &SqlitePool, id: i64, data: &NewMenu) -> Result<Option<Menu>, DbError> {
        Ok(repo::update_menu(db, id, data).await?)
    }

    async fn delete(db: &SqlitePool, id: i64) -> Result<bool, DbError> {
        Ok(repo::delete_menu(db, id).await?)
    }
}

impl Resource for MenuItemSerializer {
    const NAME: &'static str = "menu item";

    fn id(record: &MenuItem) -> i64 {
        record.id
    }

    async fn fetch_all(db: &SqlitePool) -> Result<Vec<MenuItem>, DbError> {
        Ok(repo::list_menu_items(db).await?)
    }

    async fn fetch(db: &SqlitePool, id: i64) -> Result<Option<MenuItem>, DbError> {
        Ok(repo::get_menu_item(db, id).await?)
    }

    async fn insert(db: &SqlitePool, data: &NewMenuItem) -> Result<MenuItem, DbError> {
        let item = repo::insert_menu_item(db, data).await?;
        tracing::debug!(item = %item, "stocked");
        Ok(item)
    }

    async fn update(
        db: &SqlitePool,
        id: i64,
        data: &NewMenuItem,
    ) -> Result<Option<MenuItem>, DbError> {
        Ok(repo::update_menu_item(db, id, data).await?)
    }

    async fn delete(db: &SqlitePool, id: i64) -> Result<bool, DbError> {
        Ok(repo::delete_menu_item(db, id).await?)
    }
}

impl Resource for BookingSerializer {
    const NAME: &'static str = "booking";

    fn id(record: &Booking) -> i64 {
        record.id
    }

    async fn fetch_all(db: &SqlitePool) -> Result<Vec<Booking>, DbError> {
        Ok(repo::list_bookings(db).await?)
    }

    async fn fetch(db: &SqlitePool, id: i64) -> Result<Option<Booking>, DbError> {
        Ok(repo::get_booking(db, id).await?)
    }

    async fn insert(db: &SqlitePool, data: &NewBooking) -> Result<Booking, DbError> {
        Ok(repo::insert_booking(db, data).await?)
    }

    async fn update(
        db: &SqlitePool,
        id: i64,
        data: &NewBooking,
    ) -> Result<Option<Booking>, DbError> {
        Ok(repo::update_booking(db, id, data).await?)
    }

    async fn delete(db: &SqlitePool, id: i64) -> Result<bool, DbError> {
        Ok(repo::delete_booking(db, id).await?)
    }
}

impl Resource for GroupSerializer {
    const NAME: &'static str = "group";

    fn id(record: &Group) -> i64 {
        record.id
    }

    async fn fetch_all(db: &SqlitePool) -> Result<Vec<Group>, DbError> {
        Ok(repo::list_groups(db).await?)
    }

    async fn fetch(db: &SqlitePool, id: i64) -> Result<Option<Group>, DbError> {
        Ok(repo::get_group(db, id).await?)
    }

    async fn insert(db: &SqlitePool, data: &NewGroup) -> Result<Group, DbError> {
        repo::insert_group(db, data).await
    }

    async fn update(db: &SqlitePool, id: i64, data: &NewGroup) -> Result<Option<Group>, DbError> {
        repo::update_group(db, id, data).await
    }

    async fn delete(db: &SqlitePool, id: i64) -> Result<bool, DbError> {
        Ok(repo::delete_group(db, id).await?)
    }
}

impl Resource for UserSerializer {
    const NAME: &'static str = "user";

    fn id(record: &User) -> i64 {
        record.id
    }

    async fn fetch_all(db: &SqlitePool) -> Result<Vec<User>, DbError> {
        Ok(repo::list_users(db).await?)
    }

    async fn fetch(db: &SqlitePool, id: i64) -> Result<Option<User>, DbError> {
        Ok(repo::get_user(db, id).await?)
    }

    async fn insert(db: &SqlitePool, data: &NewUser) -> Result<User, DbError> {
        repo::insert_user(db, data).await
    }

    async fn update(db: &SqlitePool, id: i64, data: &NewUser) -> Result<Option<User>, DbError> {
        repo::update_user(db, id, data).await
    }

    async fn delete(db: &SqlitePool, id: i64) -> Result<bool, DbError> {
        Ok(repo::delete_user(db, id).await?)
    }
}

pub async fn list<R: Resource>(
    State(state): State<Arc<AppState>>,
    ctx: WireContext,
) -> Result<Json<Vec<Value>>, ApiError> {
    let records = R::fetch_all(&state.db).await?;
    Ok(Json(
        records
            .iter()
            .map(|record| R::to_representation(record, &ctx))
            .collect(),
    ))
}

pub async fn create<R: Resource>(
    State(state): State<Arc<AppState>>,
    ctx: WireContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(doc) = payload?;
    let data = R::to_internal(&doc)?;
    let record = R::insert(&state.db, &data).await?;
    tracing::info!(resource = R::NAME, id = R::id(&record), "created");
    Ok((
        StatusCode::CREATED,
        Json(R::to_representation(&record, &ctx)),
    ))
}

pub async fn retrieve<R: Resource>(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    ctx: WireContext,
) -> Result<Json<Value>, ApiError> {
    let record = R::fetch(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(R::to_representation(&record, &ctx)))
}

pub async fn update<R: Resource>(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    ctx: WireContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    R::fetch(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let Json(doc) = payload?;
    let data = R::to_internal(&doc)?;
    let record = R::update(&state.db, id, &data)
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::info!(resource = R::NAME, id, "replaced");
    Ok(Json(R::to_representation(&record, &ctx)))
}

pub async fn partial_update<R: Resource>(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    ctx: WireContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let existing = R::fetch(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let Json(doc) = payload?;
    let data = R::to_internal_partial(&doc, &existing, &ctx)?;
    let record = R::update(&state.db, id, &data)
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::info!(resource = R::NAME, id, "updated");
    Ok(Json(R::to_representation(&record, &ctx)))
}

pub async fn destroy<R: Resource>(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<StatusCode, ApiError> {
    if !R::delete(&state.db, id).await? {
        return Err(ApiError::NotFound);
    }
    tracing::info!(resource = R::NAME, id, "deleted");
    Ok(StatusCode::NO_CONTENT)
}
