//! Wire mapping for every resource.
//!
//! `Menu`, `Booking` and `Group` are exposed in full: their representation
//! is the serialized record, so new record fields show up on the wire
//! without touching this file. `MenuItem` and `User` are allow-listed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use serde_json::{Value, json};

use crate::api::fields::{Fields, price_text};
use crate::api::server::AppState;
use crate::db::models::{
    Booking, Group, Menu, MenuItem, NewBooking, NewGroup, NewMenu, NewMenuItem, NewUser, User,
};
use crate::error::ValidationErrors;

const TITLE_MAX_LENGTH: usize = 255;
const PRICE_MAX_DIGITS: u32 = 10;
const PRICE_DECIMAL_PLACES: u32 = 2;
const USERNAME_MAX_LENGTH: usize = 150;
const EMAIL_MAX_LENGTH: usize = 254;
const GROUP_NAME_MAX_LENGTH: usize = 150;

/// Request-scoped data needed to render hyperlinks.
#[derive(Debug, Clone)]
pub struct WireContext {
    base_url: String,
}

impl WireContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl FromRequestParts<Arc<AppState>> for WireContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(public_url) = &state.settings.server.public_url {
            return Ok(Self::new(public_url.as_str()));
        }
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        Ok(Self::new(format!("http://{host}")))
    }
}

pub trait ModelSerializer {
    type Record: Send + Sync;
    type Data: Send + Sync;

    /// Keys of the wire document, in output order.
    const FIELDS: &'static [&'static str];

    fn to_representation(record: &Self::Record, ctx: &WireContext) -> Value;

    /// Validates a complete inbound document. Read-only and unknown keys are ignored.
    fn to_internal(doc: &Value) -> Result<Self::Data, ValidationErrors>;

    /// PATCH: keys absent from `doc` keep the values of `existing`.
    fn to_internal_partial(
        doc: &Value,
        existing: &Self::Record,
        ctx: &WireContext,
    ) -> Result<Self::Data, ValidationErrors> {
        let Value::Object(patch) = doc else {
            return Self::to_internal(doc);
        };
        let mut merged = Self::to_representation(existing, ctx);
        if let Some(base) = merged.as_object_mut() {
            base.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Self::to_internal(&merged)
    }
}

pub struct MenuSerializer;

impl ModelSerializer for MenuSerializer {
    type Record = Menu;
    type Data = NewMenu;

    const FIELDS: &'static [&'static str] = &["id", "title", "price", "inventory"];

    fn to_representation(record: &Menu, _ctx: &WireContext) -> Value {
        json!(record)
    }

    fn to_internal(doc: &Value) -> Result<NewMenu, ValidationErrors> {
        let mut fields = Fields::from_document(doc)?;
        let title = fields.text("title", TITLE_MAX_LENGTH, false);
        let price = fields.decimal("price", PRICE_MAX_DIGITS, PRICE_DECIMAL_PLACES);
        let inventory = fields.integer("inventory");

        let (Some(title), Some(price), Some(inventory)) = (title, price, inventory) else {
            return Err(fields.into_errors());
        };
        Ok(NewMenu {
            title,
            price,
            inventory,
        })
    }
}

pub struct MenuItemSerializer;

impl ModelSerializer for MenuItemSerializer {
    type Record = MenuItem;
    type Data = NewMenuItem;

    const FIELDS: &'static [&'static str] = &["id", "title", "price", "inventory"];

    fn to_representation(record: &MenuItem, _ctx: &WireContext) -> Value {
        json!({
            "id": record.id,
            "title": record.title,
            "price": price_text(&record.price),
            "inventory": record.inventory,
        })
    }

    fn to_internal(doc: &Value) -> Result<NewMenuItem, ValidationErrors> {
        let mut fields = Fields::from_document(doc)?;
        let title = fields.text("title", TITLE_MAX_LENGTH, false);
        let price = fields.decimal("price", PRICE_MAX_DIGITS, PRICE_DECIMAL_PLACES);
        let inventory = fields.integer("inventory");

        let (Some(title), Some(price), Some(inventory)) = (title, price, inventory) else {
            return Err(fields.into_errors());
        };
        Ok(NewMenuItem {
            title,
            price,
            inventory,
        })
    }
}

pub struct BookingSerializer;

impl ModelSerializer for BookingSerializer {
    type Record = Booking;
    type Data = NewBooking;

    const FIELDS: &'static [&'static str] = &["id", "name", "no_of_guests", "booking_date"];

    fn to_representation(record: &Booking, _ctx: &WireContext) -> Value {
        json!(record)
    }

    fn to_internal(doc: &Value) -> Result<NewBooking, ValidationErrors> {
        let mut fields = Fields::from_document(doc)?;
        let name = fields.text("name", TITLE_MAX_LENGTH, false);
        let no_of_guests = fields.integer("no_of_guests");
        let booking_date = fields.datetime("booking_date");

        let (Some(name), Some(no_of_guests), Some(booking_date)) = (name, no_of_guests, booking_date)
        else {
            return Err(fields.into_errors());
        };
        Ok(NewBooking {
            name,
            no_of_guests,
            booking_date,
        })
    }
}

pub struct GroupSerializer;

impl ModelSerializer for GroupSerializer {
    type Record = Group;
    type Data = NewGroup;

    const FIELDS: &'static [&'static str] = &["id", "name"];

    fn to_representation(record: &Group, _ctx: &WireContext) -> Value {
        json!(record)
    }

    fn to_internal(doc: &Value) -> Result<NewGroup, ValidationErrors> {
        let mut fields = Fields::from_document(doc)?;
        let Some(name) = fields.text("name", GROUP_NAME_MAX_LENGTH, false) else {
            return Err(fields.into_errors());
        };
        Ok(NewGroup { name })
    }
}

pub struct UserSerializer;

impl UserSerializer {
    pub fn detail_path(id: i64) -> String {
        format!("/api/users/{id}")
    }
}

impl ModelSerializer for UserSerializer {
    type Record = User;
    type Data = NewUser;

    const FIELDS: &'static [&'static str] = &["url", "username", "email", "groups"];

    fn to_representation(record: &User, ctx: &WireContext) -> Value {
        json!({
            "url": ctx.absolute(&Self::detail_path(record.id)),
            "username": record.username,
            "email": record.email,
            "groups": record.groups,
        })
    }

    fn to_internal(doc: &Value) -> Result<NewUser, ValidationErrors> {
        let mut fields = Fields::from_document(doc)?;
        let username = fields.username("username", USERNAME_MAX_LENGTH);
        let email = fields.email("email", EMAIL_MAX_LENGTH);
        let groups = fields.optional_pk_list("groups");

        let (Some(username), Some(email), Some(groups)) = (username, email, groups) else {
            return Err(fields.into_errors());
        };
        Ok(NewUser {
            username,
            email,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;

    fn ctx() -> WireContext {
        WireContext::new("http://testserver/")
    }

    fn keys(value: &Value) -> BTreeSet<String> {
        value.as_object().unwrap().keys().cloned().collect()
    }

    fn declared<S: ModelSerializer>() -> BTreeSet<String> {
        S::FIELDS.iter().map(|f| f.to_string()).collect()
    }

    fn ice_cream() -> MenuItem {
        MenuItem {
            id: 7,
            title: "IceCream".to_string(),
            price: Decimal::from(80),
            inventory: 100,
        }
    }

    fn mario() -> User {
        User {
            id: 3,
            username: "mario".to_string(),
            email: "mario@littlelemon.com".to_string(),
            is_active: false,
            date_joined: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            groups: vec![1, 2],
        }
    }

    fn booking() -> Booking {
        Booking {
            id: 1,
            name: "Adrian".to_string(),
            no_of_guests: 4,
            booking_date: Utc.with_ymd_and_hms(2026, 3, 14, 19, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_menu_item_key_set() {
        let doc = MenuItemSerializer::to_representation(&ice_cream(), &ctx());
        assert_eq!(keys(&doc), declared::<MenuItemSerializer>());
        assert_eq!(
            doc,
            json!({ "id": 7, "title": "IceCream", "price": "80.00", "inventory": 100 })
        );
    }

    #[test]
    fn test_user_key_set_hides_other_fields() {
        let doc = UserSerializer::to_representation(&mario(), &ctx());
        assert_eq!(keys(&doc), declared::<UserSerializer>());
        assert_eq!(doc["url"], "http://testserver/api/users/3");
        assert_eq!(doc["groups"], json!([1, 2]));
        assert!(doc.get("is_active").is_none());
        assert!(doc.get("date_joined").is_none());
    }

    #[test]
    fn test_full_exposure_is_whole_record() {
        let menu = Menu {
            id: 2,
            title: "Pasta".to_string(),
            price: Decimal::new(1250, 2),
            inventory: 5,
        };
        let doc = MenuSerializer::to_representation(&menu, &ctx());
        assert_eq!(doc, serde_json::to_value(&menu).unwrap());
        assert_eq!(keys(&doc), declared::<MenuSerializer>());

        let doc = BookingSerializer::to_representation(&booking(), &ctx());
        assert_eq!(doc, serde_json::to_value(booking()).unwrap());
        assert_eq!(keys(&doc), declared::<BookingSerializer>());
        assert_eq!(doc["booking_date"], "2026-03-14T19:30:00Z");

        let group = Group { id: 1, name: "Manager".to_string() };
        let doc = GroupSerializer::to_representation(&group, &ctx());
        assert_eq!(keys(&doc), declared::<GroupSerializer>());
    }

    #[test]
    fn test_round_trip_keeps_allow_listed_fields() {
        let item = ice_cream();
        let data = MenuItemSerializer::to_internal(&MenuItemSerializer::to_representation(&item, &ctx()))
            .unwrap();
        assert_eq!((data.title.as_str(), data.price, data.inventory), ("IceCream", item.price, 100));

        let user = mario();
        let data = UserSerializer::to_internal(&UserSerializer::to_representation(&user, &ctx())).unwrap();
        assert_eq!(data.username, user.username);
        assert_eq!(data.email, user.email);
        assert_eq!(data.groups, user.groups);

        let original = booking();
        let data = BookingSerializer::to_internal(&BookingSerializer::to_representation(&original, &ctx()))
            .unwrap();
        assert_eq!(data.booking_date, original.booking_date);
        assert_eq!(data.no_of_guests, original.no_of_guests);
    }

    #[test]
    fn test_all_field_errors_reported_together() {
        let errors = MenuItemSerializer::to_internal(&json!({ "price": "free", "inventory": 1.5 }))
            .unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["inventory", "price", "title"]);
        assert_eq!(errors.get("title").unwrap(), ["This field is required."]);
    }

    #[test]
    fn test_read_only_and_unknown_keys_ignored() {
        let data = MenuItemSerializer::to_internal(&json!({
            "id": 999, "title": "Soup", "price": 4, "inventory": 3, "secret": true
        }))
        .unwrap();
        assert_eq!(data.title, "Soup");

        let data = UserSerializer::to_internal(&json!({
            "url": "http://elsewhere/", "username": "luigi", "groups": []
        }))
        .unwrap();
        assert_eq!(data.email, "");
    }

    #[test]
    fn test_partial_keeps_existing_values() {
        let data =
            MenuItemSerializer::to_internal_partial(&json!({ "inventory": 42 }), &ice_cream(), &ctx())
                .unwrap();
        assert_eq!(data.title, "IceCream");
        assert_eq!(data.price, Decimal::from(80));
        assert_eq!(data.inventory, 42);

        let errors =
            MenuItemSerializer::to_internal_partial(&json!({ "title": "" }), &ice_cream(), &ctx())
                .unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["This field may not be blank."]);

        let errors =
            MenuItemSerializer::to_internal_partial(&json!("nope"), &ice_cream(), &ctx()).unwrap_err();
        assert!(errors.get("non_field_errors").is_some());
    }

    #[test]
    fn test_groups_may_be_omitted() {
        let data = UserSerializer::to_internal(&json!({ "username": "luigi" })).unwrap();
        assert!(data.groups.is_empty());
        assert_eq!(data.email, "");
    }

    #[test]
    fn test_groups_must_be_list() {
        let errors =
            UserSerializer::to_internal(&json!({ "username": "luigi", "groups": 1 })).unwrap_err();
        assert_eq!(
            errors.get("groups").unwrap(),
            ["Expected a list of items but got type \"int\"."]
        );
    }
}
