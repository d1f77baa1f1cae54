use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::api::fields::{serialize_datetime, serialize_price};

/// Menu entries are exposed on the wire as-is: every field here is public.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Menu {
    pub id: i64,
    pub title: String,
    #[serde(serialize_with = "serialize_price")]
    pub price: Decimal,
    pub inventory: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub id: i64,
    pub title: String,
    pub price: Decimal,
    pub inventory: i32,
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.title, self.price)
    }
}

/// Bookings are exposed on the wire as-is: every field here is public.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Booking {
    pub id: i64,
    pub name: String,
    pub no_of_guests: i32,
    #[serde(serialize_with = "serialize_datetime")]
    pub booking_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    /// Group ids, ascending. Loaded from `user_groups`.
    #[sqlx(skip)]
    pub groups: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMenu {
    pub title: String,
    pub price: Decimal,
    pub inventory: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMenuItem {
    pub title: String,
    pub price: Decimal,
    pub inventory: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub name: String,
    pub no_of_guests: i32,
    pub booking_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub groups: Vec<i64>,
}

// Prices are stored as TEXT so the decimal survives SQLite untouched.
fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let text: String = row.try_get(column)?;
    text.parse::<Decimal>()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

impl<'r> FromRow<'r, SqliteRow> for Menu {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            price: decimal_column(row, "price")?,
            inventory: row.try_get("inventory")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for MenuItem {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            price: decimal_column(row, "price")?,
            inventory: row.try_get("inventory")?,
        })
    }
}
