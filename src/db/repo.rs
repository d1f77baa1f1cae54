use std::collections::HashMap;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::DbError;
use crate::db::models::{
    Booking, Group, Menu, MenuItem, NewBooking, NewGroup, NewMenu, NewMenuItem, NewUser, User,
};
use crate::error::ValidationErrors;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS menus (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        price TEXT NOT NULL,
        inventory INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS menu_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        price TEXT NOT NULL,
        inventory INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bookings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        no_of_guests INTEGER NOT NULL,
        booking_date TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_group (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        email TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1,
        date_joined TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_user_groups (
        user_id INTEGER NOT NULL REFERENCES auth_user(id) ON DELETE CASCADE,
        group_id INTEGER NOT NULL REFERENCES auth_group(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, group_id)
    )
    "#,
];

const USERNAME_TAKEN: &str = "A user with that username already exists.";
const GROUP_NAME_TAKEN: &str = "group with this name already exists.";

pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

fn unique_violation(err: sqlx::Error, field: &str, message: &str) -> DbError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return DbError::Constraint(ValidationErrors::single(field, message));
        }
    }
    DbError::Sqlx(err)
}

// ---- menus ----

pub async fn list_menus(pool: &SqlitePool) -> Result<Vec<Menu>, sqlx::Error> {
    sqlx::query_as::<_, Menu>("SELECT id, title, price, inventory FROM menus ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn get_menu(pool: &SqlitePool, id: i64) -> Result<Option<Menu>, sqlx::Error> {
    sqlx::query_as::<_, Menu>("SELECT id, title, price, inventory FROM menus WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_menu(pool: &SqlitePool, menu: &NewMenu) -> Result<Menu, sqlx::Error> {
    sqlx::query_as::<_, Menu>(
        r#"
        INSERT INTO menus (title, price, inventory)
        VALUES (?, ?, ?)
        RETURNING id, title, price, inventory
        "#,
    )
    .bind(&menu.title)
    .bind(menu.price.to_string())
    .bind(menu.inventory)
    .fetch_one(pool)
    .await
}

pub async fn update_menu(
    pool: &SqlitePool,
    id: i64,
    menu: &NewMenu,
) -> Result<Option<Menu>, sqlx::Error> {
    sqlx::query_as::<_, Menu>(
        r#"
        UPDATE menus SET title = ?, price = ?, inventory = ?
        WHERE id = ?
        RETURNING id, title, price, inventory
        "#,
    )
    .bind(&menu.title)
    .bind(menu.price.to_string())
    .bind(menu.inventory)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_menu(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM menus WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---- menu items ----

pub async fn list_menu_items(pool: &SqlitePool) -> Result<Vec<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>("SELECT id, title, price, inventory FROM menu_items ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn get_menu_item(pool: &SqlitePool, id: i64) -> Result<Option<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>(
        "SELECT id, title, price, inventory FROM menu_items WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_menu_item(
    pool: &SqlitePool,
    item: &NewMenuItem,
) -> Result<MenuItem, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>(
        r#"
        INSERT INTO menu_items (title, price, inventory)
        VALUES (?, ?, ?)
        RETURNING id, title, price, inventory
        "#,
    )
    .bind(&item.title)
    .bind(item.price.to_string())
    .bind(item.inventory)
    .fetch_one(pool)
    .await
}

pub async fn update_menu_item(
    pool: &SqlitePool,
    id: i64,
    item: &NewMenuItem,
) -> Result<Option<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>(
        r#"
        UPDATE menu_items SET title = ?, price = ?, inventory = ?
        WHERE id = ?
        RETURNING id, title, price, inventory
        "#,
    )
    .bind(&item.title)
    .bind(item.price.to_string())
    .bind(item.inventory)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_menu_item(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM menu_items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---- bookings ----

pub async fn list_bookings(pool: &SqlitePool) -> Result<Vec<Booking>, sqlx::Error> {
    sqlx::query_as::<_, Booking>(
        "SELECT id, name, no_of_guests, booking_date FROM bookings ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_booking(pool: &SqlitePool, id: i64) -> Result<Option<Booking>, sqlx::Error> {
    sqlx::query_as::<_, Booking>(
        "SELECT id, name, no_of_guests, booking_date FROM bookings WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_booking(
    pool: &SqlitePool,
    booking: &NewBooking,
) -> Result<Booking, sqlx::Error> {
    sqlx::query_as::<_, Booking>(
        r#"
        INSERT INTO bookings (name, no_of_guests, booking_date)
        VALUES (?, ?, ?)
        RETURNING id, name, no_of_guests, booking_date
        "#,
    )
    .bind(&booking.name)
    .bind(booking.no_of_guests)
    .bind(booking.booking_date)
    .fetch_one(pool)
    .await
}

pub async fn update_booking(
    pool: &SqlitePool,
    id: i64,
    booking: &NewBooking,
) -> Result<Option<Booking>, sqlx::Error> {
    sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings SET name = ?, no_of_guests = ?, booking_date = ?
        WHERE id = ?
        RETURNING id, name, no_of_guests, booking_date
        "#,
    )
    .bind(&booking.name)
    .bind(booking.no_of_guests)
    .bind(booking.booking_date)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_booking(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---- groups ----

pub async fn list_groups(pool: &SqlitePool) -> Result<Vec<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>("SELECT id, name FROM auth_group ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn get_group(pool: &SqlitePool, id: i64) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>("SELECT id, name FROM auth_group WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_group(pool: &SqlitePool, group: &NewGroup) -> Result<Group, DbError> {
    sqlx::query_as::<_, Group>("INSERT INTO auth_group (name) VALUES (?) RETURNING id, name")
        .bind(&group.name)
        .fetch_one(pool)
        .await
        .map_err(|e| unique_violation(e, "name", GROUP_NAME_TAKEN))
}

pub async fn update_group(
    pool: &SqlitePool,
    id: i64,
    group: &NewGroup,
) -> Result<Option<Group>, DbError> {
    sqlx::query_as::<_, Group>("UPDATE auth_group SET name = ? WHERE id = ? RETURNING id, name")
        .bind(&group.name)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| unique_violation(e, "name", GROUP_NAME_TAKEN))
}

/// Memberships go with the group.
pub async fn delete_group(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_group WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---- users ----

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    let mut users = sqlx::query_as::<_, User>(
        "SELECT id, username, email, is_active, date_joined FROM auth_user ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let memberships: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT user_id, group_id FROM auth_user_groups ORDER BY user_id, group_id",
    )
    .fetch_all(pool)
    .await?;

    let mut by_user: HashMap<i64, Vec<i64>> = HashMap::new();
    for (user_id, group_id) in memberships {
        by_user.entry(user_id).or_default().push(group_id);
    }
    for user in &mut users {
        user.groups = by_user.remove(&user.id).unwrap_or_default();
    }

    Ok(users)
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, is_active, date_joined FROM auth_user WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(mut user) = user else {
        return Ok(None);
    };
    user.groups = user_group_ids(&mut conn, id).await?;
    Ok(Some(user))
}

pub async fn insert_user(pool: &SqlitePool, new_user: &NewUser) -> Result<User, DbError> {
    let mut tx = pool.begin().await?;
    let errors = missing_groups(&mut tx, &new_user.groups).await?;

    let inserted = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO auth_user (username, email, is_active, date_joined)
        VALUES (?, ?, 1, ?)
        RETURNING id, username, email, is_active, date_joined
        "#,
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await;
    let mut user = collect_write(inserted, errors, "username", USERNAME_TAKEN)?;

    user.groups = replace_user_groups(&mut tx, user.id, &new_user.groups).await?;
    tx.commit().await?;

    Ok(user)
}

pub async fn update_user(
    pool: &SqlitePool,
    id: i64,
    new_user: &NewUser,
) -> Result<Option<User>, DbError> {
    let mut tx = pool.begin().await?;
    let errors = missing_groups(&mut tx, &new_user.groups).await?;

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE auth_user SET username = ?, email = ?
        WHERE id = ?
        RETURNING id, username, email, is_active, date_joined
        "#,
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await;

    let Some(mut user) = collect_write(updated, errors, "username", USERNAME_TAKEN)? else {
        return Ok(None);
    };
    user.groups = replace_user_groups(&mut tx, id, &new_user.groups).await?;
    tx.commit().await?;

    Ok(Some(user))
}

/// Memberships go with the user.
pub async fn delete_user(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_user WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn user_group_ids(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT group_id FROM auth_user_groups WHERE user_id = ? ORDER BY group_id",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

/// Reports the first unknown id, the way a related-field lookup would.
async fn missing_groups(
    conn: &mut SqliteConnection,
    groups: &[i64],
) -> Result<ValidationErrors, sqlx::Error> {
    let mut errors = ValidationErrors::new();
    for id in groups {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_group WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        if found == 0 {
            errors.add("groups", format!("Invalid pk \"{id}\" - object does not exist."));
            break;
        }
    }
    Ok(errors)
}

/// Folds the outcome of a write into errors found earlier in the same
/// transaction, so a single response lists every rejected field.
/// Dropping the transaction on `Err` rolls the write back.
fn collect_write<T>(
    result: Result<T, sqlx::Error>,
    mut errors: ValidationErrors,
    field: &str,
    message: &str,
) -> Result<T, DbError> {
    match result {
        Ok(value) if errors.is_empty() => Ok(value),
        Ok(_) => Err(DbError::Constraint(errors)),
        Err(e) => match unique_violation(e, field, message) {
            DbError::Constraint(found) => {
                errors.merge(found);
                Err(DbError::Constraint(errors))
            }
            other => Err(other),
        },
    }
}

async fn replace_user_groups(
    conn: &mut SqliteConnection,
    user_id: i64,
    groups: &[i64],
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query("DELETE FROM auth_user_groups WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for group_id in groups {
        sqlx::query("INSERT OR IGNORE INTO auth_user_groups (user_id, group_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut *conn)
            .await?;
    }

    user_group_ids(conn, user_id).await
}
