//! Reward shop and the coupon lifecycle.
//!
//! ```text
//! unused ──request_use──> pending ──approve──> approved
//!    │                       │
//!    └──────── sweep ────────┴──> expired
//! ```
//!
//! Transitions only move forward. Each one is a conditional write on the expected source
//! status, so a concurrent sweep or approval makes the losing call fail instead of overwriting.

use chrono::{DateTime, Months, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{fmt_ts, opt_ts_column, ts_column};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::model::{CouponStatus, PointSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopItem {
    pub id: String,
    pub title: String,
    pub category: String,
    pub price: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: String,
    pub student_id: String,
    pub item_id: Option<String>,
    /// Snapshot of the item at purchase time.
    pub title: String,
    pub category: String,
    pub price: i64,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub status: CouponStatus,
    pub ledger_entry_id: String,
}

impl Coupon {
    /// True for a still-redeemable coupon whose window has closed. Approved and expired coupons
    /// are settled and never lapse again.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at < now
    }
}

fn row_to_item(r: &rusqlite::Row<'_>) -> rusqlite::Result<ShopItem> {
    Ok(ShopItem {
        id: r.get(0)?,
        title: r.get(1)?,
        category: r.get(2)?,
        price: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
        created_at: ts_column(r, 5)?,
    })
}

const COUPON_COLUMNS: &str = "id, student_id, item_id, title, category, price, purchased_at, expires_at, used_at, status, ledger_entry_id";

fn row_to_coupon(r: &rusqlite::Row<'_>) -> rusqlite::Result<Coupon> {
    Ok(Coupon {
        id: r.get(0)?,
        student_id: r.get(1)?,
        item_id: r.get(2)?,
        title: r.get(3)?,
        category: r.get(4)?,
        price: r.get(5)?,
        purchased_at: ts_column(r, 6)?,
        expires_at: ts_column(r, 7)?,
        used_at: opt_ts_column(r, 8)?,
        status: r.get(9)?,
        ledger_entry_id: r.get(10)?,
    })
}

pub fn create_item(
    conn: &Connection,
    title: &str,
    category: &str,
    price: i64,
    now: DateTime<Utc>,
) -> CoreResult<ShopItem> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::invalid("item title must not be empty"));
    }
    if price <= 0 {
        return Err(CoreError::InvalidAmount(price));
    }
    let item = ShopItem {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        category: category.trim().to_string(),
        price,
        active: true,
        created_at: now,
    };
    conn.execute(
        "INSERT INTO shop_items(id, title, category, price, active, created_at) VALUES(?, ?, ?, ?, 1, ?)",
        (&item.id, &item.title, &item.category, item.price, fmt_ts(now)),
    )?;
    Ok(item)
}

pub fn get_item(conn: &Connection, item_id: &str) -> CoreResult<ShopItem> {
    conn.query_row(
        "SELECT id, title, category, price, active, created_at FROM shop_items WHERE id = ?",
        [item_id],
        row_to_item,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("item", item_id))
}

pub fn list_items(conn: &Connection, active_only: bool) -> CoreResult<Vec<ShopItem>> {
    let sql = if active_only {
        "SELECT id, title, category, price, active, created_at FROM shop_items WHERE active = 1 ORDER BY price, title"
    } else {
        "SELECT id, title, category, price, active, created_at FROM shop_items ORDER BY price, title"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Hides or re-lists an item. Coupons already issued keep their snapshot.
pub fn set_item_active(conn: &Connection, item_id: &str, active: bool) -> CoreResult<ShopItem> {
    let n = conn.execute(
        "UPDATE shop_items SET active = ? WHERE id = ?",
        (i64::from(active), item_id),
    )?;
    if n == 0 {
        return Err(CoreError::not_found("item", item_id));
    }
    get_item(conn, item_id)
}

pub fn get_coupon(conn: &Connection, coupon_id: &str) -> CoreResult<Coupon> {
    conn.query_row(
        &format!("SELECT {} FROM coupons WHERE id = ?", COUPON_COLUMNS),
        [coupon_id],
        row_to_coupon,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("coupon", coupon_id))
}

/// Charges the item's price and issues a coupon for it in one transaction.
pub fn purchase(
    conn: &Connection,
    student_id: &str,
    item_id: &str,
    validity_months: u32,
    now: DateTime<Utc>,
) -> CoreResult<Coupon> {
    let tx = db::write_tx(conn)?;
    let item = get_item(&tx, item_id)?;
    if !item.active {
        return Err(CoreError::invalid(format!(
            "item is no longer available: {}",
            item.title
        )));
    }
    let expires_at = now
        .checked_add_months(Months::new(validity_months))
        .ok_or_else(|| CoreError::invalid("coupon expiry out of range"))?;
    let entry = ledger::charge_in(
        &tx,
        student_id,
        item.price,
        PointSource::Shop,
        &format!("Purchased: {}", item.title),
        now,
    )?;

    let coupon = Coupon {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        item_id: Some(item.id.clone()),
        title: item.title.clone(),
        category: item.category.clone(),
        price: item.price,
        purchased_at: now,
        expires_at,
        used_at: None,
        status: CouponStatus::Unused,
        ledger_entry_id: entry.id.clone(),
    };
    tx.execute(
        &format!(
            "INSERT INTO coupons({}) VALUES(?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
            COUPON_COLUMNS
        ),
        (
            &coupon.id,
            &coupon.student_id,
            &coupon.item_id,
            &coupon.title,
            &coupon.category,
            coupon.price,
            fmt_ts(coupon.purchased_at),
            fmt_ts(coupon.expires_at),
            coupon.status,
            &coupon.ledger_entry_id,
        ),
    )?;
    tx.commit()?;
    info!(
        student_id,
        coupon_id = %coupon.id,
        item = %coupon.title,
        price = coupon.price,
        "coupon purchased"
    );
    Ok(coupon)
}

fn transition(
    conn: &Connection,
    coupon_id: &str,
    from: CouponStatus,
    to: CouponStatus,
    action: &'static str,
    now: DateTime<Utc>,
) -> CoreResult<Coupon> {
    let tx = db::write_tx(conn)?;
    let current = get_coupon(&tx, coupon_id)?;
    if current.status != from {
        return Err(CoreError::InvalidTransition {
            from: current.status.as_str().to_string(),
            action,
        });
    }
    if current.is_past_expiry(now) {
        debug!(coupon_id, action, "coupon past expiry; awaiting sweep");
        return Err(CoreError::InvalidTransition {
            from: CouponStatus::Expired.as_str().to_string(),
            action,
        });
    }

    let used_at = (to == CouponStatus::Approved).then(|| fmt_ts(now));
    let n = tx.execute(
        "UPDATE coupons SET status = ?, used_at = COALESCE(?, used_at) WHERE id = ? AND status = ?",
        (to, &used_at, coupon_id, from),
    )?;
    if n == 0 {
        // Lost to a concurrent writer; report what the coupon became.
        let actual = get_coupon(&tx, coupon_id)?;
        return Err(CoreError::InvalidTransition {
            from: actual.status.as_str().to_string(),
            action,
        });
    }
    let updated = get_coupon(&tx, coupon_id)?;
    tx.commit()?;
    info!(
        coupon_id,
        from = from.as_str(),
        to = to.as_str(),
        "coupon transitioned"
    );
    Ok(updated)
}

/// Student asks to redeem: `unused -> pending`.
pub fn request_use(conn: &Connection, coupon_id: &str, now: DateTime<Utc>) -> CoreResult<Coupon> {
    transition(
        conn,
        coupon_id,
        CouponStatus::Unused,
        CouponStatus::Pending,
        "request use of",
        now,
    )
}

/// Teacher confirms the redemption: `pending -> approved`, stamping `used_at`.
pub fn approve(conn: &Connection, coupon_id: &str, now: DateTime<Utc>) -> CoreResult<Coupon> {
    transition(
        conn,
        coupon_id,
        CouponStatus::Pending,
        CouponStatus::Approved,
        "approve",
        now,
    )
}

/// Expires every unused or pending coupon whose `expires_at` is before `now`.
///
/// Returns the coupons changed by this call; a repeated call with the same `now` returns none.
pub fn sweep_expirations(conn: &Connection, now: DateTime<Utc>) -> CoreResult<Vec<Coupon>> {
    let tx = db::write_tx(conn)?;
    let candidates = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {} FROM coupons WHERE status IN (?, ?) AND expires_at < ? ORDER BY expires_at, rowid",
            COUPON_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                (CouponStatus::Unused, CouponStatus::Pending, fmt_ts(now)),
                row_to_coupon,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    let mut expired = Vec::with_capacity(candidates.len());
    for mut coupon in candidates {
        if !coupon.is_past_expiry(now) {
            continue;
        }
        let n = tx.execute(
            "UPDATE coupons SET status = ? WHERE id = ? AND status = ?",
            (CouponStatus::Expired, &coupon.id, coupon.status),
        )?;
        if n == 1 {
            coupon.status = CouponStatus::Expired;
            expired.push(coupon);
        }
    }
    tx.commit()?;
    if !expired.is_empty() {
        info!(count = expired.len(), "coupons expired");
    }
    Ok(expired)
}

pub fn list_coupons(
    conn: &Connection,
    student_id: &str,
    status: Option<CouponStatus>,
) -> CoreResult<Vec<Coupon>> {
    crate::students::ensure_student(conn, student_id)?;
    let rows = match status {
        Some(s) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM coupons WHERE student_id = ? AND status = ? ORDER BY purchased_at DESC, rowid DESC",
                COUPON_COLUMNS
            ))?;
            let rows = stmt
                .query_map((student_id, s), row_to_coupon)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM coupons WHERE student_id = ? ORDER BY purchased_at DESC, rowid DESC",
                COUPON_COLUMNS
            ))?;
            let rows = stmt
                .query_map([student_id], row_to_coupon)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Pending coupons across all students, oldest first, for the teacher's approval queue.
pub fn list_pending(conn: &Connection) -> CoreResult<Vec<Coupon>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM coupons WHERE status = ? ORDER BY purchased_at, rowid",
        COUPON_COLUMNS
    ))?;
    let rows = stmt
        .query_map([CouponStatus::Pending], row_to_coupon)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
