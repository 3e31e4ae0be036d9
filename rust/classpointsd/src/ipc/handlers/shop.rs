use crate::coupons;
use crate::ipc::helpers::{
    get_bool_or, get_optional_str, get_required_i64, get_required_str, load_config, now_param,
    to_json, with_db, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::CouponStatus;
use rusqlite::Connection;
use serde_json::{json, Value};

fn shop_create_item(conn: &Connection, params: &Value) -> HandlerResult {
    let title = get_required_str(params, "title")?;
    let category = get_optional_str(params, "category").unwrap_or("");
    let price = get_required_i64(params, "price")?;
    let now = now_param(params)?;
    let item = coupons::create_item(conn, title, category, price, now)?;
    Ok(json!({ "item": to_json(&item)? }))
}

fn shop_list_items(conn: &Connection, params: &Value) -> HandlerResult {
    let active_only = get_bool_or(params, "activeOnly", true)?;
    let items = coupons::list_items(conn, active_only)?;
    Ok(json!({ "items": to_json(&items)? }))
}

fn shop_set_item_active(conn: &Connection, params: &Value) -> HandlerResult {
    let item_id = get_required_str(params, "itemId")?;
    let Some(active) = params.get("active").and_then(|v| v.as_bool()) else {
        return Err(HandlerErr::bad_params("active must be boolean"));
    };
    let item = coupons::set_item_active(conn, item_id, active)?;
    Ok(json!({ "item": to_json(&item)? }))
}

fn coupons_purchase(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let item_id = get_required_str(params, "itemId")?;
    let now = now_param(params)?;
    let cfg = load_config(conn)?;
    let coupon = coupons::purchase(conn, student_id, item_id, cfg.coupon_validity_months, now)?;
    let balance = crate::ledger::get_balance(conn, student_id)?;
    Ok(json!({ "coupon": to_json(&coupon)?, "balance": balance }))
}

fn coupons_request_use(conn: &Connection, params: &Value) -> HandlerResult {
    let coupon_id = get_required_str(params, "couponId")?;
    let now = now_param(params)?;
    let coupon = coupons::request_use(conn, coupon_id, now)?;
    Ok(json!({ "coupon": to_json(&coupon)? }))
}

fn coupons_approve(conn: &Connection, params: &Value) -> HandlerResult {
    let coupon_id = get_required_str(params, "couponId")?;
    let now = now_param(params)?;
    let coupon = coupons::approve(conn, coupon_id, now)?;
    Ok(json!({ "coupon": to_json(&coupon)? }))
}

fn coupons_sweep(conn: &Connection, params: &Value) -> HandlerResult {
    let now = now_param(params)?;
    let expired = coupons::sweep_expirations(conn, now)?;
    Ok(json!({ "expired": to_json(&expired)? }))
}

fn coupons_list(conn: &Connection, params: &Value) -> HandlerResult {
    let student_id = get_required_str(params, "studentId")?;
    let status = match get_optional_str(params, "status") {
        Some(raw) => Some(CouponStatus::parse(raw).ok_or_else(|| {
            HandlerErr::bad_params("status must be one of: unused, pending, approved, expired")
        })?),
        None => None,
    };
    let rows = coupons::list_coupons(conn, student_id, status)?;
    Ok(json!({ "coupons": to_json(&rows)? }))
}

fn coupons_pending(conn: &Connection, _params: &Value) -> HandlerResult {
    let rows = coupons::list_pending(conn)?;
    Ok(json!({ "coupons": to_json(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "shop.createItem" => Some(with_db(state, req, shop_create_item)),
        "shop.listItems" => Some(with_db(state, req, shop_list_items)),
        "shop.setItemActive" => Some(with_db(state, req, shop_set_item_active)),
        "coupons.purchase" => Some(with_db(state, req, coupons_purchase)),
        "coupons.requestUse" => Some(with_db(state, req, coupons_request_use)),
        "coupons.approve" => Some(with_db(state, req, coupons_approve)),
        "coupons.sweep" => Some(with_db(state, req, coupons_sweep)),
        "coupons.list" => Some(with_db(state, req, coupons_list)),
        "coupons.pending" => Some(with_db(state, req, coupons_pending)),
        _ => None,
    }
}
