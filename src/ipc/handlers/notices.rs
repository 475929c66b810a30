use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn notice_row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "title": r.get::<_, String>(1)?,
        "content": r.get::<_, String>(2)?,
        "audience": r.get::<_, String>(3)?,
        "priority": r.get::<_, String>(4)?,
        "postedOn": r.get::<_, String>(5)?,
        "status": r.get::<_, String>(6)?
    }))
}

fn handle_notices_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "notices": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, title, content, audience, priority, posted_on, status
         FROM notices
         ORDER BY posted_on DESC, id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], notice_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(notices) => ok(&req.id, json!({ "notices": notices })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_notices_compose(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let title = match req.params.get("title").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing title", None),
    };
    let draft = req
        .params
        .get("draft")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let content = req
        .params
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    // Drafts may be saved with just a title; a sent notice needs a body,
    // audience, and priority, as in the compose form.
    if !draft {
        let audience_ok = req
            .params
            .get("audience")
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        let priority_ok = req
            .params
            .get("priority")
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if content.trim().is_empty() || !audience_ok || !priority_ok {
            return err(
                &req.id,
                "bad_params",
                "content, audience and priority are required to send",
                None,
            );
        }
    }
    let audience = req
        .params
        .get("audience")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let priority = req
        .params
        .get("priority")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let posted_on = match req.params.get("postedOn").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
    };
    let status = if draft { "draft" } else { "sent" };

    let notice_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO notices(id, title, content, audience, priority, posted_on, status)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&notice_id, &title, &content, &audience, &priority, &posted_on, status),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "notices" })),
        );
    }

    ok(
        &req.id,
        json!({ "noticeId": notice_id, "status": status, "postedOn": posted_on }),
    )
}

fn handle_notices_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let notice_id = match req.params.get("noticeId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing noticeId", None),
    };

    let existing = conn
        .query_row(
            "SELECT title, content, audience, priority, status FROM notices WHERE id = ?",
            [&notice_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )
        .optional();
    let (cur_title, cur_content, cur_audience, cur_priority, cur_status) = match existing {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "notice not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let get = |key: &str, cur: String| -> String {
        req.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or(cur)
    };
    let title = get("title", cur_title);
    if title.trim().is_empty() {
        return err(&req.id, "bad_params", "title must not be empty", None);
    }
    let content = get("content", cur_content);
    let audience = get("audience", cur_audience);
    let priority = get("priority", cur_priority);
    // Sending a draft is an update to status="sent".
    let status = get("status", cur_status);
    if status != "draft" && status != "sent" {
        return err(&req.id, "bad_params", "status must be draft or sent", None);
    }

    if let Err(e) = conn.execute(
        "UPDATE notices SET title = ?, content = ?, audience = ?, priority = ?, status = ?
         WHERE id = ?",
        (&title, &content, &audience, &priority, &status, &notice_id),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "notices" })),
        );
    }

    ok(&req.id, json!({ "ok": true, "status": status }))
}

fn handle_notices_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let notice_id = match req.params.get("noticeId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing noticeId", None),
    };

    match conn.execute("DELETE FROM notices WHERE id = ?", [&notice_id]) {
        Ok(0) => err(&req.id, "not_found", "notice not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "notices" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notices.list" => Some(handle_notices_list(state, req)),
        "notices.compose" => Some(handle_notices_compose(state, req)),
        "notices.update" => Some(handle_notices_update(state, req)),
        "notices.delete" => Some(handle_notices_delete(state, req)),
        _ => None,
    }
}
