use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn class_exists(conn: &Connection, class_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db)
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::new("not_found", "class not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, display_name, roll_number, sort_order, active
             FROM students
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::db)?;
    let students = stmt
        .query_map([&class_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "displayName": r.get::<_, String>(1)?,
                "rollNumber": r.get::<_, String>(2)?,
                "sortOrder": r.get::<_, i64>(3)?,
                "active": r.get::<_, i64>(4)? != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let display_name = required_str(params, "displayName")?;
    let roll_number = optional_str(params, "rollNumber").unwrap_or_default();
    if display_name.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "displayName must not be empty"));
    }
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::new("not_found", "class not found"));
    }

    // Append to the roster order.
    let next_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, display_name, roll_number, sort_order, active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (&student_id, &class_id, display_name.trim(), &roll_number, next_order),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    Ok(json!({
        "studentId": student_id,
        "displayName": display_name.trim(),
        "rollNumber": roll_number,
        "sortOrder": next_order
    }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let existing: Option<(String, String, i64)> = conn
        .query_row(
            "SELECT display_name, roll_number, active FROM students WHERE id = ?",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    let Some((cur_name, cur_roll, cur_active)) = existing else {
        return Err(HandlerErr::new("not_found", "student not found"));
    };

    let display_name = optional_str(params, "displayName").unwrap_or(cur_name);
    let roll_number = optional_str(params, "rollNumber").unwrap_or(cur_roll);
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .map(|b| b as i64)
        .unwrap_or(cur_active);
    if display_name.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "displayName must not be empty"));
    }

    conn.execute(
        "UPDATE students SET display_name = ?, roll_number = ?, active = ? WHERE id = ?",
        (display_name.trim(), &roll_number, active, &student_id),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db)?
        .is_some();
    if !exists {
        return Err(HandlerErr::new("not_found", "student not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "DELETE FROM attendance_records WHERE student_id = ?",
        [&student_id],
    )
    .map_err(|e| HandlerErr {
        code: "db_delete_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance_records" })),
    })?;
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "students" })),
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.update" => Some(with_conn(state, req, students_update)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        _ => None,
    }
}
