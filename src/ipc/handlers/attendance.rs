use crate::calendar::{date_key, parse_date_key};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{optional_bool, required_str};
use crate::ipc::types::{AppState, OpenSession, Request, RosterStudent};
use crate::session::{
    init_session, mark_all, mark_status, summarize, AttendanceStatus, AttendanceSummary,
    SessionError,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn summary_json(summary: &AttendanceSummary) -> serde_json::Value {
    json!({
        "present": summary.present,
        "absent": summary.absent,
        "leave": summary.leave,
        "pending": summary.pending,
        "total": summary.total,
        "rate": summary.rate,
        "readyToSave": summary.pending == 0
    })
}

fn roster_json(roster: &[RosterStudent]) -> Vec<serde_json::Value> {
    roster
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "displayName": s.display_name,
                "rollNumber": s.roll_number
            })
        })
        .collect()
}

fn require_status(params: &serde_json::Value) -> Result<AttendanceStatus, HandlerErr> {
    let raw = required_str(params, "status")?;
    AttendanceStatus::parse(&raw).ok_or_else(|| {
        HandlerErr::new(
            "bad_params",
            format!("status must be present|absent|leave|pending, got {}", raw),
        )
    })
}

fn load_roster(conn: &Connection, class_id: &str) -> Result<Vec<RosterStudent>, HandlerErr> {
    let class_found = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db)?
        .is_some();
    if !class_found {
        return Err(HandlerErr::new("not_found", "class not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, display_name, roll_number
             FROM students
             WHERE class_id = ? AND active = 1
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::db)?;
    stmt.query_map([class_id], |r| {
        Ok(RosterStudent {
            id: r.get(0)?,
            display_name: r.get(1)?,
            roll_number: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db)
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let opened = (|| -> Result<(OpenSession, bool), HandlerErr> {
        let class_id = required_str(&req.params, "classId")?;
        let raw_date = required_str(&req.params, "date")?;
        let Some(date) = parse_date_key(&raw_date) else {
            return Err(HandlerErr::new("bad_params", "date must be YYYY-MM-DD"));
        };
        let key = date_key(date);

        let roster = load_roster(conn, &class_id)?;
        let mut entries = init_session(roster.iter().map(|s| s.id.clone()));

        // A session saved earlier for this (class, date) re-seeds the grid.
        // Students rostered since then simply stay Pending.
        let mut stmt = conn
            .prepare(
                "SELECT student_id, status
                 FROM attendance_records
                 WHERE class_id = ? AND date_key = ?",
            )
            .map_err(HandlerErr::db)?;
        let saved = stmt
            .query_map((&class_id, &key), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::db)?;

        let mut seeded = false;
        for (student_id, status) in saved {
            if !entries.contains_key(&student_id) {
                continue;
            }
            if let Some(status) = AttendanceStatus::parse(&status) {
                entries.insert(student_id, status);
                seeded = true;
            }
        }

        Ok((
            OpenSession {
                class_id,
                date_key: key,
                roster,
                entries,
            },
            seeded,
        ))
    })();

    match opened {
        Ok((open, seeded)) => {
            let summary = summarize(&open.entries);
            let result = json!({
                "classId": open.class_id,
                "date": open.date_key,
                "students": roster_json(&open.roster),
                "summary": summary_json(&summary),
                "seededFromSaved": seeded
            });
            state.session = Some(open);
            ok(&req.id, result)
        }
        Err(error) => error.response(&req.id),
    }
}

fn handle_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(open) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let status = match require_status(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match mark_status(&open.entries, &student_id, status) {
        Ok(next) => {
            open.entries = next;
            let summary = summarize(&open.entries);
            ok(
                &req.id,
                json!({
                    "studentId": student_id,
                    "status": status.as_str(),
                    "summary": summary_json(&summary)
                }),
            )
        }
        Err(SessionError::UnknownStudent { student_id }) => err(
            &req.id,
            "unknown_student",
            "student not in session roster",
            Some(json!({ "studentId": student_id })),
        ),
    }
}

fn handle_mark_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(open) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };
    let status = match require_status(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    open.entries = mark_all(&open.entries, status);
    let summary = summarize(&open.entries);
    ok(
        &req.id,
        json!({
            "status": status.as_str(),
            "summary": summary_json(&summary)
        }),
    )
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(open) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open a session first", None);
    };
    let summary = summarize(&open.entries);
    ok(
        &req.id,
        json!({
            "classId": open.class_id,
            "date": open.date_key,
            "summary": summary_json(&summary)
        }),
    )
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(open) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open a session first", None);
    };

    let summary = summarize(&open.entries);
    // Advisory gate only: the caller confirms with force=true, the daemon's
    // version of the "N student(s) still pending, save anyway?" dialog.
    if summary.pending > 0 && !optional_bool(&req.params, "force") {
        return err(
            &req.id,
            "pending_entries",
            format!("{} student(s) still pending", summary.pending),
            Some(json!({ "pending": summary.pending })),
        );
    }

    let saved = (|| -> Result<usize, HandlerErr> {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
        let saved_at = chrono::Utc::now().to_rfc3339();
        let mut count = 0usize;
        for (student_id, status) in &open.entries {
            tx.execute(
                "INSERT INTO attendance_records(class_id, date_key, student_id, status, saved_at)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(class_id, date_key, student_id) DO UPDATE SET
                   status = excluded.status,
                   saved_at = excluded.saved_at",
                (&open.class_id, &open.date_key, student_id, status.as_str(), &saved_at),
            )
            .map_err(|e| HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "attendance_records" })),
            })?;
            count += 1;
        }
        tx.commit()
            .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
        Ok(count)
    })();

    match saved {
        Ok(count) => ok(
            &req.id,
            json!({
                "classId": open.class_id,
                "date": open.date_key,
                "savedCount": count,
                "summary": summary_json(&summary)
            }),
        ),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.sessionOpen" => Some(handle_session_open(state, req)),
        "attendance.mark" => Some(handle_mark(state, req)),
        "attendance.markAll" => Some(handle_mark_all(state, req)),
        "attendance.summary" => Some(handle_summary(state, req)),
        "attendance.save" => Some(handle_save(state, req)),
        _ => None,
    }
}
