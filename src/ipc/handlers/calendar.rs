use crate::calendar::{build_month_grid, date_key, parse_date_key, CalendarEvent, Marker};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{optional_str, required_i64, required_str, required_u64};
use crate::ipc::types::{AppState, Request};
use crate::session::AttendanceStatus;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

fn require_date_key(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = required_str(params, key)?;
    let Some(date) = parse_date_key(&raw) else {
        return Err(HandlerErr::new(
            "bad_params",
            format!("{} must be YYYY-MM-DD", key),
        ));
    };
    Ok(date_key(date))
}

fn events_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = require_date_key(params, "date")?;
    let title = required_str(params, "title")?;
    if title.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "title must not be empty"));
    }
    let time = optional_str(params, "time").unwrap_or_default();
    let kind = optional_str(params, "kind").unwrap_or_else(|| "blue".to_string());

    let event_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO calendar_events(id, date_key, title, event_time, kind)
         VALUES(?, ?, ?, ?, ?)",
        (&event_id, &date, title.trim(), &time, &kind),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "calendar_events" })),
    })?;

    Ok(json!({ "eventId": event_id, "date": date }))
}

fn events_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    // Optional month filter: events.list {year, month0} limits to one month.
    let (sql, arg) = if params.get("year").is_some() {
        let year = required_i64(params, "year")?;
        let month0 = required_u64(params, "month0")?;
        if month0 > 11 {
            return Err(HandlerErr::new("bad_params", "month0 must be 0..=11"));
        }
        (
            "SELECT id, date_key, title, event_time, kind
             FROM calendar_events WHERE date_key LIKE ?
             ORDER BY date_key, event_time",
            Some(format!("{:04}-{:02}-%", year, month0 + 1)),
        )
    } else {
        (
            "SELECT id, date_key, title, event_time, kind
             FROM calendar_events
             ORDER BY date_key, event_time",
            None,
        )
    };

    let mut stmt = conn.prepare(sql).map_err(HandlerErr::db)?;
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "date": r.get::<_, String>(1)?,
            "title": r.get::<_, String>(2)?,
            "time": r.get::<_, String>(3)?,
            "kind": r.get::<_, String>(4)?
        }))
    };
    let events = match arg {
        Some(prefix) => stmt
            .query_map([&prefix], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::db)?;

    Ok(json!({ "events": events }))
}

fn events_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let event_id = required_str(params, "eventId")?;
    let deleted = conn
        .execute("DELETE FROM calendar_events WHERE id = ?", [&event_id])
        .map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "calendar_events" })),
        })?;
    if deleted == 0 {
        return Err(HandlerErr::new("not_found", "event not found"));
    }
    Ok(json!({ "ok": true }))
}

fn event_markers(conn: &Connection, year: i64, month0: u64) -> Result<HashMap<String, Marker>, HandlerErr> {
    let prefix = format!("{:04}-{:02}-%", year, month0 + 1);
    let mut stmt = conn
        .prepare(
            "SELECT date_key, title, event_time, kind
             FROM calendar_events WHERE date_key LIKE ?
             ORDER BY date_key, event_time",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([&prefix], |r| {
            Ok((
                r.get::<_, String>(0)?,
                CalendarEvent {
                    title: r.get(1)?,
                    time: r.get(2)?,
                    kind: r.get(3)?,
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let mut by_date: HashMap<String, Vec<CalendarEvent>> = HashMap::new();
    for (key, event) in rows {
        by_date.entry(key).or_default().push(event);
    }
    Ok(by_date
        .into_iter()
        .map(|(key, events)| (key, Marker::Events(events)))
        .collect())
}

fn attendance_markers(
    conn: &Connection,
    params: &serde_json::Value,
    year: i64,
    month0: u64,
) -> Result<HashMap<String, Marker>, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let student_id = required_str(params, "studentId")?;
    let prefix = format!("{:04}-{:02}-%", year, month0 + 1);
    let mut stmt = conn
        .prepare(
            "SELECT date_key, status
             FROM attendance_records
             WHERE class_id = ? AND student_id = ? AND date_key LIKE ?",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map((&class_id, &student_id, &prefix), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let mut markers = HashMap::new();
    for (key, status) in rows {
        // Rows written by attendance.save always hold a valid status; skip
        // anything else rather than failing the whole grid.
        if let Some(status) = AttendanceStatus::parse(&status) {
            markers.insert(key, Marker::Attendance(status));
        }
    }
    Ok(markers)
}

fn marker_json(marker: &Marker) -> serde_json::Value {
    match marker {
        Marker::Events(events) => json!({
            "type": "events",
            "events": events.iter().map(|e| json!({
                "title": e.title,
                "time": e.time,
                "kind": e.kind
            })).collect::<Vec<_>>()
        }),
        Marker::Attendance(status) => json!({
            "type": "attendance",
            "status": status.as_str()
        }),
    }
}

fn month_grid(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year = required_i64(params, "year")?;
    let month0 = required_u64(params, "month0")?;

    // "today" is injected by the caller; only interactive use falls back to
    // the daemon's local date.
    let today = match optional_str(params, "today") {
        Some(raw) => parse_date_key(&raw)
            .ok_or_else(|| HandlerErr::new("bad_params", "today must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    let source = optional_str(params, "source").unwrap_or_else(|| "events".to_string());
    let markers = match source.as_str() {
        "events" => event_markers(conn, year, month0)?,
        "attendance" => attendance_markers(conn, params, year, month0)?,
        other => {
            return Err(HandlerErr::new(
                "bad_params",
                format!("unknown source: {}", other),
            ))
        }
    };

    let year_i32 = i32::try_from(year)
        .map_err(|_| HandlerErr::new("bad_params", "year out of range"))?;
    let month0_u32 = u32::try_from(month0)
        .map_err(|_| HandlerErr::new("bad_params", "month0 must be 0..=11"))?;
    let cells = build_month_grid(year_i32, month0_u32, &markers, today)
        .map_err(|e| HandlerErr::new("bad_params", e.to_string()))?;

    let cells_json: Vec<serde_json::Value> = cells
        .iter()
        .map(|c| {
            json!({
                "dateKey": date_key(c.date),
                "day": chrono::Datelike::day(&c.date),
                "inCurrentMonth": c.in_current_month,
                "isToday": c.is_today,
                "marker": c.marker.as_ref().map(marker_json)
            })
        })
        .collect();

    Ok(json!({
        "year": year,
        "month0": month0,
        "cells": cells_json
    }))
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
        "events.create" => Some(with_conn(state, req, events_create)),
        "events.list" => Some(with_conn(state, req, events_list)),
        "events.delete" => Some(with_conn(state, req, events_delete)),
        "calendar.monthGrid" => Some(with_conn(state, req, month_grid)),
        _ => None,
    }
}
