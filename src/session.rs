use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed status set. Every rostered student carries exactly one of these;
/// `Pending` is the initial value and the only one allowed to remain
/// unresolved ahead of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
    Pending,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<AttendanceStatus> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "leave" => Some(AttendanceStatus::Leave),
            "pending" => Some(AttendanceStatus::Pending),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Leave => "leave",
            AttendanceStatus::Pending => "pending",
        }
    }
}

/// Student-id → status for one (class, date) pair. The key set is fixed at
/// init time: it always equals the roster, and marking can never grow it.
pub type AttendanceSession = BTreeMap<String, AttendanceStatus>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    UnknownStudent { student_id: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::UnknownStudent { student_id } => {
                write!(f, "student not in session roster: {}", student_id)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Derived on every use, never stored; `rate` is the present share of the
/// whole roster, pending included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub present: usize,
    pub absent: usize,
    pub leave: usize,
    pub pending: usize,
    pub total: usize,
    pub rate: u32,
}

pub fn init_session<I>(roster: I) -> AttendanceSession
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    roster
        .into_iter()
        .map(|id| (id.into(), AttendanceStatus::Pending))
        .collect()
}

pub fn summarize(session: &AttendanceSession) -> AttendanceSummary {
    let mut present = 0usize;
    let mut absent = 0usize;
    let mut leave = 0usize;
    let mut pending = 0usize;

    for status in session.values() {
        match status {
            AttendanceStatus::Present => present += 1,
            AttendanceStatus::Absent => absent += 1,
            AttendanceStatus::Leave => leave += 1,
            AttendanceStatus::Pending => pending += 1,
        }
    }

    let total = session.len();
    let rate = if total > 0 {
        ((present as f64 / total as f64) * 100.0).round() as u32
    } else {
        0
    };

    AttendanceSummary {
        present,
        absent,
        leave,
        pending,
        total,
        rate,
    }
}

/// Returns a new session with exactly one entry replaced. The input is left
/// untouched, including when the id is rejected.
pub fn mark_status(
    session: &AttendanceSession,
    student_id: &str,
    status: AttendanceStatus,
) -> Result<AttendanceSession, SessionError> {
    if !session.contains_key(student_id) {
        return Err(SessionError::UnknownStudent {
            student_id: student_id.to_string(),
        });
    }
    let mut next = session.clone();
    next.insert(student_id.to_string(), status);
    Ok(next)
}

/// Sets every existing entry to `status`, preserving the key set.
pub fn mark_all(session: &AttendanceSession, status: AttendanceStatus) -> AttendanceSession {
    session.keys().map(|id| (id.clone(), status)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_student_session() -> AttendanceSession {
        let mut s = init_session(["s1", "s2", "s3", "s4"]);
        s = mark_status(&s, "s1", AttendanceStatus::Present).expect("mark s1");
        s = mark_status(&s, "s2", AttendanceStatus::Present).expect("mark s2");
        s = mark_status(&s, "s3", AttendanceStatus::Absent).expect("mark s3");
        s
    }

    #[test]
    fn empty_session_summary_is_all_zero() {
        let summary = summarize(&AttendanceSession::new());
        assert_eq!(
            summary,
            AttendanceSummary {
                present: 0,
                absent: 0,
                leave: 0,
                pending: 0,
                total: 0,
                rate: 0
            }
        );
    }

    #[test]
    fn init_starts_everyone_pending() {
        let s = init_session(["a", "b", "c"]);
        let summary = summarize(&s);
        assert_eq!(summary.pending, 3);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.rate, 0);
    }

    #[test]
    fn mixed_session_counts_and_rate() {
        let summary = summarize(&four_student_session());
        assert_eq!(summary.present, 2);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.leave, 0);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.rate, 50);
    }

    #[test]
    fn rate_rounds_half_up() {
        // 1 of 3 present = 33.33 -> 33; 2 of 3 = 66.67 -> 67.
        let mut s = init_session(["a", "b", "c"]);
        s = mark_status(&s, "a", AttendanceStatus::Present).expect("mark");
        assert_eq!(summarize(&s).rate, 33);
        s = mark_status(&s, "b", AttendanceStatus::Present).expect("mark");
        assert_eq!(summarize(&s).rate, 67);
        // 1 of 8 = 12.5 rounds up.
        let mut s = init_session(["a", "b", "c", "d", "e", "f", "g", "h"]);
        s = mark_status(&s, "a", AttendanceStatus::Present).expect("mark");
        assert_eq!(summarize(&s).rate, 13);
    }

    #[test]
    fn mark_all_resolves_every_entry() {
        let s = mark_all(&four_student_session(), AttendanceStatus::Absent);
        let summary = summarize(&s);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.absent, summary.total);
        assert_eq!(summary.total, 4);
    }

    #[test]
    fn unknown_student_rejected_without_mutation() {
        let original = four_student_session();
        let before = original.clone();
        let err = mark_status(&original, "s9", AttendanceStatus::Present).unwrap_err();
        assert_eq!(
            err,
            SessionError::UnknownStudent {
                student_id: "s9".to_string()
            }
        );
        assert_eq!(original, before);
    }

    #[test]
    fn marking_never_changes_the_key_set() {
        let s = four_student_session();
        let keys: Vec<_> = s.keys().cloned().collect();
        let marked = mark_status(&s, "s4", AttendanceStatus::Leave).expect("mark");
        assert_eq!(marked.keys().cloned().collect::<Vec<_>>(), keys);
        let all = mark_all(&s, AttendanceStatus::Present);
        assert_eq!(all.keys().cloned().collect::<Vec<_>>(), keys);
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Leave,
            AttendanceStatus::Pending,
        ] {
            assert_eq!(AttendanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttendanceStatus::parse("late"), None);
    }
}
