use crate::calc::{ExamRef, MarkRow};
use crate::error::{persistence, PortalError};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub student_id: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRow {
    pub id: i64,
    pub name: String,
    pub published: bool,
    pub created_at: Option<String>,
}

impl ExamRow {
    pub fn to_ref(&self) -> ExamRef {
        ExamRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// The persisted shape of a mark: no joined display fields, no blanks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub student_id: String,
    pub exam_id: i64,
    pub mcq: i64,
    pub structured: i64,
    pub essay: i64,
    pub absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamOrder {
    OldestFirst,
    NewestFirst,
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn list_students(conn: &Connection) -> Result<Vec<StudentRow>, PortalError> {
    let mut stmt = conn
        .prepare("SELECT student_id, name, password FROM students ORDER BY student_id")
        .map_err(persistence("db_query_failed", "students"))?;
    stmt.query_map([], |r| {
        Ok(StudentRow {
            student_id: r.get(0)?,
            name: r.get(1)?,
            password: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(persistence("db_query_failed", "students"))
}

pub fn get_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, PortalError> {
    conn.query_row(
        "SELECT student_id, name, password FROM students WHERE student_id = ?",
        [student_id],
        |r| {
            Ok(StudentRow {
                student_id: r.get(0)?,
                name: r.get(1)?,
                password: r.get(2)?,
            })
        },
    )
    .optional()
    .map_err(persistence("db_query_failed", "students"))
}

pub fn insert_student(conn: &Connection, student: &StudentRow) -> Result<(), PortalError> {
    let res = conn.execute(
        "INSERT INTO students(student_id, name, password) VALUES(?, ?, ?)",
        (&student.student_id, &student.name, &student.password),
    );
    match res {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(f, _)) if f.code == ErrorCode::ConstraintViolation => {
            Err(PortalError::UniquenessViolation {
                student_id: student.student_id.clone(),
            })
        }
        Err(e) => Err(persistence("db_insert_failed", "students")(e)),
    }
}

/// Removes the student and every mark they own in one transaction.
/// Returns the number of marks removed.
pub fn delete_student(conn: &Connection, student_id: &str) -> Result<usize, PortalError> {
    if get_student(conn, student_id)?.is_none() {
        return Err(PortalError::NotFound("student"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(persistence("db_tx_failed", "students"))?;
    let marks_deleted = tx
        .execute("DELETE FROM marks WHERE student_id = ?", [student_id])
        .map_err(persistence("db_delete_failed", "marks"))?;
    tx.execute("DELETE FROM students WHERE student_id = ?", [student_id])
        .map_err(persistence("db_delete_failed", "students"))?;
    tx.commit().map_err(persistence("db_tx_failed", "students"))?;
    Ok(marks_deleted)
}

fn exam_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ExamRow> {
    Ok(ExamRow {
        id: r.get(0)?,
        name: r.get(1)?,
        published: r.get::<_, i64>(2)? != 0,
        created_at: r.get(3)?,
    })
}

pub fn list_exams(conn: &Connection, order: ExamOrder) -> Result<Vec<ExamRow>, PortalError> {
    let sql = match order {
        ExamOrder::OldestFirst => "SELECT id, name, published, created_at FROM exams ORDER BY id ASC",
        ExamOrder::NewestFirst => "SELECT id, name, published, created_at FROM exams ORDER BY id DESC",
    };
    let mut stmt = conn
        .prepare(sql)
        .map_err(persistence("db_query_failed", "exams"))?;
    stmt.query_map([], exam_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(persistence("db_query_failed", "exams"))
}

pub fn list_published_exams(conn: &Connection) -> Result<Vec<ExamRow>, PortalError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, published, created_at FROM exams
             WHERE published = 1
             ORDER BY id ASC",
        )
        .map_err(persistence("db_query_failed", "exams"))?;
    stmt.query_map([], exam_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(persistence("db_query_failed", "exams"))
}

pub fn get_exam(conn: &Connection, exam_id: i64) -> Result<Option<ExamRow>, PortalError> {
    conn.query_row(
        "SELECT id, name, published, created_at FROM exams WHERE id = ?",
        [exam_id],
        exam_from_row,
    )
    .optional()
    .map_err(persistence("db_query_failed", "exams"))
}

pub fn insert_exam(conn: &Connection, name: &str) -> Result<ExamRow, PortalError> {
    let created_at = now_stamp();
    conn.execute(
        "INSERT INTO exams(name, published, created_at) VALUES(?, 0, ?)",
        (name, &created_at),
    )
    .map_err(persistence("db_insert_failed", "exams"))?;
    Ok(ExamRow {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        published: false,
        created_at: Some(created_at),
    })
}

pub fn set_exam_published(
    conn: &Connection,
    exam_id: i64,
    published: bool,
) -> Result<(), PortalError> {
    let changed = conn
        .execute(
            "UPDATE exams SET published = ? WHERE id = ?",
            (if published { 1 } else { 0 }, exam_id),
        )
        .map_err(persistence("db_update_failed", "exams"))?;
    if changed == 0 {
        return Err(PortalError::NotFound("exam"));
    }
    Ok(())
}

/// Removes the exam and all of its marks in one transaction.
/// Returns the number of marks removed.
pub fn delete_exam(conn: &Connection, exam_id: i64) -> Result<usize, PortalError> {
    if get_exam(conn, exam_id)?.is_none() {
        return Err(PortalError::NotFound("exam"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(persistence("db_tx_failed", "exams"))?;
    let marks_deleted = tx
        .execute("DELETE FROM marks WHERE exam_id = ?", [exam_id])
        .map_err(persistence("db_delete_failed", "marks"))?;
    tx.execute("DELETE FROM exams WHERE id = ?", [exam_id])
        .map_err(persistence("db_delete_failed", "exams"))?;
    tx.commit().map_err(persistence("db_tx_failed", "exams"))?;
    Ok(marks_deleted)
}

const MARK_ROW_SELECT: &str = "SELECT m.student_id, s.name, m.exam_id, e.name,
            m.mcq, m.structured, m.essay, m.absent
     FROM marks m
     LEFT JOIN students s ON s.student_id = m.student_id
     LEFT JOIN exams e ON e.id = m.exam_id";

fn mark_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<MarkRow> {
    Ok(MarkRow {
        student_id: r.get(0)?,
        student_name: r.get(1)?,
        exam_id: r.get(2)?,
        exam_name: r.get(3)?,
        mcq: r.get(4)?,
        structured: r.get(5)?,
        essay: r.get(6)?,
        absent: r.get::<_, i64>(7)? != 0,
    })
}

pub fn marks_for_exam(conn: &Connection, exam_id: i64) -> Result<Vec<MarkRow>, PortalError> {
    let sql = format!("{} WHERE m.exam_id = ? ORDER BY m.student_id", MARK_ROW_SELECT);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(persistence("db_query_failed", "marks"))?;
    stmt.query_map([exam_id], mark_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(persistence("db_query_failed", "marks"))
}

/// Marks for a set of exams, ordered by exam then student so downstream
/// tie-breaking is reproducible.
pub fn marks_for_exams(conn: &Connection, exam_ids: &[i64]) -> Result<Vec<MarkRow>, PortalError> {
    if exam_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; exam_ids.len()].join(",");
    let sql = format!(
        "{} WHERE m.exam_id IN ({}) ORDER BY m.exam_id, m.student_id",
        MARK_ROW_SELECT, placeholders
    );
    let bind_values: Vec<Value> = exam_ids.iter().map(|id| Value::Integer(*id)).collect();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(persistence("db_query_failed", "marks"))?;
    stmt.query_map(params_from_iter(bind_values), mark_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(persistence("db_query_failed", "marks"))
}

pub fn insert_marks(conn: &Connection, marks: &[MarkRecord]) -> Result<usize, PortalError> {
    let stamp = now_stamp();
    let mut stmt = conn
        .prepare(
            "INSERT INTO marks(student_id, exam_id, mcq, structured, essay, absent, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .map_err(persistence("db_insert_failed", "marks"))?;
    for m in marks {
        stmt.execute((
            &m.student_id,
            m.exam_id,
            m.mcq,
            m.structured,
            m.essay,
            if m.absent { 1 } else { 0 },
            &stamp,
        ))
        .map_err(persistence("db_insert_failed", "marks"))?;
    }
    Ok(marks.len())
}

/// Batch upsert keyed by (student_id, exam_id). All rows commit or none do.
pub fn upsert_marks(conn: &Connection, marks: &[MarkRecord]) -> Result<usize, PortalError> {
    let stamp = now_stamp();
    let tx = conn
        .unchecked_transaction()
        .map_err(persistence("db_tx_failed", "marks"))?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO marks(student_id, exam_id, mcq, structured, essay, absent, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, exam_id) DO UPDATE SET
                   mcq = excluded.mcq,
                   structured = excluded.structured,
                   essay = excluded.essay,
                   absent = excluded.absent,
                   updated_at = excluded.updated_at",
            )
            .map_err(persistence("db_upsert_failed", "marks"))?;
        for m in marks {
            stmt.execute((
                &m.student_id,
                m.exam_id,
                m.mcq,
                m.structured,
                m.essay,
                if m.absent { 1 } else { 0 },
                &stamp,
            ))
            .map_err(persistence("db_upsert_failed", "marks"))?;
        }
    }
    // Dropping an uncommitted transaction rolls it back, so an early `?` above discards the batch.
    tx.commit().map_err(persistence("db_tx_failed", "marks"))?;
    Ok(marks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn student(id: &str, name: &str) -> StudentRow {
        StudentRow {
            student_id: id.to_string(),
            name: name.to_string(),
            password: "pw".to_string(),
        }
    }

    fn record(student_id: &str, exam_id: i64, mcq: i64) -> MarkRecord {
        MarkRecord {
            student_id: student_id.to_string(),
            exam_id,
            mcq,
            structured: 0,
            essay: 0,
            absent: false,
        }
    }

    #[test]
    fn duplicate_student_is_a_uniqueness_violation() {
        let conn = open();
        insert_student(&conn, &student("ST001", "Ana")).expect("insert");
        let e = insert_student(&conn, &student("ST001", "Other")).expect_err("duplicate");
        assert!(matches!(e, PortalError::UniquenessViolation { .. }));
        assert_eq!(e.code(), "duplicate_student");
        assert_eq!(list_students(&conn).expect("list").len(), 1);
    }

    #[test]
    fn students_list_in_id_order() {
        let conn = open();
        insert_student(&conn, &student("ST002", "Ben")).expect("insert");
        insert_student(&conn, &student("ST001", "Ana")).expect("insert");
        let ids: Vec<String> = list_students(&conn)
            .expect("list")
            .into_iter()
            .map(|s| s.student_id)
            .collect();
        assert_eq!(ids, vec!["ST001", "ST002"]);
    }

    #[test]
    fn exam_ids_increase_and_are_not_reused() {
        let conn = open();
        let a = insert_exam(&conn, "A").expect("a");
        let b = insert_exam(&conn, "B").expect("b");
        assert!(b.id > a.id);
        delete_exam(&conn, b.id).expect("delete");
        let c = insert_exam(&conn, "C").expect("c");
        assert!(c.id > b.id);

        let newest: Vec<i64> = list_exams(&conn, ExamOrder::NewestFirst)
            .expect("list")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(newest, vec![c.id, a.id]);
    }

    #[test]
    fn deleting_student_cascades_to_marks() {
        let conn = open();
        insert_student(&conn, &student("ST001", "Ana")).expect("insert");
        insert_student(&conn, &student("ST002", "Ben")).expect("insert");
        let exam = insert_exam(&conn, "Mid-Term").expect("exam");
        insert_marks(&conn, &[record("ST001", exam.id, 5), record("ST002", exam.id, 7)])
            .expect("marks");

        assert_eq!(delete_student(&conn, "ST001").expect("delete"), 1);
        let left = marks_for_exam(&conn, exam.id).expect("marks");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].student_id, "ST002");
        assert!(matches!(
            delete_student(&conn, "ST001"),
            Err(PortalError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_exam_cascades_to_marks() {
        let conn = open();
        insert_student(&conn, &student("ST001", "Ana")).expect("insert");
        let exam = insert_exam(&conn, "Mid-Term").expect("exam");
        insert_marks(&conn, &[record("ST001", exam.id, 5)]).expect("marks");
        assert_eq!(delete_exam(&conn, exam.id).expect("delete"), 1);
        assert!(marks_for_exams(&conn, &[exam.id]).expect("marks").is_empty());
    }

    #[test]
    fn upsert_is_all_or_nothing() {
        let conn = open();
        insert_student(&conn, &student("ST001", "Ana")).expect("insert");
        let exam = insert_exam(&conn, "Mid-Term").expect("exam");
        insert_marks(&conn, &[record("ST001", exam.id, 1)]).expect("seed");

        // Second row references a student that does not exist: the foreign key fails the batch.
        let batch = vec![record("ST001", exam.id, 30), record("ST404", exam.id, 10)];
        let e = upsert_marks(&conn, &batch).expect_err("fk failure");
        assert_eq!(e.code(), "db_upsert_failed");

        let rows = marks_for_exam(&conn, exam.id).expect("marks");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mcq, 1);

        upsert_marks(&conn, &[record("ST001", exam.id, 30)]).expect("upsert");
        let rows = marks_for_exam(&conn, exam.id).expect("marks");
        assert_eq!(rows[0].mcq, 30);
        assert_eq!(rows[0].student_name.as_deref(), Some("Ana"));
        assert_eq!(rows[0].exam_name.as_deref(), Some("Mid-Term"));
    }

    #[test]
    fn publish_flag_and_published_listing() {
        let conn = open();
        let a = insert_exam(&conn, "A").expect("a");
        let b = insert_exam(&conn, "B").expect("b");
        set_exam_published(&conn, b.id, true).expect("publish");
        let published = list_published_exams(&conn).expect("published");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, b.id);
        assert!(!get_exam(&conn, a.id).expect("get").expect("exists").published);
        assert!(matches!(
            set_exam_published(&conn, 999, true),
            Err(PortalError::NotFound(_))
        ));
    }
}
