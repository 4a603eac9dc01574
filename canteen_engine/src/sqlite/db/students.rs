use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Money, Student, StudentId, TargetSelector},
    traits::{AccountApiError, CanteenDbError},
};

pub async fn fetch_student(
    student_id: &StudentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Student>, AccountApiError> {
    let student = sqlx::query_as("SELECT * FROM students WHERE id = $1")
        .bind(student_id)
        .fetch_optional(conn)
        .await?;
    Ok(student)
}

/// Sets the cached balance for the student. Only the ledger posting path may call this, and only
/// inside the transaction that appends the justifying ledger entry.
pub(crate) async fn set_balance(
    student_id: &StudentId,
    balance: Money,
    conn: &mut SqliteConnection,
) -> Result<(), AccountApiError> {
    let _ = sqlx::query("UPDATE students SET balance = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(balance)
        .bind(student_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Resolves a target selector into the ids of currently eligible (active + approved) students.
///
/// An explicit student list is strict: naming a student that does not exist, or exists but may
/// not transact, is a validation error rather than a silent drop.
pub async fn eligible_ids(
    selector: &TargetSelector,
    conn: &mut SqliteConnection,
) -> Result<Vec<StudentId>, CanteenDbError> {
    let ids: Vec<(StudentId,)> = match selector {
        TargetSelector::All => {
            sqlx::query_as("SELECT id FROM students WHERE active = 1 AND approved = 1 ORDER BY id")
                .fetch_all(&mut *conn)
                .await?
        },
        TargetSelector::Students(requested) => {
            if requested.is_empty() {
                return Err(CanteenDbError::Validation("an explicit student list cannot be empty".to_string()));
            }
            let mut builder =
                QueryBuilder::new("SELECT id FROM students WHERE active = 1 AND approved = 1 AND id IN (");
            let mut values = builder.separated(", ");
            for id in requested {
                values.push_bind(id.as_str());
            }
            builder.push(") ORDER BY id");
            let found: Vec<(StudentId,)> = builder.build_query_as().fetch_all(&mut *conn).await?;
            let missing = requested
                .iter()
                .filter(|id| !found.iter().any(|(f,)| &f == id))
                .map(|id| id.to_string())
                .collect::<Vec<String>>();
            if !missing.is_empty() {
                return Err(CanteenDbError::Validation(format!(
                    "unknown or ineligible students: {}",
                    missing.join(", ")
                )));
            }
            found
        },
        TargetSelector::Department(department) => {
            sqlx::query_as(
                "SELECT id FROM students WHERE active = 1 AND approved = 1 AND department = $1 ORDER BY id",
            )
            .bind(department)
            .fetch_all(&mut *conn)
            .await?
        },
        TargetSelector::Year(year) => {
            sqlx::query_as("SELECT id FROM students WHERE active = 1 AND approved = 1 AND year = $1 ORDER BY id")
                .bind(year)
                .fetch_all(&mut *conn)
                .await?
        },
    };
    trace!("🧑️ Selector [{selector}] resolved to {} students", ids.len());
    Ok(ids.into_iter().map(|(id,)| id).collect())
}
