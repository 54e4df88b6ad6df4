//! Arbitrary query execution

use crate::error::DbError;
use crate::models::{QueryParam, Record};
use crate::session::Session;
use crate::utils::row_to_record;

impl Session {
    /// Run literal query text with `params` bound to its `?` placeholders, in
    /// order, and collect every row as a [`Record`]
    pub async fn fetch_records(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Record>, DbError> {
        let mut statement = sqlx::query(query);
        for param in params {
            statement = match param {
                QueryParam::Integer(v) => statement.bind(*v),
                QueryParam::Real(v) => statement.bind(*v),
                QueryParam::Text(v) => statement.bind(v.as_str()),
                QueryParam::Null => statement.bind(None::<String>),
            };
        }
        let rows = statement.fetch_all(&mut self.conn).await?;

        rows.iter()
            .map(|row| row_to_record(row).map_err(DbError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::{NewUser, QueryParam};
    use crate::session::Session;

    #[tokio::test]
    async fn test_fetch_records_keeps_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("users.db").display());
        let mut session = Session::open_and_migrate(&url).await.unwrap();

        session
            .upsert_user(NewUser {
                user_id: Some("u1".to_string()),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                age: 36.0,
            })
            .await
            .unwrap();

        let records = session
            .fetch_records(
                "SELECT user_id, age, NULL AS nickname, COUNT(*) AS n FROM users",
                &[],
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["user_id"], json!("u1"));
        assert_eq!(record["age"], json!(36.0));
        assert_eq!(record["nickname"], json!(null));
        assert_eq!(record["n"], json!(1));
    }

    #[tokio::test]
    async fn test_fetch_records_rejects_bad_sql() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("users.db").display());
        let mut session = Session::open_and_migrate(&url).await.unwrap();

        assert!(session.fetch_records("SELECT * FROM usersm", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_records_binds_params() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("users.db").display());
        let mut session = Session::open_and_migrate(&url).await.unwrap();

        for (id, name, age) in [("u1", "Ada", 22.0), ("u2", "Alan", 41.0), ("u3", "Grace", 30.0)] {
            session
                .upsert_user(NewUser {
                    user_id: Some(id.to_string()),
                    name: name.to_string(),
                    email: format!("{}@example.com", id),
                    age,
                })
                .await
                .unwrap();
        }

        let older = session
            .fetch_records(
                "SELECT name FROM users WHERE age > ? ORDER BY age",
                &[QueryParam::Integer(25)],
            )
            .await
            .unwrap();
        let names: Vec<_> = older.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("Grace"), json!("Alan")]);

        let by_name = session
            .fetch_records(
                "SELECT user_id FROM users WHERE name = ? AND age < ?",
                &["Ada".into(), 30.5.into()],
            )
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0]["user_id"], json!("u1"));
    }

    #[test]
    fn test_query_param_from_str() {
        assert_eq!("25".parse::<QueryParam>().unwrap(), QueryParam::Integer(25));
        assert_eq!("2.5".parse::<QueryParam>().unwrap(), QueryParam::Real(2.5));
        assert_eq!("NULL".parse::<QueryParam>().unwrap(), QueryParam::Null);
        assert_eq!(
            "ada@example.com".parse::<QueryParam>().unwrap(),
            QueryParam::Text("ada@example.com".to_string())
        );
    }
}
