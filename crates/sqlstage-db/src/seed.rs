//! Seeding the users table from CSV

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::DbError;
use crate::models::NewUser;
use crate::session::Session;

/// Headers a seed file must carry
pub const REQUIRED_HEADERS: [&str; 3] = ["name", "email", "age"];

/// Outcome of a seed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub upserted: u64,
    pub skipped: u64,
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    #[serde(default)]
    user_id: Option<String>,
    name: String,
    email: String,
    age: String,
}

impl SeedRow {
    /// Ages must be plain non-negative integers
    fn parse_age(&self) -> Option<f64> {
        let age = self.age.trim();
        if age.is_empty() || !age.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        age.parse::<u32>().ok().map(f64::from)
    }
}

impl Session {
    /// Seed users from a CSV file
    pub async fn seed_from_csv(&mut self, path: impl AsRef<Path>) -> Result<SeedReport, DbError> {
        let path = path.as_ref();
        info!("Seeding users from {}", path.display());
        let file = std::fs::File::open(path)?;
        self.seed_from_reader(file).await
    }

    /// Seed users from any CSV source.
    ///
    /// All rows are written in one transaction; any database error rolls the
    /// whole file back. Rows with an invalid age are skipped.
    pub async fn seed_from_reader<R: Read>(&mut self, source: R) -> Result<SeedReport, DbError> {
        let (users, skipped) = parse_seed(source)?;
        let mut report = SeedReport {
            upserted: 0,
            skipped,
        };

        self.begin().await?;
        for user in users {
            if let Err(e) = self.upsert_user(user).await {
                if let Err(rb) = self.rollback().await {
                    warn!("Rollback after failed seed also failed: {}", rb);
                }
                return Err(e);
            }
            report.upserted += 1;
        }
        self.commit().await?;

        info!(
            "Seed complete: {} upserted, {} skipped",
            report.upserted, report.skipped
        );
        Ok(report)
    }
}

/// Read and validate seed rows, returning the users to write and the skip count
fn parse_seed<R: Read>(source: R) -> Result<(Vec<NewUser>, u64), DbError> {
    let mut reader = csv::Reader::from_reader(source);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(DbError::InvalidSeed(
            "the CSV file is empty or missing a header row".to_string(),
        ));
    }
    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h.trim() == *required))
        .collect();
    if !missing.is_empty() {
        return Err(DbError::InvalidSeed(format!(
            "missing required headers: {}",
            missing.join(", ")
        )));
    }

    let mut users = Vec::new();
    let mut skipped = 0;
    for row in reader.deserialize::<SeedRow>() {
        let row = row?;
        let Some(age) = row.parse_age() else {
            warn!("Skipping row due to invalid age value: {:?}", row.age);
            skipped += 1;
            continue;
        };
        users.push(NewUser {
            user_id: row.user_id.filter(|id| !id.trim().is_empty()),
            name: row.name.trim().to_string(),
            email: row.email.trim().to_string(),
            age,
        });
    }

    Ok((users, skipped))
}
