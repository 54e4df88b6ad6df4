//! Subcommand handlers
//!
//! Every handler builds the pipeline it needs from the configuration, runs
//! one operation through it and prints results as JSON lines on stdout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use sqlstage_core::{
    CacheStage, Call, ConnectStage, FetchUsers, Operation, Pipeline, PipelineError, QueryCache,
    RetryStage, RunQuery, SqliteConnector, TransactionStage, UpdateUserEmail, UserByAge,
    UsersOlderThan, spawn_purge_task,
};
use sqlstage_db::{QueryParam, Record, SeedReport, Session, User};
use tracing::info;

use crate::config::Config;

/// Print one value as a JSON line
fn emit<T: Serialize>(value: &T) -> Result<(), PipelineError> {
    let line = serde_json::to_string(value).map_err(|e| PipelineError::Operation(e.to_string()))?;
    println!("{}", line);
    Ok(())
}

/// Connector for the configured database file, creating its directory
async fn connector(config: &Config) -> Result<SqliteConnector> {
    if let Some(parent) = Path::new(&config.database.path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    Ok(SqliteConnector::for_path(&config.database.path).with_migrations())
}

fn log_pipeline<C: Send, T: Send>(pipeline: &Pipeline<C, T>) {
    info!("Pipeline: {}", pipeline.stage_names().join(" -> "));
}

// ==================== Operations local to the CLI ====================

struct SeedCsv {
    path: String,
}

#[async_trait]
impl Operation<Session, SeedReport> for SeedCsv {
    async fn run(&self, call: &mut Call<Session>) -> Result<SeedReport, PipelineError> {
        Ok(call.connection()?.seed_from_csv(&self.path).await?)
    }
}

/// Streams users in batches and prints those older than `min_age`
struct PrintOlderUsers {
    batch_size: usize,
    min_age: f64,
}

#[async_trait]
impl Operation<Session, u64> for PrintOlderUsers {
    async fn run(&self, call: &mut Call<Session>) -> Result<u64, PipelineError> {
        let mut batches = call.connection()?.stream_users_in_batches(self.batch_size)?;
        let mut printed = 0;
        while let Some(batch) = batches.try_next().await? {
            for user in batch.iter().filter(|u| u.age > self.min_age) {
                emit(user)?;
                printed += 1;
            }
        }
        Ok(printed)
    }
}

/// Prints one JSON array per page
struct PrintPages {
    page_size: i64,
}

#[async_trait]
impl Operation<Session, u64> for PrintPages {
    async fn run(&self, call: &mut Call<Session>) -> Result<u64, PipelineError> {
        let mut pages = call.connection()?.lazy_paginate(self.page_size)?;
        let mut count = 0;
        while let Some(page) = pages.try_next().await? {
            emit(&page)?;
            count += 1;
        }
        Ok(count)
    }
}

struct AverageAge;

#[async_trait]
impl Operation<Session, Option<f64>> for AverageAge {
    async fn run(&self, call: &mut Call<Session>) -> Result<Option<f64>, PipelineError> {
        Ok(call.connection()?.average_age().await?)
    }
}

// ==================== Handlers ====================

pub async fn seed(config: &Config, csv: &str) -> Result<()> {
    let pipeline: Pipeline<Session, SeedReport> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .build();
    log_pipeline(&pipeline);

    let op = SeedCsv {
        path: csv.to_string(),
    };
    let report = pipeline.execute(&mut Call::new(), &op).await?;
    emit(&report)?;
    Ok(())
}

pub async fn user_by_age(config: &Config, age: f64) -> Result<()> {
    let pipeline: Pipeline<Session, Option<User>> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .build();
    log_pipeline(&pipeline);

    let user = pipeline.execute(&mut Call::new(), &UserByAge { age }).await?;
    emit(&user)?;
    Ok(())
}

pub async fn update_email(config: &Config, user_id: String, email: String) -> Result<()> {
    let pipeline: Pipeline<Session, ()> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .stage(TransactionStage::new())
        .build();
    log_pipeline(&pipeline);

    let op = UpdateUserEmail {
        user_id,
        new_email: email,
    };
    pipeline.execute(&mut Call::new(), &op).await?;
    emit(&json!({ "user_id": op.user_id, "email": op.new_email, "updated": true }))?;
    Ok(())
}

pub async fn fetch_users(config: &Config) -> Result<()> {
    let pipeline: Pipeline<Session, Vec<User>> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .stage(RetryStage::new(config.retry.policy()))
        .build();
    log_pipeline(&pipeline);

    let users = pipeline.execute(&mut Call::new(), &FetchUsers).await?;
    for user in &users {
        emit(user)?;
    }
    Ok(())
}

pub async fn query(
    config: &Config,
    sql: &str,
    params: &[QueryParam],
    repeat: u32,
    interval_ms: u64,
) -> Result<()> {
    let cache = Arc::new(QueryCache::new(config.cache.ttl()));
    let purge = spawn_purge_task(cache.clone(), cache.ttl());

    let pipeline: Pipeline<Session, Vec<Record>> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .stage(RetryStage::new(config.retry.policy()))
        .stage(TransactionStage::new())
        .stage(CacheStage::new(cache.clone()))
        .build();
    log_pipeline(&pipeline);

    let runs = repeat.max(1);
    for run in 1..=runs {
        let mut call = Call::with_query(sql).with_params(params.to_vec());
        let rows = pipeline.execute(&mut call, &RunQuery).await?;
        emit(&json!({ "run": run, "rows": rows }))?;
        if run < runs && interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    purge.abort();
    emit(&json!({ "cache": cache.stats() }))?;
    cache.clear();
    Ok(())
}

pub async fn stream(config: &Config, batch_size: usize, min_age: f64) -> Result<()> {
    let pipeline: Pipeline<Session, u64> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .build();
    log_pipeline(&pipeline);

    let op = PrintOlderUsers {
        batch_size,
        min_age,
    };
    let printed = pipeline.execute(&mut Call::new(), &op).await?;
    info!("Printed {} users older than {}", printed, min_age);
    Ok(())
}

pub async fn paginate(config: &Config, page_size: i64) -> Result<()> {
    let pipeline: Pipeline<Session, u64> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .build();
    log_pipeline(&pipeline);

    let pages = pipeline
        .execute(&mut Call::new(), &PrintPages { page_size })
        .await?;
    info!("Printed {} pages", pages);
    Ok(())
}

pub async fn average_age(config: &Config) -> Result<()> {
    let pipeline: Pipeline<Session, Option<f64>> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .build();
    log_pipeline(&pipeline);

    let average = pipeline.execute(&mut Call::new(), &AverageAge).await?;
    emit(&json!({ "average_age": average }))?;
    Ok(())
}

/// Two independent pipelines, each with its own connection, run concurrently
pub async fn concurrent(config: &Config, min_age: f64) -> Result<()> {
    let pipeline: Pipeline<Session, Vec<User>> = Pipeline::builder()
        .stage(ConnectStage::new(connector(config).await?))
        .build();
    log_pipeline(&pipeline);

    let mut all_call = Call::new();
    let mut older_call = Call::new();
    let older_op = UsersOlderThan { age: min_age };
    let (everyone, older) = tokio::join!(
        pipeline.execute(&mut all_call, &FetchUsers),
        pipeline.execute(&mut older_call, &older_op),
    );

    emit(&json!({ "users": everyone?, "older_users": older? }))?;
    Ok(())
}
