//! End-to-end tests against a real database.
//!
//! These run only when `DATABASE_URL` is set (a `.env` file works too) and
//! are skipped otherwise, so the suite stays green in offline environments.

use fluentpg::{table, transaction, Binding, DbError, DbResult, RowExt, TransactionExt};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_postgres::NoTls;

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL").ok()
}

fn unique_table(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    format!("{prefix}_{}_{nanos}", std::process::id())
}

async fn connect(url: &str) -> DbResult<tokio_postgres::Client> {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
        .await
        .map_err(DbError::from_tx_error)?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn raw(client: &tokio_postgres::Client, sql: &str) -> DbResult<()> {
    client
        .execute(sql, &[])
        .await
        .map_err(|e| DbError::from_db_error(e, sql, &[]))?;
    Ok(())
}

#[tokio::test]
async fn crud_roundtrip() -> DbResult<()> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping crud_roundtrip");
        return Ok(());
    };
    let client = connect(&url).await?;
    let tbl = unique_table("fluentpg_crud");
    raw(
        &client,
        &format!("CREATE TABLE {tbl} (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL, score INT)"),
    )
    .await?;

    let id: i64 = table(&tbl)
        .set("name", "alice")
        .set("score", 10i32)
        .insert_get_id(&client)
        .await?;
    table(&tbl).set("name", "bob").set("score", 20i32).insert(&client).await?;

    assert_eq!(table(&tbl).count(&client).await?, 2);

    let row = table(&tbl).find(&client, id).await?.unwrap();
    let name: String = row.try_get_column("name")?;
    assert_eq!(name, "alice");

    let updated = table(&tbl)
        .set("score", 15i32)
        .eq("id", id)
        .update(&client)
        .await?;
    assert_eq!(updated, 1);

    let total: Option<i64> = table(&tbl).sum(&client, "score").await?;
    assert_eq!(total, Some(35));

    let deleted = table(&tbl).eq("name", "bob").delete(&client).await?;
    assert_eq!(deleted, 1);
    assert_eq!(table(&tbl).count(&client).await?, 1);

    raw(&client, &format!("DROP TABLE {tbl}")).await?;
    Ok(())
}

#[tokio::test]
async fn chunk_pages_through_all_rows() -> DbResult<()> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping chunk_pages_through_all_rows");
        return Ok(());
    };
    let client = connect(&url).await?;
    let tbl = unique_table("fluentpg_chunk");
    raw(
        &client,
        &format!("CREATE TABLE {tbl} (id BIGSERIAL PRIMARY KEY, n INT NOT NULL)"),
    )
    .await?;

    let rows: Vec<Vec<Binding>> = (0..250i32).map(|n| vec![Binding::new(n)]).collect();
    let inserted = table(&tbl).insert_many(&client, &["n"], rows).await?;
    assert_eq!(inserted, 250);

    // 250 rows at size 100: pages of 100, 100, 50, then stop on the short page.
    let mut sizes = Vec::new();
    table(&tbl)
        .chunk(&client, 100, |rows| {
            sizes.push(rows.len());
            async move { Ok(true) }
        })
        .await?;
    assert_eq!(sizes, vec![100, 100, 50]);

    // Ok(false) stops after the first page.
    let mut calls = 0u32;
    table(&tbl)
        .chunk(&client, 100, |_rows| {
            calls += 1;
            async move { Ok(false) }
        })
        .await?;
    assert_eq!(calls, 1);

    raw(&client, &format!("DROP TABLE {tbl}")).await?;
    Ok(())
}

#[tokio::test]
async fn transaction_rolls_back_on_error() -> DbResult<()> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping transaction_rolls_back_on_error");
        return Ok(());
    };
    let mut client = connect(&url).await?;
    let tbl = unique_table("fluentpg_tx");
    raw(
        &client,
        &format!("CREATE TABLE {tbl} (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL)"),
    )
    .await?;

    let result: DbResult<()> = transaction!(&mut client, tx, {
        table(&tbl).set("name", "will-vanish").insert(&tx).await?;
        Err(DbError::validation("forced failure"))
    });
    assert!(result.is_err());
    assert_eq!(table(&tbl).count(&client).await?, 0);

    let committed: DbResult<u64> = transaction!(&mut client, tx, {
        table(&tbl).set("name", "persists").insert(&tx).await
    });
    assert_eq!(committed?, 1);
    assert_eq!(table(&tbl).count(&client).await?, 1);

    raw(&client, &format!("DROP TABLE {tbl}")).await?;
    Ok(())
}

#[tokio::test]
async fn savepoint_isolates_inner_failure() -> DbResult<()> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping savepoint_isolates_inner_failure");
        return Ok(());
    };
    let mut client = connect(&url).await?;
    let tbl = unique_table("fluentpg_sp");
    raw(
        &client,
        &format!("CREATE TABLE {tbl} (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL)"),
    )
    .await?;

    let result: DbResult<()> = transaction!(&mut client, tx, {
        table(&tbl).set("name", "outer").insert(&tx).await?;

        let inner: DbResult<()> = fluentpg::savepoint!(tx, "inner", sp, {
            table(&tbl).set("name", "inner").insert(&sp).await?;
            Err(DbError::validation("forced inner failure"))
        });
        assert!(inner.is_err());

        Ok(())
    });
    result?;

    assert_eq!(table(&tbl).count(&client).await?, 1);
    let row = table(&tbl).first(&client).await?.unwrap();
    let name: String = row.try_get_column("name")?;
    assert_eq!(name, "outer");

    // Explicit savepoint API: release keeps the inner write.
    let mut tx = client.transaction().await.map_err(DbError::from_tx_error)?;
    let sp = tx.savepoint_named("explicit").await?;
    table(&tbl).set("name", "released").insert(&sp).await?;
    sp.release().await?;
    tx.commit().await.map_err(DbError::from_tx_error)?;
    assert_eq!(table(&tbl).count(&client).await?, 2);

    raw(&client, &format!("DROP TABLE {tbl}")).await?;
    Ok(())
}

#[cfg(feature = "pool")]
#[tokio::test]
async fn pooled_connection_transaction() -> DbResult<()> {
    use fluentpg::Connection;

    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping pooled_connection_transaction");
        return Ok(());
    };
    let conn = Connection::connect(&url)?;
    let client = conn.client().await?;
    let tbl = unique_table("fluentpg_pool");
    client
        .execute(
            &format!("CREATE TABLE {tbl} (id BIGSERIAL PRIMARY KEY, n INT NOT NULL)"),
            &[],
        )
        .await
        .map_err(DbError::from_tx_error)?;

    let tbl_for_tx = tbl.clone();
    let inserted = conn
        .transaction(move |tx| {
            let tbl = tbl_for_tx.clone();
            Box::pin(async move {
                table(&tbl).set("n", 1i32).insert(tx).await?;
                table(&tbl).set("n", 2i32).insert(tx).await
            })
        })
        .await?;
    assert_eq!(inserted, 1);
    assert_eq!(conn.table(&tbl).count(&client).await?, 2);

    client
        .execute(&format!("DROP TABLE {tbl}"), &[])
        .await
        .map_err(DbError::from_tx_error)?;
    Ok(())
}
