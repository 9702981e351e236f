//! Store bootstrap: provider tables, ZIP centroids and the distance macro.

use std::path::Path;

use anyhow::{Context, anyhow};
use duckdb::{Connection, params};
use serde::Serialize;

use crate::cli::InitArgs;
use crate::geo;
use crate::schema::{PROVIDER_SCHEMA, SchemaDescriptor};
use crate::storage::{StoragePaths, file_present_nonempty};

const ZIP_CENTROIDS_DDL: &str =
    "CREATE TABLE IF NOT EXISTS zip_centroids (zip5 TEXT PRIMARY KEY, lat DOUBLE, lon DOUBLE)";

/// Great-circle distance in kilometres between two ZIP centroids; NULL when either is unknown.
const ZIP_DISTANCE_MACRO: &str = r#"
    CREATE OR REPLACE MACRO calculate_zip_distance(zip1, zip2) AS (
      SELECT 2 * 6371.0088 * asin(sqrt(
          pow(sin(radians(b.lat - a.lat) / 2), 2)
          + cos(radians(a.lat)) * cos(radians(b.lat)) * pow(sin(radians(b.lon - a.lon) / 2), 2)
      ))
      FROM zip_centroids a, zip_centroids b
      WHERE a.zip5 = left(trim(CAST(zip1 AS TEXT)), 5)
        AND b.zip5 = left(trim(CAST(zip2 AS TEXT)), 5)
    )
"#;

#[derive(Debug, Serialize)]
struct InitMeta {
    initialized_at: String,
    duckdb_path: String,
    tables: Vec<TableCount>,
    zip_centroid_count: u64,
}

#[derive(Debug, Serialize)]
struct TableCount {
    table: String,
    rows: u64,
}

pub async fn run(opts: InitArgs) -> anyhow::Result<()> {
    tracing::info!("care-ask-backend init");
    tracing::info!("data_dir={}", opts.data_dir);
    if opts.rebuild {
        tracing::info!("rebuild=true (will reload zip_centroids)");
    }

    let paths = StoragePaths::new(&opts.data_dir);
    paths.ensure_dirs().context("create data directory")?;

    let mut conn = Connection::open(&paths.duckdb_path)
        .with_context(|| format!("open duckdb at {}", paths.duckdb_path.display()))?;

    tracing::info!("Step 1/3: create provider tables");
    create_schema(&mut conn, &PROVIDER_SCHEMA).context("create provider tables")?;

    tracing::info!("Step 2/3: zip centroids + calculate_zip_distance");
    match opts.zip_centroids_file.as_deref() {
        Some(p) => {
            let existing = one_u64(&mut conn, "SELECT COUNT(*) FROM zip_centroids")?;
            if opts.rebuild || existing == 0 {
                let n = load_zip_centroids(&mut conn, Path::new(p)).context("load zip_centroids")?;
                tracing::info!("Loaded {n} zip centroids from {p}");
            } else {
                tracing::info!("zip_centroids already has {existing} rows; skipping");
            }
        }
        None => tracing::warn!(
            "No --zip-centroids-file given; calculate_zip_distance returns NULL until centroids are loaded"
        ),
    }

    tracing::info!("Step 3/3: write meta");
    let meta = collect_meta(&mut conn, &paths)?;
    write_json(&paths.meta_path, &meta).context("write meta.json")?;

    tracing::info!("Init complete. DuckDB: {}", paths.duckdb_path.display());
    Ok(())
}

/// Opens an initialized store; `serve` and `ask` refuse to start without one.
pub fn open_existing(paths: &StoragePaths) -> anyhow::Result<Connection> {
    if !file_present_nonempty(&paths.duckdb_path) {
        return Err(anyhow!(
            "DuckDB not found at {}. Run: care-ask-backend init",
            paths.duckdb_path.display()
        ));
    }
    let mut conn = Connection::open(&paths.duckdb_path)
        .with_context(|| format!("open duckdb at {}", paths.duckdb_path.display()))?;
    for table in PROVIDER_SCHEMA.tables {
        if !table_exists(&mut conn, table.name)? {
            return Err(anyhow!(
                "table {} missing from {}. Run: care-ask-backend init",
                table.name,
                paths.duckdb_path.display()
            ));
        }
    }
    Ok(conn)
}

pub fn create_schema(conn: &mut Connection, schema: &SchemaDescriptor) -> anyhow::Result<()> {
    for ddl in schema.create_table_statements() {
        conn.execute(&ddl, [])
            .with_context(|| format!("execute {ddl}"))?;
    }
    conn.execute(ZIP_CENTROIDS_DDL, [])?;
    conn.execute_batch(ZIP_DISTANCE_MACRO)
        .context("create calculate_zip_distance macro")?;
    Ok(())
}

pub fn load_zip_centroids(conn: &mut Connection, geonames_txt: &Path) -> anyhow::Result<usize> {
    let centroids = geo::read_geonames_file(geonames_txt)?;
    insert_zip_centroids(conn, &centroids)
}

pub fn insert_zip_centroids(
    conn: &mut Connection,
    centroids: &[geo::ZipCentroid],
) -> anyhow::Result<usize> {
    conn.execute("DROP TABLE IF EXISTS zip_centroids", [])?;
    conn.execute(ZIP_CENTROIDS_DDL, [])?;

    let tx = conn.transaction().context("begin tx")?;
    {
        let mut stmt = tx
            .prepare("INSERT OR REPLACE INTO zip_centroids (zip5, lat, lon) VALUES (?, ?, ?)")
            .context("prepare insert zip_centroids")?;
        for c in centroids {
            stmt.execute(params![c.zip5, c.lat, c.lon])?;
        }
    }
    tx.commit().context("commit zip_centroids")?;
    Ok(centroids.len())
}

fn collect_meta(conn: &mut Connection, paths: &StoragePaths) -> anyhow::Result<InitMeta> {
    let mut tables = Vec::new();
    for t in PROVIDER_SCHEMA.tables {
        // Table names come from the static schema, never from input.
        let rows = one_u64(conn, &format!("SELECT COUNT(*) FROM {}", t.name))?;
        tables.push(TableCount {
            table: t.name.to_string(),
            rows,
        });
    }
    Ok(InitMeta {
        initialized_at: now_unix_label(),
        duckdb_path: paths.duckdb_path.display().to_string(),
        tables,
        zip_centroid_count: one_u64(conn, "SELECT COUNT(*) FROM zip_centroids")?,
    })
}

fn table_exists(conn: &mut Connection, name: &str) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare(
        r#"
        SELECT COUNT(*)
        FROM information_schema.tables
        WHERE table_schema = 'main' AND table_name = ?
    "#,
    )?;
    let count: i64 = stmt.query_row(params![name], |row| row.get(0))?;
    Ok(count > 0)
}

fn one_u64(conn: &mut Connection, sql: &str) -> anyhow::Result<u64> {
    let mut stmt = conn.prepare(sql)?;
    let v: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(v.max(0) as u64)
}

fn write_json(path: &Path, v: &impl Serialize) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let s = serde_json::to_string_pretty(v)?;
    std::fs::write(path, s)?;
    Ok(())
}

fn now_unix_label() -> String {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}s_since_epoch", dur.as_secs())
}
