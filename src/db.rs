use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::GenError;
use crate::types::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id              TEXT PRIMARY KEY,
    input_kind      TEXT NOT NULL CHECK(input_kind IN ('text', 'image', 'mixed')),
    input_content   TEXT NOT NULL,
    style_id        TEXT,
    custom_prompt   TEXT,
    seed            INTEGER NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('pending', 'generating', 'completed', 'partial_failed')),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS images (
    id              TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL REFERENCES projects(id),
    position        INTEGER NOT NULL,
    category        TEXT NOT NULL CHECK(category IN ('emotion', 'surprise')),
    emotion_type    TEXT,
    surprise_index  INTEGER,
    prompt          TEXT NOT NULL,
    seed            INTEGER NOT NULL,
    file_path       TEXT NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('pending', 'generating', 'success', 'failed')),
    error_message   TEXT,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    width           INTEGER,
    height          INTEGER,
    model_metadata  TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_project ON images(project_id, position);

CREATE TABLE IF NOT EXISTS styles (
    id              TEXT PRIMARY KEY,
    display_name    TEXT NOT NULL,
    description     TEXT NOT NULL,
    prompt_template TEXT NOT NULL,
    thumbnail_url   TEXT,
    sort_order      INTEGER NOT NULL DEFAULT 0,
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
"#;

const IMAGE_COLUMNS: &str = "id, project_id, category, emotion_type, surprise_index, prompt, seed,
     file_path, status, error_message, retry_count, width, height, model_metadata,
     created_at, updated_at";

const PROJECT_COLUMNS: &str =
    "id, input_kind, input_content, style_id, custom_prompt, seed, status, created_at, updated_at";

const STYLE_COLUMNS: &str =
    "id, display_name, description, prompt_template, thumbnail_url, sort_order, is_active";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn invalid_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected value {:?}", value),
        )),
    )
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    let kind: String = row.get(1)?;
    let status: String = row.get(6)?;
    Ok(Project {
        id: row.get(0)?,
        input_kind: InputKind::parse(&kind).ok_or_else(|| invalid_column(1, &kind))?,
        input_content: row.get(2)?,
        style_id: row.get(3)?,
        custom_prompt: row.get(4)?,
        seed: row.get(5)?,
        status: ProjectStatus::parse(&status).ok_or_else(|| invalid_column(6, &status))?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn image_from_row(row: &Row) -> rusqlite::Result<Image> {
    let category: String = row.get(2)?;
    let emotion: Option<String> = row.get(3)?;
    let status: String = row.get(8)?;
    let emotion_type = match emotion {
        Some(e) => Some(Emotion::parse(&e).ok_or_else(|| invalid_column(3, &e))?),
        None => None,
    };
    Ok(Image {
        id: row.get(0)?,
        project_id: row.get(1)?,
        category: ImageCategory::parse(&category).ok_or_else(|| invalid_column(2, &category))?,
        emotion_type,
        surprise_index: row.get(4)?,
        prompt: row.get(5)?,
        seed: row.get(6)?,
        file_path: row.get(7)?,
        status: ImageStatus::parse(&status).ok_or_else(|| invalid_column(8, &status))?,
        error_message: row.get(9)?,
        retry_count: row.get(10)?,
        width: row.get(11)?,
        height: row.get(12)?,
        model_metadata: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn style_from_row(row: &Row) -> rusqlite::Result<Style> {
    Ok(Style {
        id: row.get(0)?,
        display_name: row.get(1)?,
        description: row.get(2)?,
        prompt_template: row.get(3)?,
        thumbnail_url: row.get(4)?,
        sort_order: row.get(5)?,
        is_active: row.get(6)?,
    })
}

/// Open (or create) the database. Pass `None` for an in-memory database.
pub fn open_database(path: Option<&Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => Connection::open(p).context("Failed to open generation database")?,
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set PRAGMA options")?;

    conn.execute_batch(SCHEMA)
        .context("Failed to create generation schema")?;

    Ok(conn)
}

// ── Projects ────────────────────────────────────────────────────────

pub fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, input_kind, input_content, style_id, custom_prompt, seed,
                               status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            project.id,
            project.input_kind.as_str(),
            project.input_content,
            project.style_id,
            project.custom_prompt,
            project.seed,
            project.status.as_str(),
            project.created_at,
            project.updated_at,
        ],
    )
    .context("Failed to insert project")?;
    Ok(())
}

pub fn get_project(conn: &Connection, project_id: &str) -> Result<Option<Project>> {
    conn.query_row(
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
        params![project_id],
        project_from_row,
    )
    .optional()
    .context("Failed to load project")
}

/// All projects, newest first.
pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM projects ORDER BY created_at DESC, id ASC",
            PROJECT_COLUMNS
        ))
        .context("Failed to prepare list_projects query")?;

    let rows = stmt
        .query_map([], project_from_row)
        .context("Failed to execute list_projects query")?;

    let mut projects = Vec::new();
    for row in rows {
        projects.push(row.context("Failed to read project row")?);
    }
    Ok(projects)
}

pub fn update_project_status(
    conn: &Connection,
    project_id: &str,
    status: ProjectStatus,
) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now(), project_id],
        )
        .context("Failed to update project status")?;
    if changed == 0 {
        anyhow::bail!("Project '{}' not found", project_id);
    }
    Ok(())
}

// ── Images ──────────────────────────────────────────────────────────

/// Insert an image. `position` fixes its place in the canonical order.
pub fn insert_image(conn: &Connection, image: &Image, position: usize) -> Result<()> {
    conn.execute(
        "INSERT INTO images (id, project_id, position, category, emotion_type, surprise_index,
                             prompt, seed, file_path, status, error_message, retry_count,
                             width, height, model_metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            image.id,
            image.project_id,
            position as i64,
            image.category.as_str(),
            image.emotion_type.map(|e| e.as_str()),
            image.surprise_index,
            image.prompt,
            image.seed,
            image.file_path,
            image.status.as_str(),
            image.error_message,
            image.retry_count,
            image.width,
            image.height,
            image.model_metadata,
            image.created_at,
            image.updated_at,
        ],
    )
    .context("Failed to insert image")?;
    Ok(())
}

pub fn get_image(conn: &Connection, image_id: &str) -> Result<Option<Image>> {
    conn.query_row(
        &format!("SELECT {} FROM images WHERE id = ?1", IMAGE_COLUMNS),
        params![image_id],
        image_from_row,
    )
    .optional()
    .context("Failed to load image")
}

/// All images of a project: emotions in canonical order, then surprises by index.
pub fn images_by_project(conn: &Connection, project_id: &str) -> Result<Vec<Image>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM images WHERE project_id = ?1 ORDER BY position ASC",
            IMAGE_COLUMNS
        ))
        .context("Failed to prepare images_by_project query")?;

    let rows = stmt
        .query_map(params![project_id], image_from_row)
        .context("Failed to execute images_by_project query")?;

    let mut images = Vec::new();
    for row in rows {
        images.push(row.context("Failed to read image row")?);
    }
    Ok(images)
}

fn update_image(conn: &Connection, image_id: &str, sql: &str, what: &str) -> Result<()> {
    let changed = conn
        .execute(sql, params![now(), image_id])
        .with_context(|| format!("Failed to {}", what))?;
    if changed == 0 {
        anyhow::bail!("Image '{}' not found", image_id);
    }
    Ok(())
}

pub fn mark_image_generating(conn: &Connection, image_id: &str) -> Result<()> {
    update_image(
        conn,
        image_id,
        "UPDATE images SET status = 'generating', updated_at = ?1 WHERE id = ?2",
        "mark image as generating",
    )
}

/// Record the single retry: retry_count becomes 1 and the seed moves to `retry_seed`.
pub fn record_retry(conn: &Connection, image_id: &str, retry_seed: i64) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE images SET retry_count = 1, seed = ?1, updated_at = ?2
             WHERE id = ?3 AND retry_count = 0",
            params![retry_seed, now(), image_id],
        )
        .context("Failed to record image retry")?;
    if changed == 0 {
        anyhow::bail!("Image '{}' not found or already retried", image_id);
    }
    Ok(())
}

pub fn mark_image_success(
    conn: &Connection,
    image_id: &str,
    width: u32,
    height: u32,
    metadata: &str,
) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE images SET status = 'success', width = ?1, height = ?2, model_metadata = ?3,
                               error_message = NULL, updated_at = ?4
             WHERE id = ?5",
            params![width, height, metadata, now(), image_id],
        )
        .context("Failed to mark image as success")?;
    if changed == 0 {
        anyhow::bail!("Image '{}' not found", image_id);
    }
    Ok(())
}

pub fn mark_image_failed(conn: &Connection, image_id: &str, error: &str) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE images SET status = 'failed', error_message = ?1, updated_at = ?2
             WHERE id = ?3",
            params![error, now(), image_id],
        )
        .context("Failed to mark image as failed")?;
    if changed == 0 {
        anyhow::bail!("Image '{}' not found", image_id);
    }
    Ok(())
}

// ── Styles ──────────────────────────────────────────────────────────

pub fn upsert_style(conn: &Connection, style: &Style) -> Result<()> {
    let ts = now();
    conn.execute(
        "INSERT INTO styles (id, display_name, description, prompt_template, thumbnail_url,
                             sort_order, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(id) DO UPDATE SET
             display_name = excluded.display_name,
             description = excluded.description,
             prompt_template = excluded.prompt_template,
             thumbnail_url = excluded.thumbnail_url,
             sort_order = excluded.sort_order,
             is_active = excluded.is_active,
             updated_at = excluded.updated_at",
        params![
            style.id,
            style.display_name,
            style.description,
            style.prompt_template,
            style.thumbnail_url,
            style.sort_order,
            style.is_active,
            ts,
        ],
    )
    .context("Failed to upsert style")?;
    Ok(())
}

pub fn get_style(conn: &Connection, style_id: &str) -> Result<Option<Style>> {
    conn.query_row(
        &format!("SELECT {} FROM styles WHERE id = ?1", STYLE_COLUMNS),
        params![style_id],
        style_from_row,
    )
    .optional()
    .context("Failed to load style")
}

pub fn active_styles(conn: &Connection) -> Result<Vec<Style>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM styles WHERE is_active = 1 ORDER BY sort_order ASC, id ASC",
            STYLE_COLUMNS
        ))
        .context("Failed to prepare active_styles query")?;

    let rows = stmt
        .query_map([], style_from_row)
        .context("Failed to execute active_styles query")?;

    let mut styles = Vec::new();
    for row in rows {
        styles.push(row.context("Failed to read style row")?);
    }
    Ok(styles)
}

/// The built-in style presets.
pub fn default_styles() -> Vec<Style> {
    let presets = [
        (
            "cute-cartoon",
            "Cute Cartoon",
            "Rounded, adorable cartoon look for mascot-style characters",
            "cute cartoon style, round shapes, kawaii, adorable, colorful, simple shading",
        ),
        (
            "anime",
            "Anime",
            "Classic Japanese anime style with expressive faces",
            "anime style, manga art, expressive eyes, cel shading, vibrant colors",
        ),
        (
            "3d-render",
            "3D Render",
            "Modern 3D rendering with rich materials",
            "3D render, blender, pixar style, smooth lighting, detailed textures, high quality",
        ),
        (
            "watercolor",
            "Watercolor",
            "Soft watercolor painting",
            "watercolor painting, soft edges, pastel colors, artistic, gentle brush strokes",
        ),
        (
            "pixel-art",
            "Pixel Art",
            "Retro pixel art",
            "pixel art, 16-bit style, retro gaming, crisp pixels, limited color palette",
        ),
        (
            "line-art",
            "Line Art",
            "Clean minimalist line drawing",
            "simple line art, minimalist, clean lines, black and white, doodle style",
        ),
    ];

    presets
        .iter()
        .enumerate()
        .map(|(i, (id, name, description, template))| Style {
            id: id.to_string(),
            display_name: name.to_string(),
            description: description.to_string(),
            prompt_template: template.to_string(),
            thumbnail_url: None,
            sort_order: i as i32 + 1,
            is_active: true,
        })
        .collect()
}

/// Insert or refresh the built-in presets. Returns how many were written.
pub fn seed_default_styles(conn: &Connection) -> Result<usize> {
    let styles = default_styles();
    for style in &styles {
        upsert_style(conn, style)?;
    }
    Ok(styles.len())
}

/// Shared, thread-safe handle to the generation database.
///
/// All writes are targeted field updates; nothing here deletes records.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database. Pass `None` for an in-memory database.
    pub fn open(path: Option<&Path>) -> Result<Self, GenError> {
        let conn = open_database(path).map_err(GenError::database)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, GenError>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GenError::Database(format!("connection mutex poisoned: {}", e)))?;
        f(&conn).map_err(GenError::database)
    }

    pub fn insert_project(&self, project: &Project) -> Result<(), GenError> {
        self.with_conn(|c| insert_project(c, project))
    }

    pub fn get_project(&self, project_id: &str) -> Result<Option<Project>, GenError> {
        self.with_conn(|c| get_project(c, project_id))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, GenError> {
        self.with_conn(list_projects)
    }

    pub fn update_project_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> Result<(), GenError> {
        self.with_conn(|c| update_project_status(c, project_id, status))
    }

    /// Insert a project and all of its images in one transaction.
    pub fn insert_project_with_images(
        &self,
        project: &Project,
        images: &[Image],
    ) -> Result<(), GenError> {
        self.with_conn(|c| {
            let tx = c
                .unchecked_transaction()
                .context("Failed to begin project transaction")?;
            insert_project(&tx, project)?;
            for (position, image) in images.iter().enumerate() {
                insert_image(&tx, image, position)?;
            }
            tx.commit().context("Failed to commit project transaction")?;
            Ok(())
        })
    }

    pub fn get_image(&self, image_id: &str) -> Result<Option<Image>, GenError> {
        self.with_conn(|c| get_image(c, image_id))
    }

    pub fn images_by_project(&self, project_id: &str) -> Result<Vec<Image>, GenError> {
        self.with_conn(|c| images_by_project(c, project_id))
    }

    pub fn mark_image_generating(&self, image_id: &str) -> Result<(), GenError> {
        self.with_conn(|c| mark_image_generating(c, image_id))
    }

    pub fn record_retry(&self, image_id: &str, retry_seed: i64) -> Result<(), GenError> {
        self.with_conn(|c| record_retry(c, image_id, retry_seed))
    }

    pub fn mark_image_success(
        &self,
        image_id: &str,
        width: u32,
        height: u32,
        metadata: &str,
    ) -> Result<(), GenError> {
        self.with_conn(|c| mark_image_success(c, image_id, width, height, metadata))
    }

    pub fn mark_image_failed(&self, image_id: &str, error: &str) -> Result<(), GenError> {
        self.with_conn(|c| mark_image_failed(c, image_id, error))
    }

    pub fn upsert_style(&self, style: &Style) -> Result<(), GenError> {
        self.with_conn(|c| upsert_style(c, style))
    }

    pub fn get_style(&self, style_id: &str) -> Result<Option<Style>, GenError> {
        self.with_conn(|c| get_style(c, style_id))
    }

    pub fn active_styles(&self) -> Result<Vec<Style>, GenError> {
        self.with_conn(active_styles)
    }

    pub fn seed_default_styles(&self) -> Result<usize, GenError> {
        self.with_conn(seed_default_styles)
    }
}
