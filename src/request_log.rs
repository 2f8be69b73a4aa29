use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::{fs, sync::Mutex};
use tracing::warn;

use crate::state::AppState;

/// Text file holding only the most recent `max_lines` request lines.
pub struct RequestLog {
    path: PathBuf,
    max_lines: usize,
    lock: Mutex<()>,
}

impl RequestLog {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let existing = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let mut lines: Vec<&str> = existing.lines().collect();
        lines.push(line.trim_end());
        let keep_from = lines.len().saturating_sub(self.max_lines);
        let mut out = lines[keep_from..].join("\n");
        out.push('\n');
        fs::write(&self.path, out).await
    }
}

/// Appends `RFC3339 METHOD URI STATUS LATENCYms`; a write failure never fails the request.
pub async fn log_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();
    let res = next.run(req).await;

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let line = format!(
        "{timestamp} {method} {uri} {} {}ms",
        res.status().as_u16(),
        started.elapsed().as_millis()
    );
    if let Err(e) = state.request_log.append(&line).await {
        warn!(error = %e, path = %state.request_log.path().display(), "request log write failed");
    }
    res
}
