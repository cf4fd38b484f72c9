//! Sandboxed static asset lookup under the web root.
//!
//! Paths are normalised lexically before any filesystem access; a path whose `..`
//! segments climb above the root is refused. Symlinks inside the root are not inspected.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ApiError;
use crate::response::{Response, HTML};

/// Client-side routes of the single-page UI; all of them serve `index.html`.
pub const SPA_PATHS: [&str; 7] = [
    "/",
    "/index.html",
    "/wifi",
    "/webscan",
    "/network",
    "/loot",
    "/terminal",
];

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html") => HTML,
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[derive(Clone, Debug)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a request path to a file path under the root.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, ApiError> {
        let mut segments: Vec<&str> = Vec::new();
        for segment in request_path.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(ApiError::Forbidden);
                    }
                }
                s if s.contains('\0') => return Err(ApiError::Forbidden),
                s => segments.push(s),
            }
        }
        let resolved = segments
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment));
        if !resolved.starts_with(&self.root) {
            return Err(ApiError::Forbidden);
        }
        Ok(resolved)
    }

    pub fn index(&self) -> Response {
        self.file_response(&self.root.join("index.html"), HTML)
    }

    /// Fallback for GET paths no route claimed.
    pub fn serve(&self, request_path: &str) -> Response {
        match self.resolve(request_path) {
            Ok(path) if path.is_file() => self.file_response(&path, mime_for(&path)),
            Ok(_) => Response::error(&ApiError::NotFound),
            Err(e) => {
                debug!(path = request_path, "Refused static path");
                Response::error(&e)
            }
        }
    }

    fn file_response(&self, path: &Path, content_type: &str) -> Response {
        match fs::read(path) {
            Ok(body) => Response::new(200, content_type, body),
            Err(_) => Response::error(&ApiError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn traversal_is_refused() {
        let files = StaticFiles::new("/srv/web");
        assert_eq!(files.resolve("/../../etc/passwd"), Err(ApiError::Forbidden));
        assert_eq!(files.resolve("/scripts/../../x"), Err(ApiError::Forbidden));
        assert_eq!(files.resolve("/..\\..\\etc"), Err(ApiError::Forbidden));
        assert_eq!(
            files.resolve("/scripts/./../styles/app.css"),
            Ok(PathBuf::from("/srv/web/styles/app.css"))
        );
        assert_eq!(files.resolve("//scripts//app.js"), Ok(PathBuf::from("/srv/web/scripts/app.js")));
    }

    #[test]
    fn serves_files_with_mime() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("scripts/app.js"), "let x = 1;").unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let files = StaticFiles::new(dir.path());

        let response = files.serve("/scripts/app.js");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "application/javascript");
        assert_eq!(response.body, b"let x = 1;");

        assert_eq!(files.index().content_type, HTML);
        assert_eq!(files.serve("/missing.css").status, 404);
        assert_eq!(files.serve("/scripts").status, 404);
        assert_eq!(files.serve("/../secret").status, 403);
    }

    proptest! {
        #[test]
        fn resolved_paths_stay_under_root(path in "[a-z./\\\\]{0,40}") {
            let files = StaticFiles::new("/srv/web");
            if let Ok(resolved) = files.resolve(&path) {
                prop_assert!(resolved.starts_with("/srv/web"));
                prop_assert!(!resolved.components().any(|c| c == std::path::Component::ParentDir));
            }
        }
    }
}
