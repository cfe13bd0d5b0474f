//! Layout fetch seam and its local implementation.

use rl_core::LayoutError;
use rl_core::LayoutResult;
use std::fs;
use std::path::Component;
use std::path::PathBuf;
use std::thread;
use url::Url;

/// Status and decoded text of a layout response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Performs one blocking GET for an absolute URL.
pub trait LayoutFetcher {
    fn fetch(&mut self, url: &str) -> LayoutResult<FetchResponse>;
}

impl<F: LayoutFetcher + ?Sized> LayoutFetcher for Box<F> {
    fn fetch(&mut self, url: &str) -> LayoutResult<FetchResponse> {
        (**self).fetch(url)
    }
}

/// Serves request paths from a directory, ignoring scheme and host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, url: &str) -> LayoutResult<Option<PathBuf>> {
        let parsed = Url::parse(url).map_err(|error| {
            LayoutError::new(
                "net.url.invalid",
                format!("failed to parse URL `{url}`: {error}"),
            )
        })?;

        let root = std::path::absolute(&self.root).map_err(|error| {
            LayoutError::new(
                "net.fetch.root_invalid",
                format!("site root `{}` is unusable: {error}", self.root.display()),
            )
        })?;
        let base = Url::from_directory_path(&root).map_err(|()| {
            LayoutError::new(
                "net.fetch.root_invalid",
                format!("site root `{}` is not an absolute path", root.display()),
            )
        })?;

        // The path is already dot-normalized by the URL parser; percent
        // decoding can still smuggle separators back in.
        let relative = parsed.path().trim_start_matches('/');
        let Some(path) = base
            .join(relative)
            .ok()
            .and_then(|joined| joined.to_file_path().ok())
        else {
            return Ok(None);
        };

        let escapes = path
            .strip_prefix(&root)
            .map(|rest| rest.components().any(|part| !matches!(part, Component::Normal(_))))
            .unwrap_or(true);
        if escapes {
            return Err(LayoutError::new(
                "net.fetch.forbidden",
                format!("`{url}` escapes the site root"),
            ));
        }

        Ok(Some(path))
    }
}

impl LayoutFetcher for DirectoryFetcher {
    fn fetch(&mut self, url: &str) -> LayoutResult<FetchResponse> {
        let path = match self.resolve(url) {
            Ok(Some(path)) => path,
            Ok(None) => return Ok(FetchResponse::with_status(404)),
            Err(error) if error.code == "net.fetch.forbidden" => {
                tracing::warn!(url, "refused path outside the site root");
                return Ok(FetchResponse::with_status(403));
            }
            Err(error) => return Err(error),
        };

        if !path.is_file() {
            tracing::debug!(url, path = %path.display(), "no such layout file");
            return Ok(FetchResponse::with_status(404));
        }

        let bytes = fs::read(&path).map_err(|error| {
            LayoutError::new(
                "net.fetch.read_failed",
                format!("failed to read `{}`: {error}", path.display()),
            )
        })?;
        Ok(FetchResponse::ok(crate::client::decode_text(&bytes, "")))
    }
}

/// Runs `fetcher` for `url` on a dedicated thread and waits for it. The
/// caller observes the same ordering as a synchronous request.
pub fn fetch_on_worker<F>(fetcher: &mut F, url: &str) -> LayoutResult<FetchResponse>
where
    F: LayoutFetcher + Send + ?Sized,
{
    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("layout-fetch".to_owned())
            .spawn_scoped(scope, || fetcher.fetch(url))
            .map_err(|error| {
                LayoutError::new(
                    "net.worker.spawn_failed",
                    format!("failed to start fetch worker: {error}"),
                )
            })?;

        worker.join().map_err(|_| {
            LayoutError::new(
                "net.worker.panicked",
                format!("fetch worker panicked while fetching `{url}`"),
            )
        })?
    })
}

#[cfg(test)]
mod tests {
    use super::DirectoryFetcher;
    use super::FetchResponse;
    use super::LayoutFetcher;
    use super::fetch_on_worker;
    use rl_core::LayoutResult;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn site_root() -> std::path::PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or_default();
        let root = std::env::temp_dir().join(format!("render-layout-site-{stamp}"));
        assert!(std::fs::create_dir_all(root.join("layouts")).is_ok());
        assert!(std::fs::write(root.join("layouts/main.html"), "<slot></slot>").is_ok());
        root
    }

    #[test]
    fn serves_files_under_root() {
        let root = site_root();
        let mut fetcher = DirectoryFetcher::new(&root);

        let found = fetcher.fetch("https://example.com/layouts/main.html?v=3");
        assert_eq!(found, Ok(FetchResponse::ok("<slot></slot>")));

        let missing = fetcher.fetch("https://example.com/layouts/none.html");
        assert_eq!(missing.map(|response| response.status), Ok(404));

        let directory = fetcher.fetch("https://example.com/layouts/");
        assert_eq!(directory.map(|response| response.status), Ok(404));

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn encoded_separators_cannot_escape_root() {
        let root = site_root();
        let mut fetcher = DirectoryFetcher::new(root.join("layouts"));
        let escaped = fetcher.fetch("https://example.com/..%2Flayouts%2Fmain.html");
        assert!(escaped.is_ok_and(|response| response.status == 403 || response.status == 404));
        let _ = std::fs::remove_dir_all(root);
    }

    struct Recording {
        seen: Vec<(String, Option<String>)>,
    }

    impl LayoutFetcher for Recording {
        fn fetch(&mut self, url: &str) -> LayoutResult<FetchResponse> {
            let thread = std::thread::current().name().map(str::to_owned);
            self.seen.push((url.to_owned(), thread));
            Ok(FetchResponse::ok("body"))
        }
    }

    #[test]
    fn worker_fetch_runs_on_named_thread_and_returns_result() {
        let mut fetcher = Recording { seen: Vec::new() };
        let response = fetch_on_worker(&mut fetcher, "https://example.com/a.html");
        assert_eq!(response, Ok(FetchResponse::ok("body")));
        assert_eq!(
            fetcher.seen,
            vec![(
                "https://example.com/a.html".to_owned(),
                Some("layout-fetch".to_owned())
            )]
        );
    }
}
