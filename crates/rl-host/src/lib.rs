//! Script-driven bootstrap: finds the layout named by the page's
//! `data-path` script, loads it from session cache or the network, and
//! renders it into the page.

mod config;

pub use config::HostConfig;
pub use config::ORIGIN_ENV;
pub use config::SESSION_DIR_ENV;
pub use config::SITE_ROOT_ENV;
pub use config::TRUST_STORE_ENV;

use rl_core::LayoutError;
use rl_core::LayoutResult;
use rl_dom::Document;
use rl_net::LayoutFetcher;
use rl_net::PageLocation;
use rl_net::fetch_on_worker;
use rl_page::Page;
use rl_page::RenderOutcome;
use rl_storage::SessionStore;

pub const CACHE_KEY_PREFIX: &str = "renderLayoutJsCache:";

/// How the current page was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NavigationType {
    #[default]
    Navigate,
    Reload,
    BackForward,
    Prerender,
}

impl NavigationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Reload => "reload",
            Self::BackForward => "back_forward",
            Self::Prerender => "prerender",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "navigate" => Some(Self::Navigate),
            "reload" => Some(Self::Reload),
            "back_forward" => Some(Self::BackForward),
            "prerender" => Some(Self::Prerender),
            _ => None,
        }
    }
}

/// The script element that triggers the bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentScript {
    pub data_path: Option<String>,
}

impl CurrentScript {
    pub fn new(data_path: impl Into<String>) -> Self {
        Self {
            data_path: Some(data_path.into()),
        }
    }

    /// First `script` element in the document carrying `data-path`.
    pub fn find(doc: &Document) -> Option<Self> {
        doc.elements_by_tag(doc.root(), "script")
            .into_iter()
            .find_map(|script| doc.attribute(script, "data-path"))
            .map(Self::new)
    }
}

pub fn cache_key(path: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{path}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutOrigin {
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// No script, or a script without a usable `data-path`.
    Inactive,
    Rendered {
        /// Same-origin path the layout was loaded from; also the cache key suffix.
        path: String,
        origin: LayoutOrigin,
        render: RenderOutcome,
    },
}

/// Runs the bootstrap for `script` on `page`.
///
/// Cross-origin paths are rejected before anything is fetched. Outside of a
/// reload a non-empty cached layout is used as is; otherwise the layout is
/// fetched on a worker thread, cached, then rendered.
pub fn bootstrap<F>(
    page: &mut Page,
    script: Option<&CurrentScript>,
    location: &PageLocation,
    navigation: NavigationType,
    storage: &mut dyn SessionStore,
    fetcher: &mut F,
) -> LayoutResult<BootstrapOutcome>
where
    F: LayoutFetcher + Send + ?Sized,
{
    let Some(data_path) = script
        .and_then(|script| script.data_path.as_deref())
        .filter(|path| !path.is_empty())
    else {
        tracing::debug!("no data-path script; bootstrap inactive");
        return Ok(BootstrapOutcome::Inactive);
    };

    let path = location.same_origin_path(data_path)?;
    let key = cache_key(&path);

    if navigation != NavigationType::Reload
        && let Some(cached) = storage.get_item(&key)?.filter(|value| !value.is_empty())
    {
        tracing::debug!(%path, "layout served from session cache");
        let render = page.render_layout(cached)?;
        return Ok(BootstrapOutcome::Rendered {
            path,
            origin: LayoutOrigin::Cache,
            render,
        });
    }

    let url = location.absolute(&path)?;
    tracing::debug!(%path, navigation = navigation.as_str(), url = url.href(), "fetching layout");
    let response = fetch_on_worker(fetcher, url.href())?;
    if response.status != 200 {
        tracing::warn!(%path, status = response.status, "layout fetch failed");
        return Err(LayoutError::new(
            "host.fetch_failed",
            format!("Failed to fetch layout: {path}"),
        ));
    }

    storage.set_item(&key, &response.body)?;
    let render = page.render_layout(response.body)?;
    Ok(BootstrapOutcome::Rendered {
        path,
        origin: LayoutOrigin::Network,
        render,
    })
}

#[cfg(test)]
mod tests {
    use super::BootstrapOutcome;
    use super::CurrentScript;
    use super::LayoutOrigin;
    use super::NavigationType;
    use super::bootstrap;
    use super::cache_key;
    use rl_core::LayoutResult;
    use rl_html::serialize_children;
    use rl_net::FetchResponse;
    use rl_net::LayoutFetcher;
    use rl_net::PageLocation;
    use rl_page::Page;
    use rl_page::RenderOutcome;
    use rl_storage::MemorySessionStore;
    use rl_storage::SessionStore;

    const PAGE: &str = "<body><script src=\"renderLayout.js\" data-path=\"layout.html\"></script>\
                        <template id=\"title\">Docs</template><p>content</p></body>";

    struct StubFetcher {
        response: FetchResponse,
        requests: Vec<String>,
    }

    impl StubFetcher {
        fn new(response: FetchResponse) -> Self {
            Self {
                response,
                requests: Vec::new(),
            }
        }
    }

    impl LayoutFetcher for StubFetcher {
        fn fetch(&mut self, url: &str) -> LayoutResult<FetchResponse> {
            self.requests.push(url.to_owned());
            Ok(self.response.clone())
        }
    }

    fn page(html: &str) -> Page {
        match Page::parse(html) {
            Ok(page) => page,
            Err(error) => panic!("{error}"),
        }
    }

    fn location() -> PageLocation {
        match PageLocation::parse("https://example.com/docs/index.html") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn body_markup(page: &Page) -> String {
        let doc = page.document();
        let body = doc.body().unwrap_or_else(|| unreachable!());
        serialize_children(doc, body)
    }

    fn run(
        page: &mut Page,
        navigation: NavigationType,
        storage: &mut MemorySessionStore,
        fetcher: &mut StubFetcher,
    ) -> LayoutResult<BootstrapOutcome> {
        let script = CurrentScript::find(page.document());
        bootstrap(page, script.as_ref(), &location(), navigation, storage, fetcher)
    }

    #[test]
    fn finds_first_script_with_data_path() {
        let page = page(
            "<head><script src=\"a.js\"></script><script data-path=\"/x.html\"></script></head>\
             <body><script data-path=\"/y.html\"></script></body>",
        );
        assert_eq!(
            CurrentScript::find(page.document()),
            Some(CurrentScript::new("/x.html"))
        );
        assert_eq!(CurrentScript::find(self::page("<body><p>a</p></body>").document()), None);
    }

    #[test]
    fn missing_or_empty_data_path_does_nothing() {
        let mut storage = MemorySessionStore::new();
        let mut fetcher = StubFetcher::new(FetchResponse::ok("<slot></slot>"));

        let mut plain = page("<body><p>a</p><p>b</p></body>");
        let outcome = run(&mut plain, NavigationType::Navigate, &mut storage, &mut fetcher);
        assert_eq!(outcome, Ok(BootstrapOutcome::Inactive));

        let mut empty = page("<body><script data-path=\"\"></script><p>b</p></body>");
        let outcome = run(&mut empty, NavigationType::Navigate, &mut storage, &mut fetcher);
        assert_eq!(outcome, Ok(BootstrapOutcome::Inactive));

        assert!(fetcher.requests.is_empty());
        assert_eq!(body_markup(&empty), "<script data-path=\"\"></script><p>b</p>");
    }

    #[test]
    fn fetches_caches_and_renders_on_first_visit() {
        let mut page = page(PAGE);
        let mut storage = MemorySessionStore::new();
        let mut fetcher = StubFetcher::new(FetchResponse::ok(
            "<h1><slot name=\"title\"></slot></h1><main><slot></slot></main>",
        ));

        let outcome = run(&mut page, NavigationType::Navigate, &mut storage, &mut fetcher);
        assert!(outcome.is_ok());
        let outcome = match outcome {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        assert!(matches!(
            outcome,
            BootstrapOutcome::Rendered {
                ref path,
                origin: LayoutOrigin::Network,
                render: RenderOutcome::Rendered(_),
            } if path == "/docs/layout.html"
        ));
        assert_eq!(fetcher.requests, vec!["https://example.com/docs/layout.html".to_owned()]);
        assert_eq!(
            storage.get_item(&cache_key("/docs/layout.html")),
            Ok(Some(
                "<h1><slot name=\"title\"></slot></h1><main><slot></slot></main>".to_owned()
            ))
        );
        assert_eq!(
            body_markup(&page),
            "<h1>Docs</h1><main><script src=\"renderLayout.js\" data-path=\"layout.html\"></script><p>content</p></main>"
        );
    }

    #[test]
    fn cached_layout_skips_network_unless_reloading() {
        let mut storage = MemorySessionStore::new();
        assert!(
            storage
                .set_item("renderLayoutJsCache:/docs/layout.html", "<div><slot></slot></div>")
                .is_ok()
        );
        let mut fetcher = StubFetcher::new(FetchResponse::ok("<section><slot></slot></section>"));

        for navigation in [NavigationType::Navigate, NavigationType::BackForward] {
            let mut cached = page(PAGE);
            let outcome = run(&mut cached, navigation, &mut storage, &mut fetcher);
            assert!(matches!(
                outcome,
                Ok(BootstrapOutcome::Rendered {
                    origin: LayoutOrigin::Cache,
                    ..
                })
            ));
            assert!(body_markup(&cached).starts_with("<div>"));
        }
        assert!(fetcher.requests.is_empty());

        let mut reloaded = page(PAGE);
        let outcome = run(&mut reloaded, NavigationType::Reload, &mut storage, &mut fetcher);
        assert!(matches!(
            outcome,
            Ok(BootstrapOutcome::Rendered {
                origin: LayoutOrigin::Network,
                ..
            })
        ));
        assert_eq!(fetcher.requests.len(), 1);
        assert!(body_markup(&reloaded).starts_with("<section>"));
        assert_eq!(
            storage.get_item("renderLayoutJsCache:/docs/layout.html"),
            Ok(Some("<section><slot></slot></section>".to_owned()))
        );
    }

    #[test]
    fn empty_cached_value_counts_as_miss() {
        let mut storage = MemorySessionStore::new();
        assert!(storage.set_item(&cache_key("/docs/layout.html"), "").is_ok());
        let mut fetcher = StubFetcher::new(FetchResponse::ok("<slot></slot>"));

        let mut page = page(PAGE);
        let outcome = run(&mut page, NavigationType::Navigate, &mut storage, &mut fetcher);
        assert!(matches!(
            outcome,
            Ok(BootstrapOutcome::Rendered {
                origin: LayoutOrigin::Network,
                ..
            })
        ));
        assert_eq!(fetcher.requests.len(), 1);
    }

    #[test]
    fn cross_origin_path_fails_before_fetch() {
        let mut page = page(
            "<body><script data-path=\"https://cdn.example.net/layout.html\"></script><p>x</p></body>",
        );
        let mut storage = MemorySessionStore::new();
        let mut fetcher = StubFetcher::new(FetchResponse::ok("<slot></slot>"));

        let outcome = run(&mut page, NavigationType::Navigate, &mut storage, &mut fetcher);
        assert!(outcome.is_err());
        if let Err(error) = outcome {
            assert_eq!(error.code, "host.cross_origin_path");
            assert_eq!(
                error.message,
                "data-path must be a same-origin URL: https://cdn.example.net/layout.html"
            );
        }
        assert!(fetcher.requests.is_empty());
        assert!(storage.is_empty());
    }

    #[test]
    fn non_200_status_fails_and_leaves_page_alone() {
        let mut page = page(PAGE);
        let before = body_markup(&page);
        let mut storage = MemorySessionStore::new();
        let mut fetcher = StubFetcher::new(FetchResponse::with_status(404));

        let outcome = run(&mut page, NavigationType::Navigate, &mut storage, &mut fetcher);
        assert!(outcome.is_err());
        if let Err(error) = outcome {
            assert_eq!(error.code, "host.fetch_failed");
            assert_eq!(error.message, "Failed to fetch layout: /docs/layout.html");
        }
        assert!(storage.is_empty());
        assert_eq!(body_markup(&page), before);
    }

    #[test]
    fn render_is_deferred_when_body_is_not_ready() {
        let mut page = page("<body><script data-path=\"/l.html\"></script></body>");
        let mut storage = MemorySessionStore::new();
        let mut fetcher = StubFetcher::new(FetchResponse::ok("<main><slot></slot></main>"));

        let outcome = run(&mut page, NavigationType::Navigate, &mut storage, &mut fetcher);
        assert!(matches!(
            outcome,
            Ok(BootstrapOutcome::Rendered {
                render: RenderOutcome::Deferred(_),
                ..
            })
        ));
        assert_eq!(page.pending_renders(), 1);
        assert!(storage.get_item("renderLayoutJsCache:/l.html").is_ok_and(|value| value.is_some()));
    }

    #[test]
    fn navigation_type_names() {
        for navigation in [
            NavigationType::Navigate,
            NavigationType::Reload,
            NavigationType::BackForward,
            NavigationType::Prerender,
        ] {
            assert_eq!(NavigationType::from_name(navigation.as_str()), Some(navigation));
        }
        assert_eq!(NavigationType::from_name("bogus"), None);
    }
}
