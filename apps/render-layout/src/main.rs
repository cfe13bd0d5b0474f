//! Composes a page against its layout and prints the result.

use clap::Parser;
use clap::ValueEnum;
use rl_core::LayoutError;
use rl_core::LayoutResult;
use rl_dom::ReadyState;
use rl_host::CurrentScript;
use rl_host::HostConfig;
use rl_host::NavigationType;
use rl_host::bootstrap;
use rl_html::serialize_document;
use rl_page::Page;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "render-layout")]
#[command(about = "Render an HTML page into its slot layout")]
struct Args {
    /// Page to compose
    #[arg(value_name = "PAGE")]
    page: PathBuf,

    /// Compose with this layout file instead of the page's data-path script
    #[arg(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Address the page is loaded from
    #[arg(long, value_name = "HREF")]
    url: Option<String>,

    /// Serve layout requests from this directory
    #[arg(long, value_name = "DIR")]
    site_root: Option<PathBuf>,

    /// Persist session storage in this directory
    #[arg(long, value_name = "DIR")]
    session_dir: Option<PathBuf>,

    /// Treat the load as a reload, bypassing the session cache
    #[arg(long)]
    reload: bool,

    /// Ready state the document reaches after the initial render
    #[arg(long, value_enum, default_value_t = ReadyStateArg::Complete)]
    ready_state: ReadyStateArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReadyStateArg {
    Interactive,
    Complete,
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_tracing();

    match run(&args) {
        Ok(markup) => {
            println!("{markup}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("render-layout: {error}");
            ExitCode::FAILURE
        }
    }
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> LayoutResult<String> {
    let config = host_config(args)?;
    let mut page = Page::parse(&read_text(&args.page)?)?;

    match &args.layout {
        Some(layout) => {
            page.render_layout(read_text(layout)?)?;
        }
        None => {
            let script = CurrentScript::find(page.document());
            let location = config.location()?;
            let mut storage = config.session_store()?;
            let mut fetcher = config.fetcher()?;
            let outcome = bootstrap(
                &mut page,
                script.as_ref(),
                &location,
                config.navigation,
                storage.as_mut(),
                fetcher.as_mut(),
            )?;
            tracing::info!(?outcome, "bootstrap finished");
        }
    }

    page.set_ready_state(ReadyState::Interactive)?;
    if args.ready_state == ReadyStateArg::Complete {
        page.set_ready_state(ReadyState::Complete)?;
    }
    page.run_animation_frame()?;

    if page.pending_renders() > 0 {
        tracing::warn!(
            pending = page.pending_renders(),
            "layout render never fired; printing the page unchanged"
        );
    }

    Ok(serialize_document(page.document()))
}

fn host_config(args: &Args) -> LayoutResult<HostConfig> {
    let mut config = HostConfig::from_env()?;
    if let Some(url) = &args.url {
        config = config.with_page_url(url.clone());
    }
    if let Some(root) = &args.site_root {
        config = config.with_site_root(root.clone());
    }
    if let Some(dir) = &args.session_dir {
        config = config.with_session_dir(dir.clone());
    }
    if args.reload {
        config = config.with_navigation(NavigationType::Reload);
    }
    Ok(config)
}

fn read_text(path: &Path) -> LayoutResult<String> {
    std::fs::read_to_string(path).map_err(|error| {
        LayoutError::new(
            "app.read_failed",
            format!("failed to read `{}`: {error}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::Args;
    use super::ReadyStateArg;
    use super::run;
    use clap::Parser;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir() -> std::path::PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir().join(format!("render-layout-app-{stamp}"));
        assert!(std::fs::create_dir_all(&dir).is_ok());
        dir
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "render-layout",
            "page.html",
            "--site-root",
            "site",
            "--reload",
            "--ready-state",
            "interactive",
        ]);
        assert!(args.is_ok());
        let args = match args {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(args.reload);
        assert_eq!(args.ready_state, ReadyStateArg::Interactive);
        assert!(args.layout.is_none());
    }

    #[test]
    fn bootstraps_from_site_root() {
        let dir = scratch_dir();
        let page = dir.join("index.html");
        assert!(
            std::fs::write(
                &page,
                "<!DOCTYPE html><html><head><title>t</title></head><body>\
                 <script src=\"renderLayout.js\" data-path=\"layout.html\"></script>\
                 <template id=\"title\">Hello</template><p>body</p></body></html>",
            )
            .is_ok()
        );
        assert!(
            std::fs::write(
                dir.join("layout.html"),
                "<header><slot name=\"title\"></slot></header><main><slot></slot></main>",
            )
            .is_ok()
        );

        let args = Args::try_parse_from([
            "render-layout".into(),
            page.clone().into_os_string(),
            "--site-root".into(),
            dir.clone().into_os_string(),
            "--url".into(),
            "http://localhost/index.html".into(),
        ]);
        let args = match args {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        let output = run(&args);
        assert!(output.is_ok());
        let output = match output {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(output.contains("<header>Hello</header><main><script"));
        assert!(output.contains("<p>body</p></main>"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_layout_file_reports_read_error() {
        let dir = scratch_dir();
        let page = dir.join("index.html");
        assert!(std::fs::write(&page, "<body><p>a</p><p>b</p></body>").is_ok());

        let args = Args::try_parse_from([
            "render-layout".into(),
            page.into_os_string(),
            "--layout".into(),
            dir.join("missing.html").into_os_string(),
        ]);
        let args = match args {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        let output = run(&args);
        assert!(output.is_err());
        if let Err(error) = output {
            assert_eq!(error.code, "app.read_failed");
        }
        let _ = std::fs::remove_dir_all(dir);
    }
}
