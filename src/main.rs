use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use kiln::{
    application::error::AppError,
    cache::{CacheConfig, CacheStore, RenderContext},
    compile::Bindings,
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        warmer::CacheWarmer,
    },
    template::HtmlTemplate,
};
use serde_json::Value;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let store = Arc::new(CacheStore::new(CacheConfig {
        include_dir: Some(settings.template.dir.clone()),
        ..CacheConfig::from(&settings.cache)
    }));

    match command {
        config::Command::Content(args) => run_content(&store, &settings, &args),
        config::Command::Path(args) => {
            let ctx = render_context(&settings, args.locale.as_deref(), Bindings::new());
            let path = store.get_cache_file_path(&args.file, &ctx)?;
            print_line(&path.display().to_string())
        }
        config::Command::Url(args) => {
            let ctx = render_context(&settings, args.locale.as_deref(), Bindings::new());
            let url = store.get_file_url(&args.file, &ctx)?;
            print_line(&url)
        }
        config::Command::Clear => store.clear_cache().map_err(AppError::from),
        config::Command::Warm(args) => run_warm(store, &settings, &args),
        config::Command::Render(args) => run_render(store, &settings, args),
        config::Command::Serve(_) => run_serve(&store, &settings).await,
    }
}

fn render_context(
    settings: &config::Settings,
    locale: Option<&str>,
    bindings: Bindings,
) -> RenderContext {
    let locale = locale
        .map(str::to_string)
        .or_else(|| settings.cache.locale.clone());
    RenderContext {
        locale,
        bindings,
    }
}

fn run_content(
    store: &CacheStore,
    settings: &config::Settings,
    args: &config::EntryArgs,
) -> Result<(), AppError> {
    let ctx = render_context(settings, args.locale.as_deref(), Bindings::new());
    let content = store.get_content(&args.file, &ctx)?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&content)
        .and_then(|()| stdout.flush())
        .map_err(|err| AppError::from(InfraError::from(err)))
}

fn run_warm(
    store: Arc<CacheStore>,
    settings: &config::Settings,
    args: &config::WarmArgs,
) -> Result<(), AppError> {
    let ctx = render_context(settings, args.locale.as_deref(), Bindings::new());
    let report = CacheWarmer::new(store).warm(&args.paths, &ctx);

    for (path, reason) in &report.failed {
        warn!(
            target = "kiln::warm",
            path = %path.display(),
            reason = reason.as_str(),
            "Entry not warmed"
        );
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "{} of {} files failed to warm",
            report.failed.len(),
            report.failed.len() + report.warmed.len()
        )))
    }
}

fn run_render(
    store: Arc<CacheStore>,
    settings: &config::Settings,
    args: config::RenderArgs,
) -> Result<(), AppError> {
    let mut template = HtmlTemplate::new(store, &settings.template.dir);
    if let Some(locale) = args.locale.or_else(|| settings.cache.locale.clone()) {
        template = template.with_locale(locale);
    }
    if let Some(layout) = settings.template.layout.as_ref() {
        template.set_layout(layout);
    }
    for (key, value) in args.vars {
        template.set(key, Value::String(value));
    }
    template.add_files(&args.files, args.inline);

    let html = template.render(args.layout.as_deref())?;
    print_line(&html)
}

async fn run_serve(store: &CacheStore, settings: &config::Settings) -> Result<(), AppError> {
    let state = HttpState::from_store(store)?;
    let mount = state.mount().to_string();
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "kiln::serve",
        addr = %settings.server.addr,
        mount = mount.as_str(),
        "Serving cache files"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target = "kiln::serve", "Received shutdown signal"),
        Err(err) => warn!(
            target = "kiln::serve",
            error = %err,
            "Unable to listen for shutdown signal"
        ),
    }
}

fn print_line(line: &str) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}").map_err(|err| AppError::from(InfraError::from(err)))
}
