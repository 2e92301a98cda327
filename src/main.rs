use std::{net::SocketAddr, process, sync::Arc};

use livedoc::{
    application::{
        error::AppError,
        error_image::ErrorImageRenderer,
        kroki::KrokiClient,
        pipeline::{PipelineConfig, RequestPipeline},
    },
    config::{self, Command, Settings, StartArgs},
    domain::format::{DYNAMIC_FORMATS, STATIC_FORMATS},
    infra::{
        error::InfraError,
        files::LocalFileSource,
        http::{self, HttpState},
        net, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
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
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Start(StartArgs::default()));

    match command {
        Command::Start(_) => {
            telemetry::init(&settings.logging)?;
            run_start(settings).await
        }
        Command::Formats => {
            print_formats();
            Ok(())
        }
    }
}

async fn run_start(settings: Settings) -> Result<(), AppError> {
    let base_dir = &settings.files.base_dir;
    let is_dir = tokio::fs::metadata(base_dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(AppError::validation(format!(
            "served directory `{}` does not exist or is not a directory",
            base_dir.display()
        )));
    }

    let renderer = KrokiClient::new(&settings.kroki.url, settings.kroki.timeout)
        .map_err(InfraError::from)?;
    let pipeline = RequestPipeline::new(
        PipelineConfig {
            base_dir: base_dir.clone(),
            max_file_size: settings.files.max_file_size.get(),
        },
        Arc::new(LocalFileSource::new(settings.files.read_timeout)),
        Arc::new(renderer),
        ErrorImageRenderer::new(settings.error_image.style()),
    );
    let router = http::build_router(HttpState {
        pipeline: Arc::new(pipeline),
    });

    let listener =
        net::bind_with_fallback(settings.server.addr, settings.server.port_fallback_attempts)
            .await?;
    let local_addr = listener.local_addr().map_err(InfraError::from)?;
    log_banner(&settings, local_addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "livedoc::serve", "LiveDoc stopped");
    Ok(())
}

fn log_banner(settings: &Settings, addr: SocketAddr) {
    let url = format!("http://{addr}");
    info!(
        target = "livedoc::serve",
        url = %url,
        root = %settings.files.base_dir.display(),
        kroki = %settings.kroki.url,
        max_file_size = settings.files.max_file_size.get(),
        "LiveDoc server running"
    );
    info!(
        target = "livedoc::serve",
        "Embed in Markdown: ![Diagram]({url}/path/to/diagram.puml)"
    );
    info!(
        target = "livedoc::serve",
        "Embed in Markdown: ![Image]({url}/path/to/image.png)"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "livedoc::serve", error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "livedoc::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(target = "livedoc::serve", "Shutdown signal received; draining connections");
}

fn print_formats() {
    println!("Rendered via Kroki:");
    for (extension, diagram_type) in DYNAMIC_FORMATS {
        println!("  .{extension:<12} {diagram_type}");
    }
    println!();
    println!("Served as-is:");
    for (extension, mime) in STATIC_FORMATS {
        println!("  .{extension:<12} {mime}");
    }
}
