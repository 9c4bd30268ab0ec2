use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tollgate::api;
use tollgate::logger::*;
use tollgate::server::*;
use tollgate::settings::*;
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    match cli.command.unwrap_or_default() {
        Command::Serve => serve(&project_settings).await,
        Command::Reap { once } => reap(&project_settings, once).await,
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "could not listen for SIGINT");
    }
}

fn tls_paths(http: &Http) -> anyhow::Result<Option<(String, String)>> {
    let (Some(cert_path), Some(key_path)) = (&http.cert_path, &http.key_path) else {
        return Ok(None);
    };
    if !fs::metadata(cert_path)?.is_file() {
        return Err(anyhow::anyhow!("TLS cert is not a regular file: {:?}", cert_path));
    }
    if !fs::metadata(key_path)?.is_file() {
        return Err(anyhow::anyhow!("TLS key is not a regular file: {:?}", key_path));
    }
    Ok(Some((cert_path.clone(), key_path.clone())))
}

async fn serve(project_settings: &Settings) -> anyhow::Result<()> {
    let address: SocketAddr = project_settings.http.address.parse()?;
    let tls = tls_paths(&project_settings.http)?;

    let server = Arc::new(Server::try_new(project_settings).await?);

    let api_v1 = warp::path("api")
        .and(warp::path("v1"))
        .and(api::v1::routes(server.clone()))
        .recover(api::v1::recover_error)
        .with(warp::trace::request());

    match tls {
        Some((cert_path, key_path)) => {
            info!(%address, "listening with TLS");
            warp::serve(api_v1)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(address, shutdown_signal())
                .1
                .await;
        }
        None => {
            warn!(%address, "listening without TLS");
            let (_, running) =
                warp::serve(api_v1).try_bind_with_graceful_shutdown(address, shutdown_signal())?;
            running.await;
        }
    }

    let shutdown_timeout = std::time::Duration::from_secs(30);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => info!("server shutdown successfully"),
        Err(_) => error!("server shutdown timed out"),
    }

    Ok(())
}

async fn reap(project_settings: &Settings, once: bool) -> anyhow::Result<()> {
    let backends = Backends::connect(&project_settings.storage).await?;
    let cancel = CancellationToken::new();
    let reaper = TokenReaper::new(
        backends.store,
        backends.clock,
        project_settings.reaper.interval(),
        cancel.clone(),
    );

    if once {
        reaper.tick_once().await?;
    } else {
        let watcher = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            watcher.cancel();
        });
        reaper.run().await;
    }

    if let Some(pool) = backends.pool {
        pool.close().await;
    }
    Ok(())
}
