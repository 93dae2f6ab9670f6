use peerhttp::config::Config;
use peerhttp::{Method, Outcome, Request, ResponseWriter, Server, StatusCode};
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    LocalSet::new().run_until(serve(cfg)).await
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    let mut server = Server::with_config(handle, cfg.server.clone());
    server.open(cfg.server.listen_addr.as_str()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.close().await;
    Ok(())
}

/// Control endpoint: `GET /status` reports liveness, `POST /` echoes the body.
fn handle(req: Request, res: ResponseWriter) -> Outcome {
    match (req.method, req.path.as_str()) {
        (Method::GET | Method::HEAD, "/status") => {
            res.send(StatusCode::OK, "application/json", "{\"ok\":true}\n");
        }
        (Method::POST, "/") => {
            let content_type = req
                .header("Content-Type")
                .unwrap_or("application/octet-stream")
                .to_string();
            res.send(StatusCode::OK, &content_type, req.body);
        }
        (_, "/" | "/status") => res.send_error(StatusCode::METHOD_NOT_ALLOWED),
        _ => res.send_error(StatusCode::NOT_FOUND),
    }

    Outcome::Continue
}
