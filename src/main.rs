use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use judge::broadcast::StatusBroadcaster;
use judge::config::{CliArgs, Config};
use judge::database as db;
use judge::judge::Judge;
use judge::models::Problem;
use judge::web_server::build_server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let db_path = db::get_db_path();
    let cli = CliArgs::parse();

    let Config {
        server: server_config,
        judge: judge_config,
        toolchains,
        problems,
    } = cli.to_config().context("Failed to load configuration")?;

    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .context("Failed to initialize database")?;

    for problem in problems {
        let problem = Problem::from(problem);
        db::upsert_problem(&db_pool, &problem)
            .await
            .with_context(|| format!("Failed to seed problem {}", problem.id))?;
    }

    let interrupted = db::fail_unfinished_submissions(&db_pool, "Judging interrupted")
        .await
        .context("Failed to reconcile unfinished submissions")?;
    if interrupted > 0 {
        log::warn!("Marked {interrupted} unfinished submission(s) from a previous run as failed");
    }

    log::info!(
        "Judge workspaces live under {}",
        judge_config.workspace_root().display()
    );

    let broadcaster = Arc::new(StatusBroadcaster::new());
    let judge = Arc::new(Judge::new(
        db_pool.clone(),
        broadcaster.clone(),
        &judge_config,
        toolchains,
    ));

    // ======= PREPARATION END, EXECUTION START =======

    let server =
        build_server(server_config, db_pool.clone(), judge).context("Failed to build server")?;
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. End open event streams, otherwise graceful shutdown waits on them
    broadcaster.close();

    // 2. Stop accepting requests and let in-flight judging finish
    server_handle.stop(true).await;

    db_pool.close().await;
    log::info!("Shutdown complete");
    Ok(())
}
