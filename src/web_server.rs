use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::ServerConfig;
use crate::judge::Judge;
use crate::routes::{
    events_handler, get_problem_handler, get_problem_submissions_handler, get_problems_handler,
    get_stats_handler, get_top_problems_handler, get_user_submissions_handler,
    json_error_handler, post_problem_handler, post_submit_handler, put_problem_handler,
};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_BIND_PORT: u16 = 12345;

/// Registers every `/api` route; the app must provide `Data<SqlitePool>` and `Data<Judge>`
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(
            web::scope("/api")
                .service(post_submit_handler)
                .service(get_user_submissions_handler)
                .service(get_problem_submissions_handler)
                .service(get_problems_handler)
                .service(get_problem_handler)
                .service(post_problem_handler)
                .service(put_problem_handler)
                .service(get_stats_handler)
                .service(get_top_problems_handler)
                .service(events_handler),
        );
}

pub fn build_server(
    server_config: ServerConfig,
    db_pool: SqlitePool,
    judge: Arc<Judge>,
) -> std::io::Result<Server> {
    let db_pool = web::Data::new(db_pool);
    let judge = web::Data::from(judge);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(judge.clone())
            .wrap(middleware::Logger::default())
            .configure(api_routes)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
        server_config.bind_port.unwrap_or(DEFAULT_BIND_PORT),
    ))?
    .run();

    Ok(server)
}
