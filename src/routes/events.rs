use std::convert::Infallible;

use actix_web::http::header::CACHE_CONTROL;
use actix_web::web::Bytes;
use actix_web::{HttpResponse, Responder, get, web};
use futures::stream;
use tokio::sync::broadcast::error::RecvError;

use crate::judge::Judge;

/// Name of the server-sent event carrying a status update
const EVENT_NAME: &str = "submissionStatus";

/// Streams the status events of one user as server-sent events
///
/// Only events published after the subscription are delivered. The stream
/// ends when the broadcaster is closed on shutdown.
#[get("/events/{user_id}")]
pub async fn events_handler(judge: web::Data<Judge>, path: web::Path<(String,)>) -> impl Responder {
    let user_id = path.into_inner().0;
    let receiver = judge.broadcaster().subscribe(&user_id);
    log::info!("User {user_id} subscribed to status events");

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(data) => {
                        let frame = Bytes::from(format!("event: {EVENT_NAME}\ndata: {data}\n\n"));
                        return Some((Ok::<_, Infallible>(frame), receiver));
                    }
                    Err(e) => log::error!("Failed to encode status event: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Event subscriber fell behind, {skipped} event(s) dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(events)
}

