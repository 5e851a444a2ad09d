use crate::ledger::EventLedger;
use crate::queue::BuildQueue;
use crate::registry::SharedRegistry;
use crate::web;
use actix_web::{get, post, HttpResponse, Responder};
use crossbuild_common::api::{BuildEvent, BuildRequest, ListEvents};
use crossbuild_common::errors::*;

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().body("Not found\n")
}

async fn submit(queue: &BuildQueue, input: &str) -> web::Result<BuildEvent> {
    let event = queue.enqueue(input).await?;
    info!("Accepted build event #{} for {:?}", event.id, event.git_ref);
    Ok(event)
}

#[post("/hook")]
pub async fn push_hook(
    queue: web::Data<BuildQueue>,
    request: web::Json<BuildRequest>,
) -> web::Result<impl Responder> {
    let event = submit(&queue, &request.git_ref).await?;
    Ok(HttpResponse::Ok().json(event))
}

/// `GET /hook?ref=...`, only mounted in test mode.
#[get("/hook")]
pub async fn test_hook(
    queue: web::Data<BuildQueue>,
    query: web::Query<BuildRequest>,
) -> web::Result<impl Responder> {
    let event = submit(&queue, &query.git_ref).await?;
    Ok(HttpResponse::Ok().json(event))
}

#[get("/api/v0/events")]
pub async fn list_events(
    ledger: web::Data<dyn EventLedger>,
    query: web::Query<ListEvents>,
) -> web::Result<impl Responder> {
    let limit = query.limit.filter(|l| *l >= 0);
    let events = ledger.list(limit).map_err(Error::from)?;
    Ok(HttpResponse::Ok().json(events))
}

#[get("/api/v0/events/{id}")]
pub async fn get_event(
    ledger: web::Data<dyn EventLedger>,
    id: web::Path<i32>,
) -> web::Result<impl Responder> {
    match ledger.get(id.into_inner()).map_err(Error::from)? {
        Some(event) => Ok(HttpResponse::Ok().json(event)),
        None => Ok(not_found()),
    }
}

#[get("/api/v0/targets")]
pub async fn list_targets(registry: web::Data<SharedRegistry>) -> web::Result<impl Responder> {
    let targets = registry
        .read()
        .map_err(|_| anyhow!("Target registry lock is poisoned"))?
        .list();
    Ok(HttpResponse::Ok().json(targets))
}
