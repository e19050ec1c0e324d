use actix_web::{delete, get, post, web, Responder, Scope};
use serde::{Deserialize, Serialize};

use crate::{
    dispatcher::{DispatchSummary, Dispatcher},
    error::Error,
    message::{MessageRecord, MessageStatus, NewMessage, QueueStats},
    service::Service,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<MessageStatus>,
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Serialize, Deserialize)]
pub struct ListMessagesResponse {
    messages: Vec<MessageRecord>,
    total: u64,
    page: u32,
}

#[get("/{tenant_id}")]
async fn list_messages(
    service: web::Data<Service>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> Result<impl Responder, Error> {
    let page = query.page.unwrap_or(1);

    let (messages, total) = service
        .list(&*path, query.status, page, query.page_size.unwrap_or(25))
        .await?;

    Ok(web::Json(ListMessagesResponse {
        messages,
        total,
        page,
    }))
}

#[get("/{tenant_id}/stats")]
async fn queue_stats(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<web::Json<QueueStats>, Error> {
    Ok(web::Json(service.stats(&*path).await?))
}

#[derive(Serialize, Deserialize)]
pub struct EnqueueResponse {
    id: i64,
}

#[post("/{tenant_id}")]
async fn enqueue_message(
    service: web::Data<Service>,
    path: web::Path<String>,
    data: web::Json<NewMessage>,
) -> Result<impl Responder, Error> {
    let id = service.enqueue(&*path, data.into_inner()).await?;

    Ok(web::Json(EnqueueResponse { id }))
}

#[post("/{tenant_id}/{id}/retry")]
async fn retry_message(
    service: web::Data<Service>,
    path: web::Path<(String, i64)>,
) -> Result<impl Responder, Error> {
    let (tenant_id, id) = &*path;

    service.retry(tenant_id, *id).await?;

    Ok("OK")
}

#[delete("/{tenant_id}/{id}")]
async fn delete_message(
    service: web::Data<Service>,
    path: web::Path<(String, i64)>,
) -> Result<impl Responder, Error> {
    let (tenant_id, id) = &*path;

    service.delete(tenant_id, *id).await?;

    Ok("OK")
}

#[derive(Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    removed: u64,
}

#[delete("/{tenant_id}/sent")]
async fn delete_sent_messages(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let removed = service.delete_sent(&*path).await?;

    Ok(web::Json(BulkDeleteResponse { removed }))
}

#[delete("/{tenant_id}")]
async fn delete_all_messages(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let removed = service.delete_all(&*path).await?;

    Ok(web::Json(BulkDeleteResponse { removed }))
}

#[derive(Serialize, Deserialize)]
pub struct DispatchResponse {
    status: &'static str,
}

/// Fire-and-forget dispatch trigger. The run continues in the background;
/// its outcome is visible through stats and the per-message status fields.
#[post("/{tenant_id}/dispatch")]
async fn dispatch_queue(
    dispatcher: web::Data<Dispatcher>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let tenant_id = path.into_inner();
    let dispatcher = dispatcher.clone();

    tokio::spawn(async move {
        match dispatcher.run(&tenant_id).await {
            Ok(DispatchSummary { sent, failed, .. }) => {
                tracing::info!(%tenant_id, sent, failed, "background dispatch finished");
            }
            Err(e) => {
                tracing::error!(%tenant_id, error = %e, "background dispatch aborted");
            }
        }
    });

    Ok(web::Json(DispatchResponse {
        status: "dispatching",
    }))
}

pub fn service() -> Scope {
    web::scope("/queue")
        .service(queue_stats)
        .service(dispatch_queue)
        .service(delete_sent_messages)
        .service(retry_message)
        .service(delete_message)
        .service(list_messages)
        .service(enqueue_message)
        .service(delete_all_messages)
}
