use actix_web::{get, put, web, Responder, Scope};

use crate::{error::Error, rate_limit::RateLimitPolicy, service::Service};

#[get("/{tenant_id}")]
async fn get_rate_limit(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<web::Json<RateLimitPolicy>, Error> {
    Ok(web::Json(service.rate_limit(&*path).await?))
}

#[put("/{tenant_id}")]
async fn save_rate_limit(
    service: web::Data<Service>,
    path: web::Path<String>,
    data: web::Json<RateLimitPolicy>,
) -> Result<impl Responder, Error> {
    service.save_rate_limit(&*path, data.into_inner()).await?;

    Ok("OK")
}

pub fn service() -> Scope {
    web::scope("/rate-limit")
        .service(get_rate_limit)
        .service(save_rate_limit)
}
