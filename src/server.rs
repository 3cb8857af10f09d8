pub mod handlers {
    use actix_web::{delete, get, post, put, web, HttpResponse};
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::api::{
        ClearAllResponse, CreateNotificationRequest, HealthResponse, MarkAllReadResponse,
        NotificationListResponse, NotificationResponse, SetGenericResponse, UnreadCountResponse,
    };
    use crate::auth::Caller;
    use crate::error::{AppError, TraceErr};
    use crate::permissions::PermissionGroup;
    use crate::state::NotificationManager;

    fn parse_id(raw: &str) -> Result<Uuid, AppError> {
        raw.parse::<Uuid>()
            .map_err(|_| AppError::Validation(format!("Invalid notification id '{}'", raw)))
    }

    #[get("/health")]
    pub async fn health() -> HttpResponse {
        HttpResponse::Ok().json(HealthResponse {
            success: true,
            status: "ok".to_string(),
        })
    }

    #[get("/notifications/unread-count/{user_id}")]
    pub async fn unread_count(
        manager: web::Data<Arc<NotificationManager>>,
        caller: Caller,
        path: web::Path<String>,
    ) -> Result<HttpResponse, AppError> {
        caller.authorize(PermissionGroup::ViewNotifications)?;
        let user_id = path.into_inner();

        let unread_count = manager
            .unread_count(&user_id)
            .await
            .trace_err("unread count")?;
        Ok(HttpResponse::Ok().json(UnreadCountResponse {
            success: true,
            unread_count,
        }))
    }

    #[get("/notifications/{user_id}")]
    pub async fn list_notifications(
        manager: web::Data<Arc<NotificationManager>>,
        caller: Caller,
        path: web::Path<String>,
    ) -> Result<HttpResponse, AppError> {
        caller.authorize(PermissionGroup::ViewNotifications)?;
        let user_id = path.into_inner();

        let notifications = manager.list(&user_id).await.trace_err("list notifications")?;
        Ok(HttpResponse::Ok().json(NotificationListResponse {
            success: true,
            notifications,
        }))
    }

    #[post("/notifications")]
    pub async fn create_notification(
        manager: web::Data<Arc<NotificationManager>>,
        caller: Caller,
        request: web::Json<CreateNotificationRequest>,
    ) -> Result<HttpResponse, AppError> {
        caller.authorize(PermissionGroup::SendNotifications)?;

        let notification = manager
            .create(request.into_inner())
            .await
            .trace_err("create notification")?;
        Ok(HttpResponse::Created().json(NotificationResponse {
            success: true,
            notification,
        }))
    }

    #[put("/notifications/read-all/{user_id}")]
    pub async fn mark_all_read(
        manager: web::Data<Arc<NotificationManager>>,
        caller: Caller,
        path: web::Path<String>,
    ) -> Result<HttpResponse, AppError> {
        caller.authorize(PermissionGroup::ViewNotifications)?;
        let user_id = path.into_inner();

        let modified_count = manager
            .mark_all_read(&user_id)
            .await
            .trace_err("mark all read")?;
        Ok(HttpResponse::Ok().json(MarkAllReadResponse {
            success: true,
            modified_count,
        }))
    }

    #[put("/notifications/{id}/read")]
    pub async fn mark_read(
        manager: web::Data<Arc<NotificationManager>>,
        caller: Caller,
        path: web::Path<String>,
    ) -> Result<HttpResponse, AppError> {
        caller.authorize(PermissionGroup::ViewNotifications)?;
        let id = parse_id(&path.into_inner())?;

        let notification = manager.mark_read(id).await?;
        Ok(HttpResponse::Ok().json(NotificationResponse {
            success: true,
            notification,
        }))
    }

    #[delete("/notifications/clear-all/{user_id}")]
    pub async fn clear_all(
        manager: web::Data<Arc<NotificationManager>>,
        caller: Caller,
        path: web::Path<String>,
    ) -> Result<HttpResponse, AppError> {
        caller.authorize(PermissionGroup::ViewNotifications)?;
        let user_id = path.into_inner();

        let deleted_count = manager.clear_all(&user_id).await.trace_err("clear all")?;
        Ok(HttpResponse::Ok().json(ClearAllResponse {
            success: true,
            deleted_count,
        }))
    }

    #[delete("/notifications/{id}")]
    pub async fn delete_notification(
        manager: web::Data<Arc<NotificationManager>>,
        caller: Caller,
        path: web::Path<String>,
    ) -> Result<HttpResponse, AppError> {
        caller.authorize(PermissionGroup::ViewNotifications)?;
        let id = parse_id(&path.into_inner())?;

        manager.delete(id).await?;
        Ok(HttpResponse::Ok().json(SetGenericResponse { success: true }))
    }
}

use actix_web::{error::JsonPayloadError, web, HttpRequest};

use crate::error::AppError;

fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!("Rejected JSON body on {}: {}", req.path(), err);
    AppError::Validation(format!("Invalid request body: {}", err)).into()
}

/// Registers every route. The literal `read-all`, `clear-all` and `unread-count`
/// segments must be registered before their `{id}` / `{user_id}` siblings.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(handlers::health)
        .service(handlers::unread_count)
        .service(handlers::list_notifications)
        .service(handlers::create_notification)
        .service(handlers::mark_all_read)
        .service(handlers::mark_read)
        .service(handlers::clear_all)
        .service(handlers::delete_notification);
}
