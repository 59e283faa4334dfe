/// OpenAPI documentation for the Atelier messaging service
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Atelier Messaging Service API",
        version = "1.0.0",
        description = "Direct messaging between project collaborators: conversations, \
                       per-party archive and delete, read tracking, and file attachments",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Development server"),
    ),
    tags(
        (name = "Health", description = "Service health checks"),
        (name = "Messages", description = "Compose, list, read, archive and delete messages"),
        (name = "Attachments", description = "Attachment download and removal"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    pub fn openapi_json_path() -> &'static str {
        "/openapi.json"
    }
}
