/// Fixed greeting served on `/`
pub const GREETING: &str = "Hello from Rust + Azure!";

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Greeting", body = String, content_type = "text/plain")
    ),
    tag = "system"
)]
pub async fn home() -> &'static str {
    GREETING
}
