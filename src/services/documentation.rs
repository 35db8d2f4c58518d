use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the CamBlaster sync daemon.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::event_stream,
        crate::routes::session::get_session,
        crate::routes::session::sign_in,
        crate::routes::session::sign_out,
        crate::routes::session::begin,
        crate::routes::session::finish_tutorial,
        crate::routes::session::report_score,
        crate::routes::session::game_over,
        crate::routes::session::restart,
        crate::routes::session::return_to_menu,
        crate::routes::leaderboard::get_leaderboard,
        crate::routes::leaderboard::get_difficulty_leaderboard,
        crate::routes::leaderboard::get_profile,
        crate::routes::preferences::toggle_mute,
        crate::routes::preferences::play_sound,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::session::SessionView,
            crate::dto::session::GameOverResponse,
            crate::dto::leaderboard::LeaderboardEntry,
            crate::services::audio::SoundCue,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events stream"),
        (name = "session", description = "Sign-in, screen flow and score reporting"),
        (name = "leaderboard", description = "Rankings and stored profiles"),
        (name = "audio", description = "Mute preference and sound cues"),
    )
)]
/// OpenAPI document of every HTTP route.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/events",
            "/session/sign-in",
            "/session/game-over",
            "/leaderboard/{difficulty}",
            "/profiles/{uid}",
            "/sounds",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
