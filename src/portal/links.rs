//! Slugs, landing URLs, object paths, and route resolution.

use uuid::Uuid;

/// Length of a case slug.
pub const SLUG_LEN: usize = 6;

/// Generate a random slug of [`SLUG_LEN`] upper-case alphanumerics.
pub fn generate_slug() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SLUG_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// URL of the client-facing page for `slug`.
///
/// ```
/// use qr_stamp::portal::links::landing_url;
///
/// assert_eq!(landing_url("https://law.example", "AB12CD"), "https://law.example?v=AB12CD");
/// ```
pub fn landing_url(origin: &str, slug: &str) -> String {
    format!("{}?v={}", origin.trim_end_matches('/'), slug)
}

/// Short form of a URL for printing: no scheme, no leading `www.`.
///
/// ```
/// use qr_stamp::portal::links::display_url;
///
/// assert_eq!(display_url("https://www.law.example?v=AB12CD"), "law.example?v=AB12CD");
/// ```
pub fn display_url(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.strip_prefix("www.").unwrap_or(rest)
}

/// Object path for an uploaded video.
///
/// The extension comes from the original file name and defaults to `mp4`.
pub fn video_object_path(slug: &str, file_name: &str, millis: i64) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp4")
        .to_ascii_lowercase();
    format!("videos/{}_video_{}.{}", slug, millis, ext)
}

/// Object path for a stamped document.
pub fn document_object_path(slug: &str) -> String {
    format!("documents/{}_with_qr.pdf", slug)
}

/// Which screen a URL opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Client landing page for a slug
    Landing(String),
    /// Team member sign-up
    Register,
    /// Password reset target
    UpdatePassword,
    /// Sign-in form
    Login,
    /// Admin dashboard
    Admin,
    /// Unknown path
    NotFound,
}

/// Resolve a path and query string to a screen.
///
/// A `v` query parameter always wins, so landing pages work signed out.
pub fn resolve_route(path: &str, query: &str, has_session: bool) -> Route {
    if let Some(slug) = query_param(query, "v").filter(|slug| !slug.is_empty()) {
        return Route::Landing(slug.to_string());
    }
    match path {
        "/cadastro" => Route::Register,
        "/update-password" => Route::UpdatePassword,
        "/login" if has_session => Route::Admin,
        "/login" => Route::Login,
        _ if !has_session => Route::Login,
        "" | "/" | "/admin" => Route::Admin,
        _ => Route::NotFound,
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_shape() {
        for _ in 0..50 {
            let slug = generate_slug();
            assert_eq!(slug.len(), SLUG_LEN);
            assert!(slug.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
        assert_ne!(generate_slug(), generate_slug());
    }

    #[test]
    fn test_landing_url_trims_slash() {
        assert_eq!(landing_url("http://localhost:5173/", "X1"), "http://localhost:5173?v=X1");
    }

    #[test]
    fn test_display_url() {
        assert_eq!(display_url("http://localhost:5173?v=X1"), "localhost:5173?v=X1");
        assert_eq!(display_url("law.example"), "law.example");
        assert_eq!(display_url("https://wwwx.example"), "wwwx.example");
    }

    #[test]
    fn test_object_paths() {
        assert_eq!(
            video_object_path("AB12CD", "Explanation.MOV", 1700000000000),
            "videos/AB12CD_video_1700000000000.mov"
        );
        assert_eq!(video_object_path("AB12CD", "noext", 1), "videos/AB12CD_video_1.mp4");
        assert_eq!(document_object_path("AB12CD"), "documents/AB12CD_with_qr.pdf");
    }

    #[test]
    fn test_routes() {
        assert_eq!(resolve_route("/", "?v=AB12CD", false), Route::Landing("AB12CD".into()));
        assert_eq!(resolve_route("/admin", "x=1&v=Q", true), Route::Landing("Q".into()));
        assert_eq!(resolve_route("/cadastro", "", false), Route::Register);
        assert_eq!(resolve_route("/update-password", "", false), Route::UpdatePassword);
        assert_eq!(resolve_route("/login", "", false), Route::Login);
        assert_eq!(resolve_route("/login", "", true), Route::Admin);
        assert_eq!(resolve_route("/admin", "", false), Route::Login);
        assert_eq!(resolve_route("", "", true), Route::Admin);
        assert_eq!(resolve_route("/admin", "?v=", true), Route::Admin);
        assert_eq!(resolve_route("/nope", "", true), Route::NotFound);
    }
}
