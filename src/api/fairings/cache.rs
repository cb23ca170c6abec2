use rocket::fairing::AdHoc;
use rocket::http::Header;

/// Routes whose body changes every time a batch is composed.
const UNCACHEABLE_PATHS: &[&str] = &["/static", "/download", "/batch/"];

/// The photostrip lives at a fixed URL but is overwritten by every batch, so
/// browsers must not keep a copy.
pub fn cache_control_fairing() -> AdHoc {
    AdHoc::on_response("Cache-Control", |req, res| {
        Box::pin(async move {
            let path = req.uri().path();
            if UNCACHEABLE_PATHS
                .iter()
                .any(|prefix| path.as_str().starts_with(prefix))
            {
                res.set_header(Header::new("Cache-Control", "no-store"));
            }
        })
    })
}
