/// The edge guard and the page server wired together the way `main` does.
///
/// Unit tests check each half alone; these check that no spelling of a
/// protected URL reaches a protected page without a session.
use std::path::Path;

use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use tower::{Layer, ServiceExt};

use server::AppState;
use server::handlers::PageService;
use server::tower_middle::EdgeGuardLayer;
use shared::access::{TokenSigner, unix_now};
use shared::types::{AppConfig, Claims, Role};

const SECRET: &str = "guarded-pages-secret-0123456789abcdef";

fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("index.html"), "home").unwrap();
    std::fs::write(root.join("dashboard.html"), "admin-dashboard").unwrap();
    std::fs::write(root.join("student.html"), "student-home").unwrap();
    std::fs::create_dir_all(root.join("student")).unwrap();
    std::fs::write(root.join("student/profile.html"), "student-profile").unwrap();
    std::fs::create_dir_all(root.join("configure/seats")).unwrap();
    std::fs::write(root.join("configure/seats/index.html"), "seat-layout").unwrap();
    std::fs::write(root.join("404.html"), "missing").unwrap();
    dir
}

fn state(web_dir: &Path) -> AppState {
    let cfg: AppConfig = toml::from_str(&format!(
        "[paths]\nweb_dir = {:?}\n[auth]\njwt_secret = \"{}\"\n",
        web_dir.display().to_string(),
        SECRET
    ))
    .unwrap();
    AppState::new(cfg).unwrap()
}

struct Reply {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

async fn get(state: &AppState, path: &str, token: Option<&str>) -> Reply {
    let mut req = Request::builder().uri(path);
    if let Some(t) = token {
        req = req.header("cookie", format!("token={}", t));
    }
    let req = req.body(String::new()).unwrap();

    let service = EdgeGuardLayer::new(state.guard.clone()).layer(PageService::new(state.clone()));
    let res = service.oneshot(req).await.unwrap();

    let status = res.status();
    let location = res
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        location,
        body: String::from_utf8_lossy(&body).into_owned(),
    }
}

fn token(role: Role) -> String {
    TokenSigner::new(SECRET)
        .sign(&Claims::new("u1", role, unix_now() + 600))
        .unwrap()
}

const PROTECTED_BODIES: [&str; 4] = [
    "admin-dashboard",
    "student-home",
    "student-profile",
    "seat-layout",
];

#[tokio::test]
async fn aliases_never_serve_protected_pages_anonymously() {
    let dir = site();
    let st = state(dir.path());

    for alias in [
        "/dashboard.html",
        "//dashboard",
        "/./dashboard",
        "/dashboard/",
        "/student.html",
        "/student/",
        "/student/./profile",
        "/student/profile.html",
        "//configure/seats",
        "/configure/seats/index.html",
        "/static/../dashboard",
    ] {
        let reply = get(&st, alias, None).await;
        assert_ne!(reply.status, StatusCode::OK, "{alias}");
        assert!(
            !PROTECTED_BODIES.contains(&reply.body.as_str()),
            "{alias} leaked {:?}",
            reply.body
        );
    }
}

#[tokio::test]
async fn canonical_redirect_then_login_redirect() {
    let dir = site();
    let st = state(dir.path());

    let first = get(&st, "//dashboard/", None).await;
    assert_eq!(first.status, StatusCode::FOUND);
    assert_eq!(first.location.as_deref(), Some("/dashboard"));

    let second = get(&st, "/dashboard", None).await;
    assert_eq!(second.status, StatusCode::FOUND);
    assert_eq!(
        second.location.as_deref(),
        Some("/auth/login?redirect=%2Fdashboard")
    );
}

#[tokio::test]
async fn sessions_reach_their_own_pages_only() {
    let dir = site();
    let st = state(dir.path());
    let admin = token(Role::Admin);
    let student = token(Role::Student);

    let reply = get(&st, "/dashboard", Some(&admin)).await;
    assert_eq!((reply.status, reply.body.as_str()), (StatusCode::OK, "admin-dashboard"));

    let reply = get(&st, "/configure/seats", Some(&admin)).await;
    assert_eq!((reply.status, reply.body.as_str()), (StatusCode::OK, "seat-layout"));

    let reply = get(&st, "/student/profile", Some(&student)).await;
    assert_eq!((reply.status, reply.body.as_str()), (StatusCode::OK, "student-profile"));

    let reply = get(&st, "/dashboard", Some(&student)).await;
    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location.as_deref(), Some("/student"));
}

#[tokio::test]
async fn parent_segments_are_a_bad_request() {
    let dir = site();
    let st = state(dir.path());
    let reply = get(&st, "/auth/../dashboard", Some(&token(Role::Admin))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}
