use actix_files::NamedFile;
use actix_web::{
    get, http, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder, Result,
};
use log::{error, info};
use serde::Deserialize;
use tera::Tera;

use std::path::PathBuf;

mod message_store;
use message_store::{MessageStore, SortOrder, StoreConfig};

struct AppState {
    tera: Tera,
    store: MessageStore,
}

#[get("/static/{filename:.*}")]
async fn get_static(req: HttpRequest) -> Result<NamedFile> {
    let path: PathBuf = req.match_info().query("filename").parse().unwrap();
    let mut whole_path = PathBuf::new();
    whole_path.push("static");
    whole_path.push(path);
    Ok(NamedFile::open(whole_path)?)
}

#[get("/")]
async fn get_index(data: web::Data<AppState>) -> impl Responder {
    let messages = match data.store.get_all(SortOrder::Desc) {
        Ok(messages) => messages,
        Err(e) => {
            error!("could not read guestbook entries: {}", e);
            Vec::new()
        }
    };

    let mut context = tera::Context::new();
    context.insert("messages", &messages);

    let output = data.tera.render("index.html", &context).unwrap();
    HttpResponse::Ok().body(output)
}

// Read-only JSON surface. Any storage failure degrades to an empty list
// with a 200, never an error status.
#[get("/api/guestbook")]
async fn get_guestbook(data: web::Data<AppState>) -> impl Responder {
    let messages = match data.store.get_all(SortOrder::Asc) {
        Ok(messages) => messages,
        Err(e) => {
            error!("could not read guestbook entries: {}", e);
            Vec::new()
        }
    };
    HttpResponse::Ok().json(messages)
}

#[derive(Deserialize)]
struct GuestbookForm {
    username: String,
    message: String,
}

#[post("/guestbook")]
async fn post_guestbook(
    form: web::Form<GuestbookForm>,
    data: web::Data<AppState>,
) -> impl Responder {
    if form.username.is_empty() || form.message.is_empty() {
        return HttpResponse::BadRequest().body("Please provide both username and message");
    }

    // A failed write is logged and swallowed; the visitor is redirected
    // either way.
    match data.store.add(&form.message, &form.username) {
        Ok(entry) => info!("new guestbook entry {} from {}", entry.id, entry.username),
        Err(e) => error!("could not persist guestbook entry: {}", e),
    }

    HttpResponse::SeeOther()
        .append_header((http::header::LOCATION, "/"))
        .finish()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = StoreConfig::from_env();
    info!("guestbook file: {}", config.path.display());
    let store = MessageStore::open(config);

    let tera = match Tera::new("templates/*.html") {
        Ok(t) => t,
        Err(e) => {
            error!("template parsing error: {}", e);
            ::std::process::exit(1);
        }
    };

    let app_data = web::Data::new(AppState { tera, store });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .service(get_static)
            .service(get_index)
            .service(get_guestbook)
            .service(post_guestbook)
    })
    .bind("127.0.0.1:8000")
    .expect("Could not bind")
    .disable_signals()
    .run();

    let handle = server.handle();
    ctrlc::set_handler(move || {
        info!("shutting down");
        futures::executor::block_on(handle.stop(true));
    })
    .expect("Could not setup ctrl-c handler");

    server.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use crate::message_store::Message;
    use rand::Rng;

    fn scratch_path() -> PathBuf {
        let token: u32 = rand::thread_rng().gen();
        std::env::temp_dir().join(format!("guestbook-api-test-{}.json", token))
    }

    fn test_state(path: PathBuf) -> web::Data<AppState> {
        web::Data::new(AppState {
            tera: Tera::default(),
            store: MessageStore::open(StoreConfig { path, seed: None }),
        })
    }

    #[actix_web::test]
    async fn api_returns_empty_array_when_file_is_missing() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(scratch_path()))
                .service(get_guestbook),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/guestbook").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: Vec<Message> = test::read_body_json(resp).await;
        assert!(body.is_empty());
    }

    #[actix_web::test]
    async fn api_returns_stored_entries_in_ascending_order() {
        let path = scratch_path();
        std::fs::write(
            &path,
            r#"[
                {"id": 2, "message": "second", "username": "bob", "created_at": "2024-01-02T00:00:00+00:00"},
                {"id": 1, "message": "first", "username": "ada", "created_at": "2024-01-01T00:00:00+00:00"}
            ]"#,
        )
        .unwrap();

        let app = test::init_service(
            App::new().app_data(test_state(path)).service(get_guestbook),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/guestbook").to_request();
        let body: Vec<Message> = test::call_and_read_body_json(&app, req).await;
        let ids: Vec<u64> = body.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[actix_web::test]
    async fn post_rejects_empty_fields() {
        let path = scratch_path();
        std::fs::write(&path, "[]").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(test_state(path.clone()))
                .service(post_guestbook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/guestbook")
            .set_form(&[("username", "ada"), ("message", "")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[actix_web::test]
    async fn post_appends_and_redirects() {
        let path = scratch_path();
        std::fs::write(&path, "[]").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(test_state(path.clone()))
                .service(post_guestbook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/guestbook")
            .set_form(&[("username", "ada"), ("message", "hello there")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), http::StatusCode::SEE_OTHER);

        let stored: Vec<Message> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "hello there");
        assert_eq!(stored[0].username, "ada");
    }
}
