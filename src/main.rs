#![allow(proc_macro_derive_resolution_fallback)] // See: https://github.com/diesel-rs/diesel/issues/1785

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod api;
mod auth;
mod catalog;
mod db;
mod error;
mod models;
mod oauth;
mod schema;
mod session;
mod upload;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

use self::oauth::{GoogleOAuth, Secrets};
use self::session::SessionStore;

pub struct AppState {
    pub db: db::Pool,
    pub sessions: SessionStore,
    pub oauth: GoogleOAuth,
    pub upload_dir: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    // Read the port on which to listen.
    let port = u16::from_str(&std::env::var("PORT").unwrap_or("8000".into()))
        .expect("Failed to parse $PORT!");

    // Read the IP address on which to listen
    let ip = IpAddr::from_str(&std::env::var("LISTEN_IP").unwrap_or("127.0.0.1".into()))
        .expect("Failed to parse $LISTEN_IP");

    // Construct the full Socket address
    let listen_addr = SocketAddr::new(ip, port);

    // Create a connection pool to the database
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set!");
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .expect("Failed to create database connection pool!");

    // The registered OAuth client identity lives in a local secrets file.
    let secrets_path =
        std::env::var("CLIENT_SECRETS_FILE").unwrap_or("client_secrets.json".into());
    let secrets = Secrets::load(&secrets_path).expect("Failed to read client secrets!");
    let oauth = GoogleOAuth::new(&secrets).expect("Failed to build the OAuth client!");

    let upload_dir = PathBuf::from(std::env::var("UPLOAD_FOLDER").unwrap_or("./uploads".into()));
    std::fs::create_dir_all(&upload_dir).expect("Failed to create the upload directory!");

    let state = web::Data::new(AppState {
        db: pool,
        sessions: SessionStore::new(),
        oauth,
        upload_dir,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .route("/", web::get().to(catalog::show_app))
            .route("/index", web::get().to(catalog::show_app))
            .route("/login", web::get().to(auth::show_login))
            .route("/gconnect", web::post().to(auth::gconnect))
            .route("/gdisconnect", web::get().to(auth::gdisconnect))
            .route("/disconnect", web::get().to(auth::disconnect))
            .route("/regions", web::get().to(catalog::show_regions))
            .route("/regions/JSON", web::get().to(catalog::all_regions_json))
            .route("/regions/XML", web::get().to(catalog::all_regions_xml))
            .route(
                "/regions/{id}/JSON",
                web::get().to(catalog::single_region_json),
            )
            .route("/regions/{region}", web::get().to(catalog::single_region))
            .route("/brands", web::get().to(catalog::show_brands))
            .route("/brands/JSON", web::get().to(catalog::all_brands_json))
            .route("/brands/XML", web::get().to(catalog::all_brands_xml))
            .route(
                "/brands/{id}/JSON",
                web::get().to(catalog::single_brand_json),
            )
            .route("/brands/{id}/edit", web::post().to(catalog::edit_whiskey))
            .route(
                "/brands/{id}/delete",
                web::post().to(catalog::delete_whiskey),
            )
            .route("/brands/{brand}", web::get().to(catalog::single_brand))
            .route("/whiskey/new", web::post().to(catalog::new_whiskey))
            .route("/uploads/{filename}", web::get().to(upload::uploaded_file))
    })
    .bind(listen_addr)?;

    info!("Listening on {}", listen_addr);

    server.run().await
}
