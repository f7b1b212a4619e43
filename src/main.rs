pub mod auth;
pub mod config;
pub mod db;
pub mod eleve;
pub mod err;
pub mod models;
pub mod schedule;

use axum::handler::Handler;
use axum::{routing::get, routing::post, Extension, Json, Router};

use anyhow::bail;
use serde::Serialize;
use std::net::SocketAddr;

use crate::config::Config;
pub use crate::err::{Error, Fine, Maybe, Nothing};

pub type Payload<T> = axum::response::Result<Json<Maybe<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Fine(value)))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Nothing(err)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // `sortie-server hash-password <mot de passe>` prints the PHC string to
    // put in the config, then exits.
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("hash-password") {
        let Some(mot_de_passe) = args.next() else {
            bail!("usage: sortie-server hash-password <mot de passe>");
        };
        println!("{}", auth::hash_mot_de_passe(&mot_de_passe)?);
        return Ok(());
    }

    let config = Config::load()?;
    let pool = db::connect(&config.database_url).await?;
    db::prepare_schema(&pool).await?;

    let app = Router::new()
        .route("/admin/login", post(auth::login_admin))
        .route("/admin/logout", post(auth::logout_admin))
        .route("/eleve/list", get(eleve::list_eleves))
        .route("/eleve/create", post(eleve::create_eleve))
        .route("/eleve/read/:nom", get(eleve::read_eleve))
        .route("/eleve/update/:nom", post(eleve::update_eleve))
        .route("/eleve/delete/:nom", post(eleve::delete_eleve))
        .route("/eleve/qr/:nom", get(eleve::qr_eleve))
        .route("/sortie/:nom/:emploi_du_temps", get(eleve::afficher_sortie))
        .fallback(err::handler404.into_service())
        .layer(Extension(pool))
        .layer(Extension(config.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Starting sortie-server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
