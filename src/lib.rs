//! Backend for an open letter: signers submit their name, confirm through an
//! emailed link, and verified signatures are published in a searchable list.

#[macro_use]
extern crate rocket;

pub mod config;
pub mod error;
pub mod mail;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod schema;
pub mod signing;
pub mod store;
pub mod validation;
pub mod verification;

use rocket::{Build, Rocket};

pub use routes::AppState;

pub fn rocket(state: AppState) -> Rocket<Build> {
    rocket::build()
        .manage(state)
        .mount(
            "/",
            routes![
                routes::list_signatures,
                routes::submit_signature,
                routes::verify_signature,
            ],
        )
        .register("/", catchers![routes::default_catcher])
}
