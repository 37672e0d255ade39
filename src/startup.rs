/// Application wiring
///
/// Builds the actix App: shared state, middleware and the route table.
/// The request authenticator wraps the whole `/api/v1` scope; the auth
/// namespace bypasses it internally, and anonymous requests pass through
/// to the per-handler guards.

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::configuration::JwtSettings;
use crate::middleware::{AuthMiddleware, RequestLogging};
use crate::routes::{auth, authors, books, genres, health_check::health_check, reservations, users};

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let connection = web::Data::new(connection);
    let jwt_config_data = web::Data::new(jwt_config.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogging)
            .app_data(connection.clone())
            .app_data(jwt_config_data.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1")
                    .wrap(AuthMiddleware::new(jwt_config.clone()))
                    .service(
                        web::scope("/auth")
                            .route("/login", web::post().to(auth::login))
                            .route("/refresh", web::post().to(auth::refresh))
                            .route("/validate", web::post().to(auth::validate))
                            .route("/logout", web::post().to(auth::logout)),
                    )
                    .service(
                        web::scope("/users")
                            .route("", web::post().to(users::register))
                            .route("", web::get().to(users::list_users))
                            .route("/me", web::get().to(users::get_current_user))
                            .route("/me", web::put().to(users::update_current_user))
                            .route("/me", web::patch().to(users::patch_current_user))
                            .route("/me", web::delete().to(users::delete_current_user))
                            .route("/{id}", web::get().to(users::get_user))
                            .route("/{id}", web::put().to(users::replace_user))
                            .route("/{id}", web::patch().to(users::update_user))
                            .route("/{id}", web::delete().to(users::delete_user)),
                    )
                    .service(
                        web::scope("/books")
                            .route("", web::get().to(books::list_books))
                            .route("", web::post().to(books::create_book))
                            .route("/{id}", web::get().to(books::get_book))
                            .route("/{id}", web::put().to(books::replace_book))
                            .route("/{id}", web::patch().to(books::update_book))
                            .route("/{id}", web::delete().to(books::delete_book)),
                    )
                    .service(
                        web::scope("/authors")
                            .route("", web::get().to(authors::list_authors))
                            .route("", web::post().to(authors::create_author))
                            .route("/{id}", web::get().to(authors::get_author))
                            .route("/{id}", web::put().to(authors::replace_author))
                            .route("/{id}", web::delete().to(authors::delete_author)),
                    )
                    .service(
                        web::scope("/genres")
                            .route("", web::get().to(genres::list_genres))
                            .route("", web::post().to(genres::create_genre))
                            .route("/{id}", web::get().to(genres::get_genre))
                            .route("/{id}", web::put().to(genres::replace_genre))
                            .route("/{id}", web::delete().to(genres::delete_genre)),
                    )
                    .service(
                        web::scope("/reservations")
                            .route("", web::post().to(reservations::create_reservation))
                            .route("", web::get().to(reservations::list_reservations))
                            .route("/my", web::get().to(reservations::list_my_reservations))
                            .route("/{id}", web::get().to(reservations::get_reservation))
                            .route("/{id}", web::put().to(reservations::update_reservation))
                            .route("/{id}", web::delete().to(reservations::delete_reservation)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
