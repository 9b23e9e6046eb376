#![allow(clippy::no_effect_underscore_binding)]
use rocket::{
    form::Form,
    fs::TempFile,
    response::{content::RawCss, Redirect},
    Build, Rocket, State,
};
use sqlx::SqlitePool;

use auth::Authentication;
use config::AppConfig;
use database::fairing::DatabaseFairing;
use error::Error;
use session::{FlashKind, Session, SessionFairing, SessionUser};
use templates::{PageRenderer, TemplateFairing, Webpage};
use upload::{UploadFairing, UploadStore};

mod auth;
mod config;
mod database;
mod error;
mod session;
mod templates;
mod upload;


#[macro_use]
extern crate rocket;

#[get("/style.css")]
async fn get_style(renderer: PageRenderer<'_>) -> RawCss<String> {
    renderer.style().await
}

#[get("/")]
async fn index(db: &State<SqlitePool>, mut renderer: PageRenderer<'_>) -> Result<Webpage, Error> {
    renderer.home(database::get_all_projects(db).await?).await
}

#[get("/contact")]
async fn contact(mut renderer: PageRenderer<'_>) -> Result<Webpage, Error> {
    renderer.contact().await
}

#[get("/projects")]
async fn project_list(
    _user: SessionUser,
    db: &State<SqlitePool>,
    mut renderer: PageRenderer<'_>,
) -> Result<Webpage, Error> {
    renderer
        .project_list(database::get_all_projects(db).await?)
        .await
}

#[get("/projects", rank = 2)]
async fn project_list_unauthorized(session: Session<'_>) -> Redirect {
    require_login(&session).await
}

#[get("/projects/<id>")]
async fn project_detail(
    id: i64,
    db: &State<SqlitePool>,
    mut renderer: PageRenderer<'_>,
) -> Result<Webpage, Error> {
    let project = database::get_project(db, id)
        .await?
        .ok_or(Error::ProjectNotFound(id))?;
    renderer.project_detail(&project).await
}

#[derive(Debug, FromForm)]
struct NewProjectForm<'r> {
    name: &'r str,
    description: &'r str,
    image: Option<TempFile<'r>>,
}

#[post("/projects/add", data = "<form>")]
async fn add_project(
    _user: SessionUser,
    mut form: Form<NewProjectForm<'_>>,
    db: &State<SqlitePool>,
    uploads: &State<UploadStore>,
) -> Result<Redirect, Error> {
    let image = match form.image.as_mut() {
        Some(file) if file.len() > 0 => Some(uploads.save("project_image", file).await?),
        _ => None,
    };

    if let Err(e) =
        database::create_project(db, form.name, form.description, image.as_deref()).await
    {
        // The insert failed, so the file on disk has no row pointing at it.
        if let Some(image) = &image {
            uploads.discard(image).await;
        }
        return Err(e);
    }

    Ok(Redirect::to(uri!(project_list)))
}

#[post("/projects/add", rank = 2)]
async fn add_project_unauthorized(session: Session<'_>) -> Redirect {
    require_login(&session).await
}

/// The one fallback shared by every login-only route.
async fn require_login(session: &Session<'_>) -> Redirect {
    session
        .flash(FlashKind::Error, "You must be logged in to view this page.")
        .await;
    Redirect::to(uri!(auth::login_get))
}

fn build_app(config: AppConfig) -> Rocket<Build> {
    rocket::build()
        .attach(DatabaseFairing::fairing(&config.database_url))
        .attach(TemplateFairing::fairing())
        .attach(SessionFairing::fairing(&config))
        .attach(UploadFairing::fairing(&config.upload_dir))
        .attach(Authentication::fairing())
        .mount(
            "/",
            routes![
                get_style,
                index,
                contact,
                project_list,
                project_list_unauthorized,
                project_detail,
                add_project,
                add_project_unauthorized,
            ],
        )
}

#[launch]
fn rocket() -> _ {
    build_app(AppConfig::from_figment(&rocket::Config::figment()))
}
