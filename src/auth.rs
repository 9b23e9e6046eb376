use argon2::{Argon2, PasswordHash, PasswordVerifier};
use rocket::{
    fairing::{self, Fairing, Info, Kind},
    form::Form,
    fs::TempFile,
    http::{Cookie, CookieJar},
    response::Redirect,
    Build, Rocket, State,
};
use sqlx::SqlitePool;

use crate::{
    database,
    error::{Error, ErrorResponder},
    session::{FlashKind, Session, SessionUser, SESSION_COOKIE},
    templates::{PageRenderer, Webpage},
    upload::UploadStore,
};

pub struct Authentication {}

impl Authentication {
    pub(crate) fn fairing() -> Self {
        Self {}
    }
}

#[rocket::async_trait]
impl Fairing for Authentication {
    fn info(&self) -> Info {
        Info {
            name: "Authentication",
            kind: Kind::Ignite | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        Ok(rocket.mount(
            "/",
            routes![register_get, register_post, login_get, login_post, logout],
        ))
    }
}

#[derive(Debug, FromForm)]
struct RegistrationForm<'r> {
    name: &'r str,
    email: &'r str,
    password: &'r str,
    picture: Option<TempFile<'r>>,
}

#[derive(FromForm)]
struct LoginForm<'r> {
    email: &'r str,
    password: &'r str,
}

#[get("/register")]
async fn register_get(mut renderer: PageRenderer<'_>) -> Result<Webpage, Error> {
    renderer.register().await
}

#[post("/register", data = "<form>")]
async fn register_post(
    mut form: Form<RegistrationForm<'_>>,
    db: &State<SqlitePool>,
    uploads: &State<UploadStore>,
    session: Session<'_>,
) -> Result<Redirect, Error> {
    let picture = match form.picture.as_mut() {
        Some(file) if file.len() > 0 => Some(uploads.save("profile_picture", file).await?),
        _ => None,
    };

    match database::create_user(db, form.name, form.email, form.password, picture.as_deref()).await
    {
        Ok(()) => {
            session
                .flash(FlashKind::Success, "Registration successful. You can log in now.")
                .await;
            Ok(Redirect::to(uri!(login_get)))
        }
        Err(e) => {
            // The row never made it in, so the picture must go as well.
            if let Some(picture) = &picture {
                uploads.discard(picture).await;
            }
            error!("Registration failed: {e}");
            let (_, message) = e.response();
            session.flash(FlashKind::Error, message).await;
            Ok(Redirect::to(uri!(register_get)))
        }
    }
}

#[get("/login")]
pub(crate) async fn login_get(mut renderer: PageRenderer<'_>) -> Result<Webpage, Error> {
    renderer.login().await
}

#[post("/login", data = "<form>")]
async fn login_post(
    form: Form<LoginForm<'_>>,
    db: &State<SqlitePool>,
    session: Session<'_>,
) -> Result<Redirect, Error> {
    let Some(user) = database::get_user_by_email(db, form.email).await? else {
        session
            .flash(FlashKind::Error, "This email is not registered.")
            .await;
        return Ok(Redirect::to(uri!(login_get)));
    };

    let argon2 = Argon2::default();
    if argon2
        .verify_password(form.password.as_bytes(), &PasswordHash::new(&user.password)?)
        .is_err()
    {
        session.flash(FlashKind::Error, "Wrong password.").await;
        return Ok(Redirect::to(uri!(login_get)));
    }

    session
        .set_user(SessionUser {
            name: user.name.clone(),
            email: user.email,
        })
        .await?;
    session
        .flash(FlashKind::Success, format!("Welcome back, {}!", user.name))
        .await;
    Ok(Redirect::to(uri!("/")))
}

#[get("/logout")]
async fn logout(session: Session<'_>, cookies: &CookieJar<'_>) -> Redirect {
    // Logout always succeeds from the client's point of view.
    if let Err(e) = session.destroy().await {
        error!("Failed to destroy session: {e}");
    }
    cookies.remove(Cookie::from(SESSION_COOKIE));
    Redirect::to(uri!(login_get))
}
