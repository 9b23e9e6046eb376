use std::{convert::Into, env, fs, path::PathBuf};

use include_dir::{include_dir, Dir};
use rocket::{
    fairing::{self, Fairing, Info, Kind},
    http::Status,
    request::{self, FromRequest, Outcome},
    response::{
        content::{RawCss, RawHtml},
        Responder,
    },
    tokio::sync::RwLock,
    Build, Request, Rocket, State,
};
use tera::{Context, Tera};
use thiserror::Error;

use crate::{
    database::models::Project,
    error::Error,
    session::{Session, SessionUser},
};

static TEMPLATE_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");
static STYLE: &str = include_str!("../webroot/style.css");

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Could not read directory '{0}'. {1}")]
    FailedToReadDirectory(PathBuf, std::io::Error),
    #[error("Tera encountered an error. {0}")]
    TeraError(#[from] tera::Error),
    #[error("Failed to read file. {0}")]
    FileReadError(std::io::Error),
}

pub struct TemplateFairing;

impl TemplateFairing {
    pub fn fairing() -> Self {
        Self {}
    }
}

#[rocket::async_trait]
impl Fairing for TemplateFairing {
    fn info(&self) -> Info {
        Info {
            name: "Template",
            kind: Kind::Ignite | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let debug_mode = if let Ok(path) = env::var("TEMPLATE_DIR") {
            if let Ok(path) = PathBuf::try_from(&path) {
                Some(path)
            } else {
                error!("Could not load alternative templates. '{path}' is not a valid path.");
                return Err(rocket);
            }
        } else {
            None
        };

        let rocket = if debug_mode.is_some() {
            rocket.mount("/template", routes![refresh])
        } else {
            rocket
        };

        let templates = match Templates::new(debug_mode) {
            Ok(templates) => templates,
            Err(e) => {
                error!("Could not create page renderer. {e}");
                return Err(rocket);
            }
        };

        Ok(rocket.manage(templates))
    }
}

#[get("/refresh")]
async fn refresh(templates: &State<Templates>) -> Result<(), Error> {
    templates.refresh().await?;
    Ok(())
}

pub struct Webpage(RawHtml<String>);

impl From<String> for Webpage {
    fn from(value: String) -> Self {
        Self(RawHtml(value))
    }
}

impl<'r> Responder<'r, 'static> for Webpage {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        self.0.respond_to(request)
    }
}

pub struct Templates {
    debug_mode: Option<PathBuf>,
    tera: RwLock<Tera>,
    style: RwLock<String>,
}

impl Templates {
    fn new(debug_mode: Option<PathBuf>) -> Result<Self, Error> {
        let tera = RwLock::new(load_templates(&debug_mode)?);
        let style = RwLock::new(load_styling(&debug_mode)?);

        Ok(Self {
            debug_mode,
            tera,
            style,
        })
    }

    async fn refresh(&self) -> Result<(), Error> {
        let mut tera = self.tera.write().await;
        *tera = load_templates(&self.debug_mode)?;

        let mut style = self.style.write().await;
        *style = load_styling(&self.debug_mode)?;
        Ok(())
    }
}

/// Renders pages with the request's session baked into the context: the
/// logged-in user (if any) and the session's queued flash messages. The
/// flashes stay queued until a page actually renders; a request that only
/// fetches the stylesheet must not consume them.
pub struct PageRenderer<'r> {
    templates: &'r Templates,
    session: Option<Session<'r>>,
    context: Context,
}

impl<'r> PageRenderer<'r> {
    pub async fn style(&self) -> RawCss<String> {
        RawCss(self.templates.style.read().await.clone())
    }

    pub async fn home(&mut self, projects: Vec<Project>) -> Result<Webpage, Error> {
        self.context.insert("projects", &projects);
        self.render("index").await
    }

    pub async fn contact(&mut self) -> Result<Webpage, Error> {
        self.render("contact").await
    }

    pub async fn project_list(&mut self, projects: Vec<Project>) -> Result<Webpage, Error> {
        self.context.insert("projects", &projects);
        self.render("projects").await
    }

    pub async fn project_detail(&mut self, project: &Project) -> Result<Webpage, Error> {
        self.context.insert("project", project);
        self.render("project").await
    }

    pub async fn login(&mut self) -> Result<Webpage, Error> {
        self.render("login").await
    }

    pub async fn register(&mut self) -> Result<Webpage, Error> {
        self.render("register").await
    }

    async fn render(&mut self, name: &str) -> Result<Webpage, Error> {
        let flashes = match &self.session {
            Some(session) => session.take_flashes().await,
            None => Vec::new(),
        };
        self.context.insert("flashes", &flashes);

        Ok(self
            .templates
            .tera
            .read()
            .await
            .render(name, &self.context)
            .map(Into::into)?)
    }
}

fn load_styling(debug_mode: &Option<PathBuf>) -> Result<String, Error> {
    if let Some(path) = debug_mode {
        Ok(fs::read_to_string(path.join("webroot/style.css"))
            .map_err(TemplateError::FileReadError)?)
    } else {
        Ok(STYLE.to_string())
    }
}

fn load_templates(debug_mode: &Option<PathBuf>) -> Result<Tera, Error> {
    let mut templates = Vec::new();
    if let Some(path) = debug_mode {
        let files = path
            .join("templates")
            .read_dir()
            .map_err(|e| TemplateError::FailedToReadDirectory(path.clone(), e))?
            .flatten();
        for file in files {
            if let Some(name) = file.path().file_stem() {
                let contents =
                    fs::read_to_string(file.path()).map_err(TemplateError::FileReadError)?;
                templates.push((name.to_string_lossy().to_string(), contents));
            }
        }
    } else {
        for file in TEMPLATE_DIR.files() {
            if let Some(filename) = file.path().file_stem() {
                let filename = filename.to_string_lossy();
                let template = String::from_utf8_lossy(file.contents());
                templates.push((filename.to_string(), template.to_string()));
            }
        }
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(templates)
        .map_err(TemplateError::TeraError)?;
    Ok(tera)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageRenderer<'r> {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let mut user: Option<SessionUser> = None;
        let session = match req.guard::<Session<'r>>().await {
            Outcome::Success(session) => {
                user = session.user().await;
                Some(session)
            }
            Outcome::Error(_) | Outcome::Forward(_) => None,
        };

        let mut context = Context::default();
        context.insert("user", &user);

        let guard = req.guard::<&State<Templates>>().await;
        let templates = match guard {
            Outcome::Success(templates) => templates,
            Outcome::Error(_) => {
                return Outcome::Error((Status::InternalServerError, Error::TemplateNotFound))
            }
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        Outcome::Success(PageRenderer {
            templates,
            session,
            context,
        })
    }
}
