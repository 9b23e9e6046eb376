use std::path::{Path, PathBuf};

use chrono::Utc;
use rocket::{
    fairing::{self, Fairing, Info, Kind},
    fs::{FileServer, TempFile},
    http::ContentType,
    tokio::fs,
    Build, Rocket,
};

use crate::error::Error;

/// Writes uploaded files into the configured upload directory. Files are
/// referenced by their generated filename only; the directory itself is
/// served read-only at `/uploads`.
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Stores an uploaded file under `<field>_<unix-millis>.<ext>` and
    /// returns the generated filename. The extension comes from the
    /// submitted content type.
    pub async fn save(&self, field: &str, file: &mut TempFile<'_>) -> Result<String, Error> {
        let extension = file
            .content_type()
            .and_then(ContentType::extension)
            .map_or_else(|| "bin".to_string(), |ext| ext.as_str().to_ascii_lowercase());
        let filename = format!("{field}_{}.{extension}", Utc::now().timestamp_millis());

        file.copy_to(self.dir.join(&filename))
            .await
            .map_err(Error::UploadFailed)?;
        Ok(filename)
    }

    /// Removes a stored file again, so a controller can compensate when a
    /// database insert fails after the file already hit the disk.
    pub async fn discard(&self, filename: &str) {
        if let Err(e) = fs::remove_file(self.dir.join(filename)).await {
            warn!("Failed to remove uploaded file '{filename}': {e}");
        }
    }
}

pub struct UploadFairing {
    dir: PathBuf,
}

impl UploadFairing {
    pub fn fairing(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

#[rocket::async_trait]
impl Fairing for UploadFairing {
    fn info(&self) -> Info {
        Info {
            name: "Uploads",
            kind: Kind::Ignite | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        if let Err(e) = fs::create_dir_all(&self.dir).await {
            error!(
                "Could not create upload directory '{}': {e}",
                self.dir.display()
            );
            return Err(rocket);
        }

        Ok(rocket
            .mount("/uploads", FileServer::from(self.dir.clone()))
            .manage(UploadStore {
                dir: self.dir.clone(),
            }))
    }
}
