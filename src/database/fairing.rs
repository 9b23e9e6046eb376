use std::str::FromStr;

use rocket::{
    fairing::{self, Fairing, Info, Kind},
    Build, Rocket,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub struct DatabaseFairing {
    connection_string: String,
}

impl DatabaseFairing {
    pub fn fairing(connection_string: &str) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "Database",
            kind: Kind::Ignite | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let options = match SqliteConnectOptions::from_str(&self.connection_string) {
            Ok(options) => options.create_if_missing(true),
            Err(e) => {
                error!(
                    "Invalid database url ({}): {e}",
                    self.connection_string
                );
                return Err(rocket);
            }
        };

        // An in-memory sqlite database exists per connection, so the pool
        // must never open a second one.
        let pool_size = if self.connection_string.contains(":memory:") {
            1
        } else {
            4
        };

        let db = match SqlitePoolOptions::new()
            .max_connections(pool_size)
            .connect_with(options)
            .await
        {
            Ok(db) => db,
            Err(e) => {
                error!(
                    "Failed to connect to database ({}): {e}",
                    self.connection_string
                );
                return Err(rocket);
            }
        };

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            error!("Failed to apply pending migrations: {e}");
            return Err(rocket);
        }
        info!("Database migrations succesfully applied!");

        Ok(rocket.manage(db))
    }
}
