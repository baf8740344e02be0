use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt};
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub table_name: String,
    pub storage_dir: String,
    pub bucket_name: String,
    /// When unset, listings point at this server's own `/objects` route.
    pub cdn_domain: Option<String>,
    pub region: String,
    pub public_url: String,
    pub signing_secret: String,
}

// Hand-written so the signing secret never reaches the logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("table_name", &self.table_name)
            .field("storage_dir", &self.storage_dir)
            .field("bucket_name", &self.bucket_name)
            .field("cdn_domain", &self.cdn_domain)
            .field("region", &self.region)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Movie upload and catalog API")]
pub struct Args {
    /// Host to bind to (overrides MOVIE_APP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MOVIE_APP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides MOVIE_APP_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Record table name (overrides MOVIE_APP_TABLE_NAME)
    #[arg(long)]
    pub table_name: Option<String>,

    /// Directory where objects are stored (overrides MOVIE_APP_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Bucket holding videos and thumbnails (overrides MOVIE_APP_BUCKET_NAME)
    #[arg(long)]
    pub bucket_name: Option<String>,

    /// Content-delivery domain used in listing URLs (overrides MOVIE_APP_CDN_DOMAIN)
    #[arg(long)]
    pub cdn_domain: Option<String>,

    /// Deployment region (overrides MOVIE_APP_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Base URL clients use to reach the upload endpoint (overrides MOVIE_APP_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values looked up by environment variable name.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let env_port = match lookup("MOVIE_APP_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing MOVIE_APP_PORT value `{}`", value))?,
            None => 3000,
        };

        let host = args.host.unwrap_or_else(|| var("MOVIE_APP_HOST", "0.0.0.0"));
        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or_else(|| lookup("MOVIE_APP_PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let signing_secret = lookup("MOVIE_APP_SIGNING_SECRET").unwrap_or_else(|| {
            tracing::warn!(
                "MOVIE_APP_SIGNING_SECRET not set; upload URLs will not survive a restart"
            );
            Uuid::new_v4().simple().to_string()
        });

        Ok(Self {
            database_url: args
                .database_url
                .unwrap_or_else(|| var("MOVIE_APP_DATABASE_URL", "sqlite://./data/meta/movies.db")),
            table_name: args
                .table_name
                .unwrap_or_else(|| var("MOVIE_APP_TABLE_NAME", "movies")),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| var("MOVIE_APP_STORAGE_DIR", "./data/objects")),
            bucket_name: args
                .bucket_name
                .unwrap_or_else(|| var("MOVIE_APP_BUCKET_NAME", "movie-app-uploads")),
            cdn_domain: args
                .cdn_domain
                .or_else(|| lookup("MOVIE_APP_CDN_DOMAIN"))
                .filter(|domain| !domain.trim().is_empty()),
            region: args.region.unwrap_or_else(|| var("MOVIE_APP_REGION", "local")),
            host,
            port,
            public_url,
            signing_secret,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL prefixed to object keys in listings.
    pub fn delivery_base(&self) -> String {
        match &self.cdn_domain {
            Some(domain) => format!("https://{}", domain.trim_end_matches('/')),
            None => format!("{}/objects", self.public_url.trim_end_matches('/')),
        }
    }
}
