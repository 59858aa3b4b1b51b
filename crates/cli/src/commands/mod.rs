pub mod migrate;
pub mod seed;

use secrecy::SecretString;

/// Read the database URL, preferring `MARKETPLACE_DATABASE_URL`.
pub fn database_url() -> Result<SecretString, &'static str> {
    dotenvy::dotenv().ok();
    std::env::var("MARKETPLACE_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "MARKETPLACE_DATABASE_URL not set")
}
