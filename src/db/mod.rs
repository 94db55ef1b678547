mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::jwt::AccessTokenSigner;
use crate::mailer::Mailer;
use crate::payments::StripeClient;
use crate::security::SecurityPolicy;
use crate::tokens::TokenTtls;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool, external collaborators,
/// and the scalar policy knobs handlers need.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub stripe: StripeClient,
    pub mailer: Mailer,
    pub signer: AccessTokenSigner,
    /// Currency code applied to every catalog product (e.g. "usd").
    pub currency: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub security: SecurityPolicy,
    pub token_ttls: TokenTtls,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
