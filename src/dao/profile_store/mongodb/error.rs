//! Error types shared by the MongoDB storage implementation.

use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// No ping succeeded while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// Writing the identity fields of a profile failed.
    #[error("failed to upsert profile `{uid}`")]
    UpsertProfile {
        uid: String,
        #[source]
        source: MongoError,
    },
    /// Reading a profile failed.
    #[error("failed to load profile `{uid}`")]
    LoadProfile {
        uid: String,
        #[source]
        source: MongoError,
    },
    /// Raising the best score or the game counter failed.
    #[error("failed to update profile `{uid}`")]
    UpdateProfile {
        uid: String,
        #[source]
        source: MongoError,
    },
    /// The best-score leaderboard query failed.
    #[error("failed to query the profile leaderboard")]
    QueryLeaderboard {
        #[source]
        source: MongoError,
    },
    /// Appending a score log entry failed.
    #[error("failed to save score entry `{id}`")]
    SaveScore {
        id: uuid::Uuid,
        #[source]
        source: MongoError,
    },
    /// The per-difficulty score query failed.
    #[error("failed to query `{difficulty}` scores")]
    QueryScores {
        difficulty: &'static str,
        #[source]
        source: MongoError,
    },
}
