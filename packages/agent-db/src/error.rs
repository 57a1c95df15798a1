use agentdb_bucket_store::Error as StoreError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The store file could not be opened, or a transaction failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid port mapping: {message}")]
    InvalidMapping { message: String },
}
