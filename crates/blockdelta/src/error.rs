pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failures surfaced to the caller.
///
/// Internal consistency violations (double block claims, temp blocks surviving DAG
/// conversion, circuit-handler contract breaks) are not represented here: they panic,
/// since continuing would silently produce a corrupt, potentially data-destroying
/// payload. Scratch exhaustion is not an error at all; it takes the demotion path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("operation for {file_name:?} has no destination extents")]
    MissingDstExtents { file_name: String },

    #[error("failed to regenerate a full operation for {file_name:?}: {message}")]
    Regenerate { file_name: String, message: String },
}
