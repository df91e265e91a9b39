/// Log-and-continue handling for results whose failure must not stop the
/// sampling loop.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error under the given context and converts to an `Option`.
    fn ok_log(self, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{context}: {err}");
                None
            }
        }
    }
}
