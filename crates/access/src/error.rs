/// Errors surfaced by the typed parsing entry points.
///
/// The boolean checks never return these; they log and deny instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// A resource token was not of the form `menuName:action`.
    #[error("malformed resource '{token}': {reason}")]
    MalformedInput { token: String, reason: String },
}
