use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoostError {
    #[error("host not found: {0}")]
    HostNotFound(i64),

    #[error("scheduled change not found: {0}")]
    ChangeNotFound(i64),

    #[error("host {0} is not associated with any daemon")]
    NoDaemonAssociations(i64),

    #[error("host {0} has a daemon association with no resolved daemon")]
    UnresolvedDaemon(i64),

    #[error("host {0} has a daemon association with no resolved app")]
    UnresolvedApp(i64),

    #[error("host {0} has no identifiers")]
    NoIdentifiers(i64),

    #[error("invalid host identifier '{0}': expected hex octets")]
    InvalidIdentifier(String),

    #[error("unknown app kind: {0}")]
    UnknownAppKind(String),

    #[error("unknown host identifier kind: {0}")]
    UnknownIdentifierKind(String),

    #[error("app '{0}' has no control access point")]
    NoControlAccessPoint(String),

    #[error("daemon {0} is locked by another configuration change")]
    DaemonLocked(i64),

    #[error("scheduling a change requires an owning user")]
    MissingUser,

    #[error("change has no staged {target} {operation} update")]
    MissingUpdate { target: String, operation: String },

    #[error("staged update for host {0} is missing its before snapshot")]
    MissingSnapshot(i64),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("cannot decode scheduled recipe for {operation}: {reason}")]
    RecipeDecode { operation: String, reason: String },

    #[error("malformed control channel response to {command}: {reason}")]
    MalformedResponse { command: String, reason: String },

    #[error("cannot reach {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("http client setup failed: {0}")]
    HttpClient(String),

    #[error("{command} command to {app} failed: {detail}")]
    CommandFailed {
        command: String,
        app: String,
        detail: String,
    },

    #[error("id {id} is already in use in the {table} table")]
    IdInUse { table: String, id: i64 },

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RoostError>;
