use uuid::Uuid;

/// Crate-wide error type. One variant per symbolic error kind the control
/// plane can surface; the (out-of-scope) HTTP layer maps these onto status
/// codes and the error envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("unauthorized")]
    Unauthorized,

    #[error("email not verified")]
    Unverified,

    #[error("account disabled")]
    Disabled,

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("already connected")]
    AlreadyConnected { session_id: Uuid },

    #[error("not connected")]
    NotConnected,

    #[error("no capacity")]
    NoCapacity,

    #[error("address pool exhausted")]
    AddressExhausted,

    #[error("premium plan required")]
    PremiumRequired { upgrade_plan_id: Option<Uuid> },

    #[error("payment failed")]
    PaymentFailed,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("banned, retry after {retry_after_secs}s")]
    Banned { retry_after_secs: u64 },

    #[error("operation timed out")]
    Timeout,

    #[error("dependency unavailable")]
    DependencyDown,

    #[error("internal error")]
    Internal,
}

impl AppError {
    /// Short symbolic code, stable across
    /// releases and suitable for the `error.code` field of the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Unauthenticated => "Unauthenticated",
            AppError::Unauthorized => "Unauthorized",
            AppError::Unverified => "Unverified",
            AppError::Disabled => "Disabled",
            AppError::NotFound => "NotFound",
            AppError::AlreadyExists => "AlreadyExists",
            AppError::AlreadyConnected { .. } => "AlreadyConnected",
            AppError::NotConnected => "NotConnected",
            AppError::NoCapacity => "NoCapacity",
            AppError::AddressExhausted => "AddressExhausted",
            AppError::PremiumRequired { .. } => "PremiumRequired",
            AppError::PaymentFailed => "PaymentFailed",
            AppError::RateLimited { .. } => "RateLimited",
            AppError::Banned { .. } => "Banned",
            AppError::Timeout => "Timeout",
            AppError::DependencyDown => "DependencyDown",
            AppError::Internal => "Internal",
        }
    }
}

/// Lower-level error raised by a relational-store port implementation.
/// The engine converts these to [`AppError::Internal`] or
/// [`AppError::DependencyDown`]; infrastructure detail never crosses that
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("unique constraint violated")]
    Conflict,
    #[error("store connection unavailable")]
    Unavailable,
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Conflict => AppError::AlreadyExists,
            StoreError::Unavailable => AppError::DependencyDown,
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "store backend error");
                AppError::Internal
            }
        }
    }
}

/// Lower-level error raised by a kv-store port implementation.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv store connection unavailable")]
    Unavailable,
    #[error("kv backend error: {0}")]
    Backend(String),
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::Unavailable => AppError::DependencyDown,
            KvError::Backend(msg) => {
                tracing::error!(error = %msg, "kv backend error");
                AppError::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
