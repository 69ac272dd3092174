use crate::config::CacheConfig;
use crate::error::StorageError;
use crate::store::StorageAdapter;
use std::fmt;

/// Opaque value that ties persisted data to one version of its producer.
///
/// Persisted in its textual form, so `Float(3.0)` and `Text("3")` are considered equal.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidatorToken {
    Text(String),
    Integer(i128),
    Float(f64),
}

impl fmt::Display for ValidatorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorToken::Text(text) => f.write_str(text),
            ValidatorToken::Integer(number) => write!(f, "{number}"),
            // whole floats print without a fraction: 3.0 becomes "3"
            ValidatorToken::Float(number) => write!(f, "{number}"),
        }
    }
}

impl From<&str> for ValidatorToken {
    fn from(text: &str) -> Self {
        ValidatorToken::Text(text.to_owned())
    }
}

impl From<String> for ValidatorToken {
    fn from(text: String) -> Self {
        ValidatorToken::Text(text)
    }
}

macro_rules! token_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ValidatorToken {
                fn from(number: $ty) -> Self {
                    ValidatorToken::Integer(number.into())
                }
            }
        )*
    };
}

token_from_integer!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl From<f64> for ValidatorToken {
    fn from(number: f64) -> Self {
        ValidatorToken::Float(number)
    }
}

/// What the gate did to the persisted data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// No token was supplied, persisted data is trusted as-is.
    Unchecked,
    /// The persisted token matched.
    Matched,
    /// The persisted token was missing or different; storage was wiped.
    Invalidated,
}

/// Checks that `storage` accepts writes, then compares `token` against the persisted validator.
///
/// On mismatch the whole store is cleared before the new token is written. Any error means the
/// storage cannot be trusted and the caller should continue without it.
pub(crate) fn run_gate(
    storage: &mut dyn StorageAdapter,
    token: Option<&ValidatorToken>,
    config: &CacheConfig,
) -> Result<GateOutcome, StorageError> {
    storage.set(&config.probe_key, &config.probe_key)?;
    storage.remove(&config.probe_key)?;

    let Some(token) = token else {
        return Ok(GateOutcome::Unchecked);
    };

    let expected = token.to_string();
    let stored = storage.get(&config.validator_key)?;
    if stored.as_deref() == Some(expected.as_str()) {
        return Ok(GateOutcome::Matched);
    }

    tracing::debug!(
        stored = stored.as_deref().unwrap_or("<none>"),
        expected = %expected,
        "validator changed, erasing persisted partitions"
    );
    storage.clear()?;
    storage.set(&config.validator_key, &expected)?;

    Ok(GateOutcome::Invalidated)
}
