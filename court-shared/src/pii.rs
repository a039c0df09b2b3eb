use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Wraps customer contact data so `Debug`/`Display` (and therefore tracing fields) never print it.
/// Serialization still emits the real value for API responses and ticket payloads.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_is_masked_in_debug() {
        let phone = Masked("+998901234567".to_string());
        assert_eq!(format!("{:?}", phone), "********");
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"+998901234567\"");
    }
}
