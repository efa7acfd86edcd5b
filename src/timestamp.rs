use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// A Unix timestamp represented as a `u64`, used for nonce expiry windows.
///
/// Encodes seconds since the Unix epoch (1970-01-01T00:00:00Z). Every issued
/// nonce carries an expiry timestamp; verification and settlement both check
/// it against the current wall clock before touching the ledger.
///
/// Serialized as a stringified integer to avoid loss of precision in JSON.
/// For example, `1699999999` becomes `"1699999999"` in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// True if `self` is strictly earlier than `now`.
    pub fn is_past(&self, now: UnixTimestamp) -> bool {
        self.0 < now.0
    }

    pub fn saturating_sub(self, rhs: u64) -> Self {
        Self(self.0.saturating_sub(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_wire_format() {
        let ts = UnixTimestamp::from_secs(1699999999);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"1699999999\"");
        let back: UnixTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_rejects_non_numeric() {
        let result: Result<UnixTimestamp, _> = serde_json::from_str("\"not-a-number\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_is_past() {
        let now = UnixTimestamp::from_secs(1000);
        assert!(UnixTimestamp::from_secs(999).is_past(now));
        assert!(!UnixTimestamp::from_secs(1000).is_past(now));
        assert!(!UnixTimestamp::from_secs(1001).is_past(now));
    }
}
