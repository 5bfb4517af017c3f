use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of an inbound webhook event. Payload shapes differ per provider,
/// so everything downstream dispatches on this tag with an explicit match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Whatsapp,
    Razorpay,
    Unknown,
}

impl Provider {
    pub fn from_path(segment: &str) -> Self {
        match segment {
            "whatsapp" => Provider::Whatsapp,
            "razorpay" => Provider::Razorpay,
            _ => Provider::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Whatsapp => "whatsapp",
            Provider::Razorpay => "razorpay",
            Provider::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_path_roundtrip() {
        assert_eq!(Provider::from_path("whatsapp"), Provider::Whatsapp);
        assert_eq!(Provider::from_path("razorpay"), Provider::Razorpay);
        assert_eq!(Provider::from_path("smoke-signals"), Provider::Unknown);
        assert_eq!(Provider::Razorpay.as_str(), "razorpay");
    }
}
