use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named bucket of the request-rate policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitClass {
    Login,
    Register,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max: u64,
    pub window: Duration,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Login => "login",
            LimitClass::Register => "register",
            LimitClass::Api => "api",
        }
    }

    pub fn policy(&self) -> RatePolicy {
        match self {
            LimitClass::Login => RatePolicy {
                max: 5,
                window: Duration::from_secs(15 * 60),
            },
            LimitClass::Register => RatePolicy {
                max: 3,
                window: Duration::from_secs(60 * 60),
            },
            LimitClass::Api => RatePolicy {
                max: 100,
                window: Duration::from_secs(60),
            },
        }
    }
}

impl fmt::Display for LimitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitClass {
    type Err = std::convert::Infallible;

    // Unknown classes fall back to the generic api policy.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "login" => LimitClass::Login,
            "register" => LimitClass::Register,
            _ => LimitClass::Api,
        })
    }
}
