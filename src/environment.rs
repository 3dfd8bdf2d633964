use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvironmentError {
    #[error(
        "unknown azure environment `{0}`, expected one of Azure, AzureUSGovernment, AzureChina, AzureGermanCloud"
    )]
    Unknown(String),
}

/// Endpoint settings of a sovereign Azure cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentProfile {
    pub name: &'static str,
    /// Active Directory authority used to request tokens.
    pub auth_endpoint: &'static str,
    /// Audience (resource) tokens are requested for.
    pub token_audience: &'static str,
    pub resource_manager_base_url: &'static str,
}

/// The Azure clouds the driver can deploy to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloudEnvironment {
    #[default]
    Azure,
    AzureUSGovernment,
    AzureChina,
    AzureGermanCloud,
}

const PROFILES: [EnvironmentProfile; 4] = [
    EnvironmentProfile {
        name: "Azure",
        auth_endpoint: "https://login.microsoftonline.com/",
        token_audience: "https://management.core.windows.net/",
        resource_manager_base_url: "https://management.azure.com/",
    },
    EnvironmentProfile {
        name: "AzureUSGovernment",
        auth_endpoint: "https://login.microsoftonline.us/",
        token_audience: "https://management.core.usgovcloudapi.net/",
        resource_manager_base_url: "https://management.usgovcloudapi.net",
    },
    EnvironmentProfile {
        name: "AzureChina",
        auth_endpoint: "https://login.chinacloudapi.cn/",
        token_audience: "https://management.core.chinacloudapi.cn/",
        resource_manager_base_url: "https://management.chinacloudapi.cn",
    },
    EnvironmentProfile {
        name: "AzureGermanCloud",
        auth_endpoint: "https://login.microsoftonline.de/",
        token_audience: "https://management.core.cloudapi.de/",
        resource_manager_base_url: "https://management.microsoftazure.de",
    },
];

impl EnvironmentProfile {
    /// Case-insensitive lookup of a cloud by name. Unknown names have no profile.
    pub fn lookup(name: &str) -> Option<&'static EnvironmentProfile> {
        PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

impl CloudEnvironment {
    pub fn profile(&self) -> &'static EnvironmentProfile {
        let index = match self {
            Self::Azure => 0,
            Self::AzureUSGovernment => 1,
            Self::AzureChina => 2,
            Self::AzureGermanCloud => 3,
        };
        &PROFILES[index]
    }

    pub fn name(&self) -> &'static str {
        self.profile().name
    }
}

impl FromStr for CloudEnvironment {
    type Err = EnvironmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "azureusgovernment" => Ok(Self::AzureUSGovernment),
            "azurechina" => Ok(Self::AzureChina),
            "azuregermancloud" => Ok(Self::AzureGermanCloud),
            _ => Err(EnvironmentError::Unknown(value.to_string())),
        }
    }
}

impl TryFrom<&str> for CloudEnvironment {
    type Error = EnvironmentError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CloudEnvironment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for CloudEnvironment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(
        "Azure",
        "https://login.microsoftonline.com/",
        "https://management.core.windows.net/",
        "https://management.azure.com/"
    )]
    #[case(
        "AzureUSGovernment",
        "https://login.microsoftonline.us/",
        "https://management.core.usgovcloudapi.net/",
        "https://management.usgovcloudapi.net"
    )]
    #[case(
        "AzureChina",
        "https://login.chinacloudapi.cn/",
        "https://management.core.chinacloudapi.cn/",
        "https://management.chinacloudapi.cn"
    )]
    #[case(
        "AzureGermanCloud",
        "https://login.microsoftonline.de/",
        "https://management.core.cloudapi.de/",
        "https://management.microsoftazure.de"
    )]
    fn endpoints(
        #[case] name: &str,
        #[case] auth_endpoint: &str,
        #[case] token_audience: &str,
        #[case] base_url: &str,
    ) {
        let profile = EnvironmentProfile::lookup(name).unwrap();
        assert_eq!(profile.auth_endpoint, auth_endpoint);
        assert_eq!(profile.token_audience, token_audience);
        assert_eq!(profile.resource_manager_base_url, base_url);

        let env: CloudEnvironment = name.parse().unwrap();
        assert_eq!(env.profile(), profile);
        assert_eq!(env.to_string(), name);
    }

    #[rstest]
    #[case("azurechina", CloudEnvironment::AzureChina)]
    #[case("AZURECHINA", CloudEnvironment::AzureChina)]
    #[case("azureUSgovernment", CloudEnvironment::AzureUSGovernment)]
    #[case("AZURE", CloudEnvironment::Azure)]
    fn names_are_case_insensitive(#[case] name: &str, #[case] expected: CloudEnvironment) {
        assert_eq!(CloudEnvironment::try_from(name).unwrap(), expected);
        assert_eq!(
            EnvironmentProfile::lookup(name).unwrap(),
            expected.profile()
        );
    }

    #[rstest]
    #[case("AzureStack")]
    #[case("")]
    #[case("public")]
    fn unknown_names_have_no_match(#[case] name: &str) {
        assert!(EnvironmentProfile::lookup(name).is_none());
        assert_matches!(
            name.parse::<CloudEnvironment>(),
            Err(EnvironmentError::Unknown(n)) if n == name
        );
    }

    #[test]
    fn serde_uses_canonical_names() {
        let env: CloudEnvironment = serde_json::from_str(r#""azuregermancloud""#).unwrap();
        assert_eq!(env, CloudEnvironment::AzureGermanCloud);
        assert_eq!(
            serde_json::to_string(&env).unwrap(),
            r#""AzureGermanCloud""#
        );
        assert!(serde_json::from_str::<CloudEnvironment>(r#""mars""#).is_err());
    }
}
