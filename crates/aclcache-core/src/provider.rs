use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// How a cloud provider scopes ACLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclBinding {
    /// One ACL object per region, shared by any number of listeners.
    PerRegion,
    /// Each ACL object belongs to exactly one listener.
    PerListener,
}

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    Aliyun,
    Huawei,
    Qcloud,
    Aws,
    Azure,
    OpenStack,
    Ucloud,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aliyun => "Aliyun",
            Self::Huawei => "Huawei",
            Self::Qcloud => "Qcloud",
            Self::Aws => "Aws",
            Self::Azure => "Azure",
            Self::OpenStack => "OpenStack",
            Self::Ucloud => "Ucloud",
        }
    }

    pub fn acl_binding(&self) -> AclBinding {
        match self {
            Self::Huawei => AclBinding::PerListener,
            _ => AclBinding::PerRegion,
        }
    }

    pub fn is_listener_scoped(&self) -> bool {
        self.acl_binding() == AclBinding::PerListener
    }

    /// Listener-scoped ACLs carry no name on the remote side.
    pub fn syncs_acl_name(&self) -> bool {
        !self.is_listener_scoped()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aliyun" => Ok(Self::Aliyun),
            "huawei" => Ok(Self::Huawei),
            "qcloud" => Ok(Self::Qcloud),
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "openstack" => Ok(Self::OpenStack),
            "ucloud" => Ok(Self::Ucloud),
            _ => Err(CoreError::UnknownProvider(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding() {
        assert_eq!(ProviderKind::Huawei.acl_binding(), AclBinding::PerListener);
        assert_eq!(ProviderKind::Aliyun.acl_binding(), AclBinding::PerRegion);
        assert!(!ProviderKind::Huawei.syncs_acl_name());
        assert!(ProviderKind::Qcloud.syncs_acl_name());
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("huawei".parse::<ProviderKind>().unwrap(), ProviderKind::Huawei);
        assert_eq!("OpenStack".parse::<ProviderKind>().unwrap(), ProviderKind::OpenStack);
        assert!("gcp-ish".parse::<ProviderKind>().is_err());
    }
}
