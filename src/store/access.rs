//! Access rule lookup across the legacy and versioned listing endpoints.

use crate::backend::{AccessRight, ApiError, GrantAccess, ShareAccess, ShareApi};
use crate::microversion::Microversion;

/// Access rule normalised from either listing shape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct AccessRule {
    pub(crate) id: String,
    pub(crate) access_type: String,
    pub(crate) access_to: String,
    pub(crate) access_level: String,
}

impl AccessRule {
    pub(crate) fn grant(&self) -> GrantAccess {
        GrantAccess {
            access_type: self.access_type.clone(),
            access_to: self.access_to.clone(),
            access_level: self.access_level.clone(),
        }
    }
}

impl From<AccessRight> for AccessRule {
    fn from(rule: AccessRight) -> Self {
        Self {
            id: rule.id,
            access_type: rule.access_type,
            access_to: rule.access_to,
            access_level: rule.access_level,
        }
    }
}

impl From<ShareAccess> for AccessRule {
    fn from(rule: ShareAccess) -> Self {
        Self {
            id: rule.id,
            access_type: rule.access_type,
            access_to: rule.access_to,
            access_level: rule.access_level,
        }
    }
}

/// Rules as returned by whichever endpoint the microversion allows.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum AccessRuleListing {
    /// `access_list` share action, used at the minimum microversion.
    Legacy(Vec<AccessRight>),
    /// `share-access-rules` collection.
    Versioned(Vec<ShareAccess>),
}

impl AccessRuleListing {
    /// Lists the rules of `share_id` through the endpoint matching `version`.
    pub(crate) async fn fetch<A: ShareApi>(
        api: &A,
        version: Microversion,
        share_id: &str,
    ) -> Result<Self, ApiError> {
        if version == Microversion::MINIMUM {
            api.list_access_rights(share_id).await.map(Self::Legacy)
        } else {
            api.list_share_access_rules(share_id)
                .await
                .map(Self::Versioned)
        }
    }

    /// Returns the first rule, if any. Further rules are not propagated.
    pub(crate) fn into_first(self) -> Option<AccessRule> {
        match self {
            Self::Legacy(rules) => rules.into_iter().next().map(AccessRule::from),
            Self::Versioned(rules) => rules.into_iter().next().map(AccessRule::from),
        }
    }
}
