use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Operation kind. Closed set; every public repository operation maps to exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    Get,
    Put,
    Delete,
    Import,
    PutChild,
    ImportChild,
    Move,
    Copy,
    Rename,
    CreateLink,
    RemoveLink,
    ResourceExists,
    AddAssociation,
    RemoveAssociation,
    GetAssociations,
    GetAllAssociations,
    ApplyTag,
    GetResourcePathsWithTag,
    GetTags,
    RemoveTag,
    AddComment,
    EditComment,
    RemoveComment,
    GetComments,
    RateResource,
    GetAverageRating,
    GetRating,
    CreateVersion,
    GetVersions,
    RestoreVersion,
    ExecuteQuery,
    SearchContent,
    Dump,
    Restore,
    GetRegistryContext,
}

impl Method {
    pub const ALL: [Method; 35] = [
        Method::Get,
        Method::Put,
        Method::Delete,
        Method::Import,
        Method::PutChild,
        Method::ImportChild,
        Method::Move,
        Method::Copy,
        Method::Rename,
        Method::CreateLink,
        Method::RemoveLink,
        Method::ResourceExists,
        Method::AddAssociation,
        Method::RemoveAssociation,
        Method::GetAssociations,
        Method::GetAllAssociations,
        Method::ApplyTag,
        Method::GetResourcePathsWithTag,
        Method::GetTags,
        Method::RemoveTag,
        Method::AddComment,
        Method::EditComment,
        Method::RemoveComment,
        Method::GetComments,
        Method::RateResource,
        Method::GetAverageRating,
        Method::GetRating,
        Method::CreateVersion,
        Method::GetVersions,
        Method::RestoreVersion,
        Method::ExecuteQuery,
        Method::SearchContent,
        Method::Dump,
        Method::Restore,
        Method::GetRegistryContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Import => "IMPORT",
            Method::PutChild => "PUT_CHILD",
            Method::ImportChild => "IMPORT_CHILD",
            Method::Move => "MOVE",
            Method::Copy => "COPY",
            Method::Rename => "RENAME",
            Method::CreateLink => "CREATE_LINK",
            Method::RemoveLink => "REMOVE_LINK",
            Method::ResourceExists => "RESOURCE_EXISTS",
            Method::AddAssociation => "ADD_ASSOCIATION",
            Method::RemoveAssociation => "REMOVE_ASSOCIATION",
            Method::GetAssociations => "GET_ASSOCIATIONS",
            Method::GetAllAssociations => "GET_ALL_ASSOCIATIONS",
            Method::ApplyTag => "APPLY_TAG",
            Method::GetResourcePathsWithTag => "GET_RESOURCE_PATHS_WITH_TAG",
            Method::GetTags => "GET_TAGS",
            Method::RemoveTag => "REMOVE_TAG",
            Method::AddComment => "ADD_COMMENT",
            Method::EditComment => "EDIT_COMMENT",
            Method::RemoveComment => "REMOVE_COMMENT",
            Method::GetComments => "GET_COMMENTS",
            Method::RateResource => "RATE_RESOURCE",
            Method::GetAverageRating => "GET_AVERAGE_RATING",
            Method::GetRating => "GET_RATING",
            Method::CreateVersion => "CREATE_VERSION",
            Method::GetVersions => "GET_VERSIONS",
            Method::RestoreVersion => "RESTORE_VERSION",
            Method::ExecuteQuery => "EXECUTE_QUERY",
            Method::SearchContent => "SEARCH_CONTENT",
            Method::Dump => "DUMP",
            Method::Restore => "RESTORE",
            Method::GetRegistryContext => "GET_REGISTRY_CONTEXT",
        }
    }

    /// Methods that change stored state. Read-only mounts and registries reject these.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Method::Put
                | Method::Delete
                | Method::Import
                | Method::PutChild
                | Method::ImportChild
                | Method::Move
                | Method::Copy
                | Method::Rename
                | Method::CreateLink
                | Method::RemoveLink
                | Method::AddAssociation
                | Method::RemoveAssociation
                | Method::ApplyTag
                | Method::RemoveTag
                | Method::AddComment
                | Method::EditComment
                | Method::RemoveComment
                | Method::RateResource
                | Method::CreateVersion
                | Method::RestoreVersion
                | Method::Restore
        )
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Method {
    type Err = RegistryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| RegistryError::instantiation(s, "unknown method"))
    }
}
